//! Form settings
//!
//! Settings are usually read from a TOML file and turned into [`FormOptions`]
//! for each form:
//!
//! ```toml
//! static_root = "/admin"
//! default_exclude = ["created_at"]
//!
//! [assets]
//! ckeditor = false
//! ```

use crate::error::ConfigError;
use crate::form::{FormOptions, VERSION_KEY};
use serde::Deserialize;
use std::path::Path;

/// Which bundled client assets `render_head` declares.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AssetSettings {
	pub select2: bool,
	pub datetimepicker: bool,
	pub ckeditor: bool,
	pub bootbox: bool,
	pub socketio: bool,
}

impl Default for AssetSettings {
	fn default() -> Self {
		Self {
			select2: true,
			datetimepicker: true,
			ckeditor: true,
			bootbox: true,
			socketio: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct FormSettings {
	/// Prefix of every bundled asset URL, without a trailing slash.
	pub static_root: String,
	/// Field names left out of every form, on top of `__v`.
	pub default_exclude: Vec<String>,
	/// Extra lines appended to every form head.
	pub header_lines: Vec<String>,
	pub assets: AssetSettings,
}

impl FormSettings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_static_root(mut self, static_root: impl Into<String>) -> Self {
		self.static_root = static_root.into().trim_end_matches('/').to_string();
		self
	}

	pub fn with_exclude(mut self, name: impl Into<String>) -> Self {
		self.default_exclude.push(name.into());
		self
	}

	pub fn with_header_line(mut self, line: impl Into<String>) -> Self {
		self.header_lines.push(line.into());
		self
	}

	pub fn with_assets(mut self, assets: AssetSettings) -> Self {
		self.assets = assets;
		self
	}

	/// Parse settings from TOML
	///
	/// # Examples
	///
	/// ```
	/// use formage_forms::FormSettings;
	///
	/// let settings = FormSettings::from_toml_str(r#"
	///     static_root = "/admin"
	///     [assets]
	///     ckeditor = false
	/// "#).unwrap();
	///
	/// assert_eq!(settings.static_root, "/admin");
	/// assert!(!settings.assets.ckeditor);
	/// assert!(settings.assets.select2);
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let mut settings: Self = toml::from_str(source)?;
		settings.static_root = settings.static_root.trim_end_matches('/').to_string();
		Ok(settings)
	}

	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let source = std::fs::read_to_string(path.as_ref())?;
		tracing::debug!(path = %path.as_ref().display(), "Loading form settings");
		Self::from_toml_str(&source)
	}

	/// The bundled asset declarations, rooted at `static_root`.
	pub fn asset_lines(&self) -> Vec<String> {
		let root = &self.static_root;
		let assets = &self.assets;
		let mut lines = Vec::new();
		if assets.select2 {
			lines.push(format!("<link rel=\"stylesheet\" href=\"{root}/vendor/select2/select2.css\" />"));
		}
		if assets.datetimepicker {
			lines.push(format!(
				"<link rel=\"stylesheet\" href=\"{root}/vendor/bootstrap-datetimepicker/build/css/bootstrap-datetimepicker.min.css\" />"
			));
		}
		lines.push(format!("<link rel=\"stylesheet\" href=\"{root}/css/main.css\" />"));
		if assets.select2 {
			lines.push(format!("<script src=\"{root}/vendor/select2/select2.js\" ></script>"));
		}
		if assets.socketio {
			lines.push(format!(
				"<script src=\"{root}/vendor/socket.io-client/dist/socket.io.js\" ></script>"
			));
		}
		if assets.ckeditor {
			lines.push(format!("<script src=\"{root}/vendor/ckeditor/ckeditor.js\" ></script>"));
		}
		if assets.bootbox {
			lines.push(format!("<script src=\"{root}/vendor/bootbox/bootbox.js\" ></script>"));
		}
		if assets.datetimepicker {
			lines.push(format!(
				"<script src=\"{root}/vendor/bootstrap-datetimepicker/build/js/bootstrap-datetimepicker.min.js\" ></script>"
			));
		}
		lines.push(format!("<script src=\"{root}/js/document.js\" ></script>"));
		if assets.socketio {
			lines.push("<script>window.socketio = io.connect(\"/formage\");</script>".to_string());
		}
		lines
	}

	/// Options for one form built under these settings.
	pub fn to_options(&self) -> FormOptions {
		let mut exclude = vec![VERSION_KEY.to_string()];
		for name in &self.default_exclude {
			if !exclude.contains(name) {
				exclude.push(name.clone());
			}
		}
		FormOptions {
			exclude,
			header_lines: self.header_lines.clone(),
			asset_lines: self.asset_lines(),
		}
	}
}

impl From<FormSettings> for FormOptions {
	fn from(settings: FormSettings) -> Self {
		settings.to_options()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::io::Write;

	#[rstest]
	fn test_defaults_declare_every_asset() {
		// Act
		let lines = FormSettings::default().asset_lines();

		// Assert
		assert_eq!(lines.len(), 10);
		assert_eq!(lines[2], "<link rel=\"stylesheet\" href=\"/css/main.css\" />");
		assert_eq!(
			lines.last().map(String::as_str),
			Some("<script>window.socketio = io.connect(\"/formage\");</script>")
		);
	}

	#[rstest]
	fn test_disabled_assets_are_left_out() {
		// Arrange
		let settings = FormSettings::new().with_assets(AssetSettings {
			select2: false,
			datetimepicker: false,
			ckeditor: false,
			bootbox: false,
			socketio: false,
		});

		// Act
		let lines = settings.asset_lines();

		// Assert
		assert_eq!(
			lines,
			[
				"<link rel=\"stylesheet\" href=\"/css/main.css\" />",
				"<script src=\"/js/document.js\" ></script>",
			]
		);
	}

	#[rstest]
	fn test_trailing_slash_is_trimmed() {
		let settings = FormSettings::from_toml_str("static_root = \"/admin/\"").unwrap();
		assert_eq!(settings.static_root, "/admin");
	}

	#[rstest]
	fn test_options_always_exclude_version_key() {
		// Arrange
		let settings = FormSettings::new().with_exclude("created_at").with_exclude(VERSION_KEY);

		// Act
		let options: FormOptions = settings.into();

		// Assert
		assert_eq!(options.exclude, [VERSION_KEY, "created_at"]);
	}

	#[rstest]
	fn test_from_file() {
		// Arrange
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "default_exclude = [\"secret\"]\nheader_lines = [\"<meta x>\"]").unwrap();

		// Act
		let settings = FormSettings::from_file(file.path()).unwrap();

		// Assert
		assert_eq!(settings.default_exclude, ["secret"]);
		assert_eq!(settings.header_lines, ["<meta x>"]);
		assert_eq!(settings.assets, AssetSettings::default());
	}

	#[rstest]
	fn test_malformed_toml_is_reported() {
		let err = FormSettings::from_toml_str("static_root = [").unwrap_err();
		assert!(matches!(err, ConfigError::Toml(_)));
	}
}
