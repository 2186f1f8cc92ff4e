//! Text and password input field

use crate::field::{FormField, RawData, value_as_string};
use crate::fields::REQUIRED_MESSAGE;
use crate::render::{RenderSink, escape_attribute, escape_html};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

type TextValidator = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextWidget {
	TextInput,
	PasswordInput,
	TextArea,
}

/// Single-line text, password or textarea field with length validation
#[derive(Clone)]
pub struct TextField {
	pub name: String,
	pub label: Option<String>,
	pub required: bool,
	pub db_path: Option<String>,
	pub widget: TextWidget,
	pub max_length: Option<usize>,
	pub min_length: Option<usize>,
	pub strip: bool,
	validators: Vec<TextValidator>,
	value: Option<String>,
	data: RawData,
	errors: Vec<String>,
}

impl TextField {
	/// Create a new TextField with the given name
	///
	/// # Examples
	///
	/// ```
	/// use formage_forms::fields::TextField;
	///
	/// let field = TextField::new("username");
	/// assert_eq!(field.name, "username");
	/// assert!(!field.required);
	/// assert_eq!(field.db_path, None);
	/// ```
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			label: None,
			required: false,
			db_path: None,
			widget: TextWidget::TextInput,
			max_length: None,
			min_length: None,
			strip: true,
			validators: Vec::new(),
			value: None,
			data: RawData::new(),
			errors: Vec::new(),
		}
	}

	/// A password input. Its value is never echoed back when rendering.
	pub fn password(name: impl Into<String>) -> Self {
		Self::new(name).with_widget(TextWidget::PasswordInput)
	}

	pub fn required(mut self) -> Self {
		self.required = true;
		self
	}

	/// Commit the validated value to the instance path of the same name.
	///
	/// # Examples
	///
	/// ```
	/// use formage_forms::fields::TextField;
	///
	/// let field = TextField::new("meta.slug").stored();
	/// assert_eq!(field.db_path.as_deref(), Some("meta.slug"));
	/// ```
	pub fn stored(mut self) -> Self {
		self.db_path = Some(self.name.clone());
		self
	}

	pub fn with_db_path(mut self, db_path: impl Into<String>) -> Self {
		self.db_path = Some(db_path.into());
		self
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	pub fn with_widget(mut self, widget: TextWidget) -> Self {
		self.widget = widget;
		self
	}

	pub fn with_max_length(mut self, max_length: usize) -> Self {
		self.max_length = Some(max_length);
		self
	}

	pub fn with_min_length(mut self, min_length: usize) -> Self {
		self.min_length = Some(min_length);
		self
	}

	pub fn no_strip(mut self) -> Self {
		self.strip = false;
		self
	}

	/// Add a custom check run after the built-in length checks
	///
	/// # Examples
	///
	/// ```
	/// use formage_forms::fields::TextField;
	///
	/// let field = TextField::new("code").with_validator(|value| {
	///     if value.chars().all(|c| c.is_ascii_uppercase()) {
	///         Ok(())
	///     } else {
	///         Err("Use uppercase letters only".to_string())
	///     }
	/// });
	/// ```
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validators.push(Arc::new(validator));
		self
	}

	/// The current value after stripping, `None` when empty.
	pub fn value(&self) -> Option<&str> {
		self.value
			.as_deref()
			.map(|v| if self.strip { v.trim() } else { v })
			.filter(|v| !v.is_empty())
	}

	fn check(&self) -> Vec<String> {
		let Some(value) = self.value() else {
			return if self.required {
				vec![REQUIRED_MESSAGE.to_string()]
			} else {
				Vec::new()
			};
		};

		// Lengths count characters, not bytes
		let char_count = value.chars().count();
		let mut errors = Vec::new();
		if let Some(max_length) = self.max_length
			&& char_count > max_length
		{
			errors.push(format!(
				"Ensure this value has at most {} characters (it has {})",
				max_length, char_count
			));
		}
		if let Some(min_length) = self.min_length
			&& char_count < min_length
		{
			errors.push(format!(
				"Ensure this value has at least {} characters (it has {})",
				min_length, char_count
			));
		}
		if errors.is_empty() {
			errors.extend(self.validators.iter().filter_map(|v| v(value).err()));
		}
		errors
	}
}

impl std::fmt::Debug for TextField {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TextField")
			.field("name", &self.name)
			.field("widget", &self.widget)
			.field("value", &self.value)
			.field("errors", &self.errors)
			.finish_non_exhaustive()
	}
}

#[async_trait]
impl FormField for TextField {
	fn name(&self) -> &str {
		&self.name
	}

	fn label(&self) -> Option<&str> {
		self.label.as_deref()
	}

	fn required(&self) -> bool {
		self.required
	}

	fn db_path(&self) -> Option<&str> {
		self.db_path.as_deref()
	}

	fn bind(&mut self, value: Option<Value>) {
		self.value = value.as_ref().and_then(value_as_string);
	}

	fn set_data(&mut self, data: RawData) {
		self.data = data;
	}

	fn unbind(&mut self) {
		self.value = self.data.get(&self.name).and_then(value_as_string);
	}

	async fn validate(&mut self) {
		self.errors = self.check();
	}

	fn errors(&self) -> &[String] {
		&self.errors
	}

	fn set_errors(&mut self, errors: Vec<String>) {
		self.errors = errors;
	}

	fn get_value(&mut self) -> Value {
		self.value()
			.map(|v| Value::String(v.to_string()))
			.unwrap_or(Value::Null)
	}

	fn render(&self, sink: &mut dyn RenderSink) {
		let name = escape_attribute(&self.name);
		let value = self.value.as_deref().unwrap_or_default();
		match self.widget {
			TextWidget::TextArea => sink.write(&format!(
				"<textarea name=\"{name}\" id=\"id_{name}\">{}</textarea>\n",
				escape_html(value)
			)),
			TextWidget::PasswordInput => sink.write(&format!(
				"<input type=\"password\" name=\"{name}\" id=\"id_{name}\" />\n"
			)),
			TextWidget::TextInput => sink.write(&format!(
				"<input type=\"text\" name=\"{name}\" id=\"id_{name}\" value=\"{}\" />\n",
				escape_attribute(value)
			)),
		}
	}
}
