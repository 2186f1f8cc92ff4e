//! Error types shared by the form engine

use indexmap::IndexMap;
use serde::Serialize;

/// Ordered mapping of field name to its validation messages.
pub type ErrorMap = IndexMap<String, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum FormError {
	/// A schema reference could not be resolved while building the field hierarchy.
	#[error("{message}referred by model `{model}`")]
	MissingReference { model: String, message: String },
	/// Save was attempted while the form holds validation errors.
	#[error("not valid\n{0}")]
	Invalid(String),
	#[error("Pre-process failed for field {field}: {message}")]
	PreProcess { field: String, message: String },
	#[error("Cannot construct `{model}` from inline value: {message}")]
	Construct { model: String, message: String },
	#[error(transparent)]
	Hierarchy(#[from] HierarchyError),
	#[error(transparent)]
	Path(#[from] ModelPathError),
	#[error(transparent)]
	Storage(#[from] StorageError),
	#[error(transparent)]
	Config(#[from] ConfigError),
}

pub type FormResult<T> = Result<T, FormError>;

/// Failure reported by a [`HierarchyBuilder`](crate::hierarchy::HierarchyBuilder).
#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
	#[error("{0}")]
	MissingReference(String),
	#[error("Duplicate flattened field name `{0}`")]
	DuplicateName(String),
}

/// Failure of the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[error("Duplicate key: {0}")]
	Duplicate(String),
	#[error("Storage backend error: {0}")]
	Backend(#[from] anyhow::Error),
}

/// Failure to write a value at a dotted path on a model instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelPathError {
	#[error("Empty path")]
	Empty,
	#[error("Path `{path}` crosses non-container segment `{segment}`")]
	NotAContainer { path: String, segment: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),
}

/// The error map of a form that failed validation.
///
/// # Examples
///
/// ```
/// use formage_forms::{ErrorMap, ValidationErrors};
///
/// let mut errors = ErrorMap::new();
/// errors.insert("title".to_string(), vec!["This field is required.".to_string()]);
///
/// let failure = ValidationErrors::new(errors);
/// assert_eq!(failure.field("title"), Some(&["This field is required.".to_string()][..]));
/// assert_eq!(failure.to_json(), r#"{"title":["This field is required."]}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(transparent)]
#[error("form is not valid ({} field(s) with errors)", .0.len())]
pub struct ValidationErrors(pub ErrorMap);

impl ValidationErrors {
	pub fn new(errors: ErrorMap) -> Self {
		Self(errors)
	}

	pub fn errors(&self) -> &ErrorMap {
		&self.0
	}

	pub fn into_inner(self) -> ErrorMap {
		self.0
	}

	pub fn field(&self, name: &str) -> Option<&[String]> {
		self.0.get(name).map(Vec::as_slice)
	}

	/// Serialized form used in [`FormError::Invalid`].
	pub fn to_json(&self) -> String {
		// A map of strings to string lists always serializes.
		serde_json::to_string(&self.0).unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("Schema `Author` is not registered ", "Schema `Author` is not registered referred by model `Article`")]
	#[case("Unknown ref: ", "Unknown ref: referred by model `Article`")]
	fn test_missing_reference_message_names_model(#[case] reported: &str, #[case] expected: &str) {
		// Arrange
		let err = FormError::MissingReference {
			model: "Article".to_string(),
			message: reported.to_string(),
		};

		// Act
		let message = err.to_string();

		// Assert
		assert_eq!(message, expected);
	}

	#[rstest]
	fn test_invalid_embeds_serialized_map() {
		// Arrange
		let mut errors = ErrorMap::new();
		errors.insert("a_li3_b".to_string(), vec!["bad".to_string()]);
		let failure = ValidationErrors::new(errors);

		// Act
		let err = FormError::Invalid(failure.to_json());

		// Assert
		assert_eq!(err.to_string(), "not valid\n{\"a_li3_b\":[\"bad\"]}");
	}
}
