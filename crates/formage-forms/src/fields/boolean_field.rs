//! Checkbox field

use crate::field::{FormField, RawData, value_as_string};
use crate::fields::REQUIRED_MESSAGE;
use crate::render::{RenderSink, escape_attribute};
use async_trait::async_trait;
use serde_json::Value;

const TRUTHY: [&str; 4] = ["on", "true", "1", "yes"];

/// Checkbox-backed boolean field
///
/// Browsers omit unchecked boxes from submissions, so a missing key unbinds
/// to `false`.
#[derive(Debug, Clone)]
pub struct BooleanField {
	pub name: String,
	pub label: Option<String>,
	/// A required checkbox must be checked.
	pub required: bool,
	pub db_path: Option<String>,
	value: bool,
	data: RawData,
	errors: Vec<String>,
}

impl BooleanField {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			label: None,
			required: false,
			db_path: None,
			value: false,
			data: RawData::new(),
			errors: Vec::new(),
		}
	}

	pub fn required(mut self) -> Self {
		self.required = true;
		self
	}

	pub fn stored(mut self) -> Self {
		self.db_path = Some(self.name.clone());
		self
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	pub fn value(&self) -> bool {
		self.value
	}
}

fn is_truthy(value: &Value) -> bool {
	match value {
		Value::Bool(b) => *b,
		other => value_as_string(other)
			.map(|s| TRUTHY.contains(&s.to_ascii_lowercase().as_str()))
			.unwrap_or(false),
	}
}

#[async_trait]
impl FormField for BooleanField {
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
		self.value = value.as_ref().map(is_truthy).unwrap_or(false);
	}

	fn set_data(&mut self, data: RawData) {
		self.data = data;
	}

	fn unbind(&mut self) {
		self.value = self.data.get(&self.name).map(is_truthy).unwrap_or(false);
	}

	async fn validate(&mut self) {
		self.errors.clear();
		if self.required && !self.value {
			self.errors.push(REQUIRED_MESSAGE.to_string());
		}
	}

	fn errors(&self) -> &[String] {
		&self.errors
	}

	fn set_errors(&mut self, errors: Vec<String>) {
		self.errors = errors;
	}

	fn get_value(&mut self) -> Value {
		Value::Bool(self.value)
	}

	fn render(&self, sink: &mut dyn RenderSink) {
		let name = escape_attribute(&self.name);
		let checked = if self.value { " checked=\"checked\"" } else { "" };
		sink.write(&format!(
			"<input type=\"checkbox\" name=\"{name}\" id=\"id_{name}\"{checked} />\n"
		));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	#[case(json!("on"), true)]
	#[case(json!("TRUE"), true)]
	#[case(json!(true), true)]
	#[case(json!("off"), false)]
	#[case(json!(0), false)]
	fn test_is_truthy(#[case] input: Value, #[case] expected: bool) {
		assert_eq!(is_truthy(&input), expected);
	}

	#[rstest]
	fn test_missing_key_unbinds_false() {
		// Arrange
		let mut field = BooleanField::new("is_superuser");
		field.bind(Some(json!(true)));

		// Act
		field.set_data(RawData::new());
		field.unbind();

		// Assert
		assert!(!field.value());
	}

	#[rstest]
	#[tokio::test]
	async fn test_required_checkbox_must_be_checked() {
		let mut field = BooleanField::new("terms").required();
		field.validate().await;
		assert_eq!(field.errors(), [REQUIRED_MESSAGE]);
	}
}
