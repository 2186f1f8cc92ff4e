//! Nested object and array item forms

use crate::error::{ErrorMap, FormResult, ValidationErrors};
use crate::field::{FormField, RawData, SELF_KEY, render_errors};
use crate::fieldset::{SUB_FORM_LAYOUT, organize_by_fieldsets, render_fieldsets};
use crate::form::{FormNode, distribute_raw_data};
use crate::hierarchy::FieldMap;
use crate::model::read_path;
use crate::render::RenderSink;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

type Generator = Arc<dyn Fn(&str) -> FieldMap + Send + Sync>;

/// One nested object, or one array element, inside a parent form.
///
/// The generator receives the name prefix and returns the member fields keyed
/// by their name relative to this object. A member keyed `__self__` stands for
/// the whole value, which lets a sub-form wrap a scalar.
///
/// # Examples
///
/// ```
/// use formage_forms::fields::TextField;
/// use formage_forms::hierarchy::FieldMap;
/// use formage_forms::{FormField, SubForm};
/// use serde_json::json;
///
/// let mut address = SubForm::new("address_", |prefix: &str| {
///     let mut fields = FieldMap::new();
///     fields.insert("city".to_string(), Box::new(TextField::new(format!("{prefix}city"))));
///     fields
/// });
/// address.bind(Some(json!({"city": "Lyon"})));
///
/// assert_eq!(address.get_value(), json!({"city": "Lyon"}));
/// ```
pub struct SubForm {
	name: String,
	name_prefix: String,
	generator: Generator,
	fields: FieldMap,
	data: RawData,
	value: Value,
	errors: ErrorMap,
	messages: Vec<String>,
}

impl SubForm {
	pub fn new<G>(name_prefix: impl Into<String>, generator: G) -> Self
	where
		G: Fn(&str) -> FieldMap + Send + Sync + 'static,
	{
		let name_prefix = name_prefix.into();
		let generator: Generator = Arc::new(generator);
		let fields = generator(&name_prefix);
		Self {
			name: name_prefix.clone(),
			name_prefix,
			generator,
			fields,
			data: RawData::new(),
			value: Value::Null,
			errors: ErrorMap::new(),
			messages: Vec::new(),
		}
	}

	/// A sub-form over a fixed set of member fields.
	pub fn from_fields(name_prefix: impl Into<String>, fields: FieldMap) -> Self {
		let mut form = Self::new(name_prefix, |_: &str| FieldMap::new());
		form.fields = fields;
		form
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = name.into();
		self
	}

	pub fn name_prefix(&self) -> &str {
		&self.name_prefix
	}

	pub fn fields(&self) -> &FieldMap {
		&self.fields
	}

	/// Errors of the last validation, keyed by member field name.
	pub fn field_errors(&self) -> &ErrorMap {
		&self.errors
	}

	/// The value cached by the last bind or unbind.
	pub fn value(&self) -> &Value {
		&self.value
	}

	pub fn raw_data(&self) -> &RawData {
		&self.data
	}

	/// A fresh sub-form from the same generator under another prefix.
	pub fn regenerate(&self, name_prefix: impl Into<String>) -> Self {
		let name_prefix = name_prefix.into();
		Self {
			name: name_prefix.clone(),
			fields: (self.generator)(&name_prefix),
			name_prefix,
			generator: Arc::clone(&self.generator),
			data: RawData::new(),
			value: Value::Null,
			errors: ErrorMap::new(),
			messages: Vec::new(),
		}
	}

	/// Member values by key, collapsed to the `__self__` member when present.
	pub fn collect_value(&mut self) -> Value {
		let mut map = Map::new();
		for (key, field) in self.fields.iter_mut() {
			map.insert(key.clone(), field.get_value());
		}
		match map.remove(SELF_KEY) {
			Some(value) => value,
			None => Value::Object(map),
		}
	}

	fn header_lines_of_members(&self) -> Vec<String> {
		self.fields.values().flat_map(|field| field.header_lines()).collect()
	}
}

impl std::fmt::Debug for SubForm {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SubForm")
			.field("name", &self.name)
			.field("name_prefix", &self.name_prefix)
			.field("fields", &self.fields.keys().collect::<Vec<_>>())
			.field("value", &self.value)
			.field("errors", &self.errors)
			.finish_non_exhaustive()
	}
}

#[async_trait]
impl FormNode for SubForm {
	fn bind(&mut self) {
		for (key, field) in self.fields.iter_mut() {
			field.bind(read_path(&self.value, key));
		}
	}

	/// Raw keys are relative to the name prefix; members receive theirs under
	/// full names.
	fn unbind(&mut self) {
		if !self.data.is_empty() {
			distribute_raw_data(&mut self.fields, &self.data, &self.name_prefix);
		}
		self.value = self.collect_value();
	}

	/// Re-runs every member on each call; errors are keyed by member name.
	async fn validate(&mut self) -> Result<(), ValidationErrors> {
		self.errors = ErrorMap::new();
		for field in self.fields.values_mut() {
			field.validate().await;
			if !field.errors().is_empty() {
				self.errors
					.insert(field.name().to_string(), field.errors().to_vec());
			}
		}
		self.messages = self.errors.values().flatten().cloned().collect();
		if self.errors.is_empty() {
			Ok(())
		} else {
			Err(ValidationErrors::new(self.errors.clone()))
		}
	}

	fn get_value(&mut self) -> Value {
		self.collect_value()
	}

	fn render(&self, sink: &mut dyn RenderSink) {
		let keys: Vec<&str> = self.fields.keys().map(String::as_str).collect();
		let tree = organize_by_fieldsets(&keys);
		render_fieldsets(&tree, sink, SUB_FORM_LAYOUT, &mut |index, sink| {
			let Some((key, field)) = self.fields.get_index(index) else {
				return;
			};
			// An array item of scalars renders bare.
			if key.ends_with(SELF_KEY) {
				field.render(sink);
			} else {
				field.render_with_label(sink);
			}
		});
	}
}

#[async_trait]
impl FormField for SubForm {
	fn name(&self) -> &str {
		&self.name
	}

	fn header_lines(&self) -> Vec<String> {
		self.header_lines_of_members()
	}

	fn bind(&mut self, value: Option<Value>) {
		self.value = value.unwrap_or(Value::Null);
		FormNode::bind(self);
	}

	fn set_data(&mut self, data: RawData) {
		self.data = data;
	}

	fn unbind(&mut self) {
		FormNode::unbind(self);
	}

	async fn pre_process(&mut self) -> FormResult<()> {
		for field in self.fields.values_mut() {
			field.pre_process().await?;
		}
		Ok(())
	}

	async fn validate(&mut self) {
		// Failures stay readable through `errors` and `field_errors`.
		let _ = FormNode::validate(self).await;
	}

	fn errors(&self) -> &[String] {
		&self.messages
	}

	fn set_errors(&mut self, errors: Vec<String>) {
		self.messages = errors;
	}

	fn get_value(&mut self) -> Value {
		self.collect_value()
	}

	fn render(&self, sink: &mut dyn RenderSink) {
		FormNode::render(self, sink);
	}

	fn render_with_label(&self, sink: &mut dyn RenderSink) {
		FormNode::render(self, sink);
		render_errors(&self.messages, sink);
	}
}
