//! Sub-forms editing an embedded instance of another model

use crate::error::{ErrorMap, FormResult, ValidationErrors};
use crate::field::{FormField, RawData, SELF_KEY, render_errors};
use crate::fields::REQUIRED_MESSAGE;
use crate::form::FormNode;
use crate::hierarchy::FieldMap;
use crate::model::{Model, ModelFactory};
use crate::render::{RenderSink, escape_attribute, escape_html};
use crate::sub_form::SubForm;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

type InstanceValidator<M> = Arc<dyn Fn(&M) -> Result<(), String> + Send + Sync>;

/// Options of an [`InlineReferenceForm`].
///
/// Unset validators and attributes default to empty.
pub struct InlineOptions<M> {
	pub name: String,
	pub label: Option<String>,
	pub required: bool,
	/// Render expanded instead of collapsed.
	pub default_open: bool,
	pub validators: Vec<InstanceValidator<M>>,
	pub attrs: IndexMap<String, String>,
	/// Value used when the parent binds nothing.
	pub default: Option<Value>,
	pub db_path: Option<String>,
}

impl<M> InlineOptions<M> {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			label: None,
			required: false,
			default_open: false,
			validators: Vec::new(),
			attrs: IndexMap::new(),
			default: None,
			db_path: None,
		}
	}

	pub fn required(mut self) -> Self {
		self.required = true;
		self
	}

	pub fn open(mut self) -> Self {
		self.default_open = true;
		self
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	pub fn with_db_path(mut self, db_path: impl Into<String>) -> Self {
		self.db_path = Some(db_path.into());
		self
	}

	pub fn with_default(mut self, value: Value) -> Self {
		self.default = Some(value);
		self
	}

	pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.attrs.insert(key.into(), value.into());
		self
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&M) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validators.push(Arc::new(validator));
		self
	}
}

impl<M> Clone for InlineOptions<M> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			label: self.label.clone(),
			required: self.required,
			default_open: self.default_open,
			validators: self.validators.clone(),
			attrs: self.attrs.clone(),
			default: self.default.clone(),
			db_path: self.db_path.clone(),
		}
	}
}

enum Held<M> {
	Raw(Value),
	Instance(Arc<M>),
}

/// A sub-form whose value is an instance of a referenced model.
///
/// The raw value is turned into an instance on first read and the same
/// instance is handed out afterwards, until the next bind or unbind.
pub struct InlineReferenceForm<M: Model> {
	form: SubForm,
	options: InlineOptions<M>,
	factory: ModelFactory<M>,
	held: Held<M>,
	errors: Vec<String>,
}

impl<M: Model> InlineReferenceForm<M> {
	pub fn new(
		options: InlineOptions<M>,
		name_prefix: impl Into<String>,
		fields: FieldMap,
		factory: ModelFactory<M>,
	) -> Self {
		let held = Held::Raw(options.default.clone().unwrap_or(Value::Null));
		Self {
			form: SubForm::from_fields(name_prefix, fields).with_name(options.name.clone()),
			options,
			factory,
			held,
			errors: Vec::new(),
		}
	}

	pub fn options(&self) -> &InlineOptions<M> {
		&self.options
	}

	pub fn sub_form(&self) -> &SubForm {
		&self.form
	}

	/// Path under which the parent hierarchy addresses this form.
	pub fn hierarchy_name(&self) -> &str {
		self.options.db_path.as_deref().unwrap_or(SELF_KEY)
	}

	/// The referenced instance, constructed from the raw value once.
	pub fn instance(&mut self) -> FormResult<Arc<M>> {
		let raw = match &self.held {
			Held::Instance(instance) => return Ok(Arc::clone(instance)),
			Held::Raw(raw) => raw.clone(),
		};
		let instance = Arc::new(self.factory.construct(raw)?);
		tracing::debug!(model = self.factory.model_name(), field = %self.options.name, "Materialized inline instance");
		self.held = Held::Instance(Arc::clone(&instance));
		Ok(instance)
	}

	fn raw_is_empty(&self) -> bool {
		match &self.held {
			Held::Instance(_) => false,
			Held::Raw(Value::Null) => true,
			Held::Raw(Value::Object(map)) => map.values().all(Value::is_null),
			Held::Raw(Value::String(s)) => s.is_empty(),
			Held::Raw(_) => false,
		}
	}

	fn current_value(&self) -> Value {
		match &self.held {
			Held::Instance(instance) => instance.to_value(),
			Held::Raw(raw) => raw.clone(),
		}
	}
}

impl<M: Model> std::fmt::Debug for InlineReferenceForm<M> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InlineReferenceForm")
			.field("name", &self.options.name)
			.field("model", &self.factory.model_name())
			.field("form", &self.form)
			.field("errors", &self.errors)
			.finish_non_exhaustive()
	}
}

#[async_trait]
impl<M: Model> FormNode for InlineReferenceForm<M> {
	fn bind(&mut self) {
		let value = self.current_value();
		FormField::bind(&mut self.form, Some(value));
	}

	/// Strips the name prefix off the raw keys before the members unbind.
	///
	/// A prefixed key wins over an unprefixed one naming the same member.
	fn unbind(&mut self) {
		let prefix = self.form.name_prefix();
		let (prefixed, bare): (Vec<_>, Vec<_>) = self
			.form
			.raw_data()
			.iter()
			.partition(|(key, _)| key.starts_with(prefix));
		let mut relative = RawData::new();
		for (key, value) in bare.into_iter().chain(prefixed) {
			let key = key.strip_prefix(prefix).unwrap_or(key);
			relative.insert(key.to_string(), value.clone());
		}
		FormField::set_data(&mut self.form, relative);
		FormNode::unbind(&mut self.form);
		self.held = Held::Raw(self.form.value().clone());
	}

	async fn validate(&mut self) -> Result<(), ValidationErrors> {
		let mut errors = match FormNode::validate(&mut self.form).await {
			Ok(()) => Vec::new(),
			Err(failure) => failure.into_inner().into_values().flatten().collect(),
		};
		if self.options.required && self.raw_is_empty() {
			errors.push(REQUIRED_MESSAGE.to_string());
		} else {
			match self.instance() {
				Ok(instance) => {
					for validator in &self.options.validators {
						if let Err(message) = validator(instance.as_ref()) {
							errors.push(message);
						}
					}
					let model_errors = instance.validate().await;
					if !model_errors.is_empty() {
						tracing::debug!(
							model = self.factory.model_name(),
							count = model_errors.len(),
							"Referenced instance failed validation"
						);
					}
					errors.extend(model_errors.into_iter().map(|error| error.message));
				}
				Err(err) => errors.push(err.to_string()),
			}
		}
		self.errors = errors;
		if self.errors.is_empty() {
			Ok(())
		} else {
			let mut map = ErrorMap::new();
			map.insert(self.options.name.clone(), self.errors.clone());
			Err(ValidationErrors::new(map))
		}
	}

	/// Plain value of the memoized instance.
	///
	/// Each call yields a fresh `Value`; use [`InlineReferenceForm::instance`]
	/// when the identity of the instance matters.
	fn get_value(&mut self) -> Value {
		match self.instance() {
			Ok(instance) => instance.to_value(),
			Err(err) => {
				tracing::warn!(field = %self.options.name, error = %err, "Inline value cannot be materialized");
				Value::Null
			}
		}
	}

	fn render(&self, sink: &mut dyn RenderSink) {
		FormNode::render(&self.form, sink);
	}
}

#[async_trait]
impl<M: Model> FormField for InlineReferenceForm<M> {
	fn name(&self) -> &str {
		&self.options.name
	}

	fn label(&self) -> Option<&str> {
		self.options.label.as_deref()
	}

	fn required(&self) -> bool {
		self.options.required
	}

	fn db_path(&self) -> Option<&str> {
		self.options.db_path.as_deref()
	}

	fn header_lines(&self) -> Vec<String> {
		FormField::header_lines(&self.form)
	}

	fn bind(&mut self, value: Option<Value>) {
		let value = value
			.filter(|v| !v.is_null())
			.or_else(|| self.options.default.clone())
			.unwrap_or(Value::Null);
		self.held = Held::Raw(value);
		FormNode::bind(self);
	}

	fn set_data(&mut self, data: RawData) {
		self.form.set_data(data);
	}

	fn unbind(&mut self) {
		FormNode::unbind(self);
	}

	async fn pre_process(&mut self) -> FormResult<()> {
		self.form.pre_process().await
	}

	async fn validate(&mut self) {
		let _ = FormNode::validate(self).await;
	}

	fn errors(&self) -> &[String] {
		&self.errors
	}

	fn set_errors(&mut self, errors: Vec<String>) {
		self.errors = errors;
	}

	fn get_value(&mut self) -> Value {
		FormNode::get_value(self)
	}

	fn render(&self, sink: &mut dyn RenderSink) {
		FormNode::render(self, sink);
	}

	/// Collapsible section headed by the field label.
	fn render_with_label(&self, sink: &mut dyn RenderSink) {
		let state = if self.options.default_open { "" } else { " closed" };
		let class = if self.options.required {
			"field_label required_label"
		} else {
			"field_label optional_label"
		};
		let title = self.options.label.as_deref().unwrap_or(&self.options.name);
		sink.write(&format!("<div class=\"field nf_fieldset{state}\">\n"));
		sink.write(&format!(
			"<h2 for=\"id_{}\" class=\"{class}\">{}</h2>\n",
			escape_attribute(&self.options.name),
			escape_html(title)
		));
		FormNode::render(self, sink);
		render_errors(&self.errors, sink);
		sink.write("</div>\n");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fields::TextField;
	use crate::model::{Document, DocumentRule};
	use rstest::{fixture, rstest};
	use serde_json::json;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn author_fields() -> FieldMap {
		let mut fields = FieldMap::new();
		fields.insert("name".to_string(), Box::new(TextField::new("author_name").required()));
		fields.insert("email".to_string(), Box::new(TextField::new("author_email")));
		fields
	}

	#[fixture]
	fn author() -> InlineReferenceForm<Document> {
		InlineReferenceForm::new(
			InlineOptions::new("author").with_db_path("author"),
			"author_",
			author_fields(),
			ModelFactory::document("Author", vec![DocumentRule::required("name")]),
		)
	}

	#[rstest]
	fn test_unbind_strips_prefix(mut author: InlineReferenceForm<Document>) {
		// Arrange
		author.set_data(serde_json::from_value(json!({"author_name": "Ada", "author_email": "ada@example.com"})).unwrap());

		// Act
		FormField::unbind(&mut author);

		// Assert
		assert_eq!(
			FormField::get_value(&mut author),
			json!({"name": "Ada", "email": "ada@example.com"})
		);
	}

	#[rstest]
	fn test_instance_is_memoized() {
		// Arrange
		let built = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&built);
		let factory = ModelFactory::new("Author", move |value| {
			counter.fetch_add(1, Ordering::SeqCst);
			Document::from_value("Author", value)
		});
		let mut form = InlineReferenceForm::new(InlineOptions::new("author"), "author_", author_fields(), factory);
		FormField::bind(&mut form, Some(json!({"name": "Ada"})));

		// Act
		let first = form.instance().unwrap();
		let second = form.instance().unwrap();

		// Assert
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(built.load(Ordering::SeqCst), 1);
	}

	#[rstest]
	fn test_hierarchy_name_defaults_to_self() {
		let form = InlineReferenceForm::new(
			InlineOptions::new("tag"),
			"tag_",
			FieldMap::new(),
			ModelFactory::document("Tag", Vec::new()),
		);
		assert_eq!(form.hierarchy_name(), SELF_KEY);
		assert!(form.options().validators.is_empty());
		assert!(form.options().attrs.is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_required_and_validators() {
		// Arrange
		let mut empty = InlineReferenceForm::new(
			InlineOptions::new("author").required(),
			"author_",
			FieldMap::new(),
			ModelFactory::document("Author", Vec::new()),
		);
		let mut checked = InlineReferenceForm::new(
			InlineOptions::new("author").with_validator(|doc: &Document| {
				match doc.get("name") {
					Some(Value::String(name)) if name.len() > 2 => Ok(()),
					_ => Err("Name too short".to_string()),
				}
			}),
			"author_",
			FieldMap::new(),
			ModelFactory::document("Author", Vec::new()),
		);
		FormField::bind(&mut checked, Some(json!({"name": "Al"})));

		// Act
		FormField::validate(&mut empty).await;
		FormField::validate(&mut checked).await;

		// Assert
		assert_eq!(empty.errors(), [REQUIRED_MESSAGE]);
		assert_eq!(checked.errors(), ["Name too short"]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_member_errors_surface_on_inline_form(mut author: InlineReferenceForm<Document>) {
		// Arrange
		author.set_data(serde_json::from_value(json!({"author_email": "x@example.com"})).unwrap());
		FormField::unbind(&mut author);

		// Act
		let result = FormNode::validate(&mut author).await;

		// Assert
		assert!(result.is_err());
		assert_eq!(author.errors(), [REQUIRED_MESSAGE, "Path `name` is required."]);
	}

	#[rstest]
	fn test_prefixed_key_wins_over_bare_key(mut author: InlineReferenceForm<Document>) {
		// Arrange
		author.set_data(serde_json::from_value(json!({"author_name": "Ada", "name": "Bob"})).unwrap());

		// Act
		FormField::unbind(&mut author);

		// Assert
		assert_eq!(author.sub_form().value()["name"], json!("Ada"));
	}

	#[rstest]
	#[tokio::test]
	async fn test_referenced_model_rules_are_enforced() {
		// Arrange
		let mut form = InlineReferenceForm::new(
			InlineOptions::new("author"),
			"author_",
			author_fields(),
			ModelFactory::document("Author", vec![DocumentRule::required("email")]),
		);
		form.set_data(serde_json::from_value(json!({"author_name": "Ada"})).unwrap());
		FormField::unbind(&mut form);

		// Act
		let result = FormNode::validate(&mut form).await;

		// Assert
		let errors = result.unwrap_err();
		assert_eq!(errors.field("author"), Some(&["Path `email` is required.".to_string()][..]));
	}

	#[rstest]
	fn test_render_with_label_collapsible(author: InlineReferenceForm<Document>) {
		// Arrange
		let mut out = String::new();

		// Act
		author.render_with_label(&mut out);

		// Assert
		assert!(out.starts_with(
			"<div class=\"field nf_fieldset closed\">\n<h2 for=\"id_author\" class=\"field_label optional_label\">author</h2>\n"
		));
		assert!(out.contains("<label for=\"id_author_name\" class=\"field_label required_label\">Author name</label>"));
		assert!(out.ends_with("</div>\n"));
	}
}
