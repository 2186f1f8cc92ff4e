use crate::config::FormSettings;
use crate::error::{ErrorMap, FormError, FormResult, ValidationErrors};
use crate::field::RawData;
use crate::fieldset::{FORM_LAYOUT, organize_by_fieldsets, render_fieldsets};
use crate::hierarchy::{FieldMap, HierarchyBuilder, build_fields_hierarchy, flatten};
use crate::hooks::{ValidationContext, ValidationHook};
use crate::model::{Model, ModelValidationError, read_embedded};
use crate::render::RenderSink;
use async_trait::async_trait;
use indexmap::IndexSet;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

/// Internal version counter, never exposed as a field.
pub const VERSION_KEY: &str = "__v";

// Interior array index in a model error path: `authors.3.name`.
static ARRAY_INDEX_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\.(\d+)\.").expect("ARRAY_INDEX_SEGMENT: invalid regex pattern")
});

/// Rewrites a model error path into the submitted field naming.
///
/// # Examples
///
/// ```
/// use formage_forms::form::normalize_error_path;
///
/// assert_eq!(normalize_error_path("a.3.b"), "a_li3_b");
/// assert_eq!(normalize_error_path("title"), "title");
/// ```
pub fn normalize_error_path(path: &str) -> String {
	ARRAY_INDEX_SEGMENT.replace_all(path, "_li${1}_").into_owned()
}

/// Per-form construction options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormOptions {
	/// Field names left out of the hierarchy. Always contains [`VERSION_KEY`].
	pub exclude: Vec<String>,
	/// Lines added to [`Form::render_head`] after the fields' own.
	pub header_lines: Vec<String>,
	/// Bundled asset lines, usually from [`FormSettings::asset_lines`].
	pub asset_lines: Vec<String>,
}

impl Default for FormOptions {
	fn default() -> Self {
		FormSettings::default().to_options()
	}
}

impl FormOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_exclude(mut self, name: impl Into<String>) -> Self {
		let name = name.into();
		if !self.exclude.contains(&name) {
			self.exclude.push(name);
		}
		self
	}

	pub fn with_header_line(mut self, line: impl Into<String>) -> Self {
		self.header_lines.push(line.into());
		self
	}
}

/// The capability set shared by every node of a form tree.
///
/// [`Form`] binds from its model instance, a [`SubForm`](crate::SubForm) from
/// the value handed to it by its parent, and an
/// [`InlineReferenceForm`](crate::InlineReferenceForm) from its referenced
/// instance.
#[async_trait]
pub trait FormNode: Send + Sync {
	/// Push the node's source value into its fields.
	fn bind(&mut self);

	/// Pull pending raw data into the fields.
	fn unbind(&mut self);

	async fn validate(&mut self) -> Result<(), ValidationErrors>;

	/// The node's value in plain storage representation.
	fn get_value(&mut self) -> Value;

	fn render(&self, sink: &mut dyn RenderSink);
}

/// Assigns each field exactly the raw keys equal to its key or prefixed by `<key>_`.
///
/// `data` is keyed relative to `name_prefix`; each field receives its share
/// under full names again.
pub(crate) fn distribute_raw_data(fields: &mut FieldMap, data: &RawData, name_prefix: &str) {
	for (field_name, field) in fields.iter_mut() {
		let prefix = format!("{field_name}_");
		let claimed: RawData = data
			.iter()
			.filter(|(key, _)| key.starts_with(&prefix) || *key == field_name)
			.map(|(key, value)| (format!("{name_prefix}{key}"), value.clone()))
			.collect();
		field.set_data(claimed);
		field.unbind();
	}
}

/// Root form over a model instance
///
/// Fields are built once from the hierarchy builder, then bound from the
/// instance and unbound from the raw data before `new` returns.
///
/// # Examples
///
/// ```
/// use formage_forms::fields::TextField;
/// use formage_forms::hierarchy::{FieldHierarchy, HierarchyError, HierarchyNode};
/// use formage_forms::model::{Document, Model};
/// use formage_forms::{Form, FormOptions, RawData};
/// use serde_json::json;
///
/// let builder = |_: &dyn Model, _: &[String]| -> Result<FieldHierarchy, HierarchyError> {
///     let mut fields = FieldHierarchy::new();
///     fields.insert("title".to_string(), HierarchyNode::field(TextField::new("title").stored()));
///     Ok(fields)
/// };
/// let data: RawData = serde_json::from_value(json!({"title": "Hello"})).unwrap();
///
/// let mut form = Form::<Document>::new(FormOptions::default(), &builder, None, Some(data)).unwrap();
/// tokio_test::block_on(async {
///     assert!(form.validate().await.is_ok());
/// });
/// assert_eq!(form.instance().get("title"), Some(json!("Hello")));
/// ```
pub struct Form<M: Model> {
	options: FormOptions,
	instance: M,
	data: Option<RawData>,
	fields: FieldMap,
	errors: Option<ErrorMap>,
	hooks: Vec<Box<dyn ValidationHook>>,
}

impl<M: Model + Default> Form<M> {
	/// Builds the fields for `instance` (or a default one) and binds both sides.
	pub fn new(
		options: FormOptions,
		builder: &dyn HierarchyBuilder,
		instance: Option<M>,
		data: Option<RawData>,
	) -> FormResult<Self> {
		let options = options.with_exclude(VERSION_KEY);
		let instance = instance.unwrap_or_default();
		let hierarchy = build_fields_hierarchy(builder, &instance, &options.exclude)?;
		let fields = flatten(hierarchy)?;
		Ok(Self::from_fields(options, fields, instance, data))
	}
}

impl<M: Model> Form<M> {
	/// Wraps an already flat field map.
	pub fn from_fields(options: FormOptions, mut fields: FieldMap, instance: M, data: Option<RawData>) -> Self {
		let options = options.with_exclude(VERSION_KEY);
		fields.retain(|name, _| !options.exclude.contains(name));
		let mut form = Self {
			options,
			instance,
			data,
			fields,
			errors: None,
			hooks: Vec::new(),
		};
		form.bind();
		form.unbind();
		form
	}

	/// Registers a hook run after model validation.
	pub fn with_hook(mut self, hook: impl ValidationHook + 'static) -> Self {
		self.hooks.push(Box::new(hook));
		self
	}

	pub fn options(&self) -> &FormOptions {
		&self.options
	}

	pub fn instance(&self) -> &M {
		&self.instance
	}

	pub fn into_instance(self) -> M {
		self.instance
	}

	pub fn data(&self) -> Option<&RawData> {
		self.data.as_ref()
	}

	pub fn fields(&self) -> &FieldMap {
		&self.fields
	}

	/// `None` until the first [`Form::validate`].
	pub fn errors(&self) -> Option<&ErrorMap> {
		self.errors.as_ref()
	}

	pub fn bind(&mut self) {
		for (name, field) in self.fields.iter_mut() {
			field.bind(read_embedded(&self.instance, name));
		}
	}

	pub fn unbind(&mut self) {
		let Some(data) = self.data.as_ref().filter(|data| !data.is_empty()) else {
			return;
		};
		distribute_raw_data(&mut self.fields, data, "");
	}

	/// Validates fields in declaration order, then the instance, then the hooks.
	///
	/// The outcome is computed once. Later calls return it without running any
	/// validator again, even if the instance changed in between.
	pub async fn validate(&mut self) -> Result<(), ValidationErrors> {
		if let Some(errors) = &self.errors {
			return outcome(errors);
		}
		let mut errors = ErrorMap::new();

		for (name, field) in self.fields.iter_mut() {
			field.validate().await;
			if !field.errors().is_empty() {
				tracing::debug!(field = %name, errors = field.errors().len(), "Field failed validation");
				errors.insert(name.clone(), field.errors().to_vec());
				continue;
			}
			let Some(db_path) = field.db_path().map(str::to_string) else {
				continue;
			};
			let value = field.get_value();
			if let Err(err) = self.instance.set(&db_path, value) {
				let messages = vec![err.to_string()];
				field.set_errors(messages.clone());
				errors.insert(name.clone(), messages);
				continue;
			}
			tracing::debug!(field = %name, path = %db_path, "Committed field value");
		}

		let model_errors = self.instance.validate().await;
		if !model_errors.is_empty() {
			tracing::debug!(
				model = self.instance.model_name(),
				count = model_errors.len(),
				"Merging model validation errors"
			);
		}
		for ModelValidationError { path, message } in model_errors {
			let name = normalize_error_path(&path);
			let messages = errors.entry(name.clone()).or_default();
			messages.push(message);
			if let Some(field) = self.fields.get_mut(&name) {
				field.set_errors(messages.clone());
			}
		}

		for hook in &self.hooks {
			if !errors.is_empty() {
				break;
			}
			let mut ctx = ValidationContext::new(&self.instance, self.data.as_ref(), &mut errors);
			hook.validate(&mut ctx).await;
			for (name, messages) in &errors {
				if let Some(field) = self.fields.get_mut(name) {
					field.set_errors(messages.clone());
				}
			}
		}

		let result = outcome(&errors);
		self.errors = Some(errors);
		result
	}

	/// Runs every field's pre-process hook in declaration order.
	pub async fn pre_process(&mut self) -> FormResult<()> {
		for field in self.fields.values_mut() {
			field.pre_process().await?;
		}
		Ok(())
	}

	/// Pre-processes, validates and persists the instance.
	pub async fn save(&mut self) -> FormResult<Value> {
		self.pre_process().await?;
		if let Err(errors) = self.validate().await {
			tracing::warn!(
				model = self.instance.model_name(),
				fields = ?errors.errors().keys().collect::<Vec<_>>(),
				"Refusing to save invalid form"
			);
			return Err(FormError::Invalid(errors.to_json()));
		}
		self.instance.save().await.map_err(|err| {
			tracing::error!(model = self.instance.model_name(), error = %err, "Failed to persist instance");
			FormError::from(err)
		})
	}

	/// The submitted value for `name`, else the instance's.
	pub fn field_value(&self, name: &str) -> Option<Value> {
		if let Some(value) = self.data.as_ref().and_then(|data| data.get(name)) {
			return Some(value.clone());
		}
		self.instance.get(name)
	}

	/// Static asset lines for the page head, one per line, without duplicates.
	pub fn render_head(&self) -> String {
		let lines: IndexSet<String> = self
			.fields
			.values()
			.flat_map(|field| field.header_lines())
			.chain(self.options.header_lines.iter().cloned())
			.chain(self.options.asset_lines.iter().cloned())
			.filter(|line| !line.is_empty())
			.collect();
		let lines: Vec<String> = lines.into_iter().collect();
		format!("\n{}\n", lines.join("\n"))
	}

	/// Writes every field with its label, grouped into fieldsets.
	pub fn render(&self, sink: &mut dyn RenderSink) {
		let names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
		let tree = organize_by_fieldsets(&names);
		render_fieldsets(&tree, sink, FORM_LAYOUT, &mut |index, sink| {
			if let Some((_, field)) = self.fields.get_index(index) {
				field.render_with_label(sink);
			}
		});
	}
}

fn outcome(errors: &ErrorMap) -> Result<(), ValidationErrors> {
	if errors.is_empty() {
		Ok(())
	} else {
		Err(ValidationErrors::new(errors.clone()))
	}
}

#[async_trait]
impl<M: Model> FormNode for Form<M> {
	fn bind(&mut self) {
		Form::bind(self)
	}

	fn unbind(&mut self) {
		Form::unbind(self)
	}

	async fn validate(&mut self) -> Result<(), ValidationErrors> {
		Form::validate(self).await
	}

	fn get_value(&mut self) -> Value {
		self.instance.to_value()
	}

	fn render(&self, sink: &mut dyn RenderSink) {
		Form::render(self, sink)
	}
}

impl<M: Model> fmt::Display for Form<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut out: Vec<String> = Vec::new();
		self.render(&mut out);
		f.write_str(&out.concat())
	}
}

impl<M: Model> fmt::Debug for Form<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Form")
			.field("model", &self.instance.model_name())
			.field("fields", &self.fields.keys().collect::<Vec<_>>())
			.field("errors", &self.errors)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fields::{DateTimeField, TextField};
	use crate::hierarchy::{FieldHierarchy, HierarchyError, HierarchyNode};
	use crate::model::{Document, DocumentRule};
	use rstest::rstest;
	use serde_json::json;

	fn raw(value: Value) -> RawData {
		serde_json::from_value(value).unwrap()
	}

	fn text_builder(_: &dyn Model, _: &[String]) -> Result<FieldHierarchy, HierarchyError> {
		let mut fields = FieldHierarchy::new();
		fields.insert("__v".to_string(), HierarchyNode::field(TextField::new("__v").stored()));
		fields.insert("title".to_string(), HierarchyNode::field(TextField::new("title").stored()));
		fields.insert(
			"meta.slug".to_string(),
			HierarchyNode::field(TextField::new("meta.slug").stored()),
		);
		fields.insert(
			"published".to_string(),
			HierarchyNode::field(DateTimeField::new("published").stored()),
		);
		Ok(fields)
	}

	#[rstest]
	#[case("a.3.b", "a_li3_b")]
	#[case("authors.0.name", "authors_li0_name")]
	#[case("a.1.b.2.c", "a_li1_b_li2_c")]
	#[case("tags.0", "tags.0")]
	fn test_normalize_error_path(#[case] path: &str, #[case] expected: &str) {
		assert_eq!(normalize_error_path(path), expected);
	}

	#[rstest]
	fn test_version_key_is_always_excluded() {
		// Act
		let form = Form::<Document>::new(FormOptions::new(), &text_builder, None, None).unwrap();

		// Assert
		assert!(form.options().exclude.contains(&VERSION_KEY.to_string()));
		assert_eq!(
			form.fields().keys().collect::<Vec<_>>(),
			["title", "meta.slug", "published"]
		);
	}

	#[rstest]
	fn test_bind_reads_nested_paths() {
		// Arrange
		let instance = Document::from_value("Page", json!({"meta": {"slug": "home"}})).unwrap();

		// Act
		let form = Form::new(FormOptions::new(), &text_builder, Some(instance), None).unwrap();

		// Assert
		let html = form.to_string();
		assert!(html.contains("name=\"meta.slug\" id=\"id_meta.slug\" value=\"home\""));
	}

	#[rstest]
	fn test_unbind_without_data_keeps_bound_values() {
		// Arrange
		let instance = Document::from_value("Page", json!({"title": "Kept"})).unwrap();

		// Act
		let form = Form::new(FormOptions::new(), &text_builder, Some(instance), Some(RawData::new())).unwrap();

		// Assert
		assert!(form.to_string().contains("value=\"Kept\""));
	}

	#[rstest]
	#[tokio::test]
	async fn test_unbind_claims_underscore_keys() {
		// Arrange
		let data = raw(json!({"published": "2025-03-01", "published_hour": "08:15", "publishedx": "no"}));

		// Act
		let mut form = Form::<Document>::new(FormOptions::new(), &text_builder, None, Some(data)).unwrap();
		form.validate().await.unwrap();

		// Assert
		assert_eq!(form.instance().get("published"), Some(json!("2025-03-01T08:15:00")));
	}

	#[rstest]
	#[tokio::test]
	async fn test_model_errors_land_on_matching_field() {
		// Arrange
		let instance = Document::new("Page").with_rule(DocumentRule::required("title"));

		// Act
		let mut form = Form::new(FormOptions::new(), &text_builder, Some(instance), Some(raw(json!({"x": 1})))).unwrap();
		let result = form.validate().await;

		// Assert
		let errors = result.unwrap_err();
		assert_eq!(errors.field("title"), Some(&["Path `title` is required.".to_string()][..]));
		assert_eq!(form.fields()["title"].errors(), ["Path `title` is required."]);
	}

	#[rstest]
	fn test_field_value_prefers_submitted_data() {
		// Arrange
		let instance = Document::from_value("Page", json!({"title": "Stored", "meta": {"slug": "s"}})).unwrap();
		let data = raw(json!({"title": "Submitted"}));

		// Act
		let form = Form::new(FormOptions::new(), &text_builder, Some(instance), Some(data)).unwrap();

		// Assert
		assert_eq!(form.field_value("title"), Some(json!("Submitted")));
		assert_eq!(form.field_value("meta.slug"), Some(json!("s")));
		assert_eq!(form.field_value("missing"), None);
	}

	#[rstest]
	fn test_render_head_dedupes_and_frames() {
		// Arrange
		let options = FormOptions {
			exclude: Vec::new(),
			header_lines: vec![
				crate::fields::datetime_field::DATETIME_HEADER_LINE.to_string(),
				"<meta name=\"x\">".to_string(),
			],
			asset_lines: vec!["<link a>".to_string(), "<meta name=\"x\">".to_string()],
		};

		// Act
		let form = Form::<Document>::new(options, &text_builder, None, None).unwrap();
		let head = form.render_head();

		// Assert
		assert_eq!(
			head,
			format!(
				"\n{}\n<meta name=\"x\">\n<link a>\n",
				crate::fields::datetime_field::DATETIME_HEADER_LINE
			)
		);
	}

	#[rstest]
	fn test_render_groups_dotted_fields() {
		// Arrange
		let builder = |_: &dyn Model, _: &[String]| -> Result<FieldHierarchy, HierarchyError> {
			let mut fields = FieldHierarchy::new();
			for name in ["title", "seo.title", "seo.keywords"] {
				fields.insert(name.to_string(), HierarchyNode::field(TextField::new(name)));
			}
			Ok(fields)
		};

		// Act
		let form = Form::<Document>::new(FormOptions::new(), &builder, None, None).unwrap();
		let html = form.to_string();

		// Assert
		assert!(html.starts_with("<div>\n<div class=\"field\">\n<label for=\"id_title\""));
		assert!(html.contains("<div class=\"nf_fieldset toplevel closed\">\n<h2>Seo</h2>\n<div>\n"));
		assert!(html.contains("<label for=\"id_seo.keywords\" class=\"field_label optional_label\">Keywords</label>"));
	}
}
