//! The capability contract every node placed in a form's field map satisfies

use crate::error::FormResult;
use crate::render::{RenderSink, escape_attribute, escape_html, humanize};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

/// Raw submitted data, keyed by submitted parameter name.
pub type RawData = IndexMap<String, Value>;

/// Reserved field key meaning "the value itself" rather than a named member.
pub const SELF_KEY: &str = "__self__";

/// A bindable, validatable, renderable leaf of a form tree.
///
/// Nested forms ([`SubForm`](crate::SubForm),
/// [`InlineReferenceForm`](crate::InlineReferenceForm)) implement this trait
/// too, which is what lets them sit inside a parent's field map.
#[async_trait]
pub trait FormField: Send + Sync {
	/// Fully qualified name, used for HTML `name` attributes and error keys.
	fn name(&self) -> &str;

	fn label(&self) -> Option<&str> {
		None
	}

	fn required(&self) -> bool {
		false
	}

	/// Storage path the committed value is written to during form validation.
	fn db_path(&self) -> Option<&str> {
		None
	}

	/// Static asset declarations (scripts, stylesheets) this field needs.
	fn header_lines(&self) -> Vec<String> {
		Vec::new()
	}

	/// Push a model value into the field for display.
	fn bind(&mut self, value: Option<Value>);

	/// Assign the subset of raw data this field claims.
	fn set_data(&mut self, data: RawData);

	/// Pull the pending raw data into the field's value.
	fn unbind(&mut self);

	/// Side-effecting hook run before validation on save.
	async fn pre_process(&mut self) -> FormResult<()> {
		Ok(())
	}

	/// Validate the current value. Failures are reported through [`FormField::errors`].
	async fn validate(&mut self);

	fn errors(&self) -> &[String];

	fn set_errors(&mut self, errors: Vec<String>);

	/// The committed value, in plain storage representation.
	fn get_value(&mut self) -> Value;

	/// Write the control markup.
	fn render(&self, sink: &mut dyn RenderSink);

	/// Write the label, the control and any errors.
	fn render_with_label(&self, sink: &mut dyn RenderSink) {
		render_labelled(self, sink);
	}
}

/// Default label + control layout shared by leaf fields.
pub fn render_labelled<F: FormField + ?Sized>(field: &F, sink: &mut dyn RenderSink) {
	let label = field
		.label()
		.map(str::to_string)
		.unwrap_or_else(|| humanize(last_segment(field.name())));
	let class = if field.required() {
		"field_label required_label"
	} else {
		"field_label optional_label"
	};

	sink.write("<div class=\"field\">\n");
	sink.write(&format!(
		"<label for=\"id_{}\" class=\"{}\">{}</label>\n",
		escape_attribute(field.name()),
		class,
		escape_html(&label)
	));
	field.render(sink);
	render_errors(field.errors(), sink);
	sink.write("</div>\n");
}

/// Writes an error list, or nothing when there are no errors.
pub fn render_errors(errors: &[String], sink: &mut dyn RenderSink) {
	if errors.is_empty() {
		return;
	}
	sink.write("<ul class=\"errorlist\">\n");
	for error in errors {
		sink.write(&format!("<li>{}</li>\n", escape_html(error)));
	}
	sink.write("</ul>\n");
}

fn last_segment(name: &str) -> &str {
	name.rsplit('.').next().unwrap_or(name)
}

/// Reads a submitted scalar as a string, treating `null` as absent.
pub(crate) fn value_as_string(value: &Value) -> Option<String> {
	match value {
		Value::Null => None,
		Value::String(s) => Some(s.clone()),
		Value::Bool(b) => Some(b.to_string()),
		Value::Number(n) => Some(n.to_string()),
		// Multi-valued submissions keep their first entry.
		Value::Array(items) => items.first().and_then(value_as_string),
		Value::Object(_) => None,
	}
}
