//! Field hierarchies and their flattening
//!
//! A [`FieldHierarchy`] is what a schema adapter produces: named leaves plus
//! item templates describing the members of array-of-object fields. Forms work
//! on the flattened [`FieldMap`], where every template member is addressed by
//! `<parent>[].<child>`.

use crate::error::{FormError, FormResult};
pub use crate::error::HierarchyError;
use crate::field::FormField;
use crate::model::Model;
use indexmap::IndexMap;

/// Marker appended to a parent name for members of its item template.
pub const ARRAY_ITEM_MARKER: &str = "[]";

/// Flat, ordered mapping of composite field name to field.
pub type FieldMap = IndexMap<String, Box<dyn FormField>>;

/// Nested, ordered description of a model's editable surface.
pub type FieldHierarchy = IndexMap<String, HierarchyNode>;

pub enum HierarchyNode {
	Field(Box<dyn FormField>),
	/// Array-of-object field; `item_template` describes one element.
	Template { item_template: FieldHierarchy },
}

impl HierarchyNode {
	pub fn field(field: impl FormField + 'static) -> Self {
		Self::Field(Box::new(field))
	}

	pub fn template(item_template: FieldHierarchy) -> Self {
		Self::Template { item_template }
	}
}

impl From<Box<dyn FormField>> for HierarchyNode {
	fn from(field: Box<dyn FormField>) -> Self {
		Self::Field(field)
	}
}

impl std::fmt::Debug for HierarchyNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Field(field) => f.debug_tuple("Field").field(&field.name()).finish(),
			Self::Template { item_template } => f
				.debug_struct("Template")
				.field("item_template", item_template)
				.finish(),
		}
	}
}

/// Schema adapter producing the field hierarchy of a model.
pub trait HierarchyBuilder: Send + Sync {
	/// Builds the hierarchy, leaving out `exclude`d field names.
	fn build(&self, model: &dyn Model, exclude: &[String]) -> Result<FieldHierarchy, HierarchyError>;
}

impl<F> HierarchyBuilder for F
where
	F: Fn(&dyn Model, &[String]) -> Result<FieldHierarchy, HierarchyError> + Send + Sync,
{
	fn build(&self, model: &dyn Model, exclude: &[String]) -> Result<FieldHierarchy, HierarchyError> {
		self(model, exclude)
	}
}

/// Runs the builder for `model`, decorating missing references with the model name.
pub fn build_fields_hierarchy(
	builder: &dyn HierarchyBuilder,
	model: &dyn Model,
	exclude: &[String],
) -> FormResult<FieldHierarchy> {
	let mut hierarchy = builder.build(model, exclude).map_err(|err| match err {
		HierarchyError::MissingReference(message) => {
			tracing::warn!(model = model.model_name(), %message, "Unresolved reference in field hierarchy");
			FormError::MissingReference {
				model: model.model_name().to_string(),
				message,
			}
		}
		other => FormError::Hierarchy(other),
	})?;
	hierarchy.retain(|name, _| !exclude.contains(name));
	Ok(hierarchy)
}

/// Flattens a hierarchy into composite-name leaves.
///
/// Depth-first: a template's members take the template's position, each
/// renamed `<parent>[].<child>`. Templates may nest to any depth.
///
/// # Examples
///
/// ```
/// use formage_forms::fields::TextField;
/// use formage_forms::hierarchy::{FieldHierarchy, HierarchyNode, flatten};
///
/// let mut address = FieldHierarchy::new();
/// address.insert("street".to_string(), HierarchyNode::field(TextField::new("street")));
///
/// let mut hierarchy = FieldHierarchy::new();
/// hierarchy.insert("name".to_string(), HierarchyNode::field(TextField::new("name")));
/// hierarchy.insert("addresses".to_string(), HierarchyNode::template(address));
///
/// let flat = flatten(hierarchy).unwrap();
/// let names: Vec<&str> = flat.keys().map(String::as_str).collect();
/// assert_eq!(names, ["name", "addresses[].street"]);
/// ```
pub fn flatten(hierarchy: FieldHierarchy) -> Result<FieldMap, HierarchyError> {
	let mut forest: Vec<(String, HierarchyNode)> = hierarchy.into_iter().rev().collect();
	let mut all_fields = FieldMap::new();

	while let Some((name, node)) = forest.pop() {
		match node {
			HierarchyNode::Field(field) => {
				if all_fields.contains_key(&name) {
					return Err(HierarchyError::DuplicateName(name));
				}
				all_fields.insert(name, field);
			}
			HierarchyNode::Template { item_template } => {
				let prefix = format!("{name}{ARRAY_ITEM_MARKER}.");
				forest.extend(
					item_template
						.into_iter()
						.rev()
						.map(|(child, node)| (format!("{prefix}{child}"), node)),
				);
			}
		}
	}
	Ok(all_fields)
}

/// Lifts a flat map back into a hierarchy of leaves only.
pub fn into_hierarchy(fields: FieldMap) -> FieldHierarchy {
	fields
		.into_iter()
		.map(|(name, field)| (name, HierarchyNode::Field(field)))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fields::TextField;
	use crate::model::Document;
	use rstest::rstest;

	fn leaf(name: &str) -> HierarchyNode {
		HierarchyNode::field(TextField::new(name))
	}

	fn nested_hierarchy() -> FieldHierarchy {
		let mut phone = FieldHierarchy::new();
		phone.insert("number".to_string(), leaf("number"));
		phone.insert("kind".to_string(), leaf("kind"));

		let mut contact = FieldHierarchy::new();
		contact.insert("email".to_string(), leaf("email"));
		contact.insert("phones".to_string(), HierarchyNode::template(phone));

		let mut root = FieldHierarchy::new();
		root.insert("title".to_string(), leaf("title"));
		root.insert("contacts".to_string(), HierarchyNode::template(contact));
		root.insert("meta.slug".to_string(), leaf("meta.slug"));
		root
	}

	#[rstest]
	fn test_flatten_nested_templates() {
		// Act
		let flat = flatten(nested_hierarchy()).unwrap();

		// Assert
		let names: Vec<&str> = flat.keys().map(String::as_str).collect();
		assert_eq!(
			names,
			[
				"title",
				"contacts[].email",
				"contacts[].phones[].number",
				"contacts[].phones[].kind",
				"meta.slug",
			]
		);
	}

	#[rstest]
	fn test_flatten_is_idempotent() {
		// Arrange
		let once = flatten(nested_hierarchy()).unwrap();
		let once_names: Vec<String> = once.keys().cloned().collect();

		// Act
		let twice = flatten(into_hierarchy(once)).unwrap();

		// Assert
		let twice_names: Vec<String> = twice.keys().cloned().collect();
		assert_eq!(once_names, twice_names);
	}

	#[rstest]
	fn test_flatten_rejects_colliding_names() {
		// Arrange
		let mut item = FieldHierarchy::new();
		item.insert("b".to_string(), leaf("b"));
		let mut root = FieldHierarchy::new();
		root.insert("a".to_string(), HierarchyNode::template(item));
		root.insert("a[].b".to_string(), leaf("a[].b"));

		// Act
		let result = flatten(root);

		// Assert
		assert!(matches!(result, Err(HierarchyError::DuplicateName(name)) if name == "a[].b"));
	}

	#[rstest]
	fn test_build_decorates_missing_reference() {
		// Arrange
		let builder = |_: &dyn Model, _: &[String]| -> Result<FieldHierarchy, HierarchyError> {
			Err(HierarchyError::MissingReference(
				"Schema `Author` is not registered ".to_string(),
			))
		};
		let model = Document::new("Article");

		// Act
		let err = build_fields_hierarchy(&builder, &model, &[]).unwrap_err();

		// Assert
		assert_eq!(
			err.to_string(),
			"Schema `Author` is not registered referred by model `Article`"
		);
	}

	#[rstest]
	fn test_build_drops_excluded_names() {
		// Arrange
		let builder = |_: &dyn Model, _: &[String]| -> Result<FieldHierarchy, HierarchyError> {
			let mut h = FieldHierarchy::new();
			h.insert("__v".to_string(), leaf("__v"));
			h.insert("title".to_string(), leaf("title"));
			Ok(h)
		};
		let model = Document::new("Article");

		// Act
		let hierarchy = build_fields_hierarchy(&builder, &model, &["__v".to_string()]).unwrap();

		// Assert
		assert_eq!(hierarchy.keys().collect::<Vec<_>>(), ["title"]);
	}
}
