//! # Formage
//!
//! Recursive form trees for model-backed admin forms.
//!
//! A form is built from a model's field hierarchy, bound from an instance,
//! unbound from submitted data, validated field by field and against the
//! model, then saved. Array-of-object members, nested objects and embedded
//! instances of other models are handled by sub-forms of the same shape.
//!
//! ## Feature Flags
//!
//! - `forms` - The form engine (re-exported as [`forms`])
//! - `full` (default) - Everything
//!
//! ## Quick Example
//!
//! ```rust
//! use formage::prelude::*;
//! use serde_json::json;
//!
//! let builder = |_: &dyn Model, _: &[String]| -> Result<FieldHierarchy, HierarchyError> {
//!     let mut fields = FieldHierarchy::new();
//!     fields.insert("title".to_string(), HierarchyNode::field(TextField::new("title").required().stored()));
//!     Ok(fields)
//! };
//! let data: RawData = serde_json::from_value(json!({"title": "Hello"})).unwrap();
//!
//! let mut form = Form::<Document>::new(FormOptions::default(), &builder, None, Some(data)).unwrap();
//! let saved = tokio_test::block_on(form.save()).unwrap();
//!
//! assert_eq!(saved, json!({"title": "Hello"}));
//! ```

#[cfg(feature = "forms")]
pub use formage_forms as forms;

#[cfg(feature = "forms")]
pub mod prelude {
	pub use formage_forms::fields::{BooleanField, DateTimeField, TextField};
	pub use formage_forms::{
		Document, DocumentRule, FieldHierarchy, FieldMap, Form, FormError, FormField, FormNode,
		FormOptions, FormResult, FormSettings, HierarchyBuilder, HierarchyError, HierarchyNode,
		InlineOptions, InlineReferenceForm, Model, ModelFactory, RawData, SubForm, ValidationErrors,
		hook_fn,
	};

	// External
	pub use async_trait::async_trait;
}
