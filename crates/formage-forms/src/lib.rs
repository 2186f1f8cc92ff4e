//! Recursive form trees for model-backed admin forms
//!
//! This crate turns a declarative field hierarchy into a tree of bindable,
//! validatable and renderable nodes:
//! - Flattening of nested array-of-object templates into composite names
//! - Binding from a model instance and unbinding of raw submitted data
//! - Sequential async validation with model-level error merging
//! - Nested [`SubForm`]s and [`InlineReferenceForm`]s over referenced models
//! - Fieldset grouping for rendering
//!
//! ## Pipeline
//!
//! ```text
//! HierarchyBuilder -> flatten -> Form.fields -> bind -> unbind -> validate -> save
//! ```
//!
//! ## Example
//!
//! ```
//! use formage_forms::fields::TextField;
//! use formage_forms::hierarchy::{FieldHierarchy, HierarchyError, HierarchyNode};
//! use formage_forms::model::{Document, DocumentRule, Model};
//! use formage_forms::{Form, FormOptions, RawData};
//! use serde_json::json;
//!
//! let builder = |_: &dyn Model, _: &[String]| -> Result<FieldHierarchy, HierarchyError> {
//!     let mut fields = FieldHierarchy::new();
//!     fields.insert("title".to_string(), HierarchyNode::field(TextField::new("title").stored()));
//!     fields.insert("summary".to_string(), HierarchyNode::field(TextField::new("summary").stored()));
//!     Ok(fields)
//! };
//! let instance = Document::new("Article").with_rule(DocumentRule::required("title"));
//! let data: RawData = serde_json::from_value(json!({"summary": "Short"})).unwrap();
//!
//! let mut form = Form::new(FormOptions::default(), &builder, Some(instance), Some(data)).unwrap();
//! let errors = tokio_test::block_on(form.validate()).unwrap_err();
//!
//! assert_eq!(errors.field("title"), Some(&["Path `title` is required.".to_string()][..]));
//! assert_eq!(form.instance().get("summary"), Some(json!("Short")));
//! ```

pub mod config;
pub mod error;
pub mod field;
pub mod fields;
pub mod fieldset;
pub mod form;
pub mod hierarchy;
pub mod hooks;
pub mod inline_ref;
pub mod model;
pub mod render;
pub mod sub_form;

pub use config::{AssetSettings, FormSettings};
pub use error::{
	ConfigError, ErrorMap, FormError, FormResult, HierarchyError, ModelPathError, StorageError,
	ValidationErrors,
};
pub use field::{FormField, RawData, SELF_KEY};
pub use fieldset::{Fieldset, organize_by_fieldsets};
pub use form::{Form, FormNode, FormOptions, VERSION_KEY};
pub use hierarchy::{
	FieldHierarchy, FieldMap, HierarchyBuilder, HierarchyNode, build_fields_hierarchy, flatten,
};
pub use hooks::{PasswordChangeHook, PasswordVerifier, ValidationContext, ValidationHook, hook_fn};
pub use inline_ref::{InlineOptions, InlineReferenceForm};
pub use model::{Document, DocumentRule, DocumentStore, Model, ModelFactory, ModelValidationError};
pub use render::RenderSink;
pub use sub_form::SubForm;
