//! Reference field implementations of the [`FormField`](crate::FormField) contract

pub mod boolean_field;
pub mod datetime_field;
pub mod text_field;

pub use boolean_field::BooleanField;
pub use datetime_field::DateTimeField;
pub use text_field::{TextField, TextWidget};

/// Message used by every reference field for a missing required value.
pub const REQUIRED_MESSAGE: &str = "This field is required.";
