//! Extra validation hooks run after field and model validation
//!
//! A hook inspects the instance and the raw submission and may add errors.
//! Hooks only run while the form is still clean, in registration order, and
//! the first hook to report an error ends the chain.

use crate::error::ErrorMap;
use crate::field::{RawData, value_as_string};
use crate::model::Model;
use async_trait::async_trait;
use serde_json::Value;
use subtle::ConstantTimeEq;

/// What a [`ValidationHook`] sees of the form under validation.
pub struct ValidationContext<'a> {
	instance: &'a dyn Model,
	data: Option<&'a RawData>,
	errors: &'a mut ErrorMap,
}

impl<'a> ValidationContext<'a> {
	pub fn new(instance: &'a dyn Model, data: Option<&'a RawData>, errors: &'a mut ErrorMap) -> Self {
		Self {
			instance,
			data,
			errors,
		}
	}

	pub fn instance(&self) -> &dyn Model {
		self.instance
	}

	/// The submitted value for `name`, if any.
	pub fn raw(&self, name: &str) -> Option<&Value> {
		self.data.and_then(|data| data.get(name))
	}

	/// The submitted value for `name` as a non-empty string.
	pub fn raw_str(&self, name: &str) -> Option<String> {
		self.raw(name)
			.and_then(value_as_string)
			.filter(|s| !s.is_empty())
	}

	/// Appends `message` under `field`.
	pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
		self.errors
			.entry(field.into())
			.or_default()
			.push(message.into());
	}

	pub fn errors(&self) -> &ErrorMap {
		self.errors
	}

	pub fn has_errors(&self) -> bool {
		!self.errors.is_empty()
	}
}

#[async_trait]
pub trait ValidationHook: Send + Sync {
	async fn validate(&self, ctx: &mut ValidationContext<'_>);
}

/// Adapts a synchronous closure into a [`ValidationHook`].
pub struct HookFn<F>(F);

/// Wrap a closure as a hook
///
/// # Examples
///
/// ```
/// use formage_forms::hooks::{ValidationContext, hook_fn};
///
/// let hook = hook_fn(|ctx: &mut ValidationContext<'_>| {
///     if ctx.raw_str("slug").is_some_and(|slug| slug.contains(' ')) {
///         ctx.add_error("slug", "Slugs cannot contain spaces");
///     }
/// });
/// ```
pub fn hook_fn<F>(f: F) -> HookFn<F>
where
	F: Fn(&mut ValidationContext<'_>) + Send + Sync,
{
	HookFn(f)
}

#[async_trait]
impl<F> ValidationHook for HookFn<F>
where
	F: Fn(&mut ValidationContext<'_>) + Send + Sync,
{
	async fn validate(&self, ctx: &mut ValidationContext<'_>) {
		(self.0)(ctx)
	}
}

/// Checks a candidate password against the credential stored on an instance.
///
/// Hashing is left to the implementor.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
	async fn verify(&self, instance: &dyn Model, candidate: &str) -> bool;
}

pub const CURRENT_PASSWORD: &str = "current_password";
pub const PASSWORD: &str = "password";
pub const PASSWORD_AGAIN: &str = "password_again";

/// Account password change rule.
///
/// Passes when no password key was submitted. A persisted account must
/// supply its current password, and the new password must be typed twice.
pub struct PasswordChangeHook<V> {
	verifier: V,
}

impl<V: PasswordVerifier> PasswordChangeHook<V> {
	pub fn new(verifier: V) -> Self {
		Self { verifier }
	}
}

fn same_secret(a: &str, b: &str) -> bool {
	a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

#[async_trait]
impl<V: PasswordVerifier> ValidationHook for PasswordChangeHook<V> {
	async fn validate(&self, ctx: &mut ValidationContext<'_>) {
		let current = ctx.raw_str(CURRENT_PASSWORD);
		let password = ctx.raw_str(PASSWORD);
		let again = ctx.raw_str(PASSWORD_AGAIN);
		if current.is_none() && password.is_none() && again.is_none() {
			return;
		}

		if !ctx.instance().is_new() {
			let Some(current) = current else {
				ctx.add_error(CURRENT_PASSWORD, "Missing password");
				return;
			};
			if !self.verifier.verify(ctx.instance(), &current).await {
				tracing::debug!(model = ctx.instance().model_name(), "Current password rejected");
				ctx.add_error(CURRENT_PASSWORD, "Password incorrect");
				return;
			}
		}

		let password = password.unwrap_or_default();
		let again = again.unwrap_or_default();
		if !same_secret(&password, &again) {
			ctx.add_error(PASSWORD_AGAIN, "typed incorrectly");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{Document, read_path};
	use rstest::rstest;
	use serde_json::json;

	/// Compares against a plain `secret` path; good enough to exercise the rule.
	struct PlainVerifier;

	#[async_trait]
	impl PasswordVerifier for PlainVerifier {
		async fn verify(&self, instance: &dyn Model, candidate: &str) -> bool {
			read_path(&instance.to_value(), "secret").as_ref() == Some(&json!(candidate))
		}
	}

	async fn run(instance: &Document, data: Value) -> ErrorMap {
		let data: RawData = serde_json::from_value(data).unwrap();
		let mut errors = ErrorMap::new();
		let hook = PasswordChangeHook::new(PlainVerifier);
		let mut ctx = ValidationContext::new(instance, Some(&data), &mut errors);
		hook.validate(&mut ctx).await;
		errors
	}

	fn persisted() -> Document {
		Document::from_value("User", json!({"_id": 1, "secret": "hunter2"})).unwrap()
	}

	#[rstest]
	#[tokio::test]
	async fn test_no_password_keys_passes() {
		let errors = run(&persisted(), json!({"username": "root", "password": ""})).await;
		assert!(errors.is_empty());
	}

	#[rstest]
	#[case(json!({"password": "a", "password_again": "a"}), "Missing password")]
	#[case(json!({"current_password": "nope", "password": "a", "password_again": "a"}), "Password incorrect")]
	#[tokio::test]
	async fn test_persisted_account_needs_current_password(#[case] data: Value, #[case] expected: &str) {
		// Act
		let errors = run(&persisted(), data).await;

		// Assert
		assert_eq!(errors.get(CURRENT_PASSWORD), Some(&vec![expected.to_string()]));
	}

	#[rstest]
	#[tokio::test]
	async fn test_mismatched_repeat() {
		// Arrange
		let data = json!({"current_password": "hunter2", "password": "abc", "password_again": "abd"});

		// Act
		let errors = run(&persisted(), data).await;

		// Assert
		assert_eq!(errors.keys().collect::<Vec<_>>(), [PASSWORD_AGAIN]);
		assert_eq!(errors[PASSWORD_AGAIN], ["typed incorrectly"]);
	}

	#[rstest]
	#[tokio::test]
	async fn test_new_account_skips_current_password() {
		let errors = run(&Document::new("User"), json!({"password": "abc", "password_again": "abc"})).await;
		assert!(errors.is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_closure_hook() {
		// Arrange
		let hook = hook_fn(|ctx: &mut ValidationContext<'_>| {
			if ctx.raw_str("slug").is_some_and(|s| s.contains(' ')) {
				ctx.add_error("slug", "Slugs cannot contain spaces");
			}
		});
		let doc = Document::new("Page");
		let data: RawData = serde_json::from_value(json!({"slug": "a b"})).unwrap();
		let mut errors = ErrorMap::new();

		// Act
		hook.validate(&mut ValidationContext::new(&doc, Some(&data), &mut errors)).await;

		// Assert
		assert_eq!(errors["slug"], ["Slugs cannot contain spaces"]);
	}
}
