//! Model and storage contract consumed by forms
//!
//! A [`Model`] is the in-progress instance a [`Form`](crate::Form) binds from and
//! commits into. Values cross the boundary as plain `serde_json::Value`
//! structures addressed by dotted paths, where numeric segments index arrays.
//!
//! [`Document`] is a JSON-backed implementation with declarative path rules and
//! an optional in-memory [`DocumentStore`].

use crate::error::{FormError, FormResult, ModelPathError, StorageError};
use crate::field::SELF_KEY;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// One model-level (cross-field or schema) validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelValidationError {
	/// Dotted path, array items addressed by index (`authors.3.name`).
	pub path: String,
	pub message: String,
}

impl ModelValidationError {
	pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			message: message.into(),
		}
	}
}

/// The owning model instance of a form.
#[async_trait]
pub trait Model: Send + Sync {
	/// Name used to decorate hierarchy construction errors.
	fn model_name(&self) -> &str;

	/// Reads the value at a dotted path. Missing segments yield `None`.
	fn get(&self, path: &str) -> Option<Value>;

	fn set(&mut self, path: &str, value: Value) -> Result<(), ModelPathError>;

	/// Plain-structure conversion of the whole instance.
	fn to_value(&self) -> Value;

	/// Whether the instance has never been persisted.
	fn is_new(&self) -> bool {
		true
	}

	/// Model-level validation; an empty list means valid.
	async fn validate(&self) -> Vec<ModelValidationError>;

	/// Persist the instance, returning its stored representation.
	async fn save(&mut self) -> Result<Value, StorageError>;
}

/// Reads a field value off an instance; `__self__` addresses the instance itself.
pub fn read_embedded(instance: &dyn Model, name: &str) -> Option<Value> {
	if name == SELF_KEY {
		return Some(instance.to_value());
	}
	instance.get(name)
}

/// Reads `path` from a plain value.
///
/// A top-level key equal to the whole path wins over dotted traversal.
///
/// # Examples
///
/// ```
/// use formage_forms::model::read_path;
/// use serde_json::json;
///
/// let doc = json!({"author": {"name": "Ada"}, "tags": [{"label": "rust"}]});
/// assert_eq!(read_path(&doc, "author.name"), Some(json!("Ada")));
/// assert_eq!(read_path(&doc, "tags.0.label"), Some(json!("rust")));
/// assert_eq!(read_path(&doc, "editor.name"), None);
/// ```
pub fn read_path(root: &Value, path: &str) -> Option<Value> {
	if path == SELF_KEY {
		return Some(root.clone());
	}
	if let Some(direct) = root.as_object().and_then(|map| map.get(path)) {
		return Some(direct.clone());
	}
	let mut current = root;
	for segment in path.split('.') {
		current = match current {
			Value::Object(map) => map.get(segment)?,
			Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
			_ => return None,
		};
	}
	Some(current.clone())
}

/// Writes `value` at `path`, creating intermediate objects as needed.
///
/// An array index may address an existing element or append one past the end.
pub fn write_path(root: &mut Value, path: &str, value: Value) -> Result<(), ModelPathError> {
	if path.is_empty() {
		return Err(ModelPathError::Empty);
	}
	if path == SELF_KEY {
		*root = value;
		return Ok(());
	}
	let segments: Vec<&str> = path.split('.').collect();
	let Some((last, parents)) = segments.split_last() else {
		return Err(ModelPathError::Empty);
	};

	let mut current = root;
	for segment in parents {
		current = child_mut(current, segment, path)?;
	}
	*child_mut(current, last, path)? = value;
	Ok(())
}

fn child_mut<'a>(
	current: &'a mut Value,
	segment: &str,
	path: &str,
) -> Result<&'a mut Value, ModelPathError> {
	let not_container = || ModelPathError::NotAContainer {
		path: path.to_string(),
		segment: segment.to_string(),
	};
	if current.is_null() {
		*current = Value::Object(Map::new());
	}
	match current {
		Value::Object(map) => Ok(map.entry(segment.to_string()).or_insert(Value::Null)),
		Value::Array(items) => {
			let index = segment.parse::<usize>().map_err(|_| not_container())?;
			if index == items.len() {
				items.push(Value::Null);
			}
			items.get_mut(index).ok_or_else(not_container)
		}
		_ => Err(not_container()),
	}
}

/// Expands a path pattern whose `[]` segments stand for every array element.
///
/// `authors[].name` over two authors yields `authors.0.name` and `authors.1.name`.
pub fn expand_array_paths(root: &Value, pattern: &str) -> Vec<(String, Option<Value>)> {
	let Some((head, rest)) = pattern.split_once("[].") else {
		return vec![(pattern.to_string(), read_path(root, pattern))];
	};
	let Some(Value::Array(items)) = read_path(root, head) else {
		return Vec::new();
	};
	(0..items.len())
		.flat_map(|index| expand_array_paths(root, &format!("{head}.{index}.{rest}")))
		.collect()
}

type RuleCheck = Arc<dyn Fn(Option<&Value>) -> Option<String> + Send + Sync>;

/// A declarative model-level constraint on a path pattern.
#[derive(Clone)]
pub struct DocumentRule {
	pattern: String,
	check: RuleCheck,
}

impl DocumentRule {
	/// Fails when the value is missing, `null` or an empty string.
	pub fn required(pattern: impl Into<String>) -> Self {
		Self::custom(pattern, |value| match value {
			None | Some(Value::Null) => Some("is required.".to_string()),
			Some(Value::String(s)) if s.is_empty() => Some("is required.".to_string()),
			_ => None,
		})
	}

	/// Runs `check`, which returns the failure message (prefixed with the path).
	pub fn custom<F>(pattern: impl Into<String>, check: F) -> Self
	where
		F: Fn(Option<&Value>) -> Option<String> + Send + Sync + 'static,
	{
		Self {
			pattern: pattern.into(),
			check: Arc::new(check),
		}
	}

	fn evaluate(&self, root: &Value) -> Vec<ModelValidationError> {
		expand_array_paths(root, &self.pattern)
			.into_iter()
			.filter_map(|(path, value)| {
				(self.check)(value.as_ref())
					.map(|message| ModelValidationError::new(&path, format!("Path `{path}` {message}")))
			})
			.collect()
	}
}

impl std::fmt::Debug for DocumentRule {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocumentRule")
			.field("pattern", &self.pattern)
			.finish_non_exhaustive()
	}
}

/// In-memory persistence backend for [`Document`]s.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
	documents: Arc<RwLock<Vec<Value>>>,
	unique: Arc<Vec<String>>,
	next_id: Arc<AtomicU64>,
}

impl DocumentStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Rejects saves that would duplicate a value at any of these paths.
	pub fn with_unique(mut self, paths: &[&str]) -> Self {
		self.unique = Arc::new(paths.iter().map(|p| p.to_string()).collect());
		self
	}

	pub fn count(&self) -> usize {
		self.documents.read().len()
	}

	pub fn find(&self, id: u64) -> Option<Value> {
		self.documents
			.read()
			.iter()
			.find(|doc| doc.get("_id").and_then(Value::as_u64) == Some(id))
			.cloned()
	}

	fn upsert(&self, data: &mut Value) -> Result<Value, StorageError> {
		let mut documents = self.documents.write();
		let id = data.get("_id").and_then(Value::as_u64);

		for path in self.unique.iter() {
			let Some(candidate) = read_path(data, path) else {
				continue;
			};
			let clash = documents.iter().any(|doc| {
				doc.get("_id").and_then(Value::as_u64) != id
					&& read_path(doc, path).as_ref() == Some(&candidate)
			});
			if clash {
				return Err(StorageError::Duplicate(format!("{path} = {candidate}")));
			}
		}

		match id.and_then(|id| {
			documents
				.iter()
				.position(|doc| doc.get("_id").and_then(Value::as_u64) == Some(id))
		}) {
			Some(position) => documents[position] = data.clone(),
			None => {
				let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
				write_path(data, "_id", Value::from(id))
					.map_err(|e| StorageError::Backend(anyhow::Error::new(e)))?;
				documents.push(data.clone());
			}
		}
		Ok(data.clone())
	}
}

/// A JSON document model instance.
///
/// # Examples
///
/// ```
/// use formage_forms::model::{Document, DocumentRule, Model};
/// use serde_json::json;
///
/// let mut doc = Document::new("Article").with_rule(DocumentRule::required("title"));
/// doc.set("meta.slug", json!("hello")).unwrap();
///
/// assert_eq!(doc.get("meta.slug"), Some(json!("hello")));
/// assert_eq!(doc.get("meta.missing.deeper"), None);
/// ```
#[derive(Debug, Clone)]
pub struct Document {
	model_name: String,
	data: Value,
	rules: Vec<DocumentRule>,
	store: Option<DocumentStore>,
	is_new: bool,
}

impl Document {
	pub fn new(model_name: impl Into<String>) -> Self {
		Self {
			model_name: model_name.into(),
			data: Value::Object(Map::new()),
			rules: Vec::new(),
			store: None,
			is_new: true,
		}
	}

	/// Builds a document from an existing plain value.
	///
	/// Objects carrying an `_id` are treated as already persisted.
	pub fn from_value(model_name: impl Into<String>, data: Value) -> FormResult<Self> {
		let model_name = model_name.into();
		let data = match data {
			Value::Null => Value::Object(Map::new()),
			Value::Object(map) => Value::Object(map),
			other => {
				return Err(FormError::Construct {
					model: model_name,
					message: format!("expected an object, got {other}"),
				});
			}
		};
		let is_new = data.get("_id").is_none();
		Ok(Self {
			model_name,
			data,
			rules: Vec::new(),
			store: None,
			is_new,
		})
	}

	pub fn with_rule(mut self, rule: DocumentRule) -> Self {
		self.rules.push(rule);
		self
	}

	pub fn with_rules(mut self, rules: impl IntoIterator<Item = DocumentRule>) -> Self {
		self.rules.extend(rules);
		self
	}

	pub fn with_store(mut self, store: DocumentStore) -> Self {
		self.store = Some(store);
		self
	}

	pub fn data(&self) -> &Value {
		&self.data
	}
}

impl Default for Document {
	fn default() -> Self {
		Self::new("Document")
	}
}

#[async_trait]
impl Model for Document {
	fn model_name(&self) -> &str {
		&self.model_name
	}

	fn get(&self, path: &str) -> Option<Value> {
		read_path(&self.data, path)
	}

	fn set(&mut self, path: &str, value: Value) -> Result<(), ModelPathError> {
		write_path(&mut self.data, path, value)
	}

	fn to_value(&self) -> Value {
		self.data.clone()
	}

	fn is_new(&self) -> bool {
		self.is_new
	}

	async fn validate(&self) -> Vec<ModelValidationError> {
		self.rules
			.iter()
			.flat_map(|rule| rule.evaluate(&self.data))
			.collect()
	}

	async fn save(&mut self) -> Result<Value, StorageError> {
		let saved = match &self.store {
			Some(store) => store.upsert(&mut self.data)?,
			None => self.data.clone(),
		};
		self.is_new = false;
		Ok(saved)
	}
}

/// Constructs instances of a referenced model type from plain values.
pub struct ModelFactory<M> {
	model_name: String,
	build: Arc<dyn Fn(Value) -> FormResult<M> + Send + Sync>,
}

impl<M> ModelFactory<M> {
	pub fn new<F>(model_name: impl Into<String>, build: F) -> Self
	where
		F: Fn(Value) -> FormResult<M> + Send + Sync + 'static,
	{
		Self {
			model_name: model_name.into(),
			build: Arc::new(build),
		}
	}

	pub fn model_name(&self) -> &str {
		&self.model_name
	}

	pub fn construct(&self, value: Value) -> FormResult<M> {
		(self.build)(value)
	}
}

impl<M> Clone for ModelFactory<M> {
	fn clone(&self) -> Self {
		Self {
			model_name: self.model_name.clone(),
			build: Arc::clone(&self.build),
		}
	}
}

impl ModelFactory<Document> {
	/// Factory producing [`Document`]s of `model_name` carrying `rules`.
	pub fn document(model_name: impl Into<String>, rules: Vec<DocumentRule>) -> Self {
		let model_name = model_name.into();
		let name = model_name.clone();
		Self::new(model_name, move |value| {
			Ok(Document::from_value(name.clone(), value)?.with_rules(rules.clone()))
		})
	}
}
