use crate::field::{FormField, RawData, value_as_string};
use crate::fields::REQUIRED_MESSAGE;
use crate::render::{RenderSink, escape_attribute};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;

/// Suffix of the raw key carrying the time part.
pub const HOUR_SUFFIX: &str = "_hour";

pub const DATETIME_HEADER_LINE: &str = "<script src=\"/js/datetime_field.js\"></script>";

const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// DateTimeField split into a date input and a time input
///
/// The date is submitted under the field name and the time under
/// `<name>_hour`, so the field claims both keys.
#[derive(Debug, Clone)]
pub struct DateTimeField {
	pub name: String,
	pub label: Option<String>,
	pub required: bool,
	pub db_path: Option<String>,
	pub date_formats: Vec<String>,
	pub time_formats: Vec<String>,
	date: Option<String>,
	hour: Option<String>,
	data: RawData,
	errors: Vec<String>,
}

impl DateTimeField {
	/// Create a new DateTimeField
	///
	/// # Examples
	///
	/// ```
	/// use formage_forms::fields::DateTimeField;
	///
	/// let field = DateTimeField::new("published_at");
	/// assert_eq!(field.name, "published_at");
	/// ```
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			label: None,
			required: false,
			db_path: None,
			date_formats: vec![
				"%Y-%m-%d".to_string(),
				"%m/%d/%Y".to_string(),
				"%d.%m.%Y".to_string(),
			],
			time_formats: vec!["%H:%M".to_string(), "%H:%M:%S".to_string()],
			date: None,
			hour: None,
			data: RawData::new(),
			errors: Vec::new(),
		}
	}

	pub fn required(mut self) -> Self {
		self.required = true;
		self
	}

	pub fn stored(mut self) -> Self {
		self.db_path = Some(self.name.clone());
		self
	}

	fn hour_key(&self) -> String {
		format!("{}{}", self.name, HOUR_SUFFIX)
	}

	fn parse_date(&self, s: &str) -> Option<NaiveDate> {
		self.date_formats
			.iter()
			.find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
	}

	fn parse_time(&self, s: &str) -> Option<NaiveTime> {
		self.time_formats
			.iter()
			.find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
	}

	/// The combined value, `Ok(None)` when nothing was entered.
	pub fn datetime(&self) -> Result<Option<NaiveDateTime>, String> {
		let date = self.date.as_deref().map(str::trim).filter(|s| !s.is_empty());
		let hour = self.hour.as_deref().map(str::trim).filter(|s| !s.is_empty());
		let Some(date) = date else {
			return match hour {
				None => Ok(None),
				Some(_) => Err("Enter a valid date/time".to_string()),
			};
		};
		let date = self
			.parse_date(date)
			.ok_or_else(|| "Enter a valid date/time".to_string())?;
		let time = match hour {
			Some(hour) => self
				.parse_time(hour)
				.ok_or_else(|| "Enter a valid date/time".to_string())?,
			None => NaiveTime::MIN,
		};
		Ok(Some(date.and_time(time)))
	}
}

#[async_trait]
impl FormField for DateTimeField {
	fn name(&self) -> &str {
		&self.name
	}

	fn label(&self) -> Option<&str> {
		self.label.as_deref()
	}

	fn required(&self) -> bool {
		self.required
	}

	fn db_path(&self) -> Option<&str> {
		self.db_path.as_deref()
	}

	fn header_lines(&self) -> Vec<String> {
		vec![DATETIME_HEADER_LINE.to_string()]
	}

	fn bind(&mut self, value: Option<Value>) {
		let parsed = value
			.as_ref()
			.and_then(value_as_string)
			.and_then(|s| {
				NaiveDateTime::parse_from_str(&s, STORAGE_FORMAT)
					.ok()
					.or_else(|| chrono::DateTime::parse_from_rfc3339(&s).ok().map(|d| d.naive_utc()))
			});
		self.date = parsed.map(|dt| dt.format("%Y-%m-%d").to_string());
		self.hour = parsed.map(|dt| dt.format("%H:%M").to_string());
	}

	fn set_data(&mut self, data: RawData) {
		self.data = data;
	}

	fn unbind(&mut self) {
		self.date = self.data.get(&self.name).and_then(value_as_string);
		self.hour = self.data.get(&self.hour_key()).and_then(value_as_string);
	}

	async fn validate(&mut self) {
		self.errors = match self.datetime() {
			Ok(None) if self.required => vec![REQUIRED_MESSAGE.to_string()],
			Ok(_) => Vec::new(),
			Err(message) => vec![message],
		};
	}

	fn errors(&self) -> &[String] {
		&self.errors
	}

	fn set_errors(&mut self, errors: Vec<String>) {
		self.errors = errors;
	}

	fn get_value(&mut self) -> Value {
		match self.datetime() {
			Ok(Some(dt)) => Value::String(dt.format(STORAGE_FORMAT).to_string()),
			_ => Value::Null,
		}
	}

	fn render(&self, sink: &mut dyn RenderSink) {
		let name = escape_attribute(&self.name);
		sink.write(&format!(
			"<input type=\"date\" name=\"{name}\" id=\"id_{name}\" value=\"{}\" />\n",
			escape_attribute(self.date.as_deref().unwrap_or_default())
		));
		sink.write(&format!(
			"<input type=\"time\" name=\"{name}{HOUR_SUFFIX}\" value=\"{}\" />\n",
			escape_attribute(self.hour.as_deref().unwrap_or_default())
		));
	}
}
