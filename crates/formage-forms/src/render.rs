//! Markup sinks and escaping helpers used while rendering forms

/// Append-only text sink written to during rendering.
pub trait RenderSink {
	fn write(&mut self, fragment: &str);
}

impl RenderSink for String {
	fn write(&mut self, fragment: &str) {
		self.push_str(fragment);
	}
}

impl RenderSink for Vec<String> {
	fn write(&mut self, fragment: &str) {
		self.push(fragment.to_string());
	}
}

/// Escape HTML special characters
///
/// # Examples
///
/// ```
/// use formage_forms::render::escape_html;
///
/// assert_eq!(escape_html("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#x27;y&#x27;&lt;/b&gt;");
/// ```
pub fn escape_html(input: &str) -> String {
	input
		.replace('&', "&amp;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
		.replace('"', "&quot;")
		.replace('\'', "&#x27;")
}

/// Escape a value placed inside a double-quoted attribute.
pub fn escape_attribute(input: &str) -> String {
	escape_html(input)
		.replace('\n', "&#10;")
		.replace('\r', "&#13;")
}

/// Turns a field or group key into a human-readable title.
///
/// Underscores, dashes and camel-case boundaries become spaces and the first
/// letter is capitalized.
///
/// # Examples
///
/// ```
/// use formage_forms::render::humanize;
///
/// assert_eq!(humanize("billing_address"), "Billing address");
/// assert_eq!(humanize("lastVisit"), "Last visit");
/// assert_eq!(humanize("  seo-meta "), "Seo meta");
/// ```
pub fn humanize(key: &str) -> String {
	let mut words = String::with_capacity(key.len());
	let mut prev_lower = false;
	for ch in key.trim().chars() {
		if ch == '_' || ch == '-' || ch.is_whitespace() {
			if !words.ends_with(' ') && !words.is_empty() {
				words.push(' ');
			}
			prev_lower = false;
			continue;
		}
		if ch.is_uppercase() && prev_lower {
			words.push(' ');
		}
		prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
		words.extend(ch.to_lowercase());
	}
	let trimmed = words.trim_end();
	let mut chars = trimmed.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}
