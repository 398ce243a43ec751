//! Callback request descriptor.

// self
use crate::{_prelude::*, error::ConfigError};

/// Immutable description of the credential callback request.
///
/// Headers with an empty name or an empty value are never stored, so everything returned by
/// [`RequestSpec::headers`] is sent verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRequestSpec")]
pub struct RequestSpec {
	url: Url,
	method: String,
	headers: BTreeMap<String, String>,
}
impl RequestSpec {
	/// Method used when the descriptor does not name one.
	pub const DEFAULT_METHOD: &'static str = "POST";

	/// Creates a `POST` request to `url` without extra headers.
	pub fn new(url: Url) -> Self {
		Self { url, method: Self::DEFAULT_METHOD.into(), headers: BTreeMap::new() }
	}

	/// Overrides the HTTP method; the value is upper-cased and must be a valid token.
	pub fn with_method(mut self, method: impl AsRef<str>) -> Result<Self, ConfigError> {
		self.method = normalize_method(method.as_ref())?;

		Ok(self)
	}

	/// Adds a header unless its name or value is empty.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		let name = name.into();
		let value = value.into();

		if !name.is_empty() && !value.is_empty() {
			self.headers.insert(name, value);
		}

		self
	}

	/// Adds every non-empty header from `headers`.
	pub fn with_headers<I, K, V>(self, headers: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		headers.into_iter().fold(self, |spec, (name, value)| spec.with_header(name, value))
	}

	/// Callback endpoint.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Upper-case HTTP method.
	pub fn method(&self) -> &str {
		&self.method
	}

	/// Caller-supplied headers.
	pub fn headers(&self) -> &BTreeMap<String, String> {
		&self.headers
	}
}
impl TryFrom<RawRequestSpec> for RequestSpec {
	type Error = ConfigError;

	fn try_from(raw: RawRequestSpec) -> Result<Self, Self::Error> {
		let spec = Self::new(raw.url);
		let spec = match raw.method {
			Some(method) => spec.with_method(method)?,
			None => spec,
		};
		let headers = match raw.headers {
			Some(JsonValue::Object(map)) => map,
			_ => return Ok(spec),
		};

		Ok(spec.with_headers(
			headers
				.into_iter()
				.filter(|(_, value)| is_truthy(value))
				.map(|(name, value)| (name, stringify(value))),
		))
	}
}

/// Wire shape of the callback descriptor; unknown fields (`type`, `version`) are ignored.
#[derive(Deserialize)]
struct RawRequestSpec {
	url: Url,
	#[serde(default)]
	method: Option<String>,
	#[serde(default)]
	headers: Option<JsonValue>,
}

fn normalize_method(method: &str) -> Result<String, ConfigError> {
	const TOKEN_PUNCTUATION: &str = "!#$%&'*+-.^_`|~";

	let valid = !method.is_empty()
		&& method.chars().all(|c| c.is_ascii_alphanumeric() || TOKEN_PUNCTUATION.contains(c));

	if valid {
		Ok(method.to_ascii_uppercase())
	} else {
		Err(ConfigError::InvalidMethod { method: method.into() })
	}
}

fn is_truthy(value: &JsonValue) -> bool {
	match value {
		JsonValue::Null => false,
		JsonValue::Bool(flag) => *flag,
		JsonValue::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
		JsonValue::String(text) => !text.is_empty(),
		JsonValue::Array(items) => !items.is_empty(),
		JsonValue::Object(map) => !map.is_empty(),
	}
}

// Booleans render capitalized; only `true` survives the truthiness filter.
fn stringify(value: JsonValue) -> String {
	match value {
		JsonValue::String(text) => text,
		JsonValue::Bool(true) => "True".into(),
		JsonValue::Bool(false) => "False".into(),
		other => other.to_string(),
	}
}
