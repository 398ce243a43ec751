//! Fetched credential sets.

// self
use crate::{_prelude::*, error::FormatError};

/// String-keyed credential fields (username, password, token, ...) for one registry session.
///
/// Values are kept exactly as received. `Debug` only lists keys so secrets never reach logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet(JsonMap<String, JsonValue>);
impl CredentialSet {
	/// Wraps an existing JSON object.
	pub fn new(fields: JsonMap<String, JsonValue>) -> Self {
		Self(fields)
	}

	/// Converts a decoded JSON document, rejecting anything but an object.
	pub fn from_json(value: JsonValue) -> Result<Self, FormatError> {
		match value {
			JsonValue::Object(fields) => Ok(Self(fields)),
			other => Err(FormatError::NotAnObject { kind: json_kind(&other) }),
		}
	}

	/// Decodes a raw response body.
	pub fn from_slice(body: &[u8]) -> Result<Self, FormatError> {
		Self::from_json(serde_json::from_slice(body)?)
	}

	/// Returns the value stored under `key`.
	pub fn get(&self, key: &str) -> Option<&JsonValue> {
		self.0.get(key)
	}

	/// Iterates over `(key, value)` pairs.
	pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
		self.0.iter()
	}

	/// Number of fields.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the set has no fields.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Borrows the underlying JSON object.
	pub fn as_map(&self) -> &JsonMap<String, JsonValue> {
		&self.0
	}

	/// Returns the underlying JSON object.
	pub fn into_map(self) -> JsonMap<String, JsonValue> {
		self.0
	}
}
impl Debug for CredentialSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.0.keys()).finish()
	}
}
impl From<JsonMap<String, JsonValue>> for CredentialSet {
	fn from(fields: JsonMap<String, JsonValue>) -> Self {
		Self(fields)
	}
}

fn json_kind(value: &JsonValue) -> &'static str {
	match value {
		JsonValue::Null => "null",
		JsonValue::Bool(_) => "boolean",
		JsonValue::Number(_) => "number",
		JsonValue::String(_) => "string",
		JsonValue::Array(_) => "array",
		JsonValue::Object(_) => "object",
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn only_objects_become_credential_sets() {
		let set = CredentialSet::from_slice(br#"{"username":"u","password":"p","ttl":60}"#)
			.expect("Object body should decode.");

		assert_eq!(set.len(), 3);
		assert_eq!(set.get("ttl"), Some(&serde_json::json!(60)));
		assert!(matches!(
			CredentialSet::from_slice(b"[1, 2]"),
			Err(FormatError::NotAnObject { kind: "array" })
		));
		assert!(matches!(CredentialSet::from_slice(b""), Err(FormatError::Json(_))));
	}

	#[test]
	fn debug_hides_values() {
		let set = CredentialSet::from_slice(br#"{"password":"hunter2"}"#)
			.expect("Object body should decode.");
		let rendered = format!("{set:?}");

		assert!(rendered.contains("password"));
		assert!(!rendered.contains("hunter2"));
	}
}
