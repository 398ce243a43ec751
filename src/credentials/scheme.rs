//! Registry credential descriptors, discriminated by their `(type, version)` pair.

// self
use crate::{
	_prelude::*,
	credentials::{CredentialSet, RequestSpec},
	error::ConfigError,
};

/// Known credential schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialScheme {
	/// Credentials are carried inline by the descriptor.
	DockerV1,
	/// Credentials are fetched from a callback endpoint.
	CallbackV1,
}
impl CredentialScheme {
	/// Every supported scheme.
	pub const ALL: [Self; 2] = [Self::DockerV1, Self::CallbackV1];

	/// Value of the descriptor's `type` field.
	pub const fn kind(self) -> &'static str {
		match self {
			Self::DockerV1 => "docker",
			Self::CallbackV1 => "registry-credentials-callback",
		}
	}

	/// Value of the descriptor's `version` field.
	pub const fn version(self) -> &'static str {
		match self {
			Self::DockerV1 | Self::CallbackV1 => "1",
		}
	}

	/// Resolves a `(type, version)` pair.
	pub fn lookup(kind: &str, version: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|scheme| scheme.kind() == kind && scheme.version() == version)
	}
}
impl Display for CredentialScheme {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} v{}", self.kind(), self.version())
	}
}

/// Registry credential descriptor supplied by callers.
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryCredentials {
	/// Inline credentials used as-is.
	Docker(CredentialSet),
	/// Callback endpoint that returns the credentials.
	Callback(RequestSpec),
}
impl RegistryCredentials {
	/// Scheme implemented by this descriptor.
	pub fn scheme(&self) -> CredentialScheme {
		match self {
			Self::Docker(_) => CredentialScheme::DockerV1,
			Self::Callback(_) => CredentialScheme::CallbackV1,
		}
	}

	/// Parses a JSON descriptor such as
	/// `{"type": "registry-credentials-callback", "version": 1, "url": "..."}`.
	///
	/// `version` may be a number or a string. Inline credential fields are kept without the
	/// `type`/`version` discriminant.
	pub fn from_value(value: JsonValue) -> Result<Self, ConfigError> {
		let mut fields = match value {
			JsonValue::Object(fields) => fields,
			_ => return Err(ConfigError::MissingDiscriminant { field: "type" }),
		};
		let kind = discriminant(&fields, "type")?;
		let version = discriminant(&fields, "version")?;
		let scheme = CredentialScheme::lookup(&kind, &version)
			.ok_or(ConfigError::UnsupportedScheme { kind, version })?;

		match scheme {
			CredentialScheme::DockerV1 => {
				fields.remove("type");
				fields.remove("version");

				Ok(Self::Docker(CredentialSet::new(fields)))
			},
			CredentialScheme::CallbackV1 => {
				let spec = serde_path_to_error::deserialize(JsonValue::Object(fields))
					.map_err(|source| ConfigError::InvalidDescriptor { source })?;

				Ok(Self::Callback(spec))
			},
		}
	}
}
impl<'de> Deserialize<'de> for RegistryCredentials {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		Self::from_value(JsonValue::deserialize(deserializer)?).map_err(serde::de::Error::custom)
	}
}
impl From<RequestSpec> for RegistryCredentials {
	fn from(spec: RequestSpec) -> Self {
		Self::Callback(spec)
	}
}
impl From<CredentialSet> for RegistryCredentials {
	fn from(set: CredentialSet) -> Self {
		Self::Docker(set)
	}
}

fn discriminant(
	fields: &JsonMap<String, JsonValue>,
	field: &'static str,
) -> Result<String, ConfigError> {
	match fields.get(field) {
		Some(JsonValue::String(value)) => Ok(value.clone()),
		Some(JsonValue::Number(value)) => Ok(value.to_string()),
		_ => Err(ConfigError::MissingDiscriminant { field }),
	}
}
