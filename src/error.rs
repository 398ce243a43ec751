//! Crate-level error types shared by the fetcher, the registry login layer, and sessions.

// self
use crate::{_prelude::*, http::CallbackResponse, registry::RegistryError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential callback could not produce a credential set.
	#[error(transparent)]
	CallbackFailed(#[from] CallbackFailed),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Registry login mechanism failed.
	#[error(transparent)]
	Registry(#[from] RegistryError),
}
impl Error {
	/// Returns the raw callback response attached to a [`CallbackFailed`] error, if any.
	pub fn callback_response(&self) -> Option<&CallbackResponse> {
		match self {
			Self::CallbackFailed(failed) => failed.response(),
			_ => None,
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Attempt budgets must allow at least one attempt.
	#[error("Attempt budget must be at least 1, got {attempts}.")]
	InvalidAttempts {
		/// Rejected attempt budget.
		attempts: u32,
	},
	/// HTTP method is not a valid token.
	#[error("HTTP method `{method}` is invalid.")]
	InvalidMethod {
		/// Rejected method string.
		method: String,
	},
	/// Credential descriptor lacks its `type` or `version` discriminant.
	#[error("Registry credentials are missing the `{field}` field.")]
	MissingDiscriminant {
		/// Name of the missing field.
		field: &'static str,
	},
	/// No credential scheme is registered for the `(type, version)` pair.
	#[error("Unsupported registry credentials type `{kind}` (version {version}).")]
	UnsupportedScheme {
		/// Descriptor `type` value.
		kind: String,
		/// Descriptor `version` value.
		version: String,
	},
	/// Credential descriptor failed to deserialize.
	#[error("Registry credentials descriptor is invalid.")]
	InvalidDescriptor {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Terminal failure of the credential callback, raised once retries stop.
///
/// The original cause stays reachable through [`StdError::source`] and [`CallbackFailed::cause`];
/// when the endpoint answered with an HTTP error the raw response can be inspected through
/// [`CallbackFailed::response`].
#[derive(Debug, ThisError)]
#[error("Credential callback failed: {source}")]
pub struct CallbackFailed {
	#[source]
	source: FetchError,
	attempts: u32,
}
impl CallbackFailed {
	/// Wraps the last fetch error observed after `attempts` attempts.
	pub fn new(source: FetchError, attempts: u32) -> Self {
		Self { source, attempts }
	}

	/// Returns the error that stopped the retry loop.
	pub fn cause(&self) -> &FetchError {
		&self.source
	}

	/// Number of callback attempts that were made.
	pub fn attempts(&self) -> u32 {
		self.attempts
	}

	/// Returns the raw HTTP response of the final attempt, when one was received.
	pub fn response(&self) -> Option<&CallbackResponse> {
		self.source.response()
	}
}

/// Single-attempt failure while calling the credential callback.
#[derive(Debug, ThisError)]
pub enum FetchError {
	/// Network failure (DNS, TCP, TLS, timeout).
	#[error("Network error occurred while calling the credential callback: {source}")]
	Transport {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Endpoint answered with a non-2xx status.
	#[error(transparent)]
	Status(#[from] HttpStatusError),
	/// Endpoint answered with a body that is not a JSON object.
	#[error(transparent)]
	Format(#[from] FormatError),
}
impl FetchError {
	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Transport { source: Box::new(src) }
	}

	/// Returns `true` for 4xx responses, which are never retried.
	pub fn is_client_error(&self) -> bool {
		matches!(self, Self::Status(status) if status.is_client_error())
	}

	/// Returns the HTTP response carried by status errors.
	pub fn response(&self) -> Option<&CallbackResponse> {
		match self {
			Self::Status(status) => Some(&status.response),
			_ => None,
		}
	}
}

/// Non-2xx response returned by the credential callback.
#[derive(Debug)]
pub struct HttpStatusError {
	/// Full response, kept for diagnostics.
	pub response: CallbackResponse,
}
impl HttpStatusError {
	/// HTTP status code of the response.
	pub fn status(&self) -> u16 {
		self.response.status
	}

	/// Returns `true` when the status is in the 4xx range.
	pub fn is_client_error(&self) -> bool {
		(400..500).contains(&self.response.status)
	}

	fn class(&self) -> &'static str {
		match self.response.status {
			400..=499 => "Client",
			500..=599 => "Server",
			_ => "Unexpected Status",
		}
	}
}
impl Display for HttpStatusError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(
			f,
			"{} {} Error: {} for url: {}",
			self.response.status,
			self.class(),
			self.response.reason.as_deref().unwrap_or("Unknown"),
			self.response.url,
		)
	}
}
impl StdError for HttpStatusError {}

/// Credential callback body could not be interpreted as a credential set.
#[derive(Debug, ThisError)]
pub enum FormatError {
	/// Body is not valid JSON.
	#[error("Credential callback returned malformed JSON.")]
	Json(#[from] serde_json::Error),
	/// Body is valid JSON but not an object.
	#[error("Credential callback returned a JSON {kind}, expected an object.")]
	NotAnObject {
		/// JSON kind that was received instead.
		kind: &'static str,
	},
}
