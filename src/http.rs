//! Transport primitives for credential callback requests.
//!
//! [`CallbackHttpClient`] is the crate's only dependency on an HTTP stack. The fetcher builds a
//! transport-agnostic [`CallbackRequest`], hands it to the client, and classifies the returned
//! [`CallbackResponse`] itself, so custom clients only need to move bytes. The default
//! [`ReqwestHttpClient`] wraps a blocking reqwest client.

#[cfg(feature = "reqwest")] use reqwest::{
	Method,
	blocking::{ClientBuilder, Response},
};
// self
#[cfg(feature = "reqwest")] use crate::error::ConfigError;
use crate::_prelude::*;

/// Blocking HTTP transport able to execute a single callback request.
///
/// Implementations must honor [`CallbackRequest::timeout`] and must not retry on their own;
/// retries, status classification, and body parsing belong to the fetcher.
pub trait CallbackHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Product token the transport would send as its own `User-Agent`.
	fn user_agent(&self) -> &str;

	/// Sends `request` and returns the response regardless of its status code.
	fn execute(&self, request: &CallbackRequest) -> Result<CallbackResponse, Self::TransportError>;
}

/// Ordered header list with case-insensitive replacement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackHeaders(Vec<(String, String)>);
impl CallbackHeaders {
	/// Inserts a header, replacing any existing entry with the same (case-insensitive) name.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		let value = value.into();

		match self.0.iter_mut().find(|(existing, _)| existing.eq_ignore_ascii_case(&name)) {
			Some(entry) => *entry = (name, value),
			None => self.0.push((name, value)),
		}
	}

	/// Looks up a header value by case-insensitive name.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.0
			.iter()
			.find(|(existing, _)| existing.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Iterates over `(name, value)` pairs in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
	}

	/// Number of headers.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no header is set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Fully resolved request handed to a [`CallbackHttpClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackRequest {
	/// Upper-case HTTP method.
	pub method: String,
	/// Callback endpoint.
	pub url: Url,
	/// Default headers merged with caller headers.
	pub headers: CallbackHeaders,
	/// Per-request timeout.
	pub timeout: Duration,
}

/// Raw response returned by the callback endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackResponse {
	/// HTTP status code.
	pub status: u16,
	/// Canonical reason phrase, when known.
	pub reason: Option<String>,
	/// Final URL the response came from.
	pub url: Url,
	/// Response headers.
	pub headers: Vec<(String, String)>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl CallbackResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decodes the body as JSON.
	pub fn json<T>(&self) -> serde_json::Result<T>
	where
		T: for<'de> Deserialize<'de>,
	{
		serde_json::from_slice(&self.body)
	}

	/// Returns the body as text, replacing invalid UTF-8 sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Errors raised by [`ReqwestHttpClient`].
#[cfg(feature = "reqwest")]
#[derive(Debug, ThisError)]
pub enum ReqwestTransportError {
	/// Method string was rejected by the HTTP stack.
	#[error("HTTP method `{0}` is invalid.")]
	InvalidMethod(String),
	/// Request failed inside reqwest.
	#[error(transparent)]
	Reqwest(#[from] ReqwestError),
}

/// Thin wrapper around the blocking [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// reqwest cannot report a configured `User-Agent` back, so the wrapper keeps the transport
/// token itself and applies it to the builder in [`ReqwestHttpClient::from_builder`]. The client
/// must not be built or used from inside an async runtime.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
	user_agent: String,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Transport token used when the caller does not configure one.
	pub const DEFAULT_USER_AGENT: &'static str = "reqwest";

	/// Wraps an existing reqwest [`ReqwestClient`] reporting [`Self::DEFAULT_USER_AGENT`].
	///
	/// Use [`ReqwestHttpClient::with_user_agent`] when `client` was built with its own
	/// `User-Agent`; every callback request overrides the client-level header.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, user_agent: Self::DEFAULT_USER_AGENT.into() }
	}

	/// Applies `user_agent` to `builder`, builds the client, and remembers the token.
	pub fn from_builder(
		builder: ClientBuilder,
		user_agent: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let user_agent = user_agent.into();
		let client = builder.user_agent(user_agent.as_str()).build()?;

		Ok(Self { client, user_agent })
	}

	/// Overrides the transport token reported to the fetcher.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Wrapped reqwest client.
	pub fn client(&self) -> &ReqwestClient {
		&self.client
	}

	fn convert(response: Response) -> Result<CallbackResponse, ReqwestTransportError> {
		let status = response.status();
		let url = response.url().clone();
		let headers = response
			.headers()
			.iter()
			.filter_map(|(name, value)| {
				value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
			})
			.collect();
		let body = response.bytes()?.to_vec();

		Ok(CallbackResponse {
			status: status.as_u16(),
			reason: status.canonical_reason().map(Into::into),
			url,
			headers,
			body,
		})
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestHttpClient {
	fn default() -> Self {
		Self::with_client(ReqwestClient::default())
	}
}
#[cfg(feature = "reqwest")]
impl CallbackHttpClient for ReqwestHttpClient {
	type TransportError = ReqwestTransportError;

	fn user_agent(&self) -> &str {
		&self.user_agent
	}

	fn execute(&self, request: &CallbackRequest) -> Result<CallbackResponse, Self::TransportError> {
		let method = Method::from_bytes(request.method.as_bytes())
			.map_err(|_| ReqwestTransportError::InvalidMethod(request.method.clone()))?;
		let mut builder = self.client.request(method, request.url.clone()).timeout(request.timeout);

		for (name, value) in request.headers.iter() {
			builder = builder.header(name, value);
		}

		Self::convert(builder.send()?)
	}
}
