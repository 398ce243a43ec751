//! Credential callback client with bounded, jittered retries.
//!
//! [`CredentialFetcher::fetch`] issues one request per attempt, treats any non-2xx status or
//! non-object body as a failed attempt, and retries with `min(2^n + jitter, 16)` second delays.
//! A 4xx response is a definitive rejection: it ends the loop immediately regardless of the
//! remaining budget. Every failure surfaces as [`CallbackFailed`], which keeps the last cause and
//! the raw response for diagnostics. Credentials are never cached; each call is a fresh round
//! trip.

// std
use std::{cell::Cell, num::NonZeroU32};
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	credentials::{CredentialSet, RequestSpec},
	error::{CallbackFailed, ConfigError, FetchError, HttpStatusError},
	http::{CallbackHeaders, CallbackHttpClient, CallbackRequest},
	obs::{self, Stage, StageOutcome, StageSpan},
	retry::RetryPolicy,
};

/// Product identity appended to the transport's `User-Agent` token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	/// Product name.
	pub product: String,
	/// Product version.
	pub version: String,
}
impl Identity {
	/// Creates an identity for `product/version`.
	pub fn new(product: impl Into<String>, version: impl Into<String>) -> Self {
		Self { product: product.into(), version: version.into() }
	}

	/// Renders the `product/version` token.
	pub fn token(&self) -> String {
		format!("{}/{}", self.product, self.version)
	}
}
impl Default for Identity {
	fn default() -> Self {
		Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
	}
}

/// Static fetcher configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
	/// Timeout applied to every individual HTTP attempt.
	pub timeout: Duration,
	/// Identity reported in the `User-Agent` header.
	pub identity: Identity,
}
impl FetcherConfig {
	/// Default per-attempt timeout.
	pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
}
impl Default for FetcherConfig {
	fn default() -> Self {
		Self { timeout: Self::DEFAULT_TIMEOUT, identity: Identity::default() }
	}
}

impl RetryPolicy<FetchError> {
	/// Callback retry policy: `max_attempts` total attempts, 16s cap, 4xx responses never retried.
	pub fn callback(max_attempts: u32) -> Result<Self, ConfigError> {
		Ok(Self::new(max_attempts)?.with_retryable(is_transient))
	}
}

fn is_transient(err: &FetchError) -> bool {
	!err.is_client_error()
}

/// Fetches credential sets from callback endpoints.
pub struct CredentialFetcher<C>
where
	C: ?Sized + CallbackHttpClient,
{
	/// HTTP client used for every callback request.
	pub http_client: Arc<C>,
	/// Timeout and identity settings.
	pub config: FetcherConfig,
	retry: RetryPolicy<FetchError>,
}
impl<C> CredentialFetcher<C>
where
	C: ?Sized + CallbackHttpClient,
{
	/// Creates a fetcher around the provided transport.
	pub fn with_http_client(http_client: impl Into<Arc<C>>) -> Self {
		Self {
			http_client: http_client.into(),
			config: FetcherConfig::default(),
			retry: RetryPolicy::with_budget(RetryPolicy::<FetchError>::default_budget())
				.with_retryable(is_transient),
		}
	}

	/// Replaces the configuration.
	pub fn with_config(mut self, config: FetcherConfig) -> Self {
		self.config = config;

		self
	}

	/// Replaces the retry policy template; its attempt budget is overridden per call.
	pub fn with_retry(mut self, retry: RetryPolicy<FetchError>) -> Self {
		self.retry = retry;

		self
	}

	/// Retry policy template.
	pub fn retry(&self) -> &RetryPolicy<FetchError> {
		&self.retry
	}

	/// Fetches a credential set, making at most `max_attempts` attempts.
	pub fn fetch(&self, spec: &RequestSpec, max_attempts: u32) -> Result<CredentialSet> {
		let budget = NonZeroU32::new(max_attempts)
			.ok_or(ConfigError::InvalidAttempts { attempts: max_attempts })?;

		Ok(self.fetch_with_budget(spec, budget)?)
	}

	pub(crate) fn fetch_with_budget(
		&self,
		spec: &RequestSpec,
		max_attempts: NonZeroU32,
	) -> Result<CredentialSet, CallbackFailed> {
		let _span = StageSpan::new(Stage::Fetch, spec.url().as_str()).entered();
		let policy = self.retry.clone().with_max_attempts(max_attempts);
		let request = self.build_request(spec);
		let attempts = Cell::new(0);

		obs::record_stage_outcome(Stage::Fetch, StageOutcome::Attempt);

		let result = policy
			.run_with(
				|_| {
					attempts.set(attempts.get() + 1);

					self.fetch_once(&request)
				},
				|event, err| obs::record_retry(Stage::Fetch, event, err),
			)
			.map_err(|err| CallbackFailed::new(err, attempts.get()));

		obs::record_result(Stage::Fetch, &result);

		result
	}

	/// Merges caller headers over the defaults and resolves the outgoing request.
	pub fn build_request(&self, spec: &RequestSpec) -> CallbackRequest {
		let mut headers = CallbackHeaders::default();

		headers.insert("User-Agent", self.user_agent());
		headers.insert("Accept", "*/*");

		for (name, value) in spec.headers() {
			headers.insert(name.as_str(), value.as_str());
		}

		CallbackRequest {
			method: spec.method().to_owned(),
			url: spec.url().clone(),
			headers,
			timeout: self.config.timeout,
		}
	}

	/// Transport token followed by the product identity token.
	pub fn user_agent(&self) -> String {
		let product = self.config.identity.token();

		match self.http_client.user_agent().trim() {
			"" => product,
			transport => format!("{transport} {product}"),
		}
	}

	fn fetch_once(&self, request: &CallbackRequest) -> Result<CredentialSet, FetchError> {
		let response = self.http_client.execute(request).map_err(FetchError::transport)?;

		if !response.is_success() {
			return Err(HttpStatusError { response }.into());
		}

		Ok(CredentialSet::from_slice(&response.body)?)
	}
}
#[cfg(feature = "reqwest")]
impl CredentialFetcher<ReqwestHttpClient> {
	/// Creates a fetcher backed by a default blocking reqwest client.
	pub fn new() -> Self {
		Self::with_http_client(ReqwestHttpClient::default())
	}
}
#[cfg(feature = "reqwest")]
impl Default for CredentialFetcher<ReqwestHttpClient> {
	fn default() -> Self {
		Self::new()
	}
}
impl<C> Clone for CredentialFetcher<C>
where
	C: ?Sized + CallbackHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			config: self.config.clone(),
			retry: self.retry.clone(),
		}
	}
}
impl<C> Debug for CredentialFetcher<C>
where
	C: ?Sized + CallbackHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialFetcher")
			.field("config", &self.config)
			.field("retry", &self.retry)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{ScriptedHttpClient, ScriptedReply, instant_retry},
		error::FormatError,
	};

	fn spec() -> RequestSpec {
		RequestSpec::new(Url::parse("https://example.com/?name=erkki").expect("URL should parse."))
	}

	fn fetcher(client: Arc<ScriptedHttpClient>) -> CredentialFetcher<ScriptedHttpClient> {
		CredentialFetcher::with_http_client(client).with_retry(instant_retry(is_transient))
	}

	#[test]
	fn recovers_from_mixed_failures_on_fourth_attempt() {
		let client = Arc::new(ScriptedHttpClient::new([
			ScriptedReply::status(500),
			ScriptedReply::timeout(),
			ScriptedReply::status(200),
			ScriptedReply::json(200, serde_json::json!({ "username": "u", "password": "p" })),
		]));
		let set = fetcher(client.clone())
			.fetch(&spec(), 5)
			.expect("Fourth attempt should return credentials.");

		assert_eq!(client.requests().len(), 4);
		assert_eq!(set.get("username"), Some(&serde_json::json!("u")));
	}

	#[test]
	fn non_json_success_is_a_format_error() {
		let client = Arc::new(ScriptedHttpClient::new([ScriptedReply::status(200)]));
		let err = fetcher(client)
			.fetch_with_budget(&spec(), NonZeroU32::MIN)
			.expect_err("Empty body should be rejected.");

		assert!(matches!(err.cause(), FetchError::Format(FormatError::Json(_))));
		assert_eq!(err.attempts(), 1);
	}

	#[test]
	fn client_errors_stop_after_one_attempt() {
		let client = Arc::new(ScriptedHttpClient::new([
			ScriptedReply::status(404),
			ScriptedReply::json(200, serde_json::json!({})),
		]));
		let err = fetcher(client.clone())
			.fetch(&spec(), 5)
			.expect_err("404 should not be retried.");

		assert_eq!(client.requests().len(), 1);
		assert_eq!(err.callback_response().map(|response| response.status), Some(404));
	}

	#[test]
	fn zero_budget_is_a_config_error() {
		let client = Arc::new(ScriptedHttpClient::default());
		let err = fetcher(client.clone()).fetch(&spec(), 0).expect_err("Zero budget is invalid.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidAttempts { attempts: 0 })));
		assert!(client.requests().is_empty());
	}

	#[test]
	fn user_agent_keeps_transport_token_and_caller_headers_win() {
		let client = Arc::new(ScriptedHttpClient::default());
		let fetcher = fetcher(client).with_config(FetcherConfig {
			timeout: Duration::from_secs(3),
			identity: Identity::new("regcred", "9.9.9"),
		});
		let request = fetcher.build_request(&spec().with_header("accept", "application/json"));

		assert_eq!(request.method, "POST");
		assert_eq!(request.timeout, Duration::from_secs(3));
		assert_eq!(request.headers.get("user-agent"), Some("scripted/1.0 regcred/9.9.9"));
		assert_eq!(request.headers.get("Accept"), Some("application/json"));
	}

	#[test]
	fn default_identity_uses_package_metadata() {
		let identity = Identity::default();

		assert_eq!(identity.token(), concat!("regcred/", env!("CARGO_PKG_VERSION")));
		assert_eq!(FetcherConfig::default().timeout, Duration::from_secs(15));
	}

	#[test]
	fn callback_policy_skips_client_errors() {
		let policy = RetryPolicy::<FetchError>::callback(3).expect("Budget should be valid.");
		let transport = FetchError::transport(std::io::Error::other("reset"));

		assert_eq!(policy.max_attempts(), 3);
		assert_eq!(policy.max_delay, Duration::from_secs(16));
		assert!(policy.is_retryable(&transport));
	}
}
