//! Scoped credential sessions.
//!
//! A session walks `fetching → logged in → body → logged out`. Callback descriptors are resolved
//! through the [`CredentialFetcher`] first; if that fails the error is returned as
//! [`Error::CallbackFailed`] and the login mechanism is never touched. Once login succeeds the
//! caller's body runs inside a [`LoginGuard`], so logout follows on every exit path, including a
//! panicking body. The body's own result is returned untouched; logout failures are reported
//! through tracing and the status callback instead of replacing it.

// std
use std::num::NonZeroU32;
// self
#[cfg(feature = "reqwest")] use crate::{http::ReqwestHttpClient, registry::DockerCli};
use crate::{
	_prelude::*,
	credentials::{CredentialSet, RegistryCredentials},
	error::ConfigError,
	fetch::CredentialFetcher,
	http::CallbackHttpClient,
	registry::{LogStatus, LoginGuard, RegistryLogin, discard_status},
	retry::DEFAULT_ATTEMPTS,
};

/// Attempt budget used for both the callback and the login when none is given.
pub const DEFAULT_AUTH_TRIES: u32 = DEFAULT_ATTEMPTS;

/// Parameters of a single scoped session.
#[derive(Clone, Copy)]
pub struct SessionRequest<'a> {
	/// Image the protected operation works on.
	pub image: &'a str,
	/// Credential descriptor; `None` runs the body without logging in.
	pub credentials: Option<&'a RegistryCredentials>,
	/// Status callback receiving progress lines from the login mechanism.
	pub log_status: LogStatus<'a>,
	/// Attempt budget shared by the callback fetch and the login.
	pub auth_tries: u32,
}
impl<'a> SessionRequest<'a> {
	/// Creates an anonymous request for `image` with the default attempt budget.
	pub fn new(image: &'a str) -> Self {
		Self { image, credentials: None, log_status: &discard_status, auth_tries: DEFAULT_AUTH_TRIES }
	}

	/// Attaches a credential descriptor.
	pub fn with_credentials(mut self, credentials: &'a RegistryCredentials) -> Self {
		self.credentials = Some(credentials);

		self
	}

	/// Routes progress lines to `log_status`.
	pub fn with_log_status(mut self, log_status: LogStatus<'a>) -> Self {
		self.log_status = log_status;

		self
	}

	/// Overrides the attempt budget.
	pub fn with_auth_tries(mut self, auth_tries: u32) -> Self {
		self.auth_tries = auth_tries;

		self
	}
}
impl Debug for SessionRequest<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionRequest")
			.field("image", &self.image)
			.field("scheme", &self.credentials.map(RegistryCredentials::scheme))
			.field("auth_tries", &self.auth_tries)
			.finish()
	}
}

/// Combines a credential fetcher with a registry login mechanism.
pub struct CredentialManager<C, L>
where
	C: ?Sized + CallbackHttpClient,
	L: ?Sized + RegistryLogin,
{
	/// Fetcher used by callback descriptors.
	pub fetcher: CredentialFetcher<C>,
	/// Login mechanism wrapped around every body.
	pub registry: Arc<L>,
}
impl<C, L> CredentialManager<C, L>
where
	C: ?Sized + CallbackHttpClient,
	L: ?Sized + RegistryLogin,
{
	/// Creates a manager from its parts.
	pub fn with_parts(fetcher: CredentialFetcher<C>, registry: impl Into<Arc<L>>) -> Self {
		Self { fetcher, registry: registry.into() }
	}

	/// Runs `body` between login and logout for `request`.
	///
	/// `body` runs at most once. It does not run when the credentials cannot be fetched or the
	/// login fails; in that case the error is returned and nothing needs tearing down.
	pub fn with_session<R, F>(&self, request: SessionRequest<'_>, body: F) -> Result<R>
	where
		F: FnOnce() -> R,
	{
		let auth_tries = NonZeroU32::new(request.auth_tries)
			.ok_or(ConfigError::InvalidAttempts { attempts: request.auth_tries })?;
		let Some(credentials) = request.credentials else {
			return Ok(body());
		};

		credentials.open_scoped_session(
			&self.fetcher,
			self.registry.as_ref(),
			request.image,
			request.log_status,
			auth_tries,
			body,
		)
	}
}
#[cfg(feature = "reqwest")]
impl CredentialManager<ReqwestHttpClient, DockerCli> {
	/// Creates a manager backed by reqwest and the Docker CLI.
	pub fn new() -> Self {
		Self::with_parts(CredentialFetcher::new(), DockerCli::new())
	}
}
#[cfg(feature = "reqwest")]
impl Default for CredentialManager<ReqwestHttpClient, DockerCli> {
	fn default() -> Self {
		Self::new()
	}
}
impl<C, L> Clone for CredentialManager<C, L>
where
	C: ?Sized + CallbackHttpClient,
	L: ?Sized + RegistryLogin,
{
	fn clone(&self) -> Self {
		Self { fetcher: self.fetcher.clone(), registry: self.registry.clone() }
	}
}
impl<C, L> Debug for CredentialManager<C, L>
where
	C: ?Sized + CallbackHttpClient,
	L: ?Sized + RegistryLogin,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialManager").field("fetcher", &self.fetcher).finish_non_exhaustive()
	}
}

impl RegistryCredentials {
	/// Resolves the credential set for this descriptor and runs `body` inside a login scope.
	pub fn open_scoped_session<C, L, R, F>(
		&self,
		fetcher: &CredentialFetcher<C>,
		registry: &L,
		image: &str,
		log_status: LogStatus<'_>,
		auth_tries: NonZeroU32,
		body: F,
	) -> Result<R>
	where
		C: ?Sized + CallbackHttpClient,
		L: ?Sized + RegistryLogin,
		F: FnOnce() -> R,
	{
		match self {
			Self::Docker(set) => run_logged_in(registry, image, set, log_status, auth_tries, body),
			Self::Callback(spec) => {
				let set = fetcher.fetch_with_budget(spec, auth_tries)?;

				run_logged_in(registry, image, &set, log_status, auth_tries, body)
			},
		}
	}
}

/// Runs `body` for `image` using the default reqwest + Docker CLI stack.
#[cfg(feature = "reqwest")]
pub fn with_credential_session<R, F>(request: SessionRequest<'_>, body: F) -> Result<R>
where
	F: FnOnce() -> R,
{
	CredentialManager::new().with_session(request, body)
}

fn run_logged_in<L, R, F>(
	registry: &L,
	image: &str,
	credentials: &CredentialSet,
	log_status: LogStatus<'_>,
	auth_tries: NonZeroU32,
	body: F,
) -> Result<R>
where
	L: ?Sized + RegistryLogin,
	F: FnOnce() -> R,
{
	let guard = LoginGuard::open(registry, image, credentials, log_status, auth_tries)?;
	let output = body();

	// Drop reports logout failures without replacing the body's result.
	drop(guard);

	Ok(output)
}

#[cfg(test)]
mod tests {
	// std
	use std::panic::{self, AssertUnwindSafe};
	// self
	use super::*;
	use crate::_preludet::{
		RecordingRegistry, RegistryEvent, ScriptedHttpClient, ScriptedReply, instant_retry,
	};

	type TestManager = CredentialManager<ScriptedHttpClient, RecordingRegistry>;

	fn manager(replies: Vec<ScriptedReply>) -> (TestManager, Arc<RecordingRegistry>) {
		let registry = Arc::new(RecordingRegistry::default());
		let fetcher = CredentialFetcher::with_http_client(ScriptedHttpClient::new(replies))
			.with_retry(instant_retry(|err: &crate::error::FetchError| !err.is_client_error()));

		(CredentialManager::with_parts(fetcher, registry.clone()), registry)
	}

	fn callback() -> RegistryCredentials {
		RegistryCredentials::from_value(serde_json::json!({
			"type": "registry-credentials-callback",
			"version": 1,
			"url": "https://example.com/?name=erkki",
		}))
		.expect("Callback descriptor should parse.")
	}

	fn credentials_reply() -> ScriptedReply {
		ScriptedReply::json(200, serde_json::json!({ "username": "u", "password": "p" }))
	}

	#[test]
	fn body_runs_between_login_and_logout() {
		let (manager, registry) = manager(vec![credentials_reply()]);
		let credentials = callback();
		let observer = registry.clone();
		let output = manager
			.with_session(SessionRequest::new("owner/image").with_credentials(&credentials), || {
				observer.record_body();

				42
			})
			.expect("Session should succeed.");

		assert_eq!(output, 42);
		assert_eq!(registry.events(), [
			RegistryEvent::Login("owner/image".into()),
			RegistryEvent::Body,
			RegistryEvent::Logout("owner/image".into()),
		]);
	}

	#[test]
	fn failing_body_still_logs_out() {
		let (manager, registry) = manager(vec![credentials_reply()]);
		let credentials = callback();
		let output = manager
			.with_session(SessionRequest::new("img").with_credentials(&credentials), || {
				Err::<(), _>("body failed")
			})
			.expect("Session setup should succeed.");

		assert_eq!(output, Err("body failed"));
		assert_eq!(registry.logins(), 1);
		assert_eq!(registry.logouts(), 1);
	}

	#[test]
	fn panicking_body_still_logs_out() {
		let (manager, registry) = manager(vec![credentials_reply()]);
		let credentials = callback();
		let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
			manager.with_session::<(), _>(
				SessionRequest::new("img").with_credentials(&credentials),
				|| panic!("body exploded"),
			)
		}));

		assert!(outcome.is_err());
		assert_eq!(registry.logins(), 1);
		assert_eq!(registry.logouts(), 1);
	}

	#[test]
	fn fetch_failure_never_touches_registry() {
		let (manager, registry) = manager(vec![ScriptedReply::status(403)]);
		let credentials = callback();
		let mut ran = false;
		let err = manager
			.with_session(SessionRequest::new("img").with_credentials(&credentials), || ran = true)
			.expect_err("403 should fail the session.");

		assert!(matches!(err, Error::CallbackFailed(_)));
		assert!(!ran);
		assert!(registry.events().is_empty());
	}

	#[test]
	fn inline_credentials_skip_fetching() {
		let (manager, registry) = manager(Vec::new());
		let credentials = RegistryCredentials::from_value(serde_json::json!({
			"type": "docker",
			"version": 1,
			"username": "u",
			"password": "p",
		}))
		.expect("Docker descriptor should parse.");

		manager
			.with_session(SessionRequest::new("img").with_credentials(&credentials), || ())
			.expect("Session should succeed.");

		assert_eq!(registry.logins(), 1);
		assert_eq!(registry.logouts(), 1);
		assert!(manager.fetcher.http_client.requests().is_empty());
	}

	#[test]
	fn anonymous_sessions_run_without_login() {
		let (manager, registry) = manager(Vec::new());
		let output =
			manager.with_session(SessionRequest::new("img"), || "ok").expect("Body should run.");

		assert_eq!(output, "ok");
		assert!(registry.events().is_empty());
	}

	#[test]
	fn failed_login_skips_body_and_logout() {
		let registry = Arc::new(RecordingRegistry::failing_login());
		let fetcher = CredentialFetcher::with_http_client(ScriptedHttpClient::default());
		let manager: TestManager = CredentialManager::with_parts(fetcher, registry.clone());
		let credentials = RegistryCredentials::Docker(CredentialSet::default());
		let mut ran = false;
		let err = manager
			.with_session(SessionRequest::new("img").with_credentials(&credentials), || ran = true)
			.expect_err("Login failure should surface.");

		assert!(matches!(err, Error::Registry(_)));
		assert!(!ran);
		assert_eq!(registry.logouts(), 0);
	}

	#[test]
	fn zero_auth_tries_is_rejected_before_any_work() {
		let (manager, registry) = manager(vec![credentials_reply()]);
		let credentials = callback();
		let err = manager
			.with_session(
				SessionRequest::new("img").with_credentials(&credentials).with_auth_tries(0),
				|| (),
			)
			.expect_err("Zero budget is invalid.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidAttempts { attempts: 0 })));
		assert!(registry.events().is_empty());
		assert!(manager.fetcher.http_client.requests().is_empty());
	}
}
