// std
use std::{num::NonZeroU32, sync::Arc, time::Duration};
// crates.io
use httpmock::prelude::*;
use parking_lot::Mutex;
use serde_json::json;
// self
use regcred::{
	credentials::{CredentialSet, RegistryCredentials},
	error::{Error, FetchError},
	fetch::CredentialFetcher,
	http::ReqwestHttpClient,
	registry::{LogStatus, RegistryError, RegistryLogin},
	retry::RetryPolicy,
	session::{CredentialManager, SessionRequest},
};

#[derive(Debug, Default)]
struct Recorder {
	calls: Mutex<Vec<String>>,
}
impl Recorder {
	fn push(&self, call: String) {
		self.calls.lock().push(call);
	}

	fn calls(&self) -> Vec<String> {
		self.calls.lock().clone()
	}
}
impl RegistryLogin for Recorder {
	fn login(
		&self,
		image: &str,
		credentials: &CredentialSet,
		log_status: LogStatus<'_>,
		_: NonZeroU32,
	) -> Result<(), RegistryError> {
		let username = credentials.get("username").and_then(|value| value.as_str()).unwrap_or("");

		log_status("logging in");
		self.push(format!("login {image} {username}"));

		Ok(())
	}

	fn logout(&self, image: &str, _: LogStatus<'_>) -> Result<(), RegistryError> {
		self.push(format!("logout {image}"));

		Ok(())
	}
}

fn manager(recorder: &Arc<Recorder>) -> CredentialManager<ReqwestHttpClient, Recorder> {
	let retry = RetryPolicy::<FetchError>::callback(5)
		.expect("Callback budget should be valid.")
		.with_base_delay(Duration::ZERO)
		.with_jitter(|| Duration::ZERO);

	CredentialManager::with_parts(CredentialFetcher::new().with_retry(retry), recorder.clone())
}

fn callback(server: &MockServer) -> RegistryCredentials {
	serde_json::from_value(json!({
		"type": "registry-credentials-callback",
		"version": 1,
		"url": server.url("/creds"),
	}))
	.expect("Callback descriptor should deserialize.")
}

#[test]
fn fetched_credentials_scope_the_body() {
	let server = MockServer::start();
	let mock = server.mock(|when, then| {
		when.method(POST).path("/creds");
		then.status(200).json_body(json!({ "username": "robot", "password": "hunter2" }));
	});
	let recorder = Arc::new(Recorder::default());
	let credentials = callback(&server);
	let lines = Mutex::new(Vec::<String>::new());
	let log_status = |line: &str| lines.lock().push(line.to_owned());
	let observed = recorder.clone();
	let output = manager(&recorder)
		.with_session(
			SessionRequest::new("ghcr.io/owner/app")
				.with_credentials(&credentials)
				.with_log_status(&log_status),
			|| {
				observed.push("body".into());

				"pulled"
			},
		)
		.expect("Session should succeed.");

	mock.assert_calls(1);

	assert_eq!(output, "pulled");
	assert_eq!(recorder.calls(), [
		"login ghcr.io/owner/app robot",
		"body",
		"logout ghcr.io/owner/app"
	]);
	assert_eq!(lines.lock().as_slice(), ["logging in"]);
}

#[test]
fn rejected_callback_skips_login_and_body() {
	let server = MockServer::start();
	let mock = server.mock(|when, then| {
		when.method(POST).path("/creds");
		then.status(403);
	});
	let recorder = Arc::new(Recorder::default());
	let credentials = callback(&server);
	let mut ran = false;
	let err = manager(&recorder)
		.with_session(SessionRequest::new("owner/app").with_credentials(&credentials), || {
			ran = true
		})
		.expect_err("403 should fail the session.");

	mock.assert_calls(1);

	assert!(matches!(err, Error::CallbackFailed(_)));
	assert_eq!(err.callback_response().map(|response| response.status), Some(403));
	assert!(!ran);
	assert!(recorder.calls().is_empty());
}

#[test]
fn transient_failures_use_the_session_budget() {
	let server = MockServer::start();
	let mock = server.mock(|when, then| {
		when.method(POST).path("/creds");
		then.status(503);
	});
	let recorder = Arc::new(Recorder::default());
	let credentials = callback(&server);
	let err = manager(&recorder)
		.with_session(
			SessionRequest::new("owner/app").with_credentials(&credentials).with_auth_tries(3),
			|| (),
		)
		.expect_err("503 should exhaust the budget.");

	mock.assert_calls(3);

	assert!(matches!(err, Error::CallbackFailed(ref failed) if failed.attempts() == 3));
	assert!(recorder.calls().is_empty());
}
