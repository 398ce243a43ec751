//! Scoped container registry credentials: fetch short-lived secrets from a callback endpoint with
//! jittered retries, log in, run the protected operation, and always log out.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod credentials;
pub mod error;
pub mod fetch;
pub mod http;
pub mod obs;
pub mod registry;
pub mod retry;
pub mod session;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and test doubles; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::{collections::VecDeque, io, num::NonZeroU32};
	// crates.io
	use parking_lot::Mutex;
	// self
	use crate::{
		credentials::CredentialSet,
		http::{CallbackHttpClient, CallbackRequest, CallbackResponse},
		registry::{LogStatus, RegistryError, RegistryLogin},
		retry::RetryPolicy,
	};

	/// Builds a retry policy with the default budget that never sleeps.
	pub fn instant_retry<E, F>(retryable: F) -> RetryPolicy<E>
	where
		E: 'static,
		F: 'static + Send + Sync + Fn(&E) -> bool,
	{
		RetryPolicy::with_budget(RetryPolicy::<E>::default_budget())
			.with_base_delay(Duration::ZERO)
			.with_jitter(|| Duration::ZERO)
			.with_retryable(retryable)
	}

	/// Canned outcome returned by [`ScriptedHttpClient`].
	#[derive(Clone, Debug)]
	pub enum ScriptedReply {
		/// Respond with `status` and `body`.
		Response {
			/// HTTP status code.
			status: u16,
			/// Raw body bytes.
			body: Vec<u8>,
		},
		/// Fail with a transport timeout.
		Timeout,
	}
	impl ScriptedReply {
		/// Empty-bodied response with `status`.
		pub fn status(status: u16) -> Self {
			Self::Response { status, body: Vec::new() }
		}

		/// Response with `status` and a JSON body.
		pub fn json(status: u16, body: JsonValue) -> Self {
			Self::Response { status, body: body.to_string().into_bytes() }
		}

		/// Transport timeout.
		pub fn timeout() -> Self {
			Self::Timeout
		}
	}

	/// Transport double that replays scripted replies and records every request.
	///
	/// Once the script is exhausted every call fails with a transport error.
	#[derive(Debug, Default)]
	pub struct ScriptedHttpClient {
		replies: Mutex<VecDeque<ScriptedReply>>,
		requests: Mutex<Vec<CallbackRequest>>,
	}
	impl ScriptedHttpClient {
		/// Product token reported as the transport's `User-Agent`.
		pub const USER_AGENT: &'static str = "scripted/1.0";

		/// Creates a client replaying `replies` in order.
		pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
			Self { replies: Mutex::new(replies.into_iter().collect()), requests: Mutex::default() }
		}

		/// Requests received so far.
		pub fn requests(&self) -> Vec<CallbackRequest> {
			self.requests.lock().clone()
		}
	}
	impl CallbackHttpClient for ScriptedHttpClient {
		type TransportError = io::Error;

		fn user_agent(&self) -> &str {
			Self::USER_AGENT
		}

		fn execute(&self, request: &CallbackRequest) -> Result<CallbackResponse, io::Error> {
			self.requests.lock().push(request.clone());

			match self.replies.lock().pop_front() {
				Some(ScriptedReply::Response { status, body }) => Ok(CallbackResponse {
					status,
					reason: None,
					url: request.url.clone(),
					headers: Vec::new(),
					body,
				}),
				Some(ScriptedReply::Timeout) =>
					Err(io::Error::new(io::ErrorKind::TimedOut, "scripted timeout")),
				None => Err(io::Error::other("script exhausted")),
			}
		}
	}

	/// Call observed by [`RecordingRegistry`].
	#[derive(Clone, Debug, PartialEq, Eq)]
	pub enum RegistryEvent {
		/// Login for the image.
		Login(String),
		/// Protected body ran.
		Body,
		/// Logout for the image.
		Logout(String),
	}

	/// Login mechanism double that records calls and optionally fails them.
	#[derive(Debug, Default)]
	pub struct RecordingRegistry {
		events: Mutex<Vec<RegistryEvent>>,
		fail_login: bool,
		fail_logout: bool,
	}
	impl RecordingRegistry {
		/// Registry whose logins always fail.
		pub fn failing_login() -> Self {
			Self { fail_login: true, ..Default::default() }
		}

		/// Registry whose logouts always fail.
		pub fn failing_logout() -> Self {
			Self { fail_logout: true, ..Default::default() }
		}

		/// Marks that the protected body ran.
		pub fn record_body(&self) {
			self.events.lock().push(RegistryEvent::Body);
		}

		/// Every recorded event, in order.
		pub fn events(&self) -> Vec<RegistryEvent> {
			self.events.lock().clone()
		}

		/// Number of login calls.
		pub fn logins(&self) -> usize {
			self.count(|event| matches!(event, RegistryEvent::Login(_)))
		}

		/// Number of logout calls.
		pub fn logouts(&self) -> usize {
			self.count(|event| matches!(event, RegistryEvent::Logout(_)))
		}

		fn count(&self, filter: impl Fn(&RegistryEvent) -> bool) -> usize {
			self.events.lock().iter().filter(|event| filter(event)).count()
		}

		fn outcome(&self, fail: bool, action: &str) -> Result<(), RegistryError> {
			if fail {
				Err(RegistryError::Spawn {
					program: "recording".into(),
					source: io::Error::other(format!("{action} rejected")),
				})
			} else {
				Ok(())
			}
		}
	}
	impl RegistryLogin for RecordingRegistry {
		fn login(
			&self,
			image: &str,
			_: &CredentialSet,
			_: LogStatus<'_>,
			_: NonZeroU32,
		) -> Result<(), RegistryError> {
			self.events.lock().push(RegistryEvent::Login(image.into()));

			self.outcome(self.fail_login, "login")
		}

		fn logout(&self, image: &str, _: LogStatus<'_>) -> Result<(), RegistryError> {
			self.events.lock().push(RegistryEvent::Logout(image.into()));

			self.outcome(self.fail_logout, "logout")
		}
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		sync::Arc,
		time::Duration,
	};

	#[cfg(feature = "reqwest")]
	pub use reqwest::{Error as ReqwestError, blocking::Client as ReqwestClient};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::{Map as JsonMap, Value as JsonValue};
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
