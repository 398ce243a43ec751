//! Registry login mechanisms and the scoped login guard.
//!
//! [`RegistryLogin`] is the seam to whatever actually authenticates against a registry (the
//! bundled [`DockerCli`] shells out to `docker login`/`docker logout`). [`LoginGuard`] turns a
//! successful login into an owned scope: dropping the guard logs out, so teardown happens on
//! normal return, early return, `?` propagation, and unwinding alike. A guard only exists after
//! a successful login, which makes "logout iff login" structural.

pub mod docker;
pub mod image;

pub use docker::*;
pub use image::*;

// std
use std::{num::NonZeroU32, process::ExitStatus};
// self
use crate::{
	_prelude::*,
	credentials::CredentialSet,
	obs::{self, Stage, StageOutcome, StageSpan},
};

/// Status callback receiving human-readable progress lines.
pub type LogStatus<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Failures raised by a login mechanism.
#[derive(Debug, ThisError)]
pub enum RegistryError {
	/// The login program could not be started.
	#[error("Failed to launch `{program}`.")]
	Spawn {
		/// Program that failed to start.
		program: String,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// IO failed while exchanging data with the login program.
	#[error("I/O error occurred while running `{program} {action}`.")]
	Io {
		/// Program being run.
		program: String,
		/// Subcommand being run.
		action: &'static str,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// The login program exited unsuccessfully.
	#[error("`{program} {action}` failed ({status}): {stderr}")]
	CommandFailed {
		/// Program being run.
		program: String,
		/// Subcommand being run.
		action: &'static str,
		/// Exit status.
		status: ExitStatus,
		/// Trimmed standard error output.
		stderr: String,
	},
	/// The credential set lacks fields the mechanism requires.
	#[error("Credential set is unusable for registry login.")]
	InvalidCredentials {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The image reference cannot be parsed.
	#[error("Image reference `{image}` is invalid.")]
	InvalidImage {
		/// Rejected image reference.
		image: String,
	},
}

/// Authenticates against a registry for a given image.
///
/// Implementations own their login retry behavior; `auth_tries` is the caller's attempt budget.
/// Callers should go through [`LoginGuard::open`] rather than calling these methods directly so
/// logout is never skipped.
pub trait RegistryLogin
where
	Self: Send + Sync,
{
	/// Logs in to the registry hosting `image`.
	fn login(
		&self,
		image: &str,
		credentials: &CredentialSet,
		log_status: LogStatus<'_>,
		auth_tries: NonZeroU32,
	) -> Result<(), RegistryError>;

	/// Logs out of the registry hosting `image`.
	fn logout(&self, image: &str, log_status: LogStatus<'_>) -> Result<(), RegistryError>;
}

/// Active registry login; logs out exactly once when closed or dropped.
pub struct LoginGuard<'a, L>
where
	L: ?Sized + RegistryLogin,
{
	registry: &'a L,
	image: &'a str,
	log_status: LogStatus<'a>,
	active: bool,
}
impl<'a, L> LoginGuard<'a, L>
where
	L: ?Sized + RegistryLogin,
{
	/// Logs in and returns the guard; no guard (and so no logout) exists if login fails.
	pub fn open(
		registry: &'a L,
		image: &'a str,
		credentials: &CredentialSet,
		log_status: LogStatus<'a>,
		auth_tries: NonZeroU32,
	) -> Result<Self, RegistryError> {
		let _span = StageSpan::new(Stage::Login, image).entered();

		obs::record_stage_outcome(Stage::Login, StageOutcome::Attempt);

		let result = registry.login(image, credentials, log_status, auth_tries);

		obs::record_result(Stage::Login, &result);
		result?;

		Ok(Self { registry, image, log_status, active: true })
	}

	/// Image the guard is logged in for.
	pub fn image(&self) -> &str {
		self.image
	}

	/// Logs out now and reports the outcome.
	pub fn close(mut self) -> Result<(), RegistryError> {
		self.logout()
	}

	fn logout(&mut self) -> Result<(), RegistryError> {
		if !std::mem::replace(&mut self.active, false) {
			return Ok(());
		}

		let _span = StageSpan::new(Stage::Logout, self.image).entered();

		obs::record_stage_outcome(Stage::Logout, StageOutcome::Attempt);

		let result = self.registry.logout(self.image, self.log_status);

		obs::record_result(Stage::Logout, &result);

		result
	}
}
impl<L> Drop for LoginGuard<'_, L>
where
	L: ?Sized + RegistryLogin,
{
	fn drop(&mut self) {
		if let Err(err) = self.logout() {
			obs::record_unpropagated_failure(Stage::Logout, &err);
			(self.log_status)(&format!("Logout failed: {err}"));
		}
	}
}
impl<L> Debug for LoginGuard<'_, L>
where
	L: ?Sized + RegistryLogin,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginGuard")
			.field("image", &self.image)
			.field("active", &self.active)
			.finish()
	}
}

/// Status callback that discards every line.
pub fn discard_status(_: &str) {}
