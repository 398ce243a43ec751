//! `docker login`/`docker logout` backed login mechanism.

// std
use std::{
	io::{ErrorKind, Write},
	num::NonZeroU32,
	process::{Command, Output, Stdio},
};
// self
use crate::{
	_prelude::*,
	credentials::{CredentialSet, Secret},
	obs::{self, Stage},
	registry::{DEFAULT_REGISTRY, LogStatus, RegistryError, RegistryLogin, registry_host},
	retry::RetryPolicy,
};

/// Username/password pair expected by `docker login`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DockerCredentials {
	/// Registry username.
	pub username: String,
	/// Registry password or token.
	pub password: Secret,
}
impl DockerCredentials {
	/// Extracts `username` and `password` from a credential set; other fields are ignored.
	pub fn from_set(set: &CredentialSet) -> Result<Self, RegistryError> {
		serde_path_to_error::deserialize(JsonValue::Object(set.as_map().clone()))
			.map_err(|source| RegistryError::InvalidCredentials { source })
	}
}

/// Login mechanism that runs the Docker CLI.
///
/// The password is written to `--password-stdin` so it never shows up in process listings.
/// Logins are retried with the login policy (every failure retried, 32s delay cap); logouts run
/// once.
#[derive(Clone, Debug)]
pub struct DockerCli {
	program: String,
	login_retry: RetryPolicy<RegistryError>,
}
impl DockerCli {
	/// Program used when none is configured.
	pub const DEFAULT_PROGRAM: &'static str = "docker";

	/// Creates a mechanism that runs `docker` from `PATH`.
	pub fn new() -> Self {
		Self {
			program: Self::DEFAULT_PROGRAM.into(),
			login_retry: RetryPolicy::with_budget(RetryPolicy::<RegistryError>::default_budget())
				.with_max_delay(RetryPolicy::<RegistryError>::LEGACY_MAX_DELAY),
		}
	}

	/// Overrides the program (for example a `podman` binary or an absolute path).
	pub fn with_program(mut self, program: impl Into<String>) -> Self {
		self.program = program.into();

		self
	}

	/// Replaces the login retry policy template; its attempt budget is overridden per login.
	pub fn with_login_retry(mut self, policy: RetryPolicy<RegistryError>) -> Self {
		self.login_retry = policy;

		self
	}

	/// Program being run.
	pub fn program(&self) -> &str {
		&self.program
	}

	/// Builds the `login` command; the password must be written to its stdin.
	pub fn login_command(&self, host: Option<&str>, username: &str) -> Command {
		let mut command = Command::new(&self.program);

		command.args(["login", "--username", username, "--password-stdin"]);
		command.args(host);

		command
	}

	/// Builds the `logout` command.
	pub fn logout_command(&self, host: Option<&str>) -> Command {
		let mut command = Command::new(&self.program);

		command.arg("logout");
		command.args(host);

		command
	}

	fn run_login(
		&self,
		host: Option<&str>,
		credentials: &DockerCredentials,
	) -> Result<(), RegistryError> {
		const ACTION: &str = "login";

		let mut child = self
			.login_command(host, &credentials.username)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(|source| RegistryError::Spawn { program: self.program.clone(), source })?;
		let written = match child.stdin.take() {
			Some(mut stdin) => stdin.write_all(credentials.password.expose().as_bytes()),
			None => Ok(()),
		};
		let output = child.wait_with_output().map_err(|source| self.io_error(ACTION, source))?;

		self.check(ACTION, output)?;

		match written {
			// The program exited successfully without reading the password.
			Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other.map_err(|source| self.io_error(ACTION, source)),
		}
	}

	fn run_logout(&self, host: Option<&str>) -> Result<(), RegistryError> {
		const ACTION: &str = "logout";

		let output = self
			.logout_command(host)
			.stdin(Stdio::null())
			.output()
			.map_err(|source| RegistryError::Spawn { program: self.program.clone(), source })?;

		self.check(ACTION, output)
	}

	fn check(&self, action: &'static str, output: Output) -> Result<(), RegistryError> {
		if output.status.success() {
			return Ok(());
		}

		Err(RegistryError::CommandFailed {
			program: self.program.clone(),
			action,
			status: output.status,
			stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
		})
	}

	fn io_error(&self, action: &'static str, source: std::io::Error) -> RegistryError {
		RegistryError::Io { program: self.program.clone(), action, source }
	}
}
impl Default for DockerCli {
	fn default() -> Self {
		Self::new()
	}
}
impl RegistryLogin for DockerCli {
	fn login(
		&self,
		image: &str,
		credentials: &CredentialSet,
		log_status: LogStatus<'_>,
		auth_tries: NonZeroU32,
	) -> Result<(), RegistryError> {
		let credentials = DockerCredentials::from_set(credentials)?;
		let host = registry_host(image)?;
		let target = host.unwrap_or(DEFAULT_REGISTRY);
		let policy = self.login_retry.clone().with_max_attempts(auth_tries);

		log_status(&format!("Logging in to {target} as {}.", credentials.username));
		policy.run_with(
			|_| self.run_login(host, &credentials),
			|event, err| {
				obs::record_retry(Stage::Login, event, err);
				log_status(&format!(
					"Login to {target} failed (attempt {} of {}): {err}; retrying in {:.1}s.",
					event.attempt + 1,
					event.max_attempts,
					event.delay.as_secs_f64(),
				));
			},
		)?;
		log_status(&format!("Logged in to {target}."));

		Ok(())
	}

	fn logout(&self, image: &str, log_status: LogStatus<'_>) -> Result<(), RegistryError> {
		let host = registry_host(image)?;

		self.run_logout(host)?;
		log_status(&format!("Logged out of {}.", host.unwrap_or(DEFAULT_REGISTRY)));

		Ok(())
	}
}
