//! Image reference helpers.

// self
use crate::registry::RegistryError;

/// Registry assumed for references without an explicit host.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Returns the registry host encoded in `image`, or `None` for Docker Hub references.
///
/// The first path component names a host when it contains a `.` or `:` or equals `localhost`,
/// matching how container engines split references like `ghcr.io/owner/app:tag` or
/// `localhost:5000/app`.
pub fn registry_host(image: &str) -> Result<Option<&str>, RegistryError> {
	let image = image.trim();

	if image.is_empty() || image.chars().any(char::is_whitespace) {
		return Err(RegistryError::InvalidImage { image: image.to_owned() });
	}

	let Some((first, rest)) = image.split_once('/') else {
		return Ok(None);
	};

	if first.is_empty() || rest.is_empty() {
		return Err(RegistryError::InvalidImage { image: image.to_owned() });
	}
	if first.contains(['.', ':']) || first == "localhost" {
		return Ok(Some(first));
	}

	Ok(None)
}

/// Like [`registry_host`], falling back to [`DEFAULT_REGISTRY`].
pub fn registry_host_or_default(image: &str) -> Result<&str, RegistryError> {
	Ok(registry_host(image)?.unwrap_or(DEFAULT_REGISTRY))
}
