//! Credentials for the Atlassian APIs.
//!
//! Both services accept HTTP Basic authentication with an account identity
//! (username or e-mail) and an app password or API token. Configuration values
//! may reference environment variables with `${env:NAME}` so secrets never
//! have to be written to disk.

use std::env;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::config::AtlasConfig;
use crate::error::AtlasError;

/// Fallback variables consulted for the identity when configuration has none.
pub const IDENTITY_ENV_FALLBACKS: &[&str] = &["ATLASSIAN_EMAIL"];

/// Fallback variables consulted for the secret when configuration has none.
pub const SECRET_ENV_FALLBACKS: &[&str] = &["ATLAS_API_TOKEN", "ATLASSIAN_TOKEN"];

const ENV_REFERENCE_OPEN: &str = "${env:";

/// An identity and secret pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    identity: String,
    secret: String,
}

impl Credentials {
    /// Builds credentials from trimmed, non-empty parts.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::MissingCredentials`] when either part is blank.
    pub fn new(identity: &str, secret: &str) -> Result<Self, AtlasError> {
        let identity_value = identity.trim();
        let secret_value = secret.trim();
        if identity_value.is_empty() || secret_value.is_empty() {
            return Err(AtlasError::MissingCredentials);
        }
        Ok(Self {
            identity: identity_value.to_owned(),
            secret: secret_value.to_owned(),
        })
    }

    /// Returns the account identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the `Authorization` header value for Basic authentication.
    #[must_use]
    pub fn basic_auth_header(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.identity, self.secret));
        format!("Basic {encoded}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials to the HTTP layer.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialProvider: Send + Sync {
    /// Returns the credentials to send with every request.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasError::MissingCredentials`] when nothing is configured
    /// and [`AtlasError::Configuration`] when an `${env:NAME}` reference
    /// points at an unset variable.
    fn credentials(&self) -> Result<Credentials, AtlasError>;
}

/// Credentials taken from `username`/`app_password` with environment
/// fallbacks.
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentials {
    username: Option<String>,
    app_password: Option<String>,
}

impl ConfigCredentials {
    /// Creates a provider from raw configuration values.
    #[must_use]
    pub const fn new(username: Option<String>, app_password: Option<String>) -> Self {
        Self {
            username,
            app_password,
        }
    }

    /// Creates a provider from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &AtlasConfig) -> Self {
        Self::new(config.username.clone(), config.app_password.clone())
    }
}

impl CredentialProvider for ConfigCredentials {
    fn credentials(&self) -> Result<Credentials, AtlasError> {
        let identity = resolve(self.username.as_deref(), IDENTITY_ENV_FALLBACKS)?;
        let secret = resolve(self.app_password.as_deref(), SECRET_ENV_FALLBACKS)?;
        match (identity, secret) {
            (Some(id), Some(token)) => Credentials::new(&id, &token),
            _ => Err(AtlasError::MissingCredentials),
        }
    }
}

fn resolve(configured: Option<&str>, fallbacks: &[&str]) -> Result<Option<String>, AtlasError> {
    if let Some(raw) = configured.map(str::trim).filter(|value| !value.is_empty()) {
        return expand_env_references(raw).map(Some);
    }
    Ok(fallbacks.iter().find_map(|name| non_empty_var(name)))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Replaces every `${env:NAME}` in `value` with the variable's contents.
///
/// Unterminated or empty references are kept literally.
///
/// # Errors
///
/// Returns [`AtlasError::Configuration`] when a referenced variable is unset
/// or empty.
pub fn expand_env_references(value: &str) -> Result<String, AtlasError> {
    let mut expanded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some((before, tail)) = rest.split_once(ENV_REFERENCE_OPEN) {
        expanded.push_str(before);
        match tail.split_once('}') {
            Some((name, remainder)) if !name.is_empty() => {
                let resolved = non_empty_var(name).ok_or_else(|| AtlasError::Configuration {
                    message: format!(
                        "environment variable {name} referenced in configuration is not set"
                    ),
                })?;
                expanded.push_str(&resolved);
                rest = remainder;
            }
            _ => {
                expanded.push_str(ENV_REFERENCE_OPEN);
                rest = tail;
            }
        }
    }
    expanded.push_str(rest);
    Ok(expanded)
}
