//! Secret values and extraction from Kubernetes Secret data
//!
//! A [`Secret`] can only be read through [`Secret::reveal`]; formatting it
//! never shows the value. The Grafana admin password travels through the
//! program as a `Secret<String>` and is revealed exactly once, when the chart
//! values are resolved for submission.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{CoreError, Result};

/// Marker shown in place of secret material
pub const REDACTED: &str = "[secret]";

/// Key of the admin password inside a Secret's data
pub const ADMIN_PASSWORD_KEY: &str = "adminpass";

/// A value that must not be displayed
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Read the secret value
    pub fn reveal(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Decode the admin password out of a Secret's data
///
/// `secrets` maps keys to base64-encoded values, as stored in a Kubernetes
/// Secret's `data` field.
pub fn extract_admin_password(secrets: &BTreeMap<String, String>) -> Result<Secret<String>> {
    decode_secret_value(secrets, ADMIN_PASSWORD_KEY)
}

/// Decode a single base64 UTF-8 entry out of Secret data
pub fn decode_secret_value(secrets: &BTreeMap<String, String>, key: &str) -> Result<Secret<String>> {
    let encoded = secrets.get(key).ok_or_else(|| CoreError::MissingSecretKey {
        key: key.to_string(),
    })?;

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|source| CoreError::SecretEncoding {
            key: key.to_string(),
            source,
        })?;

    let text = String::from_utf8(bytes).map_err(|_| CoreError::SecretUtf8 {
        key: key.to_string(),
    })?;

    Ok(Secret::new(text))
}
