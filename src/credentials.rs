//! Device credentials handed over by the provisioning pipeline.

use std::fmt;

/// Rejection of a credential string that is not a decimal `u64`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("android id is not a decimal u64: {0:?}")]
    InvalidAndroidId(String),
    #[error("security token is not a decimal u64")]
    InvalidSecurityToken,
}

/// The `(androidId, securityToken)` pair produced by device provisioning.
///
/// Both values arrive as decimal strings of 64-bit unsigned integers and are
/// held verbatim; numeric validation happens when the login identity is
/// derived, so a receiver built with bad credentials fails at session start
/// rather than at construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    android_id: String,
    security_token: String,
}

impl Credentials {
    /// Wrap a credential pair as handed over by provisioning.
    #[must_use]
    pub fn new(android_id: impl Into<String>, security_token: impl Into<String>) -> Self {
        Self {
            android_id: android_id.into(),
            security_token: security_token.into(),
        }
    }

    /// The android id in its decimal string form.
    #[must_use]
    pub fn android_id(&self) -> &str {
        &self.android_id
    }

    /// The auth token sent verbatim in the login request.
    #[must_use]
    pub fn security_token(&self) -> &str {
        &self.security_token
    }

    /// Device identifier for the login request: `android-` followed by the
    /// android id re-encoded as lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidAndroidId`] if the android id is
    /// not a decimal `u64`.
    pub fn device_id(&self) -> Result<String, CredentialError> {
        let numeric: u64 = self
            .android_id
            .parse()
            .map_err(|_| CredentialError::InvalidAndroidId(self.android_id.clone()))?;
        Ok(format!("android-{numeric:x}"))
    }

    /// Validate both halves of the pair.
    ///
    /// # Errors
    ///
    /// Returns the first [`CredentialError`] encountered.
    pub fn validate(&self) -> Result<(), CredentialError> {
        self.device_id()?;
        self.security_token
            .parse::<u64>()
            .map(|_| ())
            .map_err(|_| CredentialError::InvalidSecurityToken)
    }
}

impl fmt::Debug for Credentials {
    // The security token must not leak into logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("android_id", &self.android_id)
            .field("security_token", &"<redacted>")
            .finish()
    }
}
