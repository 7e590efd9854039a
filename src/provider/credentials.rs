//! Provider credentials loaded from the environment.

use std::fmt;

use super::{ProviderError, ProviderKind};

/// A username/password pair for one provider.
///
/// The password never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials from explicit values.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads the provider's credential pair from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] naming the first variable that
    /// is unset or blank.
    pub fn from_env(kind: ProviderKind) -> Result<Self, ProviderError> {
        let (user_var, pass_var) = kind.credential_vars();
        let username = env_var_non_empty(user_var)
            .ok_or_else(|| ProviderError::missing_credential(kind, user_var))?;
        let password = env_var_non_empty(pass_var)
            .ok_or_else(|| ProviderError::missing_credential(kind, pass_var))?;
        Ok(Self { username, password })
    }

    /// Account name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Account secret.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn env_var_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
