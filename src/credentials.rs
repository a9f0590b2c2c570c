//! Secret acquisition for warehouse calls.
//!
//! Secrets arrive through `SNOWFLAKE_PASSWORD` / `SNOWFLAKE_PAT` or, when the
//! user opted in, from the profile itself. They exist only in memory and are
//! never printed: `Secret` redacts itself in `Debug` and `Display`.

use crate::config::Profile;
use crate::error::Error;

/// A password or programmatic access token.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***")
    }
}

/// Where a secret was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Env(&'static str),
    Stored,
    Prompt,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Env(var) => write!(f, "{}", var),
            SecretSource::Stored => write!(f, "stored secret"),
            SecretSource::Prompt => write!(f, "prompt"),
        }
    }
}

/// Environment variable for the profile's auth method first, then the
/// stored secret. Blank values count as unset.
pub fn resolve_secret(
    profile: &Profile,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(Secret, SecretSource), Error> {
    let var = profile.auth_method.secret_env_var();
    if let Some(value) = lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        return Ok((Secret::new(value), SecretSource::Env(var)));
    }
    if let Some(stored) = profile.secret.as_deref().filter(|s| !s.trim().is_empty()) {
        return Ok((Secret::new(stored), SecretSource::Stored));
    }
    let target = if profile.name.is_empty() {
        "this connection".to_string()
    } else {
        format!("connection {:?}", profile.name)
    };
    Err(Error::Validation(format!(
        "{} is not set; export it before using {}",
        var, target
    )))
}
