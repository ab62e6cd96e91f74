//! Bearer credential type.

use std::fmt;

use crate::error::CoreError;

/// An opaque GitHub bearer token.
///
/// The token text is only reachable through [`Credential::expose`]; the
/// `Debug` impl never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Creates a credential from user or server supplied text.
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyCredential`] if nothing remains after trimming.
    pub fn new(token: impl AsRef<str>) -> Result<Self, CoreError> {
        let trimmed = token.as_ref().trim();
        if trimmed.is_empty() {
            return Err(CoreError::EmptyCredential);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the raw token text.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns a short hint like `ghp_…wxyz` for status output.
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "…".to_string();
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}
