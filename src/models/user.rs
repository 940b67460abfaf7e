//! Quota-tracked principals

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// A principal as listed by the control plane. Identity is `email`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub email: String,
    pub username: String,
    pub current_traffic: u64,
    pub max_traffic: u64,
}

impl User {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.is_empty() {
            return Err(ValidationError::MissingField("email"));
        }
        if !looks_like_email(&self.email) {
            return Err(ValidationError::InvalidEmail(self.email.clone()));
        }
        if self.username.is_empty() {
            return Err(ValidationError::MissingField("username"));
        }
        if self.max_traffic == 0 {
            return Err(ValidationError::MissingField("max_traffic"));
        }
        Ok(())
    }

    /// Current traffic has met or exceeded the quota
    pub fn is_exhausted(&self) -> bool {
        self.current_traffic >= self.max_traffic
    }
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.chars().any(char::is_whitespace)
}
