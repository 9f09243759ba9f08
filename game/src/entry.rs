use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub consent_given: bool,
}

/// Contact details of a player whose entry form passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    name: String,
    phone: String,
    email: String,
}

impl Player {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationError {
    #[error("Please enter your name.")]
    MissingName,
    #[error("Please enter your phone number.")]
    MissingPhone,
    #[error("Please enter your email address.")]
    MissingEmail,
    #[error("Please agree to the terms before playing.")]
    ConsentRequired,
}

impl EntryForm {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
        consent_given: bool,
    ) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: email.into(),
            consent_given,
        }
    }

    /// Checks fields in display order and reports the first problem.
    pub fn validate(&self) -> Result<Player, ValidationError> {
        let name = self.name.trim();
        let phone = self.phone.trim();
        let email = self.email.trim();

        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        if phone.is_empty() {
            return Err(ValidationError::MissingPhone);
        }
        if email.is_empty() {
            return Err(ValidationError::MissingEmail);
        }
        if !self.consent_given {
            return Err(ValidationError::ConsentRequired);
        }

        Ok(Player {
            name: name.to_string(),
            phone: phone.to_string(),
            email: email.to_string(),
        })
    }
}
