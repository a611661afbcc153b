//! Identity verification collaborator.
//!
//! Earnings are only computed for creators with both email and phone
//! verified. The engine asks an [`IdentityVerifier`]; the default
//! [`ProfileFlagsVerifier`] reads the flags stored on the creator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use earnguard_common::Creator;

use crate::error::EngineResult;

/// A verification factor required before earning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationFactor {
    Email,
    Phone,
}

impl fmt::Display for VerificationFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationFactor::Email => f.write_str("email"),
            VerificationFactor::Phone => f.write_str("phone"),
        }
    }
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn is_email_verified(&self, user: &Creator) -> EngineResult<bool>;

    async fn is_phone_verified(&self, user: &Creator) -> EngineResult<bool>;

    /// Factors still missing, email first.
    async fn missing_factors(&self, user: &Creator) -> EngineResult<Vec<VerificationFactor>> {
        let mut missing = Vec::new();
        if !self.is_email_verified(user).await? {
            missing.push(VerificationFactor::Email);
        }
        if !self.is_phone_verified(user).await? {
            missing.push(VerificationFactor::Phone);
        }
        Ok(missing)
    }
}

/// Reads `email_verified` / `phone_verified` from the creator record.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProfileFlagsVerifier;

#[async_trait]
impl IdentityVerifier for ProfileFlagsVerifier {
    async fn is_email_verified(&self, user: &Creator) -> EngineResult<bool> {
        Ok(user.email_verified)
    }

    async fn is_phone_verified(&self, user: &Creator) -> EngineResult<bool> {
        Ok(user.phone_verified)
    }
}

/// Human-readable resolution path for missing factors.
pub fn verification_message(missing: &[VerificationFactor]) -> String {
    let names: Vec<String> = missing.iter().map(|f| f.to_string()).collect();
    format!(
        "verification required: verify your {} to start earning",
        names.join(" and ")
    )
}
