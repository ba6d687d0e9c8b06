//! Error types for the homni-onboarding library.
//!
//! Storage failures convert into [`OnboardingError`] through `#[from]`; the
//! onboarding flow wraps the two critical steps in contextual variants so a
//! caller can tell which step aborted and for which user.

use thiserror::Error;

/// Errors that can occur while linking leads and materializing profiles.
#[derive(Error, Debug)]
pub enum OnboardingError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Serialization/deserialization errors (metadata columns)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller supplied input the flow refuses to act on
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A stored value could not be interpreted
    #[error("Invalid stored value for {column}: {value}")]
    InvalidStoredValue {
        /// Column the value was read from
        column: &'static str,
        /// The offending value
        value: String,
    },

    /// Row expected after a write was not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Blocking storage task did not complete
    #[error("Storage task failed: {0}")]
    Task(String),

    /// Linking anonymous leads failed; the flow was aborted
    #[error("Failed to link anonymous leads for user {user_id}: {source}")]
    LeadAttribution {
        /// Account the leads were being linked to
        user_id: String,
        /// Underlying cause
        #[source]
        source: Box<OnboardingError>,
    },

    /// Reading or writing the user profile failed; the flow was aborted
    #[error("Failed to materialize profile for user {user_id}: {source}")]
    ProfileWrite {
        /// Account whose profile was being written
        user_id: String,
        /// Underlying cause
        #[source]
        source: Box<OnboardingError>,
    },
}

impl OnboardingError {
    /// Wrap a lead-linking failure with the user it concerned.
    pub fn lead_attribution(user_id: &str, source: Self) -> Self {
        Self::LeadAttribution {
            user_id: user_id.to_string(),
            source: Box::new(source),
        }
    }

    /// Wrap a profile lookup/write failure with the user it concerned.
    pub fn profile_write(user_id: &str, source: Self) -> Self {
        Self::ProfileWrite {
            user_id: user_id.to_string(),
            source: Box::new(source),
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Pool(_) => "pool",
            Self::Serialization(_) => "serialization",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidStoredValue { .. } => "invalid_stored_value",
            Self::NotFound(_) => "not_found",
            Self::Task(_) => "task",
            Self::LeadAttribution { .. } => "lead_attribution",
            Self::ProfileWrite { .. } => "profile_write",
        }
    }
}

/// Convenience type alias for Result with `OnboardingError`
pub type Result<T> = std::result::Result<T, OnboardingError>;

impl From<tokio::task::JoinError> for OnboardingError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_contextual_errors_keep_their_cause() {
        let err = OnboardingError::profile_write("u1", OnboardingError::NotFound("user_profiles/u1".into()));
        assert_eq!(err.kind(), "profile_write");
        assert!(err.to_string().contains("u1"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_lead_attribution_display() {
        let err = OnboardingError::lead_attribution("u9", OnboardingError::Task("cancelled".into()));
        assert_eq!(
            err.to_string(),
            "Failed to link anonymous leads for user u9: Storage task failed: cancelled"
        );
    }
}
