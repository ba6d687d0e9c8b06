use anyhow::{anyhow, Result};

/// Validation utilities for onboarding input collected at the edges
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate an auth account id
    pub fn validate_user_id(user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(anyhow!("User id cannot be empty"));
        }

        if user_id.len() > 128 {
            return Err(anyhow!("User id too long (max 128 characters)"));
        }

        if user_id.chars().any(char::is_whitespace) {
            return Err(anyhow!("User id cannot contain whitespace"));
        }

        Ok(())
    }

    /// Validate a display name
    pub fn validate_full_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("Full name cannot be empty"));
        }

        if name.chars().count() > 200 {
            return Err(anyhow!("Full name too long (max 200 characters)"));
        }

        // Check for potentially dangerous characters
        if name.contains('\0') || name.contains('\r') || name.contains('\n') {
            return Err(anyhow!("Full name contains invalid characters"));
        }

        Ok(())
    }

    /// Validate a company name
    pub fn validate_company_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("Company name cannot be empty"));
        }

        if name.chars().count() > 200 {
            return Err(anyhow!("Company name too long (max 200 characters)"));
        }

        if name.chars().any(char::is_control) {
            return Err(anyhow!("Company name contains invalid characters"));
        }

        Ok(())
    }

    /// Validate phone number format
    pub fn validate_phone(phone: &str) -> Result<()> {
        if phone.trim().is_empty() {
            return Err(anyhow!("Phone number cannot be empty"));
        }

        if phone
            .chars()
            .any(|c| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ')))
        {
            return Err(anyhow!("Phone number contains invalid characters"));
        }

        let digits = phone.chars().filter(char::is_ascii_digit).count();
        if !(7..=15).contains(&digits) {
            return Err(anyhow!("Phone number must be between 7 and 15 digits"));
        }

        if phone.chars().skip(1).any(|c| c == '+') {
            return Err(anyhow!("Phone number may only have + as its first character"));
        }

        Ok(())
    }

    /// Validate email format
    pub fn validate_email(email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(anyhow!("Email cannot be empty"));
        }

        if email.len() > 254 {
            return Err(anyhow!("Email too long (max 254 characters)"));
        }

        let Some((local_part, domain_part)) = email.split_once('@') else {
            return Err(anyhow!("Email must contain @ symbol"));
        };

        if domain_part.contains('@') {
            return Err(anyhow!("Email must have exactly one @ symbol"));
        }

        if local_part.is_empty() || local_part.len() > 64 {
            return Err(anyhow!("Email local part invalid"));
        }

        if domain_part.is_empty()
            || !domain_part.contains('.')
            || domain_part.starts_with('.')
            || domain_part.ends_with('.')
        {
            return Err(anyhow!("Email domain invalid"));
        }

        if email.chars().any(char::is_whitespace) {
            return Err(anyhow!("Email cannot contain whitespace"));
        }

        Ok(())
    }

    /// Validate a metadata key given on the command line
    pub fn validate_metadata_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(anyhow!("Metadata key cannot be empty"));
        }

        if key.len() > 64 {
            return Err(anyhow!("Metadata key too long (max 64 characters)"));
        }

        if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(anyhow!("Metadata key may only contain letters, digits and underscores"));
        }

        Ok(())
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(anyhow!("Database URL cannot be empty"));
        }

        if url.len() > 1000 {
            return Err(anyhow!("Database URL too long"));
        }

        Ok(())
    }

    /// Normalize an email for lookup: trimmed, domain lowercased
    #[must_use]
    pub fn normalize_email(email: &str) -> String {
        let email = email.trim();
        match email.rsplit_once('@') {
            Some((local, domain)) => format!("{local}@{}", domain.to_ascii_lowercase()),
            None => email.to_string(),
        }
    }
}
