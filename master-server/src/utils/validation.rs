//! Input validation helpers
//!
//! Centralized text length constants and validation functions.
//! SQLite TEXT has no built-in length enforcement, so every write path
//! checks lengths here first.

use crate::utils::{AppError, ErrorCode};
use validator::ValidateEmail;

// ── Text length limits ──────────────────────────────────────────────

/// Usernames
pub const MAX_USERNAME_LEN: usize = 64;

/// Entity names: role, permission, resource, action
pub const MAX_NAME_LEN: usize = 200;

/// Notes, descriptions, remarks
pub const MAX_NOTE_LEN: usize = 500;

/// Short identifiers: phone, nickname
pub const MAX_SHORT_TEXT_LEN: usize = 100;

/// Email addresses (RFC 5321)
pub const MAX_EMAIL_LEN: usize = 254;

/// Passwords (before hashing)
pub const MAX_PASSWORD_LEN: usize = 128;

/// Password strength floor
pub const MIN_PASSWORD_LEN: usize = 8;

/// URLs / avatar paths
pub const MAX_URL_LEN: usize = 2048;

// ── Validation helpers ──────────────────────────────────────────────

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::with_message(
            ErrorCode::RequiredField,
            format!("{field} must not be empty"),
        )
        .with_detail("field", field));
    }
    if value.len() > max_len {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            value.len()
        ))
        .with_detail("field", field));
    }
    Ok(())
}

/// Validate that an optional string, if present, is within the length limit.
pub fn validate_optional_text(
    value: &Option<String>,
    field: &str,
    max_len: usize,
) -> Result<(), AppError> {
    if let Some(v) = value
        && v.len() > max_len
    {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            v.len()
        ))
        .with_detail("field", field));
    }
    Ok(())
}

/// Entity ids are positive; 0 is never a valid target.
pub fn validate_id(id: i64, field: &str) -> Result<(), AppError> {
    if id <= 0 {
        return Err(AppError::validation(format!("{field} must be a positive id"))
            .with_detail("field", field));
    }
    Ok(())
}

/// Usernames: non-empty, bounded, no whitespace and no `@` so they never
/// shadow an email address at login.
pub fn validate_username(username: &str) -> Result<(), AppError> {
    validate_required_text(username, "username", MAX_USERNAME_LEN)?;
    if username.chars().any(|c| c.is_whitespace() || c == '@') {
        return Err(
            AppError::validation("username must not contain whitespace or '@'")
                .with_detail("field", "username"),
        );
    }
    Ok(())
}

/// Trimmed, lower-cased form used for every email write and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate and normalize an email address.
pub fn validate_email(email: &str) -> Result<String, AppError> {
    let normalized = normalize_email(email);
    validate_required_text(&normalized, "email", MAX_EMAIL_LEN)?;
    if !normalized.validate_email() {
        return Err(AppError::new(ErrorCode::InvalidEmail).with_detail("field", "email"));
    }
    Ok(normalized)
}

/// Non-empty and bounded; used where only presence is required (old password, login).
pub fn validate_password_present(password: &str, field: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::with_message(
            ErrorCode::RequiredField,
            format!("{field} must not be empty"),
        )
        .with_detail("field", field));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "{field} is too long (max {MAX_PASSWORD_LEN})"
        ))
        .with_detail("field", field));
    }
    Ok(())
}

/// At least 8 characters with at least one letter and one digit.
pub fn validate_password_strength(password: &str, field: &str) -> Result<(), AppError> {
    validate_password_present(password, field)?;
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(long_enough && has_letter && has_digit) {
        return Err(AppError::new(ErrorCode::PasswordTooWeak).with_detail("field", field));
    }
    Ok(())
}
