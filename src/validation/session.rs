use std::collections::HashSet;

use crate::error::{AppError, Result};
use crate::models::vote::MAX_BALLOT_LEN;

/// Smallest allowed participant cap.
pub const MIN_PARTICIPANTS: i32 = 2;
/// Largest allowed participant cap.
pub const MAX_PARTICIPANTS: i32 = 20;

const MIN_NAME_CHARS: usize = 2;
const MAX_NAME_CHARS: usize = 20;

/// Validates a participant cap.
pub fn validate_max_participants(max_participants: i32) -> Result<()> {
    if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&max_participants) {
        return Err(AppError::Validation(format!(
            "max participants must be between {} and {}",
            MIN_PARTICIPANTS, MAX_PARTICIPANTS
        )));
    }

    Ok(())
}

/// Validates a username or creator name and returns it trimmed.
///
/// Casing is preserved.
pub fn validate_username(username: &str) -> Result<String> {
    let trimmed = username.trim();
    let chars = trimmed.chars().count();

    if chars < MIN_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Username must be at least {} characters",
            MIN_NAME_CHARS
        )));
    }

    if chars > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Username must be at most {} characters",
            MAX_NAME_CHARS
        )));
    }

    if trimmed.chars().any(char::is_control) {
        return Err(AppError::Validation(
            "Username cannot contain control characters".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Normalizes a country code to upper case and checks its shape.
///
/// Only the two-letter form is checked, not whether the code is assigned.
pub fn normalize_country_code(code: &str) -> Result<String> {
    let code = code.trim().to_ascii_uppercase();

    if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(AppError::Validation(format!(
            "Invalid country code: {:?}",
            code
        )));
    }

    Ok(code)
}

/// Validates a ranked ballot and returns the normalized codes in rank order.
///
/// # Arguments
///
/// * `countries` - The ranked codes, most preferred first.
/// * `origin_country` - The session's origin, which may not be voted for.
pub fn normalize_ballot(countries: &[String], origin_country: Option<&str>) -> Result<Vec<String>> {
    if countries.is_empty() {
        return Err(AppError::Validation("Select at least 1 country".to_string()));
    }

    if countries.len() > MAX_BALLOT_LEN {
        return Err(AppError::Validation(format!(
            "Select at most {} countries",
            MAX_BALLOT_LEN
        )));
    }

    let mut seen = HashSet::with_capacity(countries.len());
    let mut ballot = Vec::with_capacity(countries.len());

    for code in countries {
        let code = normalize_country_code(code)?;

        if origin_country == Some(code.as_str()) {
            return Err(AppError::Validation(format!(
                "{} is the origin country and cannot be a destination",
                code
            )));
        }

        if !seen.insert(code.clone()) {
            return Err(AppError::Validation(format!("{} is ranked more than once", code)));
        }

        ballot.push(code);
    }

    Ok(ballot)
}
