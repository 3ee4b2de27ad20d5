//! Phone number normalization
//!
//! Different gateway deployments accept different renderings of the same
//! number, so normalization yields an ordered candidate list rather than a
//! single canonical form. Candidates are tried in order only when the
//! gateway signals a number-format failure.

use super::manager::DispatchError;

/// Normalize a free-form phone string into an ordered, de-duplicated
/// candidate list, most-canonical first: `+<cc><subscriber>`, then the
/// same digits without the plus.
///
/// A leading `0` is replaced with `country_code`; the `00` international
/// call prefix folds into the plus form; punctuation and spacing are
/// discarded. Fails with `InvalidPhone` when no subscriber digits remain,
/// so such recipients never reach the gateway.
pub fn normalize_phone(raw: &str, country_code: &str) -> Result<Vec<String>, DispatchError> {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');
    let mut digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.starts_with("00") {
        digits = digits[2..].to_string();
    } else if !has_plus {
        if let Some(rest) = digits.strip_prefix('0') {
            digits = format!("{}{}", country_code, rest);
        } else if !digits.starts_with(country_code) {
            digits = format!("{}{}", country_code, digits);
        }
    }

    if digits.is_empty() || digits == country_code {
        return Err(DispatchError::InvalidPhone(raw.to_string()));
    }

    Ok(vec![format!("+{}", digits), digits])
}
