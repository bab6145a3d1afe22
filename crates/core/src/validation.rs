//! Input validation utilities.
//!
//! Forms are validated field by field and every problem is reported at once through
//! [`FieldErrors`], so a client sees the full list rather than the first failure.

use crate::{BloodBankError, BloodBankResult};
use chrono::NaiveDate;

/// Longest identifier accepted in a path or filter value.
const MAX_ID_LEN: usize = 64;

/// Accumulates validation messages for one submitted form.
#[derive(Debug, Default)]
pub struct FieldErrors {
    messages: Vec<String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Returns the trimmed value, recording "`field` is required" when it is absent or blank.
    pub fn require<'v>(&mut self, field: &str, value: Option<&'v str>) -> Option<&'v str> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => Some(v),
            None => {
                self.push(format!("{field} is required"));
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise [`BloodBankError::Validation`].
    pub fn finish(self) -> BloodBankResult<()> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(BloodBankError::Validation(self.messages))
        }
    }
}

/// Parses a strict `YYYY-MM-DD` date.
pub fn parse_iso_date(field: &str, raw: &str) -> BloodBankResult<NaiveDate> {
    let raw = raw.trim();
    let well_formed = raw.len() == 10
        && raw
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if !well_formed {
        return Err(BloodBankError::InvalidInput(format!(
            "{field} must be in YYYY-MM-DD format"
        )));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| BloodBankError::InvalidInput(format!("{field} is not a valid date")))
}

/// Validates a record identifier before it is embedded in a store filter.
///
/// Only ASCII letters, digits, `-` and `_` are accepted.
pub fn validate_record_id(field: &str, raw: &str) -> BloodBankResult<String> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(BloodBankError::InvalidInput(format!("{field} cannot be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(BloodBankError::InvalidInput(format!("{field} is too long")));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BloodBankError::InvalidInput(format!(
            "{field} contains invalid characters"
        )));
    }
    Ok(id.to_string())
}
