//! Error types shared across the evaluation pipeline.
//!
//! None of these are fatal to a batch: each one explains why a single
//! message or observation contributed nothing to the output.

use thiserror::Error;

/// Reason a message or observation was excluded from a batch's results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
    /// A required field could not be extracted from the message.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Date of birth is not in `YYYYMMDD` form.
    #[error("Invalid date of birth '{value}': expected YYYYMMDD")]
    DateParse { value: String },

    /// Observed value is not a decimal number.
    #[error("Observed value '{value}' is not numeric")]
    NumericParse { value: String },

    /// A reference bound stored for a metric is not a decimal number.
    #[error("Metric '{metric}' has non-numeric bound '{value}'")]
    InvalidBound { metric: String, value: String },
}

impl ObservationError {
    /// Shorthand for a missing required field.
    pub fn missing(field: &str) -> Self {
        ObservationError::MalformedMessage(format!("required field {} is missing or empty", field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = ObservationError::missing("PID.7");
        assert_eq!(
            err.to_string(),
            "Malformed message: required field PID.7 is missing or empty"
        );
    }

    #[test]
    fn test_date_parse_display() {
        let err = ObservationError::DateParse { value: "1990-06-15".to_string() };
        assert!(err.to_string().contains("1990-06-15"));
    }
}
