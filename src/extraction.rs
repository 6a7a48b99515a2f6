//! Structured field addressing for segmented messages.
//!
//! This module provides the format-agnostic boundary between a parsed
//! message and the evaluation engine: an address naming a segment, its
//! occurrence, a field and optionally a component, and a trait for looking
//! values up by that address.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when an address string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid field address '{0}': expected SEG[.n] form such as OBX.3.2 or OBX[1].5")]
pub struct AddressError(pub String);

/// Address of a value inside a segmented message.
///
/// # Examples
///
/// - `PID.7` - field 7 of the first PID segment
/// - `OBX.3.2` - component 2 of field 3 of the first OBX segment
/// - `OBX[2].5` - field 5 of the third OBX segment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldAddress {
    /// Segment type, e.g. "PID"
    pub segment: String,
    /// Zero-based occurrence of the segment within the message
    pub occurrence: usize,
    /// One-based field number
    pub field: usize,
    /// One-based component number; `None` addresses the whole field
    pub component: Option<usize>,
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Z][A-Z0-9]{2})(?:\[(\d+)\])?\.(\d+)(?:\.(\d+))?$")
            .expect("field address pattern is valid")
    })
}

impl FieldAddress {
    /// Address a whole field of the first occurrence of `segment`.
    pub fn field(segment: &str, field: usize) -> Self {
        Self {
            segment: segment.to_string(),
            occurrence: 0,
            field,
            component: None,
        }
    }

    /// Address one component of a field of the first occurrence of `segment`.
    pub fn component(segment: &str, field: usize, component: usize) -> Self {
        Self {
            component: Some(component),
            ..Self::field(segment, field)
        }
    }

    /// Same address, pointed at another occurrence of the segment.
    pub fn at_occurrence(&self, occurrence: usize) -> Self {
        Self {
            occurrence,
            ..self.clone()
        }
    }
}

impl FromStr for FieldAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = address_pattern()
            .captures(s.trim())
            .ok_or_else(|| AddressError(s.to_string()))?;

        let number = |idx: usize| -> Result<Option<usize>, AddressError> {
            caps.get(idx)
                .map(|m| m.as_str().parse::<usize>().map_err(|_| AddressError(s.to_string())))
                .transpose()
        };

        let field = number(3)?.unwrap_or(0);
        let component = number(4)?;
        // HL7 numbering is one-based
        if field == 0 || component == Some(0) {
            return Err(AddressError(s.to_string()));
        }

        Ok(Self {
            segment: caps[1].to_string(),
            occurrence: number(2)?.unwrap_or(0),
            field,
            component,
        })
    }
}

impl TryFrom<String> for FieldAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldAddress> for String {
    fn from(address: FieldAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segment)?;
        if self.occurrence > 0 {
            write!(f, "[{}]", self.occurrence)?;
        }
        write!(f, ".{}", self.field)?;
        if let Some(component) = self.component {
            write!(f, ".{}", component)?;
        }
        Ok(())
    }
}

/// Value found at a field address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A plain value with no component structure
    Scalar(String),
    /// A structured value: one-based component number -> component text
    Composite(IndexMap<usize, String>),
}

impl FieldValue {
    /// Text of the given one-based component.
    ///
    /// A scalar behaves as a value whose only component is the first.
    pub fn component(&self, index: usize) -> Option<&str> {
        let text = match self {
            FieldValue::Scalar(s) if index == 1 => Some(s.as_str()),
            FieldValue::Scalar(_) => None,
            FieldValue::Composite(parts) => parts.get(&index).map(String::as_str),
        };
        text.filter(|s| !s.is_empty())
    }

    /// Plain text of the value: the scalar itself, or a composite's first component.
    pub fn text(&self) -> Option<&str> {
        self.component(1)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Scalar(s) => write!(f, "{}", s),
            FieldValue::Composite(parts) => {
                let joined: Vec<&str> = parts.values().map(String::as_str).collect();
                write!(f, "{}", joined.join("^"))
            }
        }
    }
}

/// Trait for parsed messages that expose values by structured address.
///
/// Any representation that can answer "what is at this address" can feed
/// the evaluation engine; the HL7 parser in [`crate::hl7`] is one.
///
/// # Example
///
/// ```ignore
/// use oru_risk::{Extractor, FieldAddress, FieldValue};
///
/// struct Fixed(String);
///
/// impl Extractor for Fixed {
///     fn extract(&self, _address: &FieldAddress) -> Option<FieldValue> {
///         Some(FieldValue::Scalar(self.0.clone()))
///     }
///
///     fn occurrences(&self, _segment: &str) -> usize {
///         1
///     }
/// }
/// ```
pub trait Extractor {
    /// Extract the value at the given address.
    ///
    /// Returns `None` when the segment, field or component does not exist
    /// or is empty.
    fn extract(&self, address: &FieldAddress) -> Option<FieldValue>;

    /// Number of occurrences of a segment type in the message.
    fn occurrences(&self, segment: &str) -> usize;

    /// Extract a value as plain text.
    fn extract_text(&self, address: &FieldAddress) -> Option<String> {
        self.extract(address)
            .and_then(|value| value.text().map(str::to_string))
    }
}
