//! Observation fields pulled out of one message.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ObservationError;
use crate::extraction::{Extractor, FieldAddress, FieldValue};

/// Where each observation field lives in an ORU message.
///
/// Patient fields are read from their configured occurrence; observation
/// fields are shifted by the index of the observation segment being read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationFields {
    pub date_of_birth: FieldAddress,
    pub gender: FieldAddress,
    pub sonic_code: FieldAddress,
    pub test_name: FieldAddress,
    pub value: FieldAddress,
    pub unit: FieldAddress,
    /// Component of a structured value field that carries the number
    #[serde(deserialize_with = "component_number")]
    pub value_component: usize,
}

/// Component numbers are 1-based, like the rest of an HL7 address.
fn component_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    match usize::deserialize(deserializer)? {
        0 => Err(serde::de::Error::custom(
            "value_component must be at least 1",
        )),
        n => Ok(n),
    }
}

impl Default for ObservationFields {
    fn default() -> Self {
        Self {
            date_of_birth: FieldAddress::field("PID", 7),
            gender: FieldAddress::field("PID", 8),
            sonic_code: FieldAddress::component("OBX", 3, 2),
            test_name: FieldAddress::component("OBX", 3, 1),
            value: FieldAddress::field("OBX", 5),
            unit: FieldAddress::component("OBX", 6, 1),
            value_component: 2,
        }
    }
}

impl ObservationFields {
    /// Segment type that carries one observation per occurrence.
    pub fn observation_segment(&self) -> &str {
        &self.value.segment
    }

    /// How many observations a message holds.
    pub fn observation_count<E: Extractor + ?Sized>(&self, message: &E) -> usize {
        message
            .occurrences(self.observation_segment())
            .saturating_sub(self.value.occurrence)
    }

    fn shifted(address: &FieldAddress, index: usize) -> FieldAddress {
        address.at_occurrence(address.occurrence + index)
    }
}

/// Raw values of one observation and the patient it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub date_of_birth: String,
    pub gender_code: Option<String>,
    pub sonic_code: String,
    pub unit: String,
    pub value: FieldValue,
    pub test_name: Option<String>,
    /// Component of `value` to read when it is structured
    pub value_component: usize,
}

impl Observation {
    /// Extract the `index`-th observation of a message.
    pub fn extract<E: Extractor + ?Sized>(
        message: &E,
        fields: &ObservationFields,
        index: usize,
    ) -> Result<Self, ObservationError> {
        let required = |address: &FieldAddress| {
            message
                .extract_text(address)
                .ok_or_else(|| ObservationError::missing(&address.to_string()))
        };

        let value_address = ObservationFields::shifted(&fields.value, index);
        let value = message
            .extract(&value_address)
            .ok_or_else(|| ObservationError::missing(&value_address.to_string()))?;

        Ok(Self {
            date_of_birth: required(&fields.date_of_birth)?,
            gender_code: message.extract_text(&fields.gender),
            sonic_code: required(&ObservationFields::shifted(&fields.sonic_code, index))?,
            unit: required(&ObservationFields::shifted(&fields.unit, index))?,
            value,
            test_name: message.extract_text(&ObservationFields::shifted(&fields.test_name, index)),
            value_component: fields.value_component,
        })
    }

    /// Text of the observed value; a structured value yields its designated component.
    pub fn observed_value(&self) -> Option<&str> {
        match &self.value {
            FieldValue::Scalar(s) => Some(s.as_str()).filter(|s| !s.is_empty()),
            FieldValue::Composite(_) => self.value.component(self.value_component),
        }
    }
}
