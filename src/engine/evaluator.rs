//! Decides whether a matched observation is outside its accepted range.

use serde::{Deserialize, Serialize};

use crate::engine::observation::Observation;
use crate::error::ObservationError;
use crate::reference::{MetricDefinition, ReferenceTable};

const MISSING_BOUND: &str = "N/A";

/// An observation outside its clinically-accepted range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedResult {
    /// Condition diagnosed by the metric, empty when none is recorded
    pub condition: String,
    pub test_name: String,
    /// Observed value as it appeared in the message
    pub observed_value: String,
    pub units: String,
    pub everlab_range: String,
    pub standard_range: String,
}

/// Outcome of evaluating one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Flagged(FlaggedResult),
    WithinRange,
    /// No metric definition covers the code and unit
    NoMatch,
    /// The matched metric has no complete accepted range
    NoRangePolicy,
}

/// Parse a decimal, ignoring surrounding whitespace. Infinities and NaN are rejected.
pub fn parse_decimal(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn format_range(lower: Option<&str>, higher: Option<&str>) -> String {
    format!(
        "{} - {}",
        lower.unwrap_or(MISSING_BOUND),
        higher.unwrap_or(MISSING_BOUND)
    )
}

/// Compare an observation against its matched metric.
///
/// Values equal to either bound are within range.
pub fn evaluate(
    observation: &Observation,
    metric: Option<&MetricDefinition>,
    table: &ReferenceTable,
) -> Result<Verdict, ObservationError> {
    let Some(metric) = metric else {
        return Ok(Verdict::NoMatch);
    };
    let (Some(lower_text), Some(higher_text)) = (&metric.everlab_lower, &metric.everlab_higher)
    else {
        return Ok(Verdict::NoRangePolicy);
    };

    let observed = observation
        .observed_value()
        .ok_or_else(|| ObservationError::NumericParse {
            value: observation.value.to_string(),
        })?;
    let value = parse_decimal(observed).ok_or_else(|| ObservationError::NumericParse {
        value: observed.to_string(),
    })?;

    let bound = |text: &str| {
        parse_decimal(text).ok_or_else(|| {
            tracing::warn!("Metric '{}' has non-numeric bound '{}'", metric.name, text);
            ObservationError::InvalidBound {
                metric: metric.name.clone(),
                value: text.to_string(),
            }
        })
    };
    let lower = bound(lower_text.as_str())?;
    let higher = bound(higher_text.as_str())?;

    if value >= lower && value <= higher {
        return Ok(Verdict::WithinRange);
    }

    Ok(Verdict::Flagged(FlaggedResult {
        condition: table
            .condition_for(&metric.name)
            .map(|c| c.name.clone())
            .unwrap_or_default(),
        test_name: observation
            .test_name
            .clone()
            .unwrap_or_else(|| metric.name.clone()),
        observed_value: observed.to_string(),
        units: observation.unit.clone(),
        everlab_range: format_range(Some(lower_text.as_str()), Some(higher_text.as_str())),
        standard_range: format_range(
            metric.standard_lower.as_deref(),
            metric.standard_higher.as_deref(),
        ),
    }))
}
