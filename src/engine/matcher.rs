//! Selects the metric definition that applies to one observation.

use crate::demographics::Gender;
use crate::reference::MetricDefinition;

/// What the matcher needs to know about one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricQuery<'a> {
    pub sonic_code: &'a str,
    pub unit: &'a str,
    /// `None` when the caller has no age for the patient. Batch evaluation
    /// always supplies one, since an underivable date of birth skips the
    /// observation before matching.
    pub age: Option<i32>,
    pub gender: Gender,
}

/// Pick the applicable definition for `query`.
///
/// Candidates are the rows whose codes contain the sonic code and whose
/// units contain the unit, in table order. The first candidate whose age
/// and gender constraints admit the patient wins. When none does, the first
/// candidate is used regardless of its constraints. No candidates means no
/// match.
pub fn select_metric<'t>(
    metrics: &'t [MetricDefinition],
    query: &MetricQuery<'_>,
) -> Option<&'t MetricDefinition> {
    let mut first_candidate = None;

    for metric in metrics
        .iter()
        .filter(|m| m.identifies(query.sonic_code, query.unit))
    {
        if metric.admits(query.age, query.gender) {
            return Some(metric);
        }
        first_candidate.get_or_insert(metric);
    }

    if let Some(fallback) = first_candidate {
        tracing::debug!(
            "No stratified row for {} [{}] admits age {:?} / {}; using '{}'",
            query.sonic_code,
            query.unit,
            query.age,
            query.gender,
            fallback.name
        );
    }
    first_candidate
}
