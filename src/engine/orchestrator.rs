//! Runs every message of an upload through extraction, matching and evaluation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::demographics::Demographics;
use crate::engine::evaluator::{evaluate, FlaggedResult, Verdict};
use crate::engine::matcher::{select_metric, MetricQuery};
use crate::engine::observation::{Observation, ObservationFields};
use crate::error::ObservationError;
use crate::extraction::Extractor;
use crate::hl7::{split_messages, Hl7Message};
use crate::reference::ReferenceTable;

/// Which observation segments of a message are evaluated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ObservationScope {
    /// Only the first observation segment
    #[default]
    First,
    /// Every observation segment, sharing the message's patient fields
    All,
}

impl FromStr for ObservationScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(ObservationScope::First),
            "all" => Ok(ObservationScope::All),
            other => Err(format!("unknown observation scope '{}'", other)),
        }
    }
}

impl fmt::Display for ObservationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationScope::First => write!(f, "first"),
            ObservationScope::All => write!(f, "all"),
        }
    }
}

/// Per-batch tallies of how each message and observation was handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub messages: usize,
    pub observations: usize,
    pub flagged: usize,
    pub within_range: usize,
    pub unmatched: usize,
    pub no_range_policy: usize,
    pub malformed: usize,
    pub invalid_date_of_birth: usize,
    pub non_numeric: usize,
    pub invalid_bound: usize,
}

impl BatchReport {
    fn record_verdict(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Flagged(_) => self.flagged += 1,
            Verdict::WithinRange => self.within_range += 1,
            Verdict::NoMatch => self.unmatched += 1,
            Verdict::NoRangePolicy => self.no_range_policy += 1,
        }
    }

    fn record_error(&mut self, error: &ObservationError) {
        match error {
            ObservationError::MalformedMessage(_) => self.malformed += 1,
            ObservationError::DateParse { .. } => self.invalid_date_of_birth += 1,
            ObservationError::NumericParse { .. } => self.non_numeric += 1,
            ObservationError::InvalidBound { .. } => self.invalid_bound += 1,
        }
    }

    /// Messages or observations excluded because of an error.
    pub fn skipped(&self) -> usize {
        self.malformed + self.invalid_date_of_birth + self.non_numeric + self.invalid_bound
    }
}

/// Flagged results of a batch together with its report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<FlaggedResult>,
    pub report: BatchReport,
}

/// Evaluates uploads against an immutable reference table.
///
/// Cheap to clone; the table is shared. Each message is handled in
/// isolation, so a bad message never affects the rest of the batch.
#[derive(Debug, Clone)]
pub struct BatchEvaluator {
    table: Arc<ReferenceTable>,
    fields: ObservationFields,
    scope: ObservationScope,
}

impl BatchEvaluator {
    pub fn new(table: Arc<ReferenceTable>) -> Self {
        Self {
            table,
            fields: ObservationFields::default(),
            scope: ObservationScope::default(),
        }
    }

    pub fn with_fields(mut self, fields: ObservationFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_scope(mut self, scope: ObservationScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn table(&self) -> &ReferenceTable {
        &self.table
    }

    pub fn scope(&self) -> ObservationScope {
        self.scope
    }

    /// Flag out-of-range observations, computing ages as of today.
    pub fn evaluate_batch(&self, upload: &[u8]) -> Vec<FlaggedResult> {
        self.evaluate_batch_at(upload, Local::now().date_naive())
    }

    /// Flag out-of-range observations, computing ages as of `reference`.
    pub fn evaluate_batch_at(&self, upload: &[u8], reference: NaiveDate) -> Vec<FlaggedResult> {
        self.run(upload, reference).results
    }

    /// Evaluate a batch and report how every message was handled.
    pub fn run(&self, upload: &[u8], reference: NaiveDate) -> BatchOutcome {
        let text = String::from_utf8_lossy(upload);
        let mut outcome = BatchOutcome::default();

        for (index, raw) in split_messages(&text).enumerate() {
            outcome.report.messages += 1;
            if let Err(err) = self.evaluate_message(&raw, reference, &mut outcome) {
                tracing::debug!("Skipping message {}: {}", index + 1, err);
                outcome.report.record_error(&err);
            }
        }

        let report = &outcome.report;
        tracing::info!(
            messages = report.messages,
            observations = report.observations,
            flagged = report.flagged,
            skipped = report.skipped(),
            "Batch evaluated"
        );
        outcome
    }

    fn evaluate_message(
        &self,
        raw: &str,
        reference: NaiveDate,
        outcome: &mut BatchOutcome,
    ) -> Result<(), ObservationError> {
        let message =
            Hl7Message::parse(raw).map_err(|e| ObservationError::MalformedMessage(e.to_string()))?;

        let available = self.fields.observation_count(&message);
        if available == 0 {
            return Err(ObservationError::MalformedMessage(format!(
                "no {} segment",
                self.fields.observation_segment()
            )));
        }
        let count = match self.scope {
            ObservationScope::First => 1,
            ObservationScope::All => available,
        };

        for index in 0..count {
            outcome.report.observations += 1;
            match self.evaluate_observation(&message, index, reference) {
                Ok(Verdict::Flagged(result)) => {
                    outcome.report.flagged += 1;
                    outcome.results.push(result);
                }
                Ok(verdict) => outcome.report.record_verdict(&verdict),
                Err(err) => {
                    tracing::debug!("Skipping observation {}: {}", index + 1, err);
                    outcome.report.record_error(&err);
                }
            }
        }
        Ok(())
    }

    fn evaluate_observation<E: Extractor>(
        &self,
        message: &E,
        index: usize,
        reference: NaiveDate,
    ) -> Result<Verdict, ObservationError> {
        let observation = Observation::extract(message, &self.fields, index)?;
        let demographics = Demographics::derive(
            &observation.date_of_birth,
            observation.gender_code.as_deref(),
            reference,
        )?;

        let query = MetricQuery {
            sonic_code: &observation.sonic_code,
            unit: &observation.unit,
            age: Some(demographics.age),
            gender: demographics.gender,
        };
        let metric = select_metric(self.table.metrics(), &query);

        evaluate(&observation, metric, &self.table)
    }
}
