//! Typed reference rows and the immutable table shared by all requests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::demographics::Gender;
use crate::reference::loader::{load_table, RawTable, Row, TableError};

/// Column names of the metrics table.
pub mod metric_columns {
    pub const NAME: &str = "name";
    pub const SONIC_CODES: &str = "oru_sonic_codes";
    pub const SONIC_UNITS: &str = "oru_sonic_units";
    pub const MIN_AGE: &str = "min_age";
    pub const MAX_AGE: &str = "max_age";
    pub const GENDER: &str = "gender";
    pub const EVERLAB_LOWER: &str = "everlab_lower";
    pub const EVERLAB_HIGHER: &str = "everlab_higher";
    pub const STANDARD_LOWER: &str = "standard_lower";
    pub const STANDARD_HIGHER: &str = "standard_higher";

    pub const ALL: [&str; 10] = [
        NAME,
        SONIC_CODES,
        SONIC_UNITS,
        MIN_AGE,
        MAX_AGE,
        GENDER,
        EVERLAB_LOWER,
        EVERLAB_HIGHER,
        STANDARD_LOWER,
        STANDARD_HIGHER,
    ];
}

/// Column names of the conditions table.
pub mod condition_columns {
    pub const NAME: &str = "name";
    pub const DIAGNOSTIC_METRIC: &str = "diagnostic_metrics";

    pub const ALL: [&str; 2] = [NAME, DIAGNOSTIC_METRIC];
}

const METRICS_TABLE: &str = "metrics";
const CONDITIONS_TABLE: &str = "conditions";

/// One stratified reference-range row for a lab test.
///
/// Bounds stay in their stored text form: they are only parsed when an
/// observation is evaluated, and flagged results quote them verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub name: String,
    pub sonic_codes: IndexSet<String>,
    pub sonic_units: IndexSet<String>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub gender: Gender,
    pub everlab_lower: Option<String>,
    pub everlab_higher: Option<String>,
    pub standard_lower: Option<String>,
    pub standard_higher: Option<String>,
}

fn cell<'a>(row: &'a Row, column: &str) -> &'a str {
    row.get(column).map(String::as_str).unwrap_or("")
}

fn optional(row: &Row, column: &str) -> Option<String> {
    Some(cell(row, column))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn members(row: &Row, column: &str, delimiter: char) -> IndexSet<String> {
    cell(row, column)
        .split(delimiter)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

impl MetricDefinition {
    /// Build a definition from a metrics-table row.
    ///
    /// `line` is the row's line number in the source file, used in errors.
    pub fn from_row(row: &Row, line: usize, delimiter: char) -> Result<Self, TableError> {
        let invalid = |column: &str, value: &str, reason: String| TableError::InvalidCell {
            table: METRICS_TABLE.to_string(),
            line,
            column: column.to_string(),
            value: value.to_string(),
            reason,
        };

        let age = |column: &str| -> Result<Option<u32>, TableError> {
            match cell(row, column) {
                "" => Ok(None),
                raw => raw
                    .parse::<u32>()
                    .map(Some)
                    .map_err(|e| invalid(column, raw, e.to_string())),
            }
        };

        let gender = match cell(row, metric_columns::GENDER) {
            "" => Gender::Any,
            raw => raw
                .parse::<Gender>()
                .map_err(|e| invalid(metric_columns::GENDER, raw, e))?,
        };

        Ok(Self {
            name: cell(row, metric_columns::NAME).to_string(),
            sonic_codes: members(row, metric_columns::SONIC_CODES, delimiter),
            sonic_units: members(row, metric_columns::SONIC_UNITS, delimiter),
            min_age: age(metric_columns::MIN_AGE)?,
            max_age: age(metric_columns::MAX_AGE)?,
            gender,
            everlab_lower: optional(row, metric_columns::EVERLAB_LOWER),
            everlab_higher: optional(row, metric_columns::EVERLAB_HIGHER),
            standard_lower: optional(row, metric_columns::STANDARD_LOWER),
            standard_higher: optional(row, metric_columns::STANDARD_HIGHER),
        })
    }

    /// True when this row describes the test identified by `code` reported in `unit`.
    pub fn identifies(&self, code: &str, unit: &str) -> bool {
        self.sonic_codes.contains(code) && self.sonic_units.contains(unit)
    }

    /// True when the row's age and gender constraints admit the patient.
    ///
    /// An unknown age only satisfies rows without age bounds.
    pub fn admits(&self, age: Option<i32>, gender: Gender) -> bool {
        let above_min = match (self.min_age, age) {
            (None, _) => true,
            (Some(min), Some(age)) => i64::from(age) >= i64::from(min),
            (Some(_), None) => false,
        };
        let below_max = match (self.max_age, age) {
            (None, _) => true,
            (Some(max), Some(age)) => i64::from(age) <= i64::from(max),
            (Some(_), None) => false,
        };
        let gender_ok = self.gender == Gender::Any || self.gender == gender;

        above_min && below_max && gender_ok
    }
}

/// A medical condition diagnosed by a metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub name: String,
    pub diagnostic_metric: String,
}

impl Condition {
    pub fn from_row(row: &Row) -> Self {
        Self {
            name: cell(row, condition_columns::NAME).to_string(),
            diagnostic_metric: cell(row, condition_columns::DIAGNOSTIC_METRIC).to_string(),
        }
    }
}

/// Locations of the two reference CSV files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSources {
    pub metrics: PathBuf,
    pub conditions: PathBuf,
    /// Separator between members of the code and unit columns
    pub list_delimiter: char,
}

/// Immutable in-memory reference data.
///
/// Built once at startup and shared (behind an `Arc`) by every request.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    metrics: Vec<MetricDefinition>,
    conditions: Vec<Condition>,
    /// diagnostic metric name -> index of the first condition naming it
    condition_index: HashMap<String, usize>,
}

impl ReferenceTable {
    pub fn new(metrics: Vec<MetricDefinition>, conditions: Vec<Condition>) -> Self {
        let mut condition_index = HashMap::new();
        for (i, condition) in conditions.iter().enumerate() {
            condition_index
                .entry(condition.diagnostic_metric.clone())
                .or_insert(i);
        }

        Self {
            metrics,
            conditions,
            condition_index,
        }
    }

    /// Load and validate both tables from disk.
    pub fn load(sources: &TableSources) -> Result<Self, TableError> {
        let metrics = load_table(&sources.metrics)?;
        let conditions = load_table(&sources.conditions)?;
        let table = Self::from_raw(&metrics, &conditions, sources.list_delimiter)?;

        tracing::info!(
            "Reference table ready: {} metric rows from {}, {} conditions from {}",
            table.metrics.len(),
            sources.metrics.display(),
            table.conditions.len(),
            sources.conditions.display()
        );
        Ok(table)
    }

    /// Build from already-read CSV tables.
    pub fn from_raw(
        metrics: &RawTable,
        conditions: &RawTable,
        delimiter: char,
    ) -> Result<Self, TableError> {
        metrics.require_columns(METRICS_TABLE, &metric_columns::ALL)?;
        conditions.require_columns(CONDITIONS_TABLE, &condition_columns::ALL)?;

        let metrics = metrics
            .numbered_rows()
            .map(|(line, row)| MetricDefinition::from_row(row, line, delimiter))
            .collect::<Result<Vec<_>, _>>()?;
        let conditions = conditions.rows.iter().map(Condition::from_row).collect();

        Ok(Self::new(metrics, conditions))
    }

    pub fn metrics(&self) -> &[MetricDefinition] {
        &self.metrics
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// First condition diagnosed by the named metric.
    pub fn condition_for(&self, metric_name: &str) -> Option<&Condition> {
        self.condition_index
            .get(metric_name)
            .map(|&i| &self.conditions[i])
    }
}

impl TableSources {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(metrics: P, conditions: Q) -> Self {
        Self {
            metrics: metrics.as_ref().to_path_buf(),
            conditions: conditions.as_ref().to_path_buf(),
            list_delimiter: ';',
        }
    }
}
