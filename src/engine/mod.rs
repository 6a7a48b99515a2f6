//! Range-checking engine: observation extraction, metric matching, risk
//! evaluation and batch orchestration.
//!
//! Everything here is pure computation over one upload plus the shared,
//! read-only [`ReferenceTable`](crate::reference::ReferenceTable).

pub mod observation;
pub mod matcher;
pub mod evaluator;
pub mod orchestrator;

pub use observation::{Observation, ObservationFields};
pub use matcher::{select_metric, MetricQuery};
pub use evaluator::{evaluate, parse_decimal, FlaggedResult, Verdict};
pub use orchestrator::{BatchEvaluator, BatchOutcome, BatchReport, ObservationScope};
