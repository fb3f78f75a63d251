//! Error and warning types.
//!
//! Anything that aborts a run is an `anyhow::Error`. Row-level parse failures are raised as the
//! typed `MalformedRowError` so that callers (and tests) can tell them apart from I/O failures.
//! Non-fatal findings are collected as `Warning`s and reported at the end of the run.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use tracing::warn;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// A transaction row that cannot be interpreted. Fatal for the whole run: monthly flushes and
/// cross references are only correct when every row parses.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MalformedRowError {
    #[error("line {line}: unable to parse date '{value}', expected e.g. 'September 1, 2024' (row: {raw})")]
    Date {
        line: usize,
        value: String,
        raw: String,
    },

    #[error("line {line}: unable to parse {field} '{value}' as an amount: {reason} (row: {raw})")]
    Amount {
        line: usize,
        field: &'static str,
        value: String,
        reason: String,
        raw: String,
    },

    #[error("line {line}: expected at least {expected} columns, found {found} (row: {raw})")]
    MissingColumn {
        line: usize,
        expected: usize,
        found: usize,
        raw: String,
    },

    #[error("line {line}: {kind} row has no {field} (row: {raw})")]
    MissingAmount {
        line: usize,
        kind: String,
        field: &'static str,
        raw: String,
    },
}

/// A non-fatal problem found while converting. Every variant is logged with `warn!` when it is
/// recorded and counted in the run summary.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "warning")]
pub enum Warning {
    /// A correlated row (tax, original sale) was not found; a zero adjustment was used.
    MissingCorrelation {
        line: usize,
        order_id: String,
        wanted: String,
    },
    /// A fee or marketing row matched no known category and was dropped from aggregation.
    UnhandledCategory { line: usize, description: String },
    /// A fee credit for a refunded order was not applied to the refund amount.
    UnhandledCredit {
        line: usize,
        order_id: String,
        description: String,
    },
    /// The order resolved to the placeholder buyer, so no ledger line or invoice was produced.
    UnresolvedBuyer { line: usize, order_id: String },
    /// The row's kind is not one that this tool processes.
    UnknownKind { line: usize, kind: String },
    /// A sale or refund that should reference an order carries no order number.
    MissingOrderId { line: usize, description: String },
}

impl Warning {
    /// The input line the warning refers to.
    pub fn line(&self) -> usize {
        match self {
            Warning::MissingCorrelation { line, .. }
            | Warning::UnhandledCategory { line, .. }
            | Warning::UnhandledCredit { line, .. }
            | Warning::UnresolvedBuyer { line, .. }
            | Warning::UnknownKind { line, .. }
            | Warning::MissingOrderId { line, .. } => *line,
        }
    }
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingCorrelation {
                line,
                order_id,
                wanted,
            } => write!(
                f,
                "line {line}: no {wanted} row found for order {order_id}, using a zero adjustment"
            ),
            Warning::UnhandledCategory { line, description } => write!(
                f,
                "line {line}: fee '{description}' matches no category and was not booked"
            ),
            Warning::UnhandledCredit {
                line,
                order_id,
                description,
            } => write!(
                f,
                "line {line}: fee credit '{description}' for order {order_id} was not applied"
            ),
            Warning::UnresolvedBuyer { line, order_id } => write!(
                f,
                "line {line}: order {order_id} has no real buyer, skipping it"
            ),
            Warning::UnknownKind { line, kind } => {
                write!(f, "line {line}: skipping row of unknown type '{kind}'")
            }
            Warning::MissingOrderId { line, description } => write!(
                f,
                "line {line}: '{description}' references no order, skipping it"
            ),
        }
    }
}

/// The warnings of one run, in the order they were found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Audit {
    warnings: Vec<Warning>,
}

impl Audit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs and keeps a warning.
    pub fn record(&mut self, warning: Warning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// The number of fee and marketing rows that were dropped from aggregation.
    pub fn unhandled_categories(&self) -> usize {
        self.count(|w| matches!(w, Warning::UnhandledCategory { .. }))
    }

    pub fn count(&self, pred: impl Fn(&Warning) -> bool) -> usize {
        self.warnings.iter().filter(|w| pred(w)).count()
    }
}
