//! Monthly aggregation of Etsy fees and marketing charges.
//!
//! Individual fee rows are not booked one by one. They are summed per recipient and category
//! for each calendar month and booked as one line per category, dated to the last day of the
//! month. The month is closed as soon as a fee row from a different month arrives, and once more
//! when the statement ends.

use crate::model::{Amount, InfoTag, LedgerLine, TransactionKind, TransactionRow, YearMonth};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

/// Every fee on an Etsy statement is charged by this company.
pub const ETSY_RECIPIENT: &str = "Etsy Ireland UC";

/// Titles of fee credits start with this marker, e.g. `Credit for transaction fee`.
pub const CREDIT_MARKER: &str = "Credit for";

/// The buckets fees are summed into. The label is what appears in the ledger.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum FeeCategory {
    #[serde(rename = "Listing Fees")]
    ListingFees,
    #[serde(rename = "Renew Sold Fees")]
    RenewSoldFees,
    #[serde(rename = "Transaction Fees")]
    TransactionFees,
    #[serde(rename = "Processing Fees")]
    ProcessingFees,
    #[serde(rename = "Etsy Ads Fees")]
    EtsyAdsFees,
    #[serde(rename = "Offsite Ads Fees")]
    OffsiteAdsFees,
}

impl FeeCategory {
    /// Ads are booked as marketing, everything else as a fee.
    pub fn info_tag(&self) -> InfoTag {
        match self {
            FeeCategory::EtsyAdsFees | FeeCategory::OffsiteAdsFees => InfoTag::Marketing,
            _ => InfoTag::Fee,
        }
    }
}

serde_plain::derive_display_from_serialize!(FeeCategory);

/// What a fee title says it is, before the listing/renewal distinction is made.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FeeKind {
    Listing,
    Transaction,
    Processing,
    EtsyAds,
    OffsiteAds,
}

/// Classification rules, checked top to bottom against the lower-cased title. First hit wins.
const RULES: [(&str, FeeKind); 5] = [
    ("listing fee", FeeKind::Listing),
    ("transaction fee", FeeKind::Transaction),
    ("processing fee", FeeKind::Processing),
    ("etsy ads", FeeKind::EtsyAds),
    ("offsite ads", FeeKind::OffsiteAds),
];

/// Classifies a fee title. Credits are classified as the fee they credit.
pub fn classify(title: &str) -> Option<FeeKind> {
    let (_, subject) = unwrap_credit(title);
    let lower = subject.to_lowercase();
    RULES
        .iter()
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, kind)| *kind)
}

/// Splits `Credit for transaction fee` into `(true, "transaction fee")`. Titles without the
/// credit marker are returned unchanged.
pub fn unwrap_credit(title: &str) -> (bool, &str) {
    match title.split_once(CREDIT_MARKER) {
        Some((_, rest)) => (true, rest.trim()),
        None => (false, title),
    }
}

/// Where the aggregator is in its monthly cycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum FeeState {
    /// No fee row seen yet, or the last month has been closed at the end of the statement.
    Idle,
    /// Summing fees for this month.
    Accumulating(YearMonth),
}

/// The result of feeding one row to the aggregator.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct FeeStep {
    /// Lines for the previous month, when this row opened a new month.
    pub flushed: Vec<LedgerLine>,
    /// The bucket the row was added to; `None` when the title matched no rule and the row was
    /// dropped.
    pub category: Option<FeeCategory>,
}

/// Sums fees per recipient and category for one calendar month at a time.
#[derive(Debug, Clone)]
pub struct FeeAggregator {
    state: FeeState,
    totals: IndexMap<String, IndexMap<FeeCategory, Amount>>,
    /// Set when the previous fee row was a processing fee: the listing fee that follows it is
    /// the automatic renewal of the listing that just sold.
    renewal_pending: bool,
    flushes: usize,
}

impl Default for FeeAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl FeeAggregator {
    pub fn new() -> Self {
        Self {
            state: FeeState::Idle,
            totals: IndexMap::new(),
            renewal_pending: false,
            flushes: 0,
        }
    }

    pub fn state(&self) -> FeeState {
        self.state
    }

    /// The number of flushes that emitted at least one line.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// The running total of a bucket in the open month.
    pub fn total(&self, recipient: &str, category: FeeCategory) -> Option<Amount> {
        self.totals.get(recipient)?.get(&category).copied()
    }

    /// Feeds one `Fee` or `Marketing` row. When the row belongs to a different month than the
    /// one being summed, that month is closed first and its lines are returned in the step.
    pub fn accumulate(&mut self, row: &TransactionRow) -> FeeStep {
        let month = row.month();
        let mut step = FeeStep::default();
        if let FeeState::Accumulating(open) = self.state {
            if open != month {
                debug!("Month changed: {open:?} -> {month:?}");
                step.flushed = self.flush(open);
            }
        }
        self.state = FeeState::Accumulating(month);

        let Some(kind) = classify(row.title()) else {
            if row.kind() == TransactionKind::Fee {
                self.renewal_pending = false;
            }
            return step;
        };

        let category = match kind {
            FeeKind::Listing if self.renewal_pending => FeeCategory::RenewSoldFees,
            FeeKind::Listing => FeeCategory::ListingFees,
            FeeKind::Transaction => FeeCategory::TransactionFees,
            FeeKind::Processing => FeeCategory::ProcessingFees,
            FeeKind::EtsyAds => FeeCategory::EtsyAdsFees,
            FeeKind::OffsiteAds => FeeCategory::OffsiteAdsFees,
        };
        if row.kind() == TransactionKind::Fee {
            self.renewal_pending = kind == FeeKind::Processing;
        }

        self.add(ETSY_RECIPIENT, category, row.fees_and_taxes());
        step.category = Some(category);
        step
    }

    /// Closes the open month at the end of the statement. The lines are dated to the last day of
    /// `last`, the month of the statement's final row, which may be later than the open month.
    /// Without `last` the open month is used. Returns no lines when nothing was summed.
    pub fn finish(&mut self, last: Option<YearMonth>) -> Vec<LedgerLine> {
        match std::mem::replace(&mut self.state, FeeState::Idle) {
            FeeState::Accumulating(open) => self.flush(last.unwrap_or(open)),
            FeeState::Idle => Vec::new(),
        }
    }

    /// Fees are deductions (`-€2.20`) and credits are additions (`€2.20`), while a bucket holds
    /// the total fee burden as a positive number: a negative amount is added as its magnitude,
    /// a non-negative amount is subtracted.
    fn add(&mut self, recipient: &str, category: FeeCategory, amount: Option<Amount>) {
        let total = self
            .totals
            .entry(recipient.to_string())
            .or_default()
            .entry(category)
            .or_insert(Amount::ZERO);
        if let Some(amount) = amount {
            *total = if amount.is_negative() {
                *total + amount.abs()
            } else {
                *total - amount
            };
        }
        debug!("{category} for {recipient} is now {total} EUR");
    }

    fn flush(&mut self, month: YearMonth) -> Vec<LedgerLine> {
        let date = month.last_day();
        let lines: Vec<LedgerLine> = self
            .totals
            .drain(..)
            .flat_map(|(recipient, buckets)| {
                buckets.into_iter().map(move |(category, total)| {
                    LedgerLine::new(
                        date,
                        category.info_tag(),
                        recipient.clone(),
                        category.to_string(),
                        -total,
                    )
                })
            })
            .collect();
        if !lines.is_empty() {
            self.flushes += 1;
            info!("Closed fees for {} with {} lines", date, lines.len());
        }
        lines
    }
}
