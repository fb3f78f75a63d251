use crate::error::MalformedRowError;
use crate::model::Amount;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// The date format of the statement's Date column, e.g. `September 1, 2024`.
pub const STATEMENT_DATE_FORMAT: &str = "%B %d, %Y";

/// Positional columns of an Etsy payment statement:
/// `Date,Type,Title,Info,Currency,Amount,"Fees & Taxes",Net,"Tax Details",...`
const DATE_IDX: usize = 0;
const KIND_IDX: usize = 1;
const TITLE_IDX: usize = 2;
const INFO_IDX: usize = 3;
const CURRENCY_IDX: usize = 4;
const AMOUNT_IDX: usize = 5;
const FEES_AND_TAXES_IDX: usize = 6;
const NET_IDX: usize = 7;
const REQUIRED_COLUMNS: usize = NET_IDX + 1;

/// The kinds of statement rows this tool understands.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TransactionKind {
    Deposit,
    Sale,
    Refund,
    Tax,
    Fee,
    Marketing,
}

serde_plain::derive_display_from_serialize!(TransactionKind);
serde_plain::derive_fromstr_from_deserialize!(TransactionKind);

/// One parsed row of the statement. Rows are immutable once parsed.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct TransactionRow {
    /// The 1-based line of the row in the input file (the header is line 1).
    pub(crate) line: usize,
    pub(crate) date: NaiveDate,
    pub(crate) kind: TransactionKind,
    /// Etsy's "Title" column, e.g. `Payment for Order #1234567890`.
    pub(crate) title: String,
    /// Etsy's "Info" column, e.g. `Order #1234567890`.
    pub(crate) info: String,
    pub(crate) currency: String,
    pub(crate) gross_amount: Option<Amount>,
    pub(crate) fees_and_taxes: Option<Amount>,
    pub(crate) net_amount: Option<Amount>,
    /// The raw record joined with commas, used in diagnostics.
    pub(crate) raw: String,
}

/// The outcome of parsing a statement record.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ParsedRecord {
    Row(TransactionRow),
    /// A row whose kind is not processed (e.g. `Payment` or `Shipping`).
    Unknown { line: usize, kind: String },
}

impl TransactionRow {
    /// Parses one statement record. `line` is the 1-based line number used in diagnostics.
    pub fn parse<S>(line: usize, fields: &[S]) -> Result<ParsedRecord, MalformedRowError>
    where
        S: AsRef<str>,
    {
        let raw = fields
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        if fields.len() < REQUIRED_COLUMNS {
            return Err(MalformedRowError::MissingColumn {
                line,
                expected: REQUIRED_COLUMNS,
                found: fields.len(),
                raw,
            });
        }
        let field = |ix: usize| fields[ix].as_ref().trim();

        let date_str = field(DATE_IDX).trim_matches('"').trim();
        let date = NaiveDate::parse_from_str(date_str, STATEMENT_DATE_FORMAT).map_err(|_| {
            MalformedRowError::Date {
                line,
                value: date_str.to_string(),
                raw: raw.clone(),
            }
        })?;

        let kind = match field(KIND_IDX).parse::<TransactionKind>() {
            Ok(kind) => kind,
            Err(_) => {
                return Ok(ParsedRecord::Unknown {
                    line,
                    kind: field(KIND_IDX).to_string(),
                })
            }
        };

        let amount = |ix: usize, name: &'static str| {
            Amount::parse_field(field(ix)).map_err(|e| MalformedRowError::Amount {
                line,
                field: name,
                value: field(ix).to_string(),
                reason: e.to_string(),
                raw: raw.clone(),
            })
        };
        let gross_amount = amount(AMOUNT_IDX, "amount")?;
        let fees_and_taxes = amount(FEES_AND_TAXES_IDX, "fees & taxes")?;
        let net_amount = amount(NET_IDX, "net")?;

        Ok(ParsedRecord::Row(TransactionRow {
            line,
            date,
            kind,
            title: field(TITLE_IDX).to_string(),
            info: field(INFO_IDX).to_string(),
            currency: field(CURRENCY_IDX).to_string(),
            gross_amount,
            fees_and_taxes,
            net_amount,
            raw,
        }))
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn gross_amount(&self) -> Option<Amount> {
        self.gross_amount
    }

    pub fn fees_and_taxes(&self) -> Option<Amount> {
        self.fees_and_taxes
    }

    pub fn net_amount(&self) -> Option<Amount> {
        self.net_amount
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The `(year, month)` the row belongs to.
    pub fn month(&self) -> YearMonth {
        YearMonth::of(self.date)
    }

    /// The settled value of the row: the net column, falling back to the amount column.
    pub fn settled_amount(&self) -> Option<Amount> {
        self.net_amount.or(self.gross_amount)
    }

    /// The sale or refund amount, or an error naming the row when both columns are `--`.
    pub(crate) fn require_settled_amount(&self) -> Result<Amount, MalformedRowError> {
        self.settled_amount()
            .ok_or_else(|| MalformedRowError::MissingAmount {
                line: self.line,
                kind: self.kind.to_string(),
                field: "net or amount value",
                raw: self.raw.clone(),
            })
    }

    /// The order id referenced by the title: the token following the first `#`.
    pub fn title_order_id(&self) -> Option<String> {
        order_id_after_hash(&self.title)
    }
}

/// A calendar month.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The last calendar day of the month.
    pub fn last_day(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|first_of_next| first_of_next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }
}

/// Returns the alphanumeric token after the first `#` in `text`, e.g. `1234` for
/// `Payment for Order #1234`.
pub fn order_id_after_hash(text: &str) -> Option<String> {
    let (_, rest) = text.split_once('#')?;
    token(rest)
}

/// Returns every order id written as `Order #<id>` inside `text`.
pub fn order_ids_in(text: &str) -> Vec<String> {
    text.match_indices(ORDER_MARKER)
        .filter_map(|(ix, marker)| token(&text[ix + marker.len()..]))
        .collect()
}

/// The literal that introduces an order reference.
pub const ORDER_MARKER: &str = "Order #";

fn token(s: &str) -> Option<String> {
    let id: String = s
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
