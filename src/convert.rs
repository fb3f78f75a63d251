//! The conversion run: read the statement, sort it, route every row and collect the results.
//!
//! The whole statement is held in memory. Rows are sorted by date once and then visited exactly
//! once, in that order. Sales and refunds are resolved against the full row set, fees are summed
//! per month, and deposits are booked as they are.

use crate::countries::CountryCodes;
use crate::error::{Audit, MalformedRowError, Warning};
use crate::fees::{FeeAggregator, ETSY_RECIPIENT};
use crate::index::CrossReferenceIndex;
use crate::model::{
    Amount, InfoTag, InvoiceNumberAllocator, InvoiceRecord, LedgerLine, LedgerWriter,
    ParsedRecord, TransactionKind, TransactionRow, DEFAULT_INVOICE_PREFIX,
};
use crate::orders::OrderBook;
use crate::resolve::{resolve_refund, resolve_sale, Lookups, Resolution};
use crate::Result;
use anyhow::Context;
use serde::Serialize;
use std::io::Read;
use tracing::{debug, info, warn};

/// The purpose written for payouts to the seller's bank account.
pub const PAYOUT_PURPOSE: &str = "Geldtransit/Umbuchung/Auszahlung";

/// The only currency the ledger is kept in.
pub const LEDGER_CURRENCY: &str = "EUR";

/// Counts describing one conversion run.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct Summary {
    pub rows: usize,
    pub deposits: usize,
    pub sales: usize,
    pub refunds: usize,
    pub taxes: usize,
    pub fees: usize,
    pub skipped: usize,
    pub fee_flushes: usize,
    pub ledger_lines: usize,
    pub invoices: usize,
    pub unhandled_categories: usize,
    pub warnings: usize,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub ledger: LedgerWriter,
    pub invoices: Vec<InvoiceRecord>,
    pub audit: Audit,
    pub summary: Summary,
}

/// Reads a payment statement. The header row is skipped, unknown row kinds are recorded in
/// `audit` and left out, and the rows are returned sorted by date (stable, oldest first).
pub fn read_statement<R: Read>(reader: R, audit: &mut Audit) -> Result<Vec<TransactionRow>> {
    // Data rows may carry fewer trailing columns than the header.
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (ix, record) in rdr.records().enumerate() {
        let record = record.context("Unable to read the statement")?;
        let line = record
            .position()
            .map_or(ix + 2, |p| p.line() as usize);
        let fields: Vec<&str> = record.iter().collect();
        match TransactionRow::parse(line, &fields)? {
            ParsedRecord::Row(row) => {
                if row.currency() != LEDGER_CURRENCY {
                    warn!(
                        "Line {line}: amount is in '{}', it is booked as {LEDGER_CURRENCY}",
                        row.currency()
                    );
                }
                rows.push(row);
            }
            ParsedRecord::Unknown { line, kind } => {
                audit.record(Warning::UnknownKind { line, kind });
            }
        }
    }
    rows.sort_by_key(|row| row.date());
    info!("Read and sorted {} rows", rows.len());
    Ok(rows)
}

/// Runs the conversion against one set of lookups. Each `Converter` owns its invoice counter, so
/// separate runs never share numbers.
#[derive(Debug)]
pub struct Converter<'a> {
    orders: &'a OrderBook,
    countries: &'a CountryCodes,
    allocator: InvoiceNumberAllocator,
}

impl<'a> Converter<'a> {
    pub fn new(orders: &'a OrderBook, countries: &'a CountryCodes) -> Self {
        Self {
            orders,
            countries,
            allocator: InvoiceNumberAllocator::new(DEFAULT_INVOICE_PREFIX),
        }
    }

    pub fn with_invoice_prefix(mut self, prefix: &str) -> Self {
        self.allocator = InvoiceNumberAllocator::new(prefix);
        self
    }

    /// Reads and converts a statement.
    pub fn convert<R: Read>(self, statement: R) -> Result<Conversion> {
        let mut audit = Audit::new();
        let rows = read_statement(statement, &mut audit)?;
        self.run(&rows, audit)
    }

    /// Converts rows that are already sorted by date.
    pub fn run(mut self, rows: &[TransactionRow], mut audit: Audit) -> Result<Conversion> {
        let lookups = Lookups {
            index: CrossReferenceIndex::build(rows),
            orders: self.orders,
            countries: self.countries,
        };
        debug!("{} orders referenced by the statement", lookups.index.orders());

        let mut fees = FeeAggregator::new();
        let mut ledger = LedgerWriter::new();
        let mut invoices = Vec::new();
        let mut summary = Summary {
            rows: rows.len(),
            skipped: audit.count(|w| matches!(w, Warning::UnknownKind { .. })),
            ..Summary::default()
        };

        for row in rows {
            match row.kind() {
                TransactionKind::Deposit => {
                    summary.deposits += 1;
                    ledger.push(deposit(row)?);
                }
                TransactionKind::Sale => {
                    summary.sales += 1;
                    let resolved = resolve_sale(row, &lookups, &mut self.allocator, &mut audit)?;
                    book(resolved, &mut ledger, &mut invoices, &mut summary);
                }
                TransactionKind::Refund => {
                    summary.refunds += 1;
                    let resolved =
                        resolve_refund(row, &lookups, &mut self.allocator, &mut audit)?;
                    book(resolved, &mut ledger, &mut invoices, &mut summary);
                }
                TransactionKind::Tax => {
                    // Consumed by the sale and refund of the same order.
                    summary.taxes += 1;
                }
                TransactionKind::Fee | TransactionKind::Marketing => {
                    summary.fees += 1;
                    let step = fees.accumulate(row);
                    ledger.extend(step.flushed);
                    if step.category.is_none() {
                        audit.record(Warning::UnhandledCategory {
                            line: row.line(),
                            description: row.title().to_string(),
                        });
                    }
                }
            }
        }
        ledger.extend(fees.finish(rows.last().map(TransactionRow::month)));

        summary.fee_flushes = fees.flushes();
        summary.ledger_lines = ledger.len();
        summary.invoices = invoices.len();
        summary.unhandled_categories = audit.unhandled_categories();
        summary.warnings = audit.warnings().len();
        info!(
            "Converted {} rows into {} ledger lines and {} invoices",
            summary.rows, summary.ledger_lines, summary.invoices
        );

        Ok(Conversion {
            ledger,
            invoices,
            audit,
            summary,
        })
    }
}

/// A payout to the bank account. The amount is only written in the title.
fn deposit(row: &TransactionRow) -> Result<LedgerLine> {
    let amount =
        Amount::find_in_text(row.title()).map_err(|e| MalformedRowError::Amount {
            line: row.line(),
            field: "title",
            value: row.title().to_string(),
            reason: e.to_string(),
            raw: row.raw().to_string(),
        })?;
    Ok(LedgerLine::new(
        row.date(),
        InfoTag::Payout,
        ETSY_RECIPIENT,
        PAYOUT_PURPOSE,
        -amount,
    ))
}

fn book(
    resolved: Option<Resolution>,
    ledger: &mut LedgerWriter,
    invoices: &mut Vec<InvoiceRecord>,
    summary: &mut Summary,
) {
    match resolved {
        Some(Resolution { line, invoice }) => {
            ledger.push(line);
            invoices.push(invoice);
        }
        None => summary.skipped += 1,
    }
}
