use crate::model::Amount;
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;

/// The header of the ledger CSV, as expected by the bookkeeping import.
pub const LEDGER_HEADER: [&str; 5] = [
    "BUCHUNGSDATUM",
    "ZUSATZINFO",
    "AUFTRAGGEBER/EMPFÄNGER",
    "VERWENDUNGSZWECK",
    "BETRAG",
];

/// The date format of the ledger's posting date column.
pub const LEDGER_DATE_FORMAT: &str = "%d.%m.%Y";

/// The `ZUSATZINFO` column, which tells the bookkeeping import what kind of booking a line is.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum InfoTag {
    #[serde(rename = "Auszahlung")]
    Payout,
    #[serde(rename = "Verkauf")]
    Sale,
    #[serde(rename = "Rückerstattung")]
    Refund,
    #[serde(rename = "Gebühr")]
    Fee,
    #[serde(rename = "Marketing")]
    Marketing,
}

serde_plain::derive_display_from_serialize!(InfoTag);

/// One line of the output ledger.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct LedgerLine {
    pub(crate) posting_date: NaiveDate,
    pub(crate) info: InfoTag,
    pub(crate) counterparty: String,
    pub(crate) purpose: String,
    pub(crate) amount: Amount,
}

impl LedgerLine {
    pub fn new(
        posting_date: NaiveDate,
        info: InfoTag,
        counterparty: impl Into<String>,
        purpose: impl Into<String>,
        amount: Amount,
    ) -> Self {
        Self {
            posting_date,
            info,
            counterparty: counterparty.into(),
            purpose: purpose.into(),
            amount,
        }
    }

    pub fn posting_date(&self) -> NaiveDate {
        self.posting_date
    }

    pub fn info(&self) -> InfoTag {
        self.info
    }

    pub fn counterparty(&self) -> &str {
        &self.counterparty
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// The line as the five CSV cells of the ledger.
    pub fn to_record(&self) -> [String; 5] {
        [
            self.posting_date.format(LEDGER_DATE_FORMAT).to_string(),
            self.info.to_string(),
            self.counterparty.clone(),
            self.purpose.clone(),
            self.amount.ledger(),
        ]
    }
}

/// Collects ledger lines in emission order and writes them out, newest first.
#[derive(Debug, Default, Clone)]
pub struct LedgerWriter {
    lines: Vec<LedgerLine>,
}

impl LedgerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: LedgerLine) {
        self.lines.push(line);
    }

    pub fn extend(&mut self, lines: impl IntoIterator<Item = LedgerLine>) {
        self.lines.extend(lines);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The lines in emission order.
    pub fn lines(&self) -> &[LedgerLine] {
        &self.lines
    }

    /// Stable-sorts by posting date, newest first, and returns the lines. Lines with equal dates
    /// keep their emission order. Nothing is dropped or merged.
    pub fn into_sorted(mut self) -> Vec<LedgerLine> {
        self.lines
            .sort_by(|a, b| b.posting_date.cmp(&a.posting_date));
        self.lines
    }

    /// Writes the header and the sorted lines as CSV.
    pub fn write_csv<W: Write>(self, w: W) -> Result<Vec<LedgerLine>> {
        let lines = self.into_sorted();
        let mut wtr = csv::Writer::from_writer(w);
        wtr.write_record(LEDGER_HEADER)
            .context("Unable to write the ledger header")?;
        for line in &lines {
            wtr.write_record(line.to_record())
                .context("Unable to write a ledger line")?;
        }
        wtr.flush().context("Unable to flush the ledger")?;
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    #[test]
    fn test_record_format() {
        let line = LedgerLine::new(
            d(2024, 9, 10),
            InfoTag::Payout,
            "Etsy Ireland UC",
            "Geldtransit/Umbuchung/Auszahlung",
            amt("-123.45"),
        );
        assert_eq!(
            line.to_record(),
            [
                "10.09.2024",
                "Auszahlung",
                "Etsy Ireland UC",
                "Geldtransit/Umbuchung/Auszahlung",
                "-123,45"
            ]
        );
    }

    #[test]
    fn test_sort_is_descending_and_stable() {
        let mut w = LedgerWriter::new();
        w.push(LedgerLine::new(d(2024, 9, 10), InfoTag::Payout, "a", "1", amt("1")));
        w.push(LedgerLine::new(d(2024, 9, 30), InfoTag::Fee, "b", "2", amt("2")));
        w.push(LedgerLine::new(d(2024, 9, 15), InfoTag::Sale, "c", "3", amt("3")));
        w.push(LedgerLine::new(d(2024, 9, 30), InfoTag::Marketing, "d", "4", amt("4")));
        assert_eq!(w.len(), 4);

        let purposes: Vec<String> = w
            .into_sorted()
            .into_iter()
            .map(|l| l.purpose().to_string())
            .collect();
        assert_eq!(purposes, vec!["2", "4", "3", "1"]);
    }

    #[test]
    fn test_write_csv_quotes_and_header() {
        let mut w = LedgerWriter::new();
        w.push(LedgerLine::new(
            d(2024, 9, 15),
            InfoTag::Sale,
            "Jane Doe",
            "Invoice ETSY-2409-0001 - Bestellung #1",
            amt("82.70"),
        ));
        let mut buf = Vec::new();
        let lines = w.write_csv(&mut buf).unwrap();
        assert_eq!(lines.len(), 1);

        let text = String::from_utf8(buf).unwrap();
        let mut rows = text.lines();
        assert_eq!(
            rows.next(),
            Some("BUCHUNGSDATUM,ZUSATZINFO,AUFTRAGGEBER/EMPFÄNGER,VERWENDUNGSZWECK,BETRAG")
        );
        assert_eq!(
            rows.next(),
            Some("15.09.2024,Verkauf,Jane Doe,Invoice ETSY-2409-0001 - Bestellung #1,\"82,70\"")
        );
    }
}
