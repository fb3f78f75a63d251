//! Shared test utilities for building statement rows and statements.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::config::Sender;
use crate::model::{ParsedRecord, TransactionRow};

/// The header of an Etsy payment statement.
pub const STATEMENT_HEADER: &str =
    r#"Date,Type,Title,Info,Currency,Amount,"Fees & Taxes",Net,"Tax Details",Status,"Availability Date""#;

/// A statement row described with the strings Etsy would write.
#[derive(Debug, Clone)]
pub struct Row {
    date: String,
    kind: String,
    title: String,
    info: String,
    amount: String,
    fees: String,
    net: String,
}

impl Row {
    pub fn new(
        date: &str,
        kind: &str,
        title: &str,
        info: &str,
        amount: &str,
        fees: &str,
        net: &str,
    ) -> Self {
        Self {
            date: date.to_string(),
            kind: kind.to_string(),
            title: title.to_string(),
            info: info.to_string(),
            amount: amount.to_string(),
            fees: fees.to_string(),
            net: net.to_string(),
        }
    }

    /// `€<amount> sent to your bank account`
    pub fn deposit(date: &str, amount: &str) -> Self {
        let title = format!("€{amount} sent to your bank account");
        Self::new(date, "Deposit", &title, "", "--", "--", "--")
    }

    /// `Payment for Order #<order>` with the same amount in the Amount and Net columns.
    pub fn sale(date: &str, order: &str, amount: &str) -> Self {
        let title = format!("Payment for Order #{order}");
        Self::new(date, "Sale", &title, "", amount, "--", amount)
    }

    /// `Sales tax paid by buyer` referencing `Order #<order>`.
    pub fn tax(date: &str, order: &str, fees: &str) -> Self {
        let info = format!("Order #{order}");
        Self::new(date, "Tax", "Sales tax paid by buyer", &info, "--", fees, fees)
    }

    pub fn fee(date: &str, title: &str, info: &str, fees: &str) -> Self {
        Self::new(date, "Fee", title, info, "--", fees, fees)
    }

    pub fn marketing(date: &str, title: &str, fees: &str) -> Self {
        Self::new(date, "Marketing", title, "Bill for something", "--", fees, fees)
    }

    /// A refund row whose title references `Order #<order>`.
    pub fn refund(date: &str, title: &str, amount: &str, fees: &str, net: &str) -> Self {
        Self::new(date, "Refund", title, "", amount, fees, net)
    }

    pub fn fields(&self) -> Vec<String> {
        vec![
            format!("\"{}\"", self.date),
            self.kind.clone(),
            self.title.clone(),
            self.info.clone(),
            "EUR".to_string(),
            self.amount.clone(),
            self.fees.clone(),
            self.net.clone(),
            "--".to_string(),
            "--".to_string(),
            "--".to_string(),
        ]
    }

    /// The row as one CSV line.
    pub fn csv_line(&self) -> String {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        wtr.write_record(self.fields()).unwrap();
        let bytes = wtr.into_inner().unwrap();
        String::from_utf8(bytes).unwrap().trim_end().to_string()
    }
}

/// Parses a test row, panicking when it is not a processed kind.
pub fn row(r: Row) -> TransactionRow {
    match TransactionRow::parse(2, &r.fields()).unwrap() {
        ParsedRecord::Row(row) => row,
        other => panic!("expected a transaction row, got {other:?}"),
    }
}

/// Parses test rows, numbering their lines as they would be in a statement file.
pub fn rows(rows: &[Row]) -> Vec<TransactionRow> {
    rows.iter()
        .enumerate()
        .map(|(ix, r)| match TransactionRow::parse(ix + 2, &r.fields()).unwrap() {
            ParsedRecord::Row(row) => row,
            other => panic!("expected a transaction row, got {other:?}"),
        })
        .collect()
}

/// A full statement file, header included.
pub fn statement(rows: &[Row]) -> String {
    let mut s = String::from(STATEMENT_HEADER);
    s.push('\n');
    for r in rows {
        s.push_str(&r.csv_line());
        s.push('\n');
    }
    s
}

/// The seller used by invoice tests.
pub fn sender() -> Sender {
    Sender {
        company_name: "Muster Keramik UG".to_string(),
        name: "Erika Muster".to_string(),
        street: "Hauptstr. 1".to_string(),
        city: "Berlin".to_string(),
        postal_code: "10115".to_string(),
        country: "DE".to_string(),
        phone_number: "+49 30 1234567".to_string(),
        mail: "shop@example.com".to_string(),
        vat_id: "DE123456789".to_string(),
        hra: "HRB 12345".to_string(),
    }
}
