//! The standalone invoice table rendered by the `invoices` command.
//!
//! One row per invoice: `Invoice Number, Order Info, Amount, Date, Buyer, Street 1, Street 2,
//! City, Zipcode, Country`, optionally followed by `Is Cancellation, Original Invoice Number,
//! Reverse Charge`. Amounts are VAT inclusive and written positive; cancellations are negated.

use crate::countries::CountryCodes;
use crate::model::{order_id_after_hash, Address, Amount, InvoiceRecord};
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;
use tracing::{debug, warn};

/// The date format of the `Date` column.
pub const INVOICE_TABLE_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct InvoiceTableRecord {
    #[serde(rename = "Invoice Number")]
    number: String,
    #[serde(rename = "Order Info")]
    order_info: String,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Buyer", default)]
    buyer: String,
    #[serde(rename = "Street 1", default)]
    street_1: String,
    #[serde(rename = "Street 2", default)]
    street_2: String,
    #[serde(rename = "City", default)]
    city: String,
    #[serde(rename = "Zipcode", default)]
    zipcode: String,
    #[serde(rename = "Country", default)]
    country: String,
    #[serde(rename = "Is Cancellation", default)]
    is_cancellation: String,
    #[serde(rename = "Original Invoice Number", default)]
    original: String,
    #[serde(rename = "Reverse Charge", default)]
    reverse_charge: String,
}

/// Reads the invoice table. Any row that cannot be read fails the whole table.
pub fn read_invoice_table<R: Read>(
    reader: R,
    countries: &CountryCodes,
) -> Result<Vec<InvoiceRecord>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut invoices = Vec::new();
    for (ix, record) in rdr.deserialize::<InvoiceTableRecord>().enumerate() {
        let line = ix + 2;
        let record =
            record.with_context(|| format!("Unable to read invoice on line {line}"))?;
        let invoice = record
            .into_invoice(countries)
            .with_context(|| format!("Invalid invoice on line {line}"))?;
        debug!("Read invoice {} from line {line}", invoice.number());
        invoices.push(invoice);
    }
    Ok(invoices)
}

impl InvoiceTableRecord {
    fn into_invoice(self, countries: &CountryCodes) -> Result<InvoiceRecord> {
        let number = self.number.trim().to_string();
        anyhow::ensure!(!number.is_empty(), "The invoice number is empty");
        let amount = Amount::from_str(self.amount.trim())
            .with_context(|| format!("Unable to parse the amount '{}'", self.amount))?;
        let date = NaiveDate::parse_from_str(self.date.trim(), INVOICE_TABLE_DATE_FORMAT)
            .with_context(|| format!("Unable to parse the date '{}'", self.date))?;
        let is_cancellation = flag(&self.is_cancellation);
        let amount = if is_cancellation {
            -amount.abs()
        } else {
            amount
        };
        let country_code = countries.code(&self.country).to_string();
        if country_code.is_empty() {
            warn!(
                "Invoice {number}: country '{}' is not in the country table",
                self.country
            );
        }
        let order_id = order_id_after_hash(&self.order_info)
            .unwrap_or_else(|| self.order_info.trim().to_string());
        let original = self.original.trim();
        Ok(InvoiceRecord {
            number,
            order_id,
            date,
            amount,
            marketplace_tax: Amount::ZERO,
            buyer: self.buyer.trim().to_string(),
            address: Address::new(
                self.street_1,
                self.street_2,
                self.city,
                "",
                self.zipcode,
                self.country,
            ),
            country_code,
            cancels: (is_cancellation && !original.is_empty()).then(|| original.to_string()),
            is_cancellation,
            reverse_charge: flag(&self.reverse_charge),
        })
    }
}

/// Spreadsheet style booleans: `True`, `true`, `1`, `yes`, `ja`, `x`.
fn flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "ja" | "x"
    )
}
