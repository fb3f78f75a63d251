use crate::model::Amount;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The default prefix of generated invoice numbers.
pub const DEFAULT_INVOICE_PREFIX: &str = "ETSY-";

/// Appended to an invoice number to form the number of its cancellation invoice.
pub const CANCELLATION_SUFFIX: &str = "-STORNO";

/// A buyer's shipping address as found in the sold-orders export.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Address {
    pub(crate) street_1: String,
    pub(crate) street_2: String,
    pub(crate) city: String,
    pub(crate) state: String,
    pub(crate) zipcode: String,
    pub(crate) country: String,
}

impl Address {
    pub fn new(
        street_1: impl Into<String>,
        street_2: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zipcode: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            street_1: street_1.into(),
            street_2: street_2.into(),
            city: city.into(),
            state: state.into(),
            zipcode: zipcode.into(),
            country: country.into(),
        }
    }

    pub fn street_2(&self) -> &str {
        &self.street_2
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn zipcode(&self) -> &str {
        &self.zipcode
    }

    /// The country display name, e.g. `Germany`.
    pub fn country(&self) -> &str {
        &self.country
    }

    /// A single-line rendering: `Street 1 Street 2, City, State Zip, Country`.
    pub fn one_line(&self) -> String {
        format!(
            "{} {}, {}, {} {}, {}",
            self.street_1, self.street_2, self.city, self.state, self.zipcode, self.country
        )
    }
}

/// An invoice to be rendered as an XRechnung document.
///
/// `amount` is the gross (VAT inclusive) amount exactly as it appears on the document, so it is
/// negative for cancellation invoices.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct InvoiceRecord {
    pub(crate) number: String,
    pub(crate) order_id: String,
    pub(crate) date: NaiveDate,
    pub(crate) amount: Amount,
    /// Sales tax collected and remitted by the marketplace, already excluded from `amount`.
    pub(crate) marketplace_tax: Amount,
    pub(crate) buyer: String,
    pub(crate) address: Address,
    /// ISO 3166-1 alpha-2 code of the buyer's country, empty when unknown.
    pub(crate) country_code: String,
    /// For a cancellation invoice, the number of the invoice it cancels (when known).
    pub(crate) cancels: Option<String>,
    pub(crate) is_cancellation: bool,
    pub(crate) reverse_charge: bool,
}

impl InvoiceRecord {
    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn marketplace_tax(&self) -> Amount {
        self.marketplace_tax
    }

    pub fn buyer(&self) -> &str {
        &self.buyer
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn cancels(&self) -> Option<&str> {
        self.cancels.as_deref()
    }

    pub fn is_cancellation(&self) -> bool {
        self.is_cancellation
    }

    pub fn reverse_charge(&self) -> bool {
        self.reverse_charge
    }
}

/// Hands out invoice numbers for one run and remembers which order each sale invoice belongs to.
///
/// Numbers look like `ETSY-2409-0001`: prefix, two-digit year, two-digit month and a four-digit
/// sequence shared by the whole run. The sequence starts at 1 for every run and is never reused
/// within a run.
#[derive(Debug, Clone)]
pub struct InvoiceNumberAllocator {
    prefix: String,
    counter: u32,
    by_order: HashMap<String, String>,
}

impl Default for InvoiceNumberAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_INVOICE_PREFIX)
    }
}

impl InvoiceNumberAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
            by_order: HashMap::new(),
        }
    }

    /// Allocates the next number, dated by `date`. Cancellation numbers carry the suffix.
    pub fn allocate(&mut self, date: NaiveDate, cancellation: bool) -> String {
        self.counter += 1;
        let mut number = format!(
            "{}{:02}{:02}-{:04}",
            self.prefix,
            date.year().rem_euclid(100),
            date.month(),
            self.counter
        );
        if cancellation {
            number.push_str(CANCELLATION_SUFFIX);
        }
        number
    }

    /// Remembers the invoice issued for a sale so a later refund can cancel it.
    pub fn record_sale(&mut self, order_id: impl Into<String>, invoice_number: impl Into<String>) {
        self.by_order.insert(order_id.into(), invoice_number.into());
    }

    /// The sale invoice issued for `order_id` during this run.
    pub fn sale_invoice(&self, order_id: &str) -> Option<&str> {
        self.by_order.get(order_id).map(String::as_str)
    }

    /// The number of the cancellation invoice for `order_id`, paired with the number of the
    /// invoice it cancels. Without a known sale invoice a fresh cancellation number is allocated.
    pub fn cancellation(&mut self, order_id: &str, date: NaiveDate) -> (String, Option<String>) {
        match self.sale_invoice(order_id).map(String::from) {
            Some(original) => (format!("{original}{CANCELLATION_SUFFIX}"), Some(original)),
            None => (self.allocate(date, true), None),
        }
    }

    /// How many numbers have been allocated so far.
    pub fn issued(&self) -> u32 {
        self.counter
    }
}
