//! Buyer details from Etsy's "Sold Orders" exports.
//!
//! The payment statement does not name buyers. Etsy's separate `EtsySoldOrders*.csv` exports do,
//! and they are loaded into an `OrderBook` keyed by order id.

use crate::model::Address;
use crate::Result;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names of Etsy's sold-orders exports start with this.
pub const ORDERS_FILE_PREFIX: &str = "EtsySoldOrders";

/// The full name Etsy writes for an order that was cancelled before it shipped. There is no
/// real buyer behind it.
pub const PLACEHOLDER_BUYER: &str = "Etsy Refund";

/// The literal that separates the buyer from the order reference in a statement title,
/// e.g. `Jane Doe for Order #1234`.
const FOR_ORDER: &str = "for Order";

#[derive(Debug, Deserialize)]
struct OrderRecord {
    #[serde(rename = "Order ID")]
    order_id: String,
    #[serde(rename = "Full Name", default)]
    full_name: String,
    #[serde(rename = "Street 1", default)]
    street_1: String,
    #[serde(rename = "Street 2", default)]
    street_2: String,
    #[serde(rename = "Ship City", default)]
    city: String,
    #[serde(rename = "Ship State", default)]
    state: String,
    #[serde(rename = "Ship Zipcode", default)]
    zipcode: String,
    #[serde(rename = "Ship Country", default)]
    country: String,
}

/// The buyer and shipping address of one order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct OrderDetails {
    full_name: String,
    address: Address,
}

impl OrderDetails {
    pub fn new(full_name: impl Into<String>, address: Address) -> Self {
        Self {
            full_name: full_name.into(),
            address,
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// True when the order stands for a full cancellation rather than a real buyer.
    pub fn is_placeholder(&self) -> bool {
        let name = self.full_name.trim();
        name.is_empty() || name == PLACEHOLDER_BUYER
    }
}

/// Who an order was sold to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Buyer {
    /// The order was found in the sold-orders export.
    Known(OrderDetails),
    /// The order was not found; the name is taken from the statement title and the address is
    /// unknown.
    FromTitle(String),
    /// The order was found but has no real buyer. Such rows are not booked.
    Placeholder,
}

impl Buyer {
    /// The name written to the ledger's counterparty column.
    pub fn name(&self) -> &str {
        match self {
            Buyer::Known(details) => details.full_name(),
            Buyer::FromTitle(name) => name,
            Buyer::Placeholder => PLACEHOLDER_BUYER,
        }
    }

    /// The shipping address, or an empty address when it is unknown.
    pub fn address(&self) -> Address {
        match self {
            Buyer::Known(details) => details.address().clone(),
            _ => Address::default(),
        }
    }
}

/// Order id to buyer details.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: HashMap<String, OrderDetails>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one sold-orders export. Only `Order ID` is required; missing address columns are
    /// left empty.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut book = Self::new();
        for (ix, record) in rdr.deserialize::<OrderRecord>().enumerate() {
            let record =
                record.with_context(|| format!("Unable to read order on line {}", ix + 2))?;
            let address = Address::new(
                record.street_1,
                record.street_2,
                record.city,
                record.state,
                record.zipcode,
                record.country,
            );
            book.insert(record.order_id.trim(), OrderDetails::new(record.full_name, address));
        }
        Ok(book)
    }

    pub fn insert(&mut self, order_id: impl Into<String>, details: OrderDetails) {
        self.orders.insert(order_id.into(), details);
    }

    /// Merges `other` into this book. Entries of `other` replace entries for the same order id.
    pub fn merge(&mut self, other: OrderBook) {
        self.orders.extend(other.orders);
    }

    pub fn get(&self, order_id: &str) -> Option<&OrderDetails> {
        self.orders.get(order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Resolves the buyer of `order_id`. When the order is unknown, the name is the text of
    /// `title` before `for Order`.
    pub fn buyer(&self, order_id: &str, title: &str) -> Buyer {
        match self.get(order_id) {
            Some(details) if details.is_placeholder() => Buyer::Placeholder,
            Some(details) => Buyer::Known(details.clone()),
            None => {
                let name = title
                    .split_once(FOR_ORDER)
                    .map_or(title, |(before, _)| before)
                    .trim();
                debug!("Order {order_id} is not in the orders lookup, using '{name}' as buyer");
                Buyer::FromTitle(name.to_string())
            }
        }
    }
}

/// Lists the sold-orders exports in `dir`, sorted by file name.
pub async fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Unable to read orders directory {}", dir.display()))?;
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Unable to read orders directory {}", dir.display()))?
    {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(ORDERS_FILE_PREFIX) && name.ends_with(".csv") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
Sale Date,Order ID,Buyer User ID,Full Name,First Name,Last Name,Number of Items,Street 1,Street 2,Ship City,Ship State,Ship Zipcode,Ship Country
09/15/24,9876543210,jdoe,Jane Doe,Jane,Doe,1,Hauptstr. 1,,Berlin,,10115,Germany
09/16/24,1111111111,xx,Etsy Refund,,,1,,,,,,
09/17/24,2222222222,yy,,,,1,,,,,,
";

    #[test]
    fn test_from_csv_reads_named_columns() {
        let book = OrderBook::from_csv(EXPORT.as_bytes()).unwrap();
        assert_eq!(book.len(), 3);
        let details = book.get("9876543210").unwrap();
        assert_eq!(details.full_name(), "Jane Doe");
        assert_eq!(details.address().city(), "Berlin");
        assert_eq!(details.address().country(), "Germany");
        assert_eq!(
            details.address().one_line(),
            "Hauptstr. 1 , Berlin,  10115, Germany"
        );
    }

    #[test]
    fn test_buyer_resolution() {
        let book = OrderBook::from_csv(EXPORT.as_bytes()).unwrap();
        assert_eq!(book.buyer("9876543210", "Payment for Order #9876543210").name(), "Jane Doe");
        assert_eq!(book.buyer("1111111111", "x"), Buyer::Placeholder);
        assert_eq!(book.buyer("2222222222", "x"), Buyer::Placeholder);

        let unknown = book.buyer("42", "Max Mustermann for Order #42");
        assert_eq!(unknown, Buyer::FromTitle("Max Mustermann".to_string()));
        assert_eq!(unknown.address(), Address::default());
    }

    #[test]
    fn test_merge_later_wins() {
        let mut book = OrderBook::from_csv(EXPORT.as_bytes()).unwrap();
        let mut later = OrderBook::new();
        later.insert(
            "9876543210",
            OrderDetails::new("Jane Roe", Address::new("", "", "Hamburg", "", "20095", "Germany")),
        );
        book.merge(later);
        assert_eq!(book.get("9876543210").unwrap().full_name(), "Jane Roe");
        assert_eq!(book.len(), 3);
    }

    #[tokio::test]
    async fn test_discover_sorts_and_filters() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in [
            "EtsySoldOrders2024-10.csv",
            "EtsySoldOrders2024-09.csv",
            "EtsyDirectCheckout2024-09.csv",
            "EtsySoldOrders.txt",
        ] {
            tokio::fs::write(dir.path().join(name), "Order ID\n").await.unwrap();
        }
        let found = discover(dir.path()).await.unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["EtsySoldOrders2024-09.csv", "EtsySoldOrders2024-10.csv"]
        );
    }
}
