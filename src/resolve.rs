//! Turns sale and refund rows into ledger lines and invoices.
//!
//! Both need rows from elsewhere in the statement: the tax Etsy collected for the order, the
//! original sale of a refunded order, and the fee credits Etsy granted for the refund. These are
//! looked up through the `CrossReferenceIndex`.

use crate::countries::CountryCodes;
use crate::error::{Audit, Warning};
use crate::fees::{classify, unwrap_credit, FeeKind, CREDIT_MARKER};
use crate::index::CrossReferenceIndex;
use crate::model::{
    Address, Amount, InfoTag, InvoiceNumberAllocator, InvoiceRecord, LedgerLine, TransactionKind,
    TransactionRow, NOT_APPLICABLE,
};
use crate::orders::{Buyer, OrderBook};
use crate::Result;
use tracing::{debug, info};

/// Sale titles that belong to an order contain this, e.g. `Payment for Order #1234`.
const FOR_ORDER: &str = "for Order";

/// Refund titles for partial refunds contain this.
const PARTIAL: &str = "Partial";

/// The read-only lookups shared by every resolver call of a run.
#[derive(Debug, Clone)]
pub struct Lookups<'a> {
    pub index: CrossReferenceIndex<'a>,
    pub orders: &'a OrderBook,
    pub countries: &'a CountryCodes,
}

/// A resolved sale or refund.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Resolution {
    pub line: LedgerLine,
    pub invoice: InvoiceRecord,
}

/// Books a sale: gross minus the sales tax Etsy collected, and one invoice.
///
/// Returns `None` for sales that belong to no order (e.g. gift cards) and for orders without a
/// real buyer.
pub fn resolve_sale(
    row: &TransactionRow,
    lookups: &Lookups<'_>,
    allocator: &mut InvoiceNumberAllocator,
    audit: &mut Audit,
) -> Result<Option<Resolution>> {
    let Some(order_id) = row
        .title()
        .contains(FOR_ORDER)
        .then(|| row.title_order_id())
        .flatten()
    else {
        info!("Line {}: '{}' is not an order sale, skipping it", row.line(), row.title());
        return Ok(None);
    };

    let buyer = lookups.orders.buyer(&order_id, row.title());
    if buyer == Buyer::Placeholder {
        audit.record(Warning::UnresolvedBuyer {
            line: row.line(),
            order_id,
        });
        return Ok(None);
    }

    let gross = row.require_settled_amount()?;
    let tax = sales_tax(&lookups.index, &order_id);
    let net = gross - tax.unwrap_or(Amount::ZERO);

    let address = buyer.address();
    let calculation = match tax {
        Some(tax) => format!("({gross} € - {tax} € (US-Sales Taxes paid by Etsy))"),
        None => format!("({gross} €)"),
    };
    let trail = semicolons(&format!(
        "{calculation} | Address: {}",
        address.one_line()
    ));

    let number = allocator.allocate(row.date(), false);
    allocator.record_sale(&order_id, &number);
    debug!("Invoice {number} issued for order {order_id}");

    let line = LedgerLine::new(
        row.date(),
        InfoTag::Sale,
        buyer.name(),
        format!("Invoice {number} - Bestellung #{order_id} {trail}"),
        net,
    );
    let invoice = invoice(
        lookups,
        InvoiceRecord {
            number,
            order_id,
            date: row.date(),
            amount: net,
            marketplace_tax: tax.unwrap_or(Amount::ZERO),
            buyer: buyer.name().to_string(),
            address,
            country_code: String::new(),
            cancels: None,
            is_cancellation: false,
            reverse_charge: false,
        },
    );
    Ok(Some(Resolution { line, invoice }))
}

/// Books a refund as a negative amount and issues the matching cancellation invoice.
///
/// The amount starts from the refund row itself plus the processing and transaction fee credits
/// Etsy granted for the order. When the original sale is in the statement, the amount is instead
/// the full net of that sale (gross minus sales tax), and the fee credits only appear in the
/// purpose trail.
pub fn resolve_refund(
    row: &TransactionRow,
    lookups: &Lookups<'_>,
    allocator: &mut InvoiceNumberAllocator,
    audit: &mut Audit,
) -> Result<Option<Resolution>> {
    let Some(order_id) = row.title_order_id() else {
        audit.record(Warning::MissingOrderId {
            line: row.line(),
            description: row.title().to_string(),
        });
        return Ok(None);
    };

    let buyer = lookups.orders.buyer(&order_id, row.title());
    if buyer == Buyer::Placeholder {
        audit.record(Warning::UnresolvedBuyer {
            line: row.line(),
            order_id,
        });
        return Ok(None);
    }

    let mut refund = row
        .fees_and_taxes()
        .or(row.net_amount())
        .unwrap_or(Amount::ZERO);

    let mut fee_credits = Amount::ZERO;
    for credit in lookups
        .index
        .find_all(&order_id, TransactionKind::Fee, Some(CREDIT_MARKER))
    {
        let magnitude = credit
            .net_amount()
            .or(credit.fees_and_taxes())
            .map(|a| a.abs())
            .unwrap_or(Amount::ZERO);
        fee_credits = fee_credits + magnitude;
        match classify(credit.title()) {
            Some(FeeKind::Processing) | Some(FeeKind::Transaction) => {
                refund = refund + magnitude;
                debug!(
                    "Adjusting refund for order {order_id} by +{magnitude} EUR for '{}'",
                    unwrap_credit(credit.title()).1
                );
            }
            _ => audit.record(Warning::UnhandledCredit {
                line: credit.line(),
                order_id: order_id.clone(),
                description: credit.title().to_string(),
            }),
        }
    }

    let sale = lookups
        .index
        .find(&order_id, TransactionKind::Sale, Some(FOR_ORDER));
    let mut sale_tax = Amount::ZERO;
    let sale_amount = match sale {
        Some(sale) => {
            let gross = sale.require_settled_amount()?;
            sale_tax = sales_tax(&lookups.index, &order_id).unwrap_or(Amount::ZERO);
            refund = -(gross - sale_tax);
            debug!("Refund for order {order_id} set to {refund} EUR from the original sale");
            gross.to_string()
        }
        None => {
            audit.record(Warning::MissingCorrelation {
                line: row.line(),
                order_id: order_id.clone(),
                wanted: TransactionKind::Sale.to_string(),
            });
            "N/A".to_string()
        }
    };
    let amount = -refund.abs();

    let refund_kind = if row.title().contains(PARTIAL) {
        "Partial Refund"
    } else {
        "Full Refund"
    };
    let refunded = row
        .settled_amount()
        .map_or_else(|| NOT_APPLICABLE.to_string(), |a| a.to_string());
    let address = buyer.address();
    let trail = semicolons(&format!(
        "({sale_amount} € (Original Sale) - {refunded} € (Refund) + {fee_credits} € (Fee Credit)) | Address: {}",
        address.one_line()
    ));

    let (number, original) = allocator.cancellation(&order_id, row.date());
    debug!(
        "Cancellation invoice {number} issued for order {order_id} (cancels {})",
        original.as_deref().unwrap_or("an unknown invoice")
    );

    let line = LedgerLine::new(
        row.date(),
        InfoTag::Refund,
        buyer.name(),
        format!("Invoice {number} - {refund_kind} Bestellung #{order_id} {trail}"),
        amount,
    );
    let invoice = invoice(
        lookups,
        InvoiceRecord {
            number,
            order_id,
            date: row.date(),
            amount,
            marketplace_tax: -sale_tax,
            buyer: buyer.name().to_string(),
            address,
            country_code: String::new(),
            cancels: original,
            is_cancellation: true,
            reverse_charge: false,
        },
    );
    Ok(Some(Resolution { line, invoice }))
}

/// The magnitude of the sales tax Etsy collected for an order, from the earliest tax row.
fn sales_tax(index: &CrossReferenceIndex<'_>, order_id: &str) -> Option<Amount> {
    let tax = index.find(order_id, TransactionKind::Tax, None)?;
    Some(tax.fees_and_taxes().or(tax.net_amount())?.abs())
}

/// Fills in the country code of the buyer's address.
fn invoice(lookups: &Lookups<'_>, mut record: InvoiceRecord) -> InvoiceRecord {
    record.country_code = country_code(lookups.countries, &record.address);
    record
}

fn country_code(countries: &CountryCodes, address: &Address) -> String {
    countries.code(address.country()).to_string()
}

/// The ledger is comma separated, so commas in free text become semicolons.
fn semicolons(text: &str) -> String {
    text.replace(',', ";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderDetails;
    use crate::test::Row;

    fn orders() -> OrderBook {
        let mut book = OrderBook::new();
        book.insert(
            "9876543210",
            OrderDetails::new(
                "Jane Doe",
                Address::new("Hauptstr. 1", "", "Berlin", "", "10115", "Germany"),
            ),
        );
        book.insert(
            "1111111111",
            OrderDetails::new("Etsy Refund", Address::default()),
        );
        book
    }

    fn countries() -> CountryCodes {
        [("Germany", "DE"), ("United States", "US")]
            .into_iter()
            .collect()
    }

    struct Run {
        rows: Vec<TransactionRow>,
        orders: OrderBook,
        countries: CountryCodes,
        allocator: InvoiceNumberAllocator,
        audit: Audit,
    }

    impl Run {
        fn new(rows: &[Row]) -> Self {
            Self {
                rows: crate::test::rows(rows),
                orders: orders(),
                countries: countries(),
                allocator: InvoiceNumberAllocator::default(),
                audit: Audit::new(),
            }
        }

        fn resolve(&mut self, ix: usize) -> Option<Resolution> {
            let lookups = Lookups {
                index: CrossReferenceIndex::build(&self.rows),
                orders: &self.orders,
                countries: &self.countries,
            };
            let row = &self.rows[ix];
            match row.kind() {
                TransactionKind::Sale => {
                    resolve_sale(row, &lookups, &mut self.allocator, &mut self.audit).unwrap()
                }
                TransactionKind::Refund => {
                    resolve_refund(row, &lookups, &mut self.allocator, &mut self.audit).unwrap()
                }
                other => panic!("cannot resolve {other}"),
            }
        }
    }

    #[test]
    fn test_sale_subtracts_correlated_tax() {
        let mut run = Run::new(&[
            Row::sale("September 15, 2024", "9876543210", "€88.20"),
            Row::tax("September 15, 2024", "9876543210", "-€5.50"),
        ]);
        let resolved = run.resolve(0).unwrap();
        assert_eq!(
            resolved.line.to_record(),
            [
                "15.09.2024".to_string(),
                "Verkauf".to_string(),
                "Jane Doe".to_string(),
                "Invoice ETSY-2409-0001 - Bestellung #9876543210 (88.20 € - 5.50 € (US-Sales Taxes paid by Etsy)) | Address: Hauptstr. 1 ; Berlin;  10115; Germany".to_string(),
                "82,70".to_string(),
            ]
        );
        let invoice = resolved.invoice;
        assert_eq!(invoice.number(), "ETSY-2409-0001");
        assert_eq!(invoice.amount().to_string(), "82.70");
        assert_eq!(invoice.marketplace_tax().to_string(), "5.50");
        assert_eq!(invoice.country_code(), "DE");
        assert!(!invoice.is_cancellation());
        assert_eq!(run.allocator.sale_invoice("9876543210"), Some("ETSY-2409-0001"));
        assert!(run.audit.is_empty());
    }

    #[test]
    fn test_sale_without_tax_keeps_gross() {
        let mut run = Run::new(&[Row::sale("September 15, 2024", "9876543210", "€88.20")]);
        let resolved = run.resolve(0).unwrap();
        assert_eq!(resolved.line.amount().ledger(), "88,20");
        assert!(resolved.line.purpose().contains("(88.20 €) | Address:"));
    }

    #[test]
    fn test_tax_row_after_sale_is_found() {
        let mut run = Run::new(&[
            Row::sale("September 15, 2024", "9876543210", "€88.20"),
            Row::fee("September 16, 2024", "Transaction fee: Mug", "Order #9876543210", "-€2.20"),
            Row::tax("September 17, 2024", "9876543210", "-€5.50"),
        ]);
        assert_eq!(run.resolve(0).unwrap().line.amount().ledger(), "82,70");
    }

    #[test]
    fn test_sale_without_order_is_skipped() {
        let mut run = Run::new(&[Row::new(
            "September 15, 2024",
            "Sale",
            "Gift card purchase",
            "",
            "€25.00",
            "--",
            "€25.00",
        )]);
        assert!(run.resolve(0).is_none());
        assert_eq!(run.allocator.issued(), 0);
    }

    #[test]
    fn test_placeholder_buyer_is_skipped() {
        let mut run = Run::new(&[Row::sale("September 15, 2024", "1111111111", "€10.00")]);
        assert!(run.resolve(0).is_none());
        assert_eq!(
            run.audit.warnings(),
            &[Warning::UnresolvedBuyer {
                line: 2,
                order_id: "1111111111".to_string()
            }]
        );
        assert_eq!(run.allocator.issued(), 0);
    }

    #[test]
    fn test_unknown_order_uses_title_buyer() {
        let mut run = Run::new(&[Row::new(
            "September 15, 2024",
            "Sale",
            "Max Mustermann for Order #42",
            "",
            "€10.00",
            "--",
            "€10.00",
        )]);
        let resolved = run.resolve(0).unwrap();
        assert_eq!(resolved.line.counterparty(), "Max Mustermann");
        assert_eq!(resolved.invoice.country_code(), "");
    }

    #[test]
    fn test_refund_recomputed_from_original_sale() {
        let mut run = Run::new(&[
            Row::sale("September 15, 2024", "9876543210", "€88.20"),
            Row::tax("September 15, 2024", "9876543210", "-€5.50"),
            Row::refund(
                "October 2, 2024",
                "Refund to Jane Doe for Order #9876543210",
                "-€88.20",
                "€2.00",
                "-€86.20",
            ),
            Row::fee(
                "October 2, 2024",
                "Credit for transaction fee",
                "Order #9876543210",
                "€2.20",
            ),
        ]);
        run.resolve(0).unwrap();
        let resolved = run.resolve(2).unwrap();
        assert_eq!(resolved.line.info(), InfoTag::Refund);
        assert_eq!(resolved.line.amount().ledger(), "-82,70");
        assert_eq!(
            resolved.line.purpose(),
            "Invoice ETSY-2409-0001-STORNO - Full Refund Bestellung #9876543210 (88.20 € (Original Sale) - -86.20 € (Refund) + 2.20 € (Fee Credit)) | Address: Hauptstr. 1 ; Berlin;  10115; Germany"
        );

        let invoice = resolved.invoice;
        assert_eq!(invoice.number(), "ETSY-2409-0001-STORNO");
        assert_eq!(invoice.cancels(), Some("ETSY-2409-0001"));
        assert!(invoice.is_cancellation());
        assert_eq!(invoice.amount().to_string(), "-82.70");
        assert_eq!(run.allocator.issued(), 1);
    }

    #[test]
    fn test_refund_without_sale_applies_fee_credits() {
        let mut run = Run::new(&[
            Row::refund(
                "October 2, 2024",
                "Partial refund to Jane Doe for Order #9876543210",
                "-€20.00",
                "--",
                "-€20.00",
            ),
            Row::fee("October 2, 2024", "Credit for processing fee", "Order #9876543210", "€0.50"),
            Row::fee("October 2, 2024", "Credit for listing fee", "Order #9876543210", "€0.18"),
        ]);
        let resolved = run.resolve(0).unwrap();
        // -20.00 + 0.50 (processing credit); the listing credit is not applied
        assert_eq!(resolved.line.amount().ledger(), "-19,50");
        assert!(resolved
            .line
            .purpose()
            .starts_with("Invoice ETSY-2410-0001-STORNO - Partial Refund Bestellung #9876543210 (N/A € (Original Sale) - -20.00 € (Refund) + 0.68 € (Fee Credit))"));
        assert_eq!(resolved.invoice.cancels(), None);
        assert_eq!(run.allocator.issued(), 1);

        let kinds: Vec<_> = run
            .audit
            .warnings()
            .iter()
            .map(|w| match w {
                Warning::UnhandledCredit { line, .. } => format!("credit:{line}"),
                Warning::MissingCorrelation { wanted, .. } => format!("missing:{wanted}"),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["credit:4", "missing:Sale"]);
    }

    #[test]
    fn test_refund_amount_is_never_positive() {
        let mut run = Run::new(&[Row::refund(
            "October 2, 2024",
            "Refund to Jane Doe for Order #9876543210",
            "€5.00",
            "--",
            "€5.00",
        )]);
        assert_eq!(run.resolve(0).unwrap().line.amount().ledger(), "-5,00");
    }

    #[test]
    fn test_refund_without_order_id_is_skipped() {
        let mut run = Run::new(&[Row::refund(
            "October 2, 2024",
            "Refund for gift card",
            "-€5.00",
            "--",
            "-€5.00",
        )]);
        assert!(run.resolve(0).is_none());
        assert!(matches!(
            run.audit.warnings(),
            [Warning::MissingOrderId { line: 2, .. }]
        ));
    }

    #[test]
    fn test_refund_with_no_amounts_defaults_to_zero() {
        let mut run = Run::new(&[Row::refund(
            "October 2, 2024",
            "Refund to Jane Doe for Order #9876543210",
            "--",
            "--",
            "--",
        )]);
        assert_eq!(run.resolve(0).unwrap().line.amount().ledger(), "0,00");
    }
}
