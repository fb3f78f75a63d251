//! XRechnung (UBL 2.1 Invoice) rendering.
//!
//! Buyers are private persons, so the customer party is anonymised except for the city, postal
//! code and country that decide the VAT treatment. Amounts on an `InvoiceRecord` are VAT
//! inclusive; the VAT is split off here.

use crate::config::Sender;
use crate::model::{Amount, InvoiceRecord};
use crate::Result;
use anyhow::Context;
use chrono::Duration;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::io::Write;

const NS_INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
const NS_CAC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
const NS_CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2 \
    http://docs.oasis-open.org/ubl/os-UBL-2.1/xsd/maindoc/UBL-Invoice-2.1.xsd";

pub const CUSTOMIZATION_ID: &str =
    "urn:cen.eu:en16931:2017#compliant#urn:xeinkauf.de:kosit:xrechnung_3.0";
pub const PROFILE_ID: &str = "urn:fdc:peppol.eu:2017:poacc:billing:01:1.0";

/// Days between issue date and due date.
pub const PAYMENT_TERM_DAYS: i64 = 14;

const CURRENCY: &str = "EUR";
const INVOICE_TYPE: &str = "380";
const CANCELLATION_TYPE: &str = "381";
/// Credit transfer: Etsy pays out to the seller's bank account.
const PAYMENT_MEANS: &str = "42";

const ANONYMOUS_STREET: &str = "Straße Anonymisiert";
const ANONYMOUS_NAME: &str = "Name Anonymisiert";
const ANONYMOUS_MAIL: &str = "no-email@etsy.com";

const EU_MEMBERS: [&str; 27] = [
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GR", "HR", "HU", "IE", "IT",
    "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK",
];

/// UNCL 5305 tax category codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum VatCategory {
    /// Standard rate.
    S,
    /// Outside the scope of VAT; the marketplace remitted it.
    O,
    /// Export outside the EU.
    G,
    /// Intra-community supply, reverse charge.
    K,
    /// Zero rated.
    Z,
}

serde_plain::derive_display_from_serialize!(VatCategory);

/// How an invoice is taxed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct VatTreatment {
    pub category: VatCategory,
    pub rate: Decimal,
    /// The exemption reason printed for zero-rated invoices.
    pub note: &'static str,
}

impl VatTreatment {
    fn new(category: VatCategory, percent: i64, note: &'static str) -> Self {
        Self {
            category,
            rate: Decimal::new(percent, 2),
            note,
        }
    }

    /// Percent with two decimals, e.g. `19.00`.
    pub fn percent(&self) -> String {
        format!("{:.2}", self.rate * Decimal::ONE_HUNDRED)
    }

    fn is_exempt(&self) -> bool {
        self.rate.is_zero() && self.category != VatCategory::Z
    }
}

pub fn is_eu_member(country_code: &str) -> bool {
    EU_MEMBERS.contains(&country_code)
}

/// Decides the VAT treatment from the buyer's country. Unknown countries are treated as exports.
pub fn classify_vat(country_code: &str, reverse_charge: bool) -> VatTreatment {
    let uk = matches!(country_code, "GB" | "UK");
    match (reverse_charge, country_code) {
        (false, "DE") => VatTreatment::new(
            VatCategory::S,
            19,
            "Lieferung innerhalb Deutschlands mit deutscher Mehrwertsteuer.",
        ),
        (false, _) if uk => VatTreatment::new(
            VatCategory::O,
            0,
            "§ 3c UStG i.V.m. Section 14 VAT Act 1994 (VAT durch Marketplace abgeführt)",
        ),
        (false, code) if is_eu_member(code) => VatTreatment::new(
            VatCategory::S,
            19,
            "Lieferung gemäß § 3a UStG (Umsatz unter 10.000 € grenzüberschreitend)",
        ),
        (false, _) => VatTreatment::new(
            VatCategory::G,
            0,
            "Steuerfreie Ausfuhrlieferung nach § 4 Nr. 1a UStG.",
        ),
        (true, "DE") => VatTreatment::new(
            VatCategory::S,
            19,
            "Lieferung innerhalb Deutschlands mit deutscher Mehrwertsteuer.",
        ),
        (true, code) if uk || is_eu_member(code) => VatTreatment::new(
            VatCategory::K,
            0,
            "Reverse Charge - Steuerschuldnerschaft des Leistungsempfängers gemäß Art. 196 \
             MwStSystRL i.V.m. §13b UStG",
        ),
        (true, _) => VatTreatment::new(
            VatCategory::Z,
            0,
            "§ 13b Abs. 2 UStG (Reverse Charge im Bestimmungsland)",
        ),
    }
}

/// The VAT split of a VAT-inclusive amount.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Totals {
    pub gross: Amount,
    pub vat: Amount,
    pub net: Amount,
}

impl Totals {
    /// `vat = gross × rate / (1 + rate)`, rounded half-even to cents.
    pub fn split(gross: Amount, rate: Decimal) -> Self {
        let vat = (gross.value() * rate / (Decimal::ONE + rate))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
        let vat = Amount::new(vat);
        Self {
            gross,
            vat,
            net: gross - vat,
        }
    }
}

/// The file name of an invoice document.
pub fn file_name(invoice: &InvoiceRecord) -> String {
    format!("{}.xml", invoice.number())
}

/// Renders one invoice as an XRechnung XML document.
pub fn render(invoice: &InvoiceRecord, sender: &Sender) -> Result<String> {
    let mut doc = Ubl::new(Vec::new());
    write_invoice(&mut doc, invoice, sender)
        .with_context(|| format!("Unable to render invoice {}", invoice.number()))?;
    String::from_utf8(doc.into_inner()).context("Rendered invoice is not valid UTF-8")
}

fn write_invoice<W: Write>(doc: &mut Ubl<W>, invoice: &InvoiceRecord, sender: &Sender) -> Result<()> {
    let vat = classify_vat(invoice.country_code(), invoice.reverse_charge());
    let totals = Totals::split(invoice.amount(), vat.rate);
    let due = invoice.date() + Duration::days(PAYMENT_TERM_DAYS);

    doc.decl()?;
    doc.open_with(
        "Invoice",
        &[
            ("xmlns", NS_INVOICE),
            ("xmlns:cac", NS_CAC),
            ("xmlns:cbc", NS_CBC),
            ("xmlns:xsi", NS_XSI),
            ("xsi:schemaLocation", SCHEMA_LOCATION),
        ],
    )?;
    doc.leaf("cbc:CustomizationID", CUSTOMIZATION_ID)?;
    doc.leaf("cbc:ProfileID", PROFILE_ID)?;
    doc.leaf("cbc:ID", invoice.number())?;
    doc.leaf("cbc:IssueDate", &invoice.date().format("%Y-%m-%d").to_string())?;
    doc.leaf("cbc:DueDate", &due.format("%Y-%m-%d").to_string())?;
    let type_code = if invoice.is_cancellation() {
        CANCELLATION_TYPE
    } else {
        INVOICE_TYPE
    };
    doc.leaf("cbc:InvoiceTypeCode", type_code)?;
    doc.leaf("cbc:DocumentCurrencyCode", CURRENCY)?;

    if let (true, Some(original)) = (invoice.is_cancellation(), invoice.cancels()) {
        doc.open("cac:BillingReference")?;
        doc.open("cac:InvoiceDocumentReference")?;
        doc.leaf("cbc:ID", original)?;
        doc.close("cac:InvoiceDocumentReference")?;
        doc.close("cac:BillingReference")?;
    }

    write_supplier(doc, sender)?;
    write_customer(doc, invoice)?;

    doc.open("cac:PaymentMeans")?;
    doc.leaf("cbc:PaymentMeansCode", PAYMENT_MEANS)?;
    doc.close("cac:PaymentMeans")?;

    doc.open("cac:TaxTotal")?;
    doc.amount("cbc:TaxAmount", totals.vat)?;
    doc.open("cac:TaxSubtotal")?;
    doc.amount("cbc:TaxableAmount", totals.net)?;
    doc.amount("cbc:TaxAmount", totals.vat)?;
    doc.open("cac:TaxCategory")?;
    doc.leaf("cbc:ID", &vat.category.to_string())?;
    doc.leaf("cbc:Percent", &vat.percent())?;
    if vat.is_exempt() {
        doc.leaf("cbc:TaxExemptionReason", vat.note)?;
    }
    doc.tax_scheme()?;
    doc.close("cac:TaxCategory")?;
    doc.close("cac:TaxSubtotal")?;
    doc.close("cac:TaxTotal")?;

    doc.open("cac:LegalMonetaryTotal")?;
    doc.amount("cbc:LineExtensionAmount", totals.net)?;
    doc.amount("cbc:TaxExclusiveAmount", totals.net)?;
    doc.amount("cbc:TaxInclusiveAmount", totals.gross)?;
    doc.amount("cbc:PayableAmount", totals.gross)?;
    doc.close("cac:LegalMonetaryTotal")?;

    doc.open("cac:InvoiceLine")?;
    doc.leaf("cbc:ID", "1")?;
    let quantity = if invoice.is_cancellation() { "-1" } else { "1" };
    doc.leaf_with("cbc:InvoicedQuantity", &[("unitCode", "C62")], quantity)?;
    doc.amount("cbc:LineExtensionAmount", totals.net)?;
    doc.open("cac:Item")?;
    doc.leaf(
        "cbc:Description",
        &format!("Etsy Bestellung #{}", invoice.order_id()),
    )?;
    doc.leaf("cbc:Name", "Bestellung")?;
    doc.open("cac:ClassifiedTaxCategory")?;
    doc.leaf("cbc:ID", &vat.category.to_string())?;
    doc.leaf("cbc:Percent", &vat.percent())?;
    doc.tax_scheme()?;
    doc.close("cac:ClassifiedTaxCategory")?;
    doc.close("cac:Item")?;
    doc.open("cac:Price")?;
    doc.amount("cbc:PriceAmount", totals.net.abs())?;
    doc.close("cac:Price")?;
    doc.close("cac:InvoiceLine")?;

    doc.close("Invoice")
}

fn write_supplier<W: Write>(doc: &mut Ubl<W>, sender: &Sender) -> Result<()> {
    doc.open("cac:AccountingSupplierParty")?;
    doc.open("cac:Party")?;
    doc.leaf_with("cbc:EndpointID", &[("schemeID", "EM")], &sender.mail)?;
    doc.open("cac:PartyName")?;
    doc.leaf("cbc:Name", &sender.name)?;
    doc.close("cac:PartyName")?;
    doc.open("cac:PostalAddress")?;
    doc.leaf("cbc:StreetName", &sender.street)?;
    doc.leaf("cbc:CityName", &sender.city)?;
    doc.leaf("cbc:PostalZone", &sender.postal_code)?;
    doc.open("cac:Country")?;
    doc.leaf("cbc:IdentificationCode", &sender.country)?;
    doc.close("cac:Country")?;
    doc.close("cac:PostalAddress")?;
    doc.open("cac:PartyTaxScheme")?;
    doc.leaf("cbc:CompanyID", &sender.vat_id)?;
    doc.tax_scheme()?;
    doc.close("cac:PartyTaxScheme")?;
    doc.open("cac:PartyLegalEntity")?;
    doc.leaf("cbc:RegistrationName", &sender.company_name)?;
    doc.leaf("cbc:CompanyID", &sender.hra)?;
    doc.close("cac:PartyLegalEntity")?;
    doc.open("cac:Contact")?;
    doc.leaf("cbc:Name", &sender.name)?;
    doc.leaf("cbc:Telephone", &sender.phone_number)?;
    doc.leaf("cbc:ElectronicMail", &sender.mail)?;
    doc.close("cac:Contact")?;
    doc.close("cac:Party")?;
    doc.close("cac:AccountingSupplierParty")
}

fn write_customer<W: Write>(doc: &mut Ubl<W>, invoice: &InvoiceRecord) -> Result<()> {
    let address = invoice.address();
    doc.open("cac:AccountingCustomerParty")?;
    doc.open("cac:Party")?;
    doc.leaf_with("cbc:EndpointID", &[("schemeID", "EM")], ANONYMOUS_MAIL)?;
    doc.open("cac:PostalAddress")?;
    doc.leaf("cbc:StreetName", ANONYMOUS_STREET)?;
    if !address.street_2().is_empty() {
        doc.leaf("cbc:AdditionalStreetName", address.street_2())?;
    }
    doc.leaf("cbc:CityName", address.city())?;
    if !address.zipcode().is_empty() {
        doc.leaf("cbc:PostalZone", address.zipcode())?;
    }
    doc.open("cac:Country")?;
    doc.leaf("cbc:IdentificationCode", invoice.country_code())?;
    doc.close("cac:Country")?;
    doc.close("cac:PostalAddress")?;
    doc.open("cac:PartyLegalEntity")?;
    doc.leaf("cbc:RegistrationName", ANONYMOUS_NAME)?;
    doc.close("cac:PartyLegalEntity")?;
    doc.close("cac:Party")?;
    doc.close("cac:AccountingCustomerParty")
}

/// A thin layer over `quick_xml::Writer` for the element shapes UBL uses.
struct Ubl<W: Write> {
    wr: Writer<W>,
}

impl<W: Write> Ubl<W> {
    fn new(inner: W) -> Self {
        Self {
            wr: Writer::new_with_indent(inner, b' ', 2),
        }
    }

    fn into_inner(self) -> W {
        self.wr.into_inner()
    }

    fn decl(&mut self) -> Result<()> {
        self.wr
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<()> {
        self.open_with(name, &[])
    }

    fn open_with(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.wr.write_event(Event::Start(start))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.wr.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn leaf(&mut self, name: &str, text: &str) -> Result<()> {
        self.leaf_with(name, &[], text)
    }

    fn leaf_with(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.open_with(name, attributes)?;
        self.wr.write_event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn amount(&mut self, name: &str, amount: Amount) -> Result<()> {
        self.leaf_with(name, &[("currencyID", CURRENCY)], &amount.to_string())
    }

    fn tax_scheme(&mut self) -> Result<()> {
        self.open("cac:TaxScheme")?;
        self.leaf("cbc:ID", "VAT")?;
        self.close("cac:TaxScheme")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Address;
    use crate::test::sender;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn invoice(country_code: &str, amount: &str, cancels: Option<&str>) -> InvoiceRecord {
        let is_cancellation = amount.starts_with('-');
        InvoiceRecord {
            number: if is_cancellation {
                "ETSY-2409-0001-STORNO".to_string()
            } else {
                "ETSY-2409-0001".to_string()
            },
            order_id: "9876543210".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 9, 15).unwrap(),
            amount: amt(amount),
            marketplace_tax: Amount::ZERO,
            buyer: "Jane Doe".to_string(),
            address: Address::new("Hauptstr. 1", "Hinterhaus", "Berlin", "", "10115", "Germany"),
            country_code: country_code.to_string(),
            cancels: cancels.map(String::from),
            is_cancellation,
            reverse_charge: false,
        }
    }

    #[test]
    fn test_vat_classification() {
        let c = |code, rc| classify_vat(code, rc).category;
        assert_eq!(c("DE", false), VatCategory::S);
        assert_eq!(c("FR", false), VatCategory::S);
        assert_eq!(c("GB", false), VatCategory::O);
        assert_eq!(c("UK", false), VatCategory::O);
        assert_eq!(c("US", false), VatCategory::G);
        assert_eq!(c("", false), VatCategory::G);
        assert_eq!(c("DE", true), VatCategory::S);
        assert_eq!(c("AT", true), VatCategory::K);
        assert_eq!(c("GB", true), VatCategory::K);
        assert_eq!(c("CH", true), VatCategory::Z);
        assert_eq!(classify_vat("DE", false).percent(), "19.00");
        assert_eq!(classify_vat("US", false).percent(), "0.00");
    }

    #[test]
    fn test_vat_split_rounds_half_even() {
        let t = Totals::split(amt("82.70"), Decimal::new(19, 2));
        assert_eq!(t.vat.to_string(), "13.20");
        assert_eq!(t.net.to_string(), "69.50");

        let t = Totals::split(amt("0.83"), Decimal::new(19, 2));
        assert_eq!(t.vat.to_string(), "0.13");

        let t = Totals::split(amt("-82.70"), Decimal::new(19, 2));
        assert_eq!(t.vat.to_string(), "-13.20");
        assert_eq!(t.net.to_string(), "-69.50");

        let t = Totals::split(amt("10.00"), Decimal::ZERO);
        assert_eq!(t.vat, Amount::ZERO);
        assert_eq!(t.net.to_string(), "10.00");
    }

    #[test]
    fn test_render_sale() {
        let xml = render(&invoice("DE", "82.70", None), &sender()).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(&format!("<cbc:CustomizationID>{CUSTOMIZATION_ID}</cbc:CustomizationID>")));
        assert!(xml.contains("<cbc:ID>ETSY-2409-0001</cbc:ID>"));
        assert!(xml.contains("<cbc:IssueDate>2024-09-15</cbc:IssueDate>"));
        assert!(xml.contains("<cbc:DueDate>2024-09-29</cbc:DueDate>"));
        assert!(xml.contains("<cbc:InvoiceTypeCode>380</cbc:InvoiceTypeCode>"));
        assert!(!xml.contains("BillingReference"));
        assert!(xml.contains(r#"<cbc:TaxAmount currencyID="EUR">13.20</cbc:TaxAmount>"#));
        assert!(xml.contains(r#"<cbc:TaxableAmount currencyID="EUR">69.50</cbc:TaxableAmount>"#));
        assert!(xml.contains(r#"<cbc:PayableAmount currencyID="EUR">82.70</cbc:PayableAmount>"#));
        assert!(xml.contains("<cbc:Percent>19.00</cbc:Percent>"));
        assert!(!xml.contains("TaxExemptionReason"));
        assert!(xml.contains("<cbc:StreetName>Straße Anonymisiert</cbc:StreetName>"));
        assert!(xml.contains("<cbc:AdditionalStreetName>Hinterhaus</cbc:AdditionalStreetName>"));
        assert!(xml.contains("<cbc:RegistrationName>Name Anonymisiert</cbc:RegistrationName>"));
        assert!(!xml.contains("Jane Doe"));
        assert!(xml.contains("<cbc:Description>Etsy Bestellung #9876543210</cbc:Description>"));
        assert!(xml.contains(r#"<cbc:InvoicedQuantity unitCode="C62">1</cbc:InvoicedQuantity>"#));
        assert!(xml.contains("<cbc:RegistrationName>Muster Keramik UG</cbc:RegistrationName>"));
        assert!(xml.trim_end().ends_with("</Invoice>"));
    }

    #[test]
    fn test_render_cancellation() {
        let xml = render(
            &invoice("US", "-82.70", Some("ETSY-2409-0001")),
            &sender(),
        )
        .unwrap();
        assert!(xml.contains("<cbc:InvoiceTypeCode>381</cbc:InvoiceTypeCode>"));
        assert!(xml.contains("<cac:BillingReference>"));
        assert!(xml.contains("<cbc:ID>ETSY-2409-0001</cbc:ID>"));
        assert!(xml.contains("<cbc:ID>G</cbc:ID>"));
        assert!(xml.contains("<cbc:TaxExemptionReason>"));
        assert!(xml.contains(r#"<cbc:PayableAmount currencyID="EUR">-82.70</cbc:PayableAmount>"#));
        assert!(xml.contains(r#"<cbc:InvoicedQuantity unitCode="C62">-1</cbc:InvoicedQuantity>"#));
        assert!(xml.contains(r#"<cbc:PriceAmount currencyID="EUR">82.70</cbc:PriceAmount>"#));
    }

    #[test]
    fn test_text_is_escaped() {
        let mut s = sender();
        s.company_name = "Muster & Söhne".to_string();
        let xml = render(&invoice("DE", "1.00", None), &s).unwrap();
        assert!(xml.contains("Muster &amp; Söhne"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(&invoice("DE", "1.00", None)), "ETSY-2409-0001.xml");
    }
}
