//! Types that represent the data model: statement rows, amounts, ledger lines and invoices.
mod amount;
mod invoice;
mod ledger;
mod row;

pub use amount::{Amount, AmountError, CURRENCY_SYMBOL, NOT_APPLICABLE};
pub use invoice::{
    Address, InvoiceNumberAllocator, InvoiceRecord, CANCELLATION_SUFFIX, DEFAULT_INVOICE_PREFIX,
};
pub use ledger::{InfoTag, LedgerLine, LedgerWriter, LEDGER_DATE_FORMAT, LEDGER_HEADER};
pub use row::{
    order_id_after_hash, order_ids_in, ParsedRecord, TransactionKind, TransactionRow, YearMonth,
    ORDER_MARKER, STATEMENT_DATE_FORMAT,
};
