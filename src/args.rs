//! These structs provide the CLI interface for the etsy-ledger CLI.

use crate::countries::DEFAULT_COUNTRY_CODES_FILE as DEFAULT_COUNTRY_CODES;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;

/// The default directory invoice documents are written to.
pub const DEFAULT_INVOICE_DIR: &str = "Rechnungen";

/// etsy-ledger: Turns Etsy payment statements into bookkeeping records.
///
/// The `convert` command reads an Etsy payment statement CSV and writes a ledger CSV in the
/// German import format (Buchungsdatum, Zusatzinfo, Auftraggeber/Empfänger, Verwendungszweck,
/// Betrag). Every sale and refund also gets an XRechnung invoice document.
///
/// The seller named on invoices is read from a JSON config file (--config) or from the SENDER_*
/// environment variables.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert an Etsy payment statement into a ledger CSV and XRechnung invoices.
    ///
    /// Buyer names and addresses come from the sold-orders exports. Pass them with --orders or
    /// point --orders-dir at the directory holding the EtsySoldOrders*.csv files.
    Convert(ConvertArgs),
    /// Render XRechnung invoices from a standalone invoice table.
    Invoices(InvoicesArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,
}

impl Common {
    pub fn new(log_level: LevelFilter) -> Self {
        Self { log_level }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }
}

/// Args for the `etsy-ledger convert` command.
#[derive(Debug, Parser, Clone)]
pub struct ConvertArgs {
    /// The Etsy payment statement CSV.
    #[arg(long)]
    input: PathBuf,

    /// Where to write the ledger CSV.
    #[arg(long)]
    output: PathBuf,

    /// A sold-orders CSV. May be given more than once; later files win.
    #[arg(long)]
    orders: Vec<PathBuf>,

    /// A directory whose EtsySoldOrders*.csv files are loaded before any --orders file.
    #[arg(long)]
    orders_dir: Option<PathBuf>,

    /// The table mapping country names to ISO codes.
    #[arg(long, default_value = DEFAULT_COUNTRY_CODES)]
    country_codes: PathBuf,

    /// Where to write the XRechnung documents.
    #[arg(long, default_value = DEFAULT_INVOICE_DIR)]
    invoice_dir: PathBuf,

    /// The JSON config file naming the seller.
    #[arg(long, env = "ETSY_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Only write the ledger CSV.
    #[arg(long)]
    skip_invoices: bool,
}

impl ConvertArgs {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            orders: Vec::new(),
            orders_dir: None,
            country_codes: PathBuf::from(DEFAULT_COUNTRY_CODES),
            invoice_dir: PathBuf::from(DEFAULT_INVOICE_DIR),
            config: None,
            skip_invoices: false,
        }
    }

    pub fn with_orders(mut self, orders: Vec<PathBuf>) -> Self {
        self.orders = orders;
        self
    }

    pub fn with_orders_dir(mut self, orders_dir: impl Into<PathBuf>) -> Self {
        self.orders_dir = Some(orders_dir.into());
        self
    }

    pub fn with_country_codes(mut self, country_codes: impl Into<PathBuf>) -> Self {
        self.country_codes = country_codes.into();
        self
    }

    pub fn with_invoice_dir(mut self, invoice_dir: impl Into<PathBuf>) -> Self {
        self.invoice_dir = invoice_dir.into();
        self
    }

    pub fn with_config(mut self, config: impl Into<PathBuf>) -> Self {
        self.config = Some(config.into());
        self
    }

    pub fn with_skip_invoices(mut self, skip_invoices: bool) -> Self {
        self.skip_invoices = skip_invoices;
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn orders(&self) -> &[PathBuf] {
        &self.orders
    }

    pub fn orders_dir(&self) -> Option<&Path> {
        self.orders_dir.as_deref()
    }

    pub fn country_codes(&self) -> &Path {
        &self.country_codes
    }

    pub fn invoice_dir(&self) -> &Path {
        &self.invoice_dir
    }

    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    pub fn skip_invoices(&self) -> bool {
        self.skip_invoices
    }
}

/// Args for the `etsy-ledger invoices` command.
#[derive(Debug, Parser, Clone)]
pub struct InvoicesArgs {
    /// The invoice table CSV.
    ///
    /// Columns: Invoice Number, Order Info, Amount, Date (YYYY-MM-DD), Buyer, Street 1,
    /// Street 2, City, Zipcode, Country and optionally Is Cancellation, Original Invoice Number
    /// and Reverse Charge.
    #[arg(long)]
    input: PathBuf,

    /// The table mapping country names to ISO codes.
    #[arg(long, default_value = DEFAULT_COUNTRY_CODES)]
    country_codes: PathBuf,

    /// Where to write the XRechnung documents.
    #[arg(long, default_value = DEFAULT_INVOICE_DIR)]
    invoice_dir: PathBuf,

    /// The JSON config file naming the seller.
    #[arg(long, env = "ETSY_LEDGER_CONFIG")]
    config: Option<PathBuf>,
}

impl InvoicesArgs {
    pub fn new(
        input: impl Into<PathBuf>,
        country_codes: impl Into<PathBuf>,
        invoice_dir: impl Into<PathBuf>,
        config: Option<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            country_codes: country_codes.into(),
            invoice_dir: invoice_dir.into(),
            config,
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn country_codes(&self) -> &Path {
        &self.country_codes
    }

    pub fn invoice_dir(&self) -> &Path {
        &self.invoice_dir
    }

    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}
