use crate::args::ConvertArgs;
use crate::commands::invoices::{load_countries, write_invoices};
use crate::commands::Out;
use crate::convert::{Conversion, Converter, Summary};
use crate::orders::{self, OrderBook};
use crate::{utils, Config, Result};
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Converts a payment statement into a ledger CSV and, unless skipped, XRechnung invoices.
///
/// Nothing is written when the statement cannot be converted.
pub async fn convert(config: Config, args: ConvertArgs) -> Result<Out<Summary>> {
    // Resolve the sender first so a missing identity fails before any output exists.
    let sender = if args.skip_invoices() {
        None
    } else {
        Some(config.sender()?)
    };

    let statement = utils::read_bytes(args.input()).await?;
    info!(
        "Statement {} has SHA-256 {}",
        args.input().display(),
        utils::sha256(&statement)
    );
    let orders = load_orders(args.orders_dir(), args.orders()).await?;
    let countries = load_countries(args.country_codes()).await?;

    let Conversion {
        ledger,
        invoices,
        summary,
        ..
    } = Converter::new(&orders, &countries)
        .with_invoice_prefix(config.invoice_prefix())
        .convert(statement.as_slice())
        .with_context(|| format!("Unable to convert {}", args.input().display()))?;

    let mut data = Vec::new();
    let lines = ledger.write_csv(&mut data)?;
    utils::write(args.output(), &data).await?;
    info!(
        "Wrote {} ledger lines to {}, SHA-256 {}",
        lines.len(),
        args.output().display(),
        utils::file_sha256(args.output()).await?
    );

    match &sender {
        Some(sender) => {
            write_invoices(&invoices, sender, args.invoice_dir()).await?;
        }
        None => debug!("Skipping {} invoice documents", invoices.len()),
    }

    if summary.unhandled_categories > 0 {
        warn!(
            "{} fee rows matched no fee category and are NOT in the ledger",
            summary.unhandled_categories
        );
    }

    Ok(Out::new(
        format!(
            "Converted {} rows into {} ledger lines and {} invoices with {} warnings",
            summary.rows, summary.ledger_lines, summary.invoices, summary.warnings
        ),
        summary,
    ))
}

/// Loads the sold-orders exports: the files found in `dir` first, then `files` in the order
/// given. Later files win for the same order id.
async fn load_orders(dir: Option<&Path>, files: &[PathBuf]) -> Result<OrderBook> {
    let mut paths = match dir {
        Some(dir) => orders::discover(dir).await?,
        None => Vec::new(),
    };
    paths.extend(files.iter().cloned());

    let mut book = OrderBook::new();
    for path in &paths {
        let data = utils::read_bytes(path).await?;
        info!("Orders {} have SHA-256 {}", path.display(), utils::sha256(&data));
        let orders = OrderBook::from_csv(data.as_slice())
            .with_context(|| format!("Unable to read orders from {}", path.display()))?;
        debug!("Loaded {} orders from {}", orders.len(), path.display());
        book.merge(orders);
    }
    if book.is_empty() {
        warn!("No sold orders loaded, buyers are taken from the statement titles");
    }
    Ok(book)
}
