use crate::args::InvoicesArgs;
use crate::commands::Out;
use crate::config::Sender;
use crate::countries::CountryCodes;
use crate::invoices::read_invoice_table;
use crate::model::InvoiceRecord;
use crate::{utils, xrechnung, Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What the `invoices` command rendered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InvoicesReport {
    pub invoices: usize,
    pub cancellations: usize,
    pub files: Vec<PathBuf>,
}

/// Renders every invoice of a standalone invoice table.
pub async fn invoices(config: Config, args: InvoicesArgs) -> Result<Out<InvoicesReport>> {
    let sender = config.sender()?;
    let table = utils::read_bytes(args.input()).await?;
    info!(
        "Invoice table {} has SHA-256 {}",
        args.input().display(),
        utils::sha256(&table)
    );
    let countries = load_countries(args.country_codes()).await?;
    let records = read_invoice_table(table.as_slice(), &countries)
        .with_context(|| format!("Unable to read invoice table {}", args.input().display()))?;

    let files = write_invoices(&records, &sender, args.invoice_dir()).await?;
    let report = InvoicesReport {
        invoices: records.len(),
        cancellations: records.iter().filter(|r| r.is_cancellation()).count(),
        files,
    };
    Ok(Out::new(
        format!(
            "Rendered {} invoices into {}",
            report.invoices,
            args.invoice_dir().display()
        ),
        report,
    ))
}

/// Loads the country table. A missing file is not fatal: every buyer then has an unknown
/// country and is invoiced as an export.
pub(crate) async fn load_countries(path: &Path) -> Result<CountryCodes> {
    let exists = tokio::fs::try_exists(path)
        .await
        .with_context(|| format!("Unable to access {}", path.display()))?;
    if !exists {
        warn!(
            "Country table {} not found, country codes will be empty",
            path.display()
        );
        return Ok(CountryCodes::default());
    }
    let data = utils::read_bytes(path).await?;
    let countries = CountryCodes::from_csv(data.as_slice())
        .with_context(|| format!("Unable to read country table {}", path.display()))?;
    debug!("Loaded {} countries from {}", countries.len(), path.display());
    Ok(countries)
}

/// Writes `<dir>/<invoice number>.xml` for every record and returns the written paths.
pub(crate) async fn write_invoices(
    records: &[InvoiceRecord],
    sender: &Sender,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    utils::make_dir(dir).await?;
    let mut files = Vec::with_capacity(records.len());
    for record in records {
        let xml = xrechnung::render(record, sender)?;
        let path = dir.join(xrechnung::file_name(record));
        utils::write(&path, &xml).await?;
        debug!("Wrote invoice {}", path.display());
        files.push(path);
    }
    info!("Wrote {} invoices to {}", files.len(), dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::sender;
    use tempfile::TempDir;

    async fn config(dir: &Path) -> Config {
        let path = dir.join("config.json");
        let json = serde_json::json!({
            "app_name": "etsy-ledger",
            "config_version": 1,
            "sender": sender(),
        });
        utils::write(&path, json.to_string()).await.unwrap();
        Config::load(Some(&path)).await.unwrap()
    }

    #[tokio::test]
    async fn test_invoices_command() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("invoices.csv");
        let countries = dir.path().join("country_codes.csv");
        let out = dir.path().join("out");
        utils::write(
            &input,
            "Invoice Number,Order Info,Amount,Date,Buyer,Street 1,Street 2,City,Zipcode,Country,Is Cancellation,Original Invoice Number\n\
             RE-1,Order #1,82.70,2024-09-15,Jane Doe,Hauptstr. 1,,Berlin,10115,Germany,,\n\
             RE-1-STORNO,Order #1,82.70,2024-10-02,Jane Doe,Hauptstr. 1,,Berlin,10115,Germany,true,RE-1\n",
        )
        .await
        .unwrap();
        utils::write(&countries, "country_name,alpha_2\nGermany,DE\n")
            .await
            .unwrap();

        let args = InvoicesArgs::new(&input, &countries, &out, None);
        let result = invoices(config(dir.path()).await, args).await.unwrap();
        let report = result.structure().unwrap();
        assert_eq!(report.invoices, 2);
        assert_eq!(report.cancellations, 1);

        let cancellation = utils::read(&out.join("RE-1-STORNO.xml")).await.unwrap();
        assert!(cancellation.contains("<cbc:InvoiceTypeCode>381</cbc:InvoiceTypeCode>"));
        assert!(cancellation.contains("<cbc:ID>RE-1</cbc:ID>"));
        assert!(out.join("RE-1.xml").exists());
    }

    #[tokio::test]
    async fn test_missing_country_table_is_empty() {
        let dir = TempDir::new().unwrap();
        let countries = load_countries(&dir.path().join("nope.csv")).await.unwrap();
        assert!(countries.is_empty());
    }
}
