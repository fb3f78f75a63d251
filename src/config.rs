//! Configuration of the invoicing company.
//!
//! Invoices name the seller, so rendering them needs the seller's identity. It comes either from
//! a JSON config file passed with `--config` or from `SENDER_*` environment variables.

use crate::model::DEFAULT_INVOICE_PREFIX;
use crate::{utils, Result};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_NAME: &str = "etsy-ledger";
const CONFIG_VERSION: u8 = 1;

/// The seller as it appears on every invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Sender {
    /// The registered company name.
    pub company_name: String,
    /// The contact person and trading name.
    pub name: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 code, e.g. `DE`.
    pub country: String,
    pub phone_number: String,
    pub mail: String,
    pub vat_id: String,
    /// The commercial register number.
    pub hra: String,
}

impl Sender {
    /// Reads the sender from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the sender from `SENDER_*` variables provided by `lookup`. Every variable is
    /// required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key).ok_or_else(|| anyhow!("The environment variable {key} is not set"))
        };
        Ok(Self {
            company_name: var("SENDER_COMPANY_NAME")?,
            name: var("SENDER_NAME")?,
            street: var("SENDER_STREET")?,
            city: var("SENDER_CITY")?,
            postal_code: var("SENDER_POSTALCODE")?,
            country: var("SENDER_COUNTRY")?,
            phone_number: var("SENDER_PHONE_NUMBER")?,
            mail: var("SENDER_MAIL")?,
            vat_id: var("SENDER_VAT_ID")?,
            hra: var("SENDER_HRA")?,
        })
    }
}

/// The settings of one run.
#[derive(Debug, Clone)]
pub struct Config {
    path: Option<PathBuf>,
    sender: Option<Sender>,
    invoice_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            sender: None,
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Loads the config file at `path`, or falls back to the environment when there is none.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No config file given, the sender is read from the environment");
            return Ok(Self::default());
        };
        let file = ConfigFile::load(path).await?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            sender: Some(file.sender),
            invoice_prefix: file.invoice_prefix,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn invoice_prefix(&self) -> &str {
        &self.invoice_prefix
    }

    /// The sender from the config file, or else from the environment.
    pub fn sender(&self) -> Result<Sender> {
        match &self.sender {
            Some(sender) => Ok(sender.clone()),
            None => Sender::from_env().context("Unable to read the sender from the environment"),
        }
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "etsy-ledger",
///   "config_version": 1,
///   "invoice_prefix": "ETSY-",
///   "sender": {
///     "company_name": "Muster Keramik UG",
///     "name": "Erika Muster",
///     "street": "Hauptstr. 1",
///     "city": "Berlin",
///     "postal_code": "10115",
///     "country": "DE",
///     "phone_number": "+49 30 1234567",
///     "mail": "shop@example.com",
///     "vat_id": "DE123456789",
///     "hra": "HRB 12345"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "etsy-ledger"
    app_name: String,
    /// Configuration file version
    config_version: u8,
    sender: Sender,
    #[serde(default = "default_invoice_prefix")]
    invoice_prefix: String,
}

fn default_invoice_prefix() -> String {
    DEFAULT_INVOICE_PREFIX.to_string()
}

impl ConfigFile {
    async fn load(path: &Path) -> Result<Self> {
        let config: ConfigFile = utils::deserialize(path)
            .await
            .with_context(|| format!("Failed to load config file at {}", path.display()))?;
        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version == CONFIG_VERSION,
            "Unsupported config_version {} in config file, expected {}",
            config.config_version,
            CONFIG_VERSION
        );
        Ok(config)
    }

    #[cfg(test)]
    async fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }
}
