//! Country display names to ISO 3166-1 alpha-2 codes.

use crate::Result;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

/// The default location of the country table.
pub const DEFAULT_COUNTRY_CODES_FILE: &str = "country_codes.csv";

#[derive(Debug, Deserialize)]
struct CountryRecord {
    country_name: String,
    alpha_2: String,
}

/// Maps the country names Etsy writes (`Germany`, `United States`) to their two-letter codes.
#[derive(Debug, Clone, Default)]
pub struct CountryCodes {
    by_name: HashMap<String, String>,
}

impl CountryCodes {
    /// Reads a CSV with the columns `country_name` and `alpha_2`. Other columns are ignored.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut by_name = HashMap::new();
        for (ix, record) in rdr.deserialize::<CountryRecord>().enumerate() {
            let record =
                record.with_context(|| format!("Unable to read country on line {}", ix + 2))?;
            by_name.insert(record.country_name.trim().to_string(), record.alpha_2.trim().to_string());
        }
        Ok(Self { by_name })
    }

    /// The code for `name`, or an empty string when the country is not in the table.
    pub fn code(&self, name: &str) -> &str {
        self.by_name.get(name.trim()).map_or("", String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl<N: Into<String>, C: Into<String>> FromIterator<(N, C)> for CountryCodes {
    fn from_iter<T: IntoIterator<Item = (N, C)>>(iter: T) -> Self {
        Self {
            by_name: iter
                .into_iter()
                .map(|(name, code)| (name.into(), code.into()))
                .collect(),
        }
    }
}
