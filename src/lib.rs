//! etsy-ledger converts Etsy payment statements into a German bookkeeping ledger CSV and
//! XRechnung invoice documents.
//!
//! The conversion core is synchronous and works on in-memory data: see [`convert::Converter`].
//! The async [`commands`] read and write the files around it.

pub mod args;
pub mod commands;
mod config;
pub mod convert;
pub mod countries;
mod error;
pub mod fees;
pub mod index;
pub mod invoices;
pub mod model;
pub mod orders;
pub mod resolve;
mod utils;
pub mod xrechnung;

#[cfg(test)]
mod test;

pub use config::{Config, Sender};
pub use error::{Audit, Error, MalformedRowError, Result, Warning};
pub use model::Amount;
