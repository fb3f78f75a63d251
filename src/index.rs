//! Cross references between statement rows that belong to the same order.
//!
//! A sale, its tax row, a later refund and the fee credits for that refund all mention the same
//! `Order #<id>` in their title or info column. The index maps each order id to the rows that
//! mention it, in chronological order, so that "the first Tax row for order X" is a lookup rather
//! than a scan of the whole statement.

use crate::model::{order_ids_in, TransactionKind, TransactionRow};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CrossReferenceIndex<'a> {
    rows: &'a [TransactionRow],
    by_order: HashMap<String, Vec<usize>>,
}

impl<'a> CrossReferenceIndex<'a> {
    /// Builds the index over `rows`, which must already be in chronological order.
    pub fn build(rows: &'a [TransactionRow]) -> Self {
        let mut by_order: HashMap<String, Vec<usize>> = HashMap::new();
        for (ix, row) in rows.iter().enumerate() {
            let mut ids = order_ids_in(row.title());
            ids.extend(order_ids_in(row.info()));
            for id in ids {
                let entries = by_order.entry(id).or_default();
                if entries.last() != Some(&ix) {
                    entries.push(ix);
                }
            }
        }
        Self { rows, by_order }
    }

    /// All rows of `kind` that reference `order_id` and, when given, whose title contains
    /// `title_contains`. Rows come in chronological order.
    pub fn find_all<'s>(
        &'s self,
        order_id: &str,
        kind: TransactionKind,
        title_contains: Option<&'s str>,
    ) -> impl Iterator<Item = &'a TransactionRow> + 's {
        self.by_order
            .get(order_id)
            .into_iter()
            .flatten()
            .map(|ix| &self.rows[*ix])
            .filter(move |row| row.kind() == kind)
            .filter(move |row| title_contains.map_or(true, |needle| row.title().contains(needle)))
    }

    /// The earliest row matching `find_all`.
    pub fn find(
        &self,
        order_id: &str,
        kind: TransactionKind,
        title_contains: Option<&str>,
    ) -> Option<&'a TransactionRow> {
        self.find_all(order_id, kind, title_contains).next()
    }

    /// The number of distinct order ids referenced by the statement.
    pub fn orders(&self) -> usize {
        self.by_order.len()
    }
}
