//! Transaction table
//!
//! Immutable transaction-level input. One row per sale line; the engine never
//! mutates loaded rows, every derived table is a fresh allocation.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::schema::{self, Column};
use crate::error::{EngineError, EngineResult};

/// A single sale line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub customer_id: String,
    pub product_id: String,
    pub invoice_id: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_amount: f64,
    pub date: NaiveDate,
}

/// Transaction-level input table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionTable {
    pub rows: Vec<Transaction>,
}

impl TransactionTable {
    pub fn new(rows: Vec<Transaction>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct customer ids in first-seen order.
    pub fn customer_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut ids = Vec::new();
        for row in &self.rows {
            if seen.insert(row.customer_id.clone()) {
                ids.push(row.customer_id.clone());
            }
        }
        ids
    }

    /// Rows grouped per customer, preserving row order within each group.
    pub fn by_customer(&self) -> BTreeMap<&str, Vec<&Transaction>> {
        let mut groups: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(row.customer_id.as_str()).or_default().push(row);
        }
        groups
    }

    /// Latest transaction date across the table.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).max()
    }

    /// Load from CSV, resolving column aliases.
    ///
    /// customer_id, quantity, unit_price and the transaction date are
    /// required; product_id, invoice_id and total_amount degrade gracefully
    /// (amount falls back to quantity * unit_price).
    pub fn from_csv(path: &Path) -> EngineResult<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();

        let customer_idx = schema::require_column(&headers, Column::CustomerId)?;
        let date_idx = schema::require_column(&headers, Column::TransactionDate)?;
        let quantity_idx = schema::require_column(&headers, Column::Quantity)?;
        let price_idx = schema::require_column(&headers, Column::UnitPrice)?;
        let product_idx = schema::find_column(&headers, Column::ProductId);
        let invoice_idx = schema::find_column(&headers, Column::InvoiceId);
        let amount_idx = schema::find_column(&headers, Column::TotalAmount);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let get = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();

            let quantity: f64 = get(quantity_idx).parse().unwrap_or(0.0);
            let unit_price: f64 = get(price_idx).parse().unwrap_or(0.0);
            let total_amount = match amount_idx {
                Some(idx) => get(idx).parse().unwrap_or(quantity * unit_price),
                None => quantity * unit_price,
            };

            let date_raw = get(date_idx);
            let date = parse_date(&date_raw).ok_or_else(|| {
                EngineError::TrainingFailed(format!("unparseable date '{date_raw}'"))
            })?;

            rows.push(Transaction {
                customer_id: get(customer_idx),
                product_id: product_idx.map(get).unwrap_or_default(),
                invoice_id: invoice_idx.map(get).filter(|s| !s.is_empty()),
                quantity,
                unit_price,
                total_amount,
                date,
            });
        }

        if rows.is_empty() {
            return Err(EngineError::EmptyInput);
        }

        info!(rows = rows.len(), path = %path.display(), "loaded transaction table");
        Ok(Self { rows })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%m/%d/%Y"];
    for fmt in FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    // Timestamps: keep the date part.
    raw.split(&[' ', 'T'][..])
        .next()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}
