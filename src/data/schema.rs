//! Column schema and alias resolution
//!
//! Upstream exports name columns inconsistently (`trans_date`, `order_date`,
//! `invoice_date` all mean the transaction date). Resolution order: alias
//! lookup table, then case-insensitive exact match, then (for the date
//! column only) any header containing "date".

use crate::error::{EngineError, EngineResult};

/// Canonical transaction columns the engine needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    CustomerId,
    ProductId,
    InvoiceId,
    Quantity,
    UnitPrice,
    TotalAmount,
    TransactionDate,
}

impl Column {
    pub fn canonical(&self) -> &'static str {
        match self {
            Column::CustomerId => "customer_id",
            Column::ProductId => "product_id",
            Column::InvoiceId => "invoice_id",
            Column::Quantity => "quantity",
            Column::UnitPrice => "unit_price",
            Column::TotalAmount => "total_amount",
            Column::TransactionDate => "transaction_date",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Column::CustomerId => &["customer_id", "customerId", "cust_id", "customer"],
            Column::ProductId => &["product_id", "productId", "item_id", "itemId"],
            Column::InvoiceId => &["invoice_id", "invoice_number", "invoiceNo"],
            Column::Quantity => &["quantity", "qty", "total_qty"],
            Column::UnitPrice => &["unit_price", "unitPrice", "price"],
            Column::TotalAmount => &["total_amount", "amount", "revenue", "line_total", "total_revenue"],
            Column::TransactionDate => &[
                "transaction_date",
                "trans_date",
                "date",
                "invoice_date",
                "order_date",
            ],
        }
    }

    fn is_date(&self) -> bool {
        matches!(self, Column::TransactionDate)
    }
}

/// Find the index of `column` within `headers`, or None.
pub fn find_column(headers: &[String], column: Column) -> Option<usize> {
    // Alias table first.
    for alias in column.aliases() {
        if let Some(idx) = headers.iter().position(|h| h == alias) {
            return Some(idx);
        }
    }

    // Case-insensitive exact match against canonical name and aliases.
    for (idx, header) in headers.iter().enumerate() {
        let lower = header.to_lowercase();
        if lower == column.canonical().to_lowercase() {
            return Some(idx);
        }
        if column.aliases().iter().any(|a| a.to_lowercase() == lower) {
            return Some(idx);
        }
    }

    // Last resort for the date column: any header containing "date".
    if column.is_date() {
        return headers.iter().position(|h| h.to_lowercase().contains("date"));
    }

    None
}

/// Like [`find_column`] but a hard error when the column is required.
pub fn require_column(headers: &[String], column: Column) -> EngineResult<usize> {
    find_column(headers, column)
        .ok_or_else(|| EngineError::MissingColumn(column.canonical().to_string()))
}
