//! Validation utilities for the Stock Ledger service

use rust_decimal::Decimal;
use uuid::Uuid;

// ============================================================================
// Product Validations
// ============================================================================

/// Normalize a SKU: trimmed and upper-cased
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

/// Validate SKU format (1-64 chars of letters, digits, '-', '_' or '.')
pub fn validate_sku(sku: &str) -> Result<(), &'static str> {
    let sku = sku.trim();
    if sku.is_empty() {
        return Err("SKU is required");
    }
    if sku.len() > 64 {
        return Err("SKU must be at most 64 characters");
    }
    if !sku
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("SKU may only contain letters, digits, '-', '_' and '.'");
    }
    Ok(())
}

/// Validate unit price is strictly positive
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price <= Decimal::ZERO {
        return Err("Unit price must be greater than zero");
    }
    Ok(())
}

/// Validate a category name (at least 2 characters)
pub fn validate_category_name(name: &str) -> Result<(), &'static str> {
    if name.trim().chars().count() < 2 {
        return Err("Category name must be at least 2 characters long");
    }
    Ok(())
}

// ============================================================================
// Operation Validations
// ============================================================================

/// Trimmed name, or `None` when blank
pub fn non_blank(name: Option<&str>) -> Option<&str> {
    name.map(str::trim).filter(|s| !s.is_empty())
}

/// Validate a movement quantity (at least 1)
pub fn validate_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity < 1 {
        return Err("Quantity must be at least 1");
    }
    Ok(())
}

/// Validate a transfer moves stock between two distinct locations
pub fn validate_transfer_locations(from: Uuid, to: Uuid) -> Result<(), &'static str> {
    if from == to {
        return Err("Source and destination locations must differ");
    }
    Ok(())
}

/// Validate a client-supplied idempotency key (1-128 printable ASCII chars)
pub fn validate_idempotency_key(key: &str) -> Result<(), &'static str> {
    if key.is_empty() || key.len() > 128 {
        return Err("Idempotency key must be 1-128 characters");
    }
    if !key.chars().all(|c| c.is_ascii_graphic()) {
        return Err("Idempotency key must be printable ASCII without spaces");
    }
    Ok(())
}
