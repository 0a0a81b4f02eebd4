//! # Validation Module
//!
//! Input validation utilities for Tally POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure, synchronous)                              │
//! │  ├── Quantities, prices, tax rates                                     │
//! │  ├── Transfer preconditions (resolved, distinct, positive)             │
//! │  └── Product name field rules                                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: tally-engine                                                 │
//! │  └── Remote checks (name uniqueness) behind a debounce                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Remote store                                                 │
//! │  └── Atomic stock deltas, constraint checks                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here runs before a remote call is made.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::quantity::Quantity;
use crate::types::{ItemKey, StockTransfer};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_LINE_WEIGHT_MILLI, MAX_PRODUCT_NAME_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Issues
// =============================================================================

/// One problem with a form field, shown next to the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FieldIssue {
    pub field: String,
    /// Machine-readable issue code (`REQUIRED`, `TOO_LONG`, `DUPLICATE`, ...).
    pub code: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: &str, code: &str, message: impl Into<String>) -> Self {
        FieldIssue {
            field: field.to_string(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<&ValidationError> for FieldIssue {
    fn from(err: &ValidationError) -> Self {
        let (field, code) = match err {
            ValidationError::Required { field } => (field, "REQUIRED"),
            ValidationError::TooShort { field, .. } => (field, "TOO_SHORT"),
            ValidationError::TooLong { field, .. } => (field, "TOO_LONG"),
            ValidationError::OutOfRange { field, .. } => (field, "OUT_OF_RANGE"),
            ValidationError::MustBePositive { field } => (field, "MUST_BE_POSITIVE"),
            ValidationError::InvalidFormat { field, .. } => (field, "INVALID_FORMAT"),
            ValidationError::MustDiffer { field, .. } => (field, "MUST_DIFFER"),
            ValidationError::Duplicate { field, .. } => (field, "DUPLICATE"),
        };
        FieldIssue::new(field, code, err.to_string())
    }
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ```rust
/// use tally_core::validation::validate_sku;
///
/// assert!(validate_sku("COKE-330").is_ok());
/// assert!(validate_sku("").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name (first failing rule wins).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    match product_name_rules(name).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// All local rule violations for a product name, as field issues.
///
/// ```rust
/// use tally_core::validation::product_name_issues;
///
/// assert!(product_name_issues("Oat Milk 1L").is_empty());
/// assert_eq!(product_name_issues("  ")[0].code, "REQUIRED");
/// ```
pub fn product_name_issues(name: &str) -> Vec<FieldIssue> {
    product_name_rules(name).iter().map(FieldIssue::from).collect()
}

fn product_name_rules(name: &str) -> Vec<ValidationError> {
    let trimmed = name.trim();
    let mut errors = Vec::new();

    if trimmed.is_empty() {
        errors.push(ValidationError::Required {
            field: "name".to_string(),
        });
        return errors;
    }

    if trimmed.chars().count() < 2 {
        errors.push(ValidationError::TooShort {
            field: "name".to_string(),
            min: 2,
        });
    }

    if trimmed.chars().count() > MAX_PRODUCT_NAME_LEN {
        errors.push(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_PRODUCT_NAME_LEN,
        });
    }

    if trimmed.chars().any(char::is_control) {
        errors.push(ValidationError::InvalidFormat {
            field: "name".to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    errors
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a whole-unit quantity for a cart line (1..=999).
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a scale reading for a loose-weight line.
///
/// ## Rules
/// - Must be positive (a zero weight would price the line at zero)
/// - At most `MAX_LINE_WEIGHT_MILLI` (999.999 kg)
pub fn validate_weight(weight: Quantity) -> ValidationResult<()> {
    if !weight.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "weight".to_string(),
        });
    }

    if weight.milli() > MAX_LINE_WEIGHT_MILLI {
        return Err(ValidationError::OutOfRange {
            field: "weight".to_string(),
            min: 1,
            max: MAX_LINE_WEIGHT_MILLI,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
///
/// ```rust
/// use tally_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0..=10000).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates that one more line fits in the cart.
pub fn validate_cart_size(current_items: usize) -> ValidationResult<()> {
    if current_items >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Transfer Preconditions
// =============================================================================

/// Checked transfer input, ready for the saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTransfer {
    pub from: ItemKey,
    pub to: ItemKey,
    pub quantity: i64,
}

/// Fail-fast checks for a stock transfer.
///
/// ## Rules
/// ```text
/// from resolved?        ── no ──► Required { "source" }
/// to resolved?          ── no ──► Required { "destination" }
/// from != to            ── no ──► MustDiffer { "destination", "source" }
/// quantity > 0          ── no ──► MustBePositive { "quantity" }
/// ```
pub fn validate_transfer(transfer: &StockTransfer) -> ValidationResult<ValidTransfer> {
    let from = transfer.from.clone().ok_or_else(|| ValidationError::Required {
        field: "source".to_string(),
    })?;
    let to = transfer.to.clone().ok_or_else(|| ValidationError::Required {
        field: "destination".to_string(),
    })?;

    if from.product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "source".to_string(),
        });
    }
    if to.product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "destination".to_string(),
        });
    }

    if from == to {
        return Err(ValidationError::MustDiffer {
            field: "destination".to_string(),
            other: "source".to_string(),
        });
    }

    if transfer.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(ValidTransfer {
        from,
        to,
        quantity: transfer.quantity,
    })
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(from: Option<ItemKey>, to: Option<ItemKey>, quantity: i64) -> StockTransfer {
        StockTransfer {
            from,
            to,
            quantity,
            notes: None,
        }
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("COKE-330").is_ok());
        assert!(validate_sku("product_1").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_product_name_issues_collects_all() {
        let long_with_control = format!("{}\u{7}", "A".repeat(MAX_PRODUCT_NAME_LEN + 1));
        let issues = product_name_issues(&long_with_control);
        let codes: Vec<_> = issues.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["TOO_LONG", "INVALID_FORMAT"]);
        assert!(issues.iter().all(|i| i.field == "name"));
    }

    #[test]
    fn test_validate_product_name() {
        assert!(validate_product_name("Coca-Cola 330ml").is_ok());
        assert!(matches!(
            validate_product_name(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_product_name("A"),
            Err(ValidationError::TooShort { .. })
        ));
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_weight() {
        assert!(validate_weight(Quantity::from_milli(1250)).is_ok());
        assert!(validate_weight(Quantity::zero()).is_err());
        assert!(validate_weight(Quantity::from_milli(MAX_LINE_WEIGHT_MILLI + 1)).is_err());
    }

    #[test]
    fn test_validate_tax_rate_bps() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(825).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
    }

    #[test]
    fn test_validate_transfer_happy_path() {
        let valid = validate_transfer(&transfer(
            Some(ItemKey::product("a")),
            Some(ItemKey::product("b")),
            3,
        ))
        .unwrap();
        assert_eq!(valid.quantity, 3);
        assert_eq!(valid.from, ItemKey::product("a"));
    }

    #[test]
    fn test_validate_transfer_rejects_unresolved() {
        let err = validate_transfer(&transfer(None, Some(ItemKey::product("b")), 3)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Required {
                field: "source".to_string()
            }
        );
        let err = validate_transfer(&transfer(Some(ItemKey::product("a")), None, 3)).unwrap_err();
        assert!(matches!(err, ValidationError::Required { ref field } if field == "destination"));
    }

    #[test]
    fn test_validate_transfer_rejects_same_item() {
        let err = validate_transfer(&transfer(
            Some(ItemKey::variant("a", "x")),
            Some(ItemKey::variant("a", "x")),
            1,
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::MustDiffer { .. }));

        // Different variants of one product are distinct items.
        assert!(validate_transfer(&transfer(
            Some(ItemKey::variant("a", "x")),
            Some(ItemKey::variant("a", "y")),
            1,
        ))
        .is_ok());
    }

    #[test]
    fn test_validate_transfer_rejects_non_positive_quantity() {
        for qty in [0, -3] {
            let err = validate_transfer(&transfer(
                Some(ItemKey::product("a")),
                Some(ItemKey::product("b")),
                qty,
            ))
            .unwrap_err();
            assert!(matches!(err, ValidationError::MustBePositive { .. }));
        }
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }
}
