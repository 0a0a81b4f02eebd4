//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Cart / pricing rule violations                 │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors                                                       │
//! │  └── DbError          - Remote store failures                          │
//! │                                                                         │
//! │  tally-engine errors                                                   │
//! │  ├── CheckoutError / TransferError                                     │
//! │  └── ErrorNotice      - What the operator sees (code + message)        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CheckoutError → ErrorNotice       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cart and numpad errors are local and recoverable: the cashier re-enters.

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Cart and pricing rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// No line with this item id in the cart.
    #[error("Item not in cart: {0}")]
    ItemNotFound(String),

    /// Product is inactive and cannot be sold.
    #[error("Product is not available for sale: {0}")]
    ProductInactive(String),

    /// Variant id does not belong to the product.
    #[error("Variant {variant_id} not found for product {product_id}")]
    VariantNotFound {
        product_id: String,
        variant_id: String,
    },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Field cannot be changed for this kind of line (e.g. weight on a
    /// unit-counted line).
    #[error("{field} cannot be set on {item_id}")]
    FieldNotApplicable { item_id: String, field: String },

    /// Nothing to price or settle.
    #[error("Cart is empty")]
    EmptyCart,

    /// The calculation was derived from an older cart revision.
    ///
    /// ## When This Occurs
    /// ```text
    /// calculate(cart)   → revision 7
    /// cart.add_item(..) → revision 8
    /// settle(cart, calc@7) → StaleCalculation { 7, 8 }
    /// ```
    #[error("Totals are out of date (calculated at revision {calculated}, cart is at {current})")]
    StaleCalculation { calculated: u64, current: u64 },

    /// Line still waiting for a weight or price capture.
    #[error("{0} has not been weighed or priced yet")]
    UnpricedLine(String),

    /// Cash received does not cover the total.
    #[error("Cash received {received} is less than total {total}")]
    InsufficientCash { received: Money, total: Money },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Rejected before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Two fields that must differ are equal.
    #[error("{field} must differ from {other}")]
    MustDiffer { field: String, other: String },

    /// Duplicate value (e.g., duplicate product name).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientCash {
            received: Money::from_cents(1000),
            total: Money::from_cents(1250),
        };
        assert_eq!(
            err.to_string(),
            "Cash received $10.00 is less than total $12.50"
        );

        let err = CoreError::StaleCalculation {
            calculated: 7,
            current: 8,
        };
        assert!(err.to_string().contains("revision 7"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "source".to_string(),
        };
        assert_eq!(err.to_string(), "source is required");

        let err = ValidationError::MustDiffer {
            field: "destination".to_string(),
            other: "source".to_string(),
        };
        assert_eq!(err.to_string(), "destination must differ from source");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
