//! Cylinder inventory domain (pure logic).
//!
//! Locations, positions, movement requests/records and the movement validator.
//! No IO, no storage, no clocks beyond what callers pass in.

pub mod location;
pub mod movement;
pub mod position;
pub mod validator;

pub use location::{CylinderStatus, Endpoint, Location, LocationKind, PositionKey};
pub use movement::{IdempotencyKey, MovementQuery, MovementRecord, MovementRequest, MovementType};
pub use position::{checked_adjust, Adjustment, InventoryPosition, PositionFilter};
pub use validator::{
    check_rules, needs_stock_check, validate, KindRule, MovementRule, StatusRule,
    ValidationIssue, ValidationResult, ValidationWarning,
};
