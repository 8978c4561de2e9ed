//! Movement validation: the closed transition table plus source sufficiency.
//!
//! | type            | status        | from kinds        | to kinds          |
//! |-----------------|---------------|-------------------|-------------------|
//! | DELIVERY_FILLED | FILLED→FILLED | YARD, VEHICLE     | CUSTOMER, VEHICLE |
//! | RETURN_EMPTY    | FILLED→EMPTY  | CUSTOMER, VEHICLE | PLANT, VEHICLE    |
//! | REFILLING_OUT   | EMPTY→FILLED  | PLANT, REFILLING  | YARD              |
//! | RETURN_FILLED   | FILLED→FILLED | any               | any               |
//! | ADJUSTMENT      | none          | any               | any               |
//! | TRANSFER        | none          | any               | any               |
//! | DELIVERY        | FILLED→FILLED | YARD, VEHICLE     | VEHICLE, CUSTOMER |
//! | RETURN          | FILLED→FILLED | CUSTOMER, VEHICLE | VEHICLE, YARD     |

use serde::{Deserialize, Serialize};

use gasflow_core::{DomainError, DomainResult};

use crate::location::{CylinderStatus, Endpoint, LocationKind};
use crate::movement::{MovementRequest, MovementType};

use CylinderStatus::{Empty, Filled};
use LocationKind::{Customer, Plant, Refilling, Vehicle, Yard};

/// Required source/destination statuses for a movement type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatusRule {
    Unconstrained,
    Exact {
        from: CylinderStatus,
        to: CylinderStatus,
    },
}

/// Allowed location kinds on one side of a movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KindRule {
    Any,
    OneOf(&'static [LocationKind]),
}

impl KindRule {
    pub fn allows(self, kind: LocationKind) -> bool {
        match self {
            KindRule::Any => true,
            KindRule::OneOf(kinds) => kinds.contains(&kind),
        }
    }
}

/// One row of the transition table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MovementRule {
    pub status: StatusRule,
    pub from_kinds: KindRule,
    pub to_kinds: KindRule,
}

impl MovementRule {
    /// Status-constrained types cannot be sourceless.
    pub fn requires_source(&self) -> bool {
        matches!(self.status, StatusRule::Exact { .. })
    }
}

impl MovementType {
    pub const fn rule(self) -> MovementRule {
        const FILLED_TO_FILLED: StatusRule = StatusRule::Exact { from: Filled, to: Filled };

        match self {
            MovementType::DeliveryFilled => MovementRule {
                status: FILLED_TO_FILLED,
                from_kinds: KindRule::OneOf(&[Yard, Vehicle]),
                to_kinds: KindRule::OneOf(&[Customer, Vehicle]),
            },
            MovementType::ReturnEmpty => MovementRule {
                status: StatusRule::Exact { from: Filled, to: Empty },
                from_kinds: KindRule::OneOf(&[Customer, Vehicle]),
                to_kinds: KindRule::OneOf(&[Plant, Vehicle]),
            },
            MovementType::RefillingOut => MovementRule {
                status: StatusRule::Exact { from: Empty, to: Filled },
                from_kinds: KindRule::OneOf(&[Plant, Refilling]),
                to_kinds: KindRule::OneOf(&[Yard]),
            },
            MovementType::ReturnFilled => MovementRule {
                status: FILLED_TO_FILLED,
                from_kinds: KindRule::Any,
                to_kinds: KindRule::Any,
            },
            MovementType::Adjustment | MovementType::Transfer => MovementRule {
                status: StatusRule::Unconstrained,
                from_kinds: KindRule::Any,
                to_kinds: KindRule::Any,
            },
            MovementType::Delivery => MovementRule {
                status: FILLED_TO_FILLED,
                from_kinds: KindRule::OneOf(&[Yard, Vehicle]),
                to_kinds: KindRule::OneOf(&[Vehicle, Customer]),
            },
            MovementType::Return => MovementRule {
                status: FILLED_TO_FILLED,
                from_kinds: KindRule::OneOf(&[Customer, Vehicle]),
                to_kinds: KindRule::OneOf(&[Vehicle, Yard]),
            },
        }
    }
}

/// Blocking validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationIssue {
    NonPositiveQuantity { quantity: i64 },
    MissingSource { movement_type: MovementType },
    SourceStatus { expected: CylinderStatus, found: CylinderStatus },
    DestinationStatus { expected: CylinderStatus, found: CylinderStatus },
    SourceKind { movement_type: MovementType, kind: LocationKind },
    DestinationKind { movement_type: MovementType, kind: LocationKind },
    SelfTransfer,
    InsufficientQuantity { requested: i64, available: i64 },
}

impl core::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ValidationIssue::NonPositiveQuantity { quantity } => {
                write!(f, "quantity must be positive (got {quantity})")
            }
            ValidationIssue::MissingSource { movement_type } => {
                write!(f, "{movement_type} requires a source location")
            }
            ValidationIssue::SourceStatus { expected, found } => {
                write!(f, "source status must be {expected}, got {found}")
            }
            ValidationIssue::DestinationStatus { expected, found } => {
                write!(f, "destination status must be {expected}, got {found}")
            }
            ValidationIssue::SourceKind { movement_type, kind } => {
                write!(f, "{movement_type} cannot move from {kind}")
            }
            ValidationIssue::DestinationKind { movement_type, kind } => {
                write!(f, "{movement_type} cannot move to {kind}")
            }
            ValidationIssue::SelfTransfer => f.write_str("source and destination are identical"),
            ValidationIssue::InsufficientQuantity { requested, available } => write!(
                f,
                "insufficient quantity: requested {requested}, available {available}, short by {}",
                requested - available
            ),
        }
    }
}

/// Legal but unusual combination; reported, never blocking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValidationWarning {
    FilledDeliveryToVehicle,
    SourcelessAdjustment,
    StatusChangingTransfer { from: CylinderStatus, to: CylinderStatus },
    ExternalRefillingSource,
}

impl core::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ValidationWarning::FilledDeliveryToVehicle => {
                f.write_str("filled cylinders delivered to a vehicle rather than a customer")
            }
            ValidationWarning::SourcelessAdjustment => {
                f.write_str("adjustment without a source creates stock")
            }
            ValidationWarning::StatusChangingTransfer { from, to } => {
                write!(f, "transfer changes cylinder status from {from} to {to}")
            }
            ValidationWarning::ExternalRefillingSource => {
                f.write_str("refilling source is outside tracked inventory and is not debited")
            }
        }
    }
}

/// Outcome of `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    fn from_parts(errors: Vec<ValidationIssue>, warnings: Vec<ValidationWarning>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Convert into the error taxonomy.
    ///
    /// A lone insufficiency maps to `InsufficientQuantity`; anything else is a
    /// `Validation` error listing every issue.
    pub fn into_result(self) -> DomainResult<Vec<ValidationWarning>> {
        if self.is_valid {
            return Ok(self.warnings);
        }
        if let [ValidationIssue::InsufficientQuantity { requested, available }] =
            self.errors.as_slice()
        {
            return Err(DomainError::insufficient(*requested, *available));
        }
        let msg = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(DomainError::validation(msg))
    }
}

/// Whether step 3 (source sufficiency) applies to this movement.
pub fn needs_stock_check(request: &MovementRequest) -> bool {
    request.movement_type != MovementType::Adjustment && request.debits_source()
}

/// Table, quantity and self-transfer checks; everything that does not need stock data.
pub fn check_rules(request: &MovementRequest) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let rule = request.movement_type.rule();

    if request.quantity <= 0 {
        errors.push(ValidationIssue::NonPositiveQuantity {
            quantity: request.quantity,
        });
    }

    match request.from {
        Some(from) => check_source(request, &rule, from, &mut errors),
        None if rule.requires_source() => errors.push(ValidationIssue::MissingSource {
            movement_type: request.movement_type,
        }),
        None => {}
    }
    check_destination(request, &rule, &mut errors);

    if request.from == Some(request.to) {
        errors.push(ValidationIssue::SelfTransfer);
    }

    collect_warnings(request, &mut warnings);
    ValidationResult::from_parts(errors, warnings)
}

/// Full validation given the quantity currently held at the source position.
///
/// `source_available` is ignored when the movement needs no stock check.
pub fn validate(request: &MovementRequest, source_available: i64) -> ValidationResult {
    let mut result = check_rules(request);
    if needs_stock_check(request) && request.quantity > 0 && source_available < request.quantity {
        result.errors.push(ValidationIssue::InsufficientQuantity {
            requested: request.quantity,
            available: source_available,
        });
        result.is_valid = false;
    }
    result
}

fn check_source(
    request: &MovementRequest,
    rule: &MovementRule,
    from: Endpoint,
    errors: &mut Vec<ValidationIssue>,
) {
    if !rule.from_kinds.allows(from.kind()) {
        errors.push(ValidationIssue::SourceKind {
            movement_type: request.movement_type,
            kind: from.kind(),
        });
    }
    if let StatusRule::Exact { from: expected, .. } = rule.status {
        if from.status != expected {
            errors.push(ValidationIssue::SourceStatus {
                expected,
                found: from.status,
            });
        }
    }
}

fn check_destination(request: &MovementRequest, rule: &MovementRule, errors: &mut Vec<ValidationIssue>) {
    let to = request.to;
    if !rule.to_kinds.allows(to.kind()) {
        errors.push(ValidationIssue::DestinationKind {
            movement_type: request.movement_type,
            kind: to.kind(),
        });
    }
    if let StatusRule::Exact { to: expected, .. } = rule.status {
        if to.status != expected {
            errors.push(ValidationIssue::DestinationStatus {
                expected,
                found: to.status,
            });
        }
    }
}

fn collect_warnings(request: &MovementRequest, warnings: &mut Vec<ValidationWarning>) {
    match request.movement_type {
        MovementType::DeliveryFilled if request.to.kind() == Vehicle => {
            warnings.push(ValidationWarning::FilledDeliveryToVehicle);
        }
        MovementType::Adjustment if request.from.is_none() => {
            warnings.push(ValidationWarning::SourcelessAdjustment);
        }
        MovementType::Transfer => {
            if let Some(from) = request.from {
                if from.status != request.to.status {
                    warnings.push(ValidationWarning::StatusChangingTransfer {
                        from: from.status,
                        to: request.to.status,
                    });
                }
            }
        }
        _ => {}
    }
    if matches!(request.from, Some(f) if f.kind() == Refilling) {
        warnings.push(ValidationWarning::ExternalRefillingSource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use gasflow_core::{CustomerId, CylinderTypeId, LocationRefId, UserId, VehicleId};
    use proptest::prelude::*;

    fn location_of(kind: LocationKind) -> Location {
        match kind {
            Yard => Location::yard(),
            Vehicle => Location::vehicle(VehicleId(3)),
            Customer => Location::customer(CustomerId(9)),
            Plant => Location::plant(Some(LocationRefId(1))),
            Refilling => Location::refilling(Some(LocationRefId(2))),
        }
    }

    fn request(
        movement_type: MovementType,
        from: Option<(LocationKind, CylinderStatus)>,
        to: (LocationKind, CylinderStatus),
        quantity: i64,
    ) -> MovementRequest {
        let mut req = MovementRequest::new(
            movement_type,
            CylinderTypeId(1),
            quantity,
            Endpoint::new(location_of(to.0), to.1),
            UserId(1),
        );
        if let Some((kind, status)) = from {
            req = req.source(Endpoint::new(location_of(kind), status));
        }
        req
    }

    /// Independent restatement of the transition table.
    fn table_allows(
        t: MovementType,
        from: Option<(LocationKind, CylinderStatus)>,
        to: (LocationKind, CylinderStatus),
    ) -> bool {
        let constrained = |fs: CylinderStatus, ts: CylinderStatus, fk: &[LocationKind], tk: &[LocationKind]| {
            match from {
                None => false,
                Some((k, s)) => s == fs && to.1 == ts && fk.contains(&k) && tk.contains(&to.0),
            }
        };
        let same_tuple = from == Some(to);
        if same_tuple {
            return false;
        }
        match t {
            MovementType::DeliveryFilled => constrained(Filled, Filled, &[Yard, Vehicle], &[Customer, Vehicle]),
            MovementType::ReturnEmpty => constrained(Filled, Empty, &[Customer, Vehicle], &[Plant, Vehicle]),
            MovementType::RefillingOut => constrained(Empty, Filled, &[Plant, Refilling], &[Yard]),
            MovementType::ReturnFilled => constrained(Filled, Filled, &LocationKind::ALL, &LocationKind::ALL),
            MovementType::Adjustment | MovementType::Transfer => true,
            MovementType::Delivery => constrained(Filled, Filled, &[Yard, Vehicle], &[Vehicle, Customer]),
            MovementType::Return => constrained(Filled, Filled, &[Customer, Vehicle], &[Vehicle, Yard]),
        }
    }

    fn all_endpoints() -> Vec<(LocationKind, CylinderStatus)> {
        LocationKind::ALL
            .into_iter()
            .flat_map(|k| CylinderStatus::ALL.into_iter().map(move |s| (k, s)))
            .collect()
    }

    #[test]
    fn table_is_enforced_exhaustively() {
        let endpoints = all_endpoints();
        let mut sources: Vec<Option<(LocationKind, CylinderStatus)>> = vec![None];
        sources.extend(endpoints.iter().copied().map(Some));

        for t in MovementType::ALL {
            for from in &sources {
                for to in &endpoints {
                    let req = request(t, *from, *to, 5);
                    // Plenty of stock: only the table decides.
                    let result = validate(&req, 1_000);
                    assert_eq!(
                        result.is_valid,
                        table_allows(t, *from, *to),
                        "{t} from {from:?} to {to:?}: {:?}",
                        result.errors
                    );
                }
            }
        }
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let req = request(MovementType::Transfer, Some((Yard, Filled)), (Vehicle, Filled), 0);
        let result = validate(&req, 100);
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec![ValidationIssue::NonPositiveQuantity { quantity: 0 }]);
    }

    #[test]
    fn self_transfer_is_rejected() {
        let req = request(MovementType::Transfer, Some((Yard, Filled)), (Yard, Filled), 1);
        let err = validate(&req, 100).into_result().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("identical")));
    }

    #[test]
    fn insufficient_source_names_shortfall() {
        let req = request(MovementType::Transfer, Some((Yard, Filled)), (Vehicle, Filled), 1000);
        let result = validate(&req, 90);
        assert_eq!(
            result.errors,
            vec![ValidationIssue::InsufficientQuantity { requested: 1000, available: 90 }]
        );
        assert!(result.errors[0].to_string().contains("short by 910"));
        assert_eq!(
            result.into_result().unwrap_err(),
            DomainError::insufficient(1000, 90)
        );
    }

    #[test]
    fn adjustment_and_refilling_skip_stock_check() {
        let adj = request(MovementType::Adjustment, Some((Yard, Filled)), (Vehicle, Filled), 50);
        assert!(validate(&adj, 0).is_valid);

        let refill = request(MovementType::RefillingOut, Some((Refilling, Empty)), (Yard, Filled), 50);
        let result = validate(&refill, 0);
        assert!(result.is_valid);
        assert!(result.warnings.contains(&ValidationWarning::ExternalRefillingSource));

        let from_plant = request(MovementType::RefillingOut, Some((Plant, Empty)), (Yard, Filled), 50);
        assert!(!validate(&from_plant, 0).is_valid);
    }

    #[test]
    fn unusual_combinations_warn_without_blocking() {
        let to_vehicle = request(MovementType::DeliveryFilled, Some((Yard, Filled)), (Vehicle, Filled), 1);
        let result = validate(&to_vehicle, 10);
        assert!(result.is_valid);
        assert_eq!(result.warnings, vec![ValidationWarning::FilledDeliveryToVehicle]);

        let seed = request(MovementType::Adjustment, None, (Yard, Filled), 10);
        assert_eq!(
            check_rules(&seed).warnings,
            vec![ValidationWarning::SourcelessAdjustment]
        );

        let flip = request(MovementType::Transfer, Some((Yard, Filled)), (Yard, Empty), 1);
        let result = validate(&flip, 10);
        assert!(result.is_valid);
        assert_eq!(
            result.warnings,
            vec![ValidationWarning::StatusChangingTransfer { from: Filled, to: Empty }]
        );
    }

    #[test]
    fn multiple_issues_are_all_reported() {
        let req = request(MovementType::RefillingOut, Some((Customer, Filled)), (Plant, Empty), -1);
        let result = check_rules(&req);
        assert_eq!(result.errors.len(), 5);
        let err = result.into_result().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains(';')));
    }

    fn movement_type() -> impl Strategy<Value = MovementType> {
        proptest::sample::select(MovementType::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_global_rejects: 8192,
            ..ProptestConfig::default()
        })]

        /// Property: any in-table movement is accepted exactly when the source
        /// covers the requested quantity.
        #[test]
        fn sufficiency_decides_in_table_movements(
            t in movement_type(),
            from_idx in 0usize..10,
            to_idx in 0usize..10,
            quantity in 1i64..500,
            available in 0i64..500,
        ) {
            let endpoints = all_endpoints();
            let from = Some(endpoints[from_idx]);
            let to = endpoints[to_idx];
            prop_assume!(table_allows(t, from, to));

            let req = request(t, from, to, quantity);
            let result = validate(&req, available);
            let expected = !needs_stock_check(&req) || available >= quantity;
            prop_assert_eq!(result.is_valid, expected);
        }
    }
}
