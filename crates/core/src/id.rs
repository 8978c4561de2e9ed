//! Strongly-typed identifiers used across the domain.
//!
//! Master-data references (cylinder types, vehicles, customers, deliveries, plans)
//! are integer keys owned by other domains. Records created by this subsystem get
//! time-ordered UUIDs.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! impl_uuid_newtype {
    ($t:ident, $name:literal) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier (UUIDv7, time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

macro_rules! impl_int_newtype {
    ($t:ident, $name:literal) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(pub i64);

        impl $t {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let v = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(v))
            }
        }
    };
}

impl_int_newtype!(CylinderTypeId, "CylinderTypeId");
impl_int_newtype!(LocationRefId, "LocationRefId");
impl_int_newtype!(VehicleId, "VehicleId");
impl_int_newtype!(CustomerId, "CustomerId");
impl_int_newtype!(DeliveryId, "DeliveryId");
impl_int_newtype!(TransactionId, "TransactionId");
impl_int_newtype!(PlanId, "PlanId");
impl_int_newtype!(OrderId, "OrderId");
impl_int_newtype!(UserId, "UserId");

impl_uuid_newtype!(MovementId, "MovementId");
impl_uuid_newtype!(GoodsReceiptId, "GoodsReceiptId");
impl_uuid_newtype!(ExchangeId, "ExchangeId");
impl_uuid_newtype!(ReconciliationId, "ReconciliationId");
impl_uuid_newtype!(VarianceDetailId, "VarianceDetailId");

impl From<VehicleId> for LocationRefId {
    fn from(value: VehicleId) -> Self {
        Self(value.0)
    }
}

impl From<CustomerId> for LocationRefId {
    fn from(value: CustomerId) -> Self {
        Self(value.0)
    }
}

/// Deliveries are the reference transaction for GR-driven movements.
impl From<DeliveryId> for TransactionId {
    fn from(value: DeliveryId) -> Self {
        Self(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_ids_parse_and_reject_garbage() {
        assert_eq!("42".parse::<CylinderTypeId>().unwrap(), CylinderTypeId(42));
        assert!(matches!(
            "forty".parse::<VehicleId>(),
            Err(DomainError::Validation(msg)) if msg.starts_with("VehicleId")
        ));
    }

    #[test]
    fn uuid_ids_are_time_ordered() {
        let a = MovementId::new();
        let b = MovementId::new();
        assert!(a <= b);
        assert_eq!(a.to_string().parse::<MovementId>().unwrap(), a);
    }

    #[test]
    fn delivery_converts_to_reference_transaction() {
        assert_eq!(TransactionId::from(DeliveryId(5)), TransactionId(5));
        assert_eq!(LocationRefId::from(VehicleId(3)), LocationRefId(3));
    }
}
