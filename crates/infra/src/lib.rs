//! Infrastructure layer: stores, services, the outbox and the engine that
//! wires them together.

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod goods_receipts;
pub mod inventory_store;
pub mod kv;
pub mod ledger;
pub mod locks;
pub mod movements;
pub mod outbox;
pub mod receipt_store;
pub mod reconciliations;
pub mod summaries;

pub use config::{ConfigError, EngineConfig};
pub use directory::{
    CylinderTypeInfo, DeliverySource, InMemoryDeliverySource, InMemoryDirectory, ReferenceDirectory,
};
pub use engine::{Engine, EngineParts};
pub use error::StoreError;
pub use goods_receipts::TransitionOutcome;
pub use movements::{InitialStock, MovementOutcome, MovementService};
