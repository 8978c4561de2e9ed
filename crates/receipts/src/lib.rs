//! `gasflow-receipts`: goods receipt lifecycle and the movements it drives.
//!
//! The aggregate is pure: commands in, events out. Applying the planned
//! movements and persisting receipts happens in `gasflow-infra`.

pub mod delivery;
pub mod goods_receipt;

pub use delivery::{
    DeliveryLine, DeliveryTransaction, approval_movements, dispatch_movement, finalize_movements,
    handover_movement, return_movements,
};
pub use goods_receipt::{
    ApproveGoodsReceipt, CreateGoodsReceipt, FinalizeGoodsReceipt, GoodsReceipt,
    GoodsReceiptApproved, GoodsReceiptCommand, GoodsReceiptCreated, GoodsReceiptEvent,
    GoodsReceiptFinalized, GoodsReceiptStatus, TripClosure,
};
