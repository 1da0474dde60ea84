//! Billing domain module (event-sourced).
//!
//! This crate contains the invoice-batch adjustment engine: the pure
//! allocation functions (preview mode) and the `InvoiceBatch` aggregate that
//! commits adjustments as append-only audit events and supports reversal.
//! No IO, no HTTP, no storage.

pub mod allocation;
pub mod batch;
pub mod error;

pub use allocation::{
    AllocationMethod, AllocationOutcome, LARGE_VARIANCE_THRESHOLD, LineAllocation, LineId,
    LineInput, ManualReconciliation, allocate, exceeds_variance_threshold, reconcile_manual,
    variance_percent,
};
pub use batch::{
    AdjustmentApplied, AdjustmentEntry, AdjustmentId, AdjustmentReversed, ApplyAdjustment,
    BatchCommand, BatchEvent, BatchId, BatchLine, BatchOpened, InvoiceBatch, LineBaseline,
    LineSpec, LineType, OpenBatch, RestoredLine, ReverseAdjustment,
};
pub use error::AdjustmentError;
