//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are rebuildable from the event stream, tenant-isolated,
//! and idempotent (safe for at-least-once delivery).

pub mod invoice_batches;

pub use invoice_batches::{
    AdjustmentRecord, AdjustmentSummary, BatchProjectionError, InvoiceBatchReadModel,
    InvoiceBatchesProjection, LineReadModel,
};
