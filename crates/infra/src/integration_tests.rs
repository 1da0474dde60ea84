//! Integration tests for the full event-sourced pipeline.
//!
//! Command → EventStore → EventBus → Projection → ReadModel
//!
//! Verifies that adjustment commands update the batch read model, that the
//! audit history survives reversal, that tenant isolation holds, and that
//! stale appends are rejected.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use scdp_billing::{
    AdjustmentId, AllocationMethod, ApplyAdjustment, BatchCommand, BatchId, InvoiceBatch, LineId,
    LineSpec, LineType, OpenBatch, ReverseAdjustment,
};
use scdp_core::{AggregateId, ExpectedVersion, Money, TenantId, UserId};
use scdp_events::{EventEnvelope, InMemoryEventBus};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent, UncommittedEvent};
use crate::projections::invoice_batches::{BATCH_AGGREGATE_TYPE, InvoiceBatchesProjection};
use crate::read_model::InMemoryTenantStore;

type Dispatcher =
    CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;
type Projection = InvoiceBatchesProjection<
    Arc<InMemoryTenantStore<BatchId, crate::projections::InvoiceBatchReadModel>>,
>;

fn setup() -> (Dispatcher, Arc<InMemoryEventStore>, Projection) {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store.clone(), bus);
    let projection = InvoiceBatchesProjection::new(Arc::new(InMemoryTenantStore::new()));
    (dispatcher, store, projection)
}

fn project(projection: &Projection, committed: &[StoredEvent]) {
    for stored in committed {
        projection.apply_envelope(&stored.to_envelope()).unwrap();
    }
}

fn line_spec(amount_cents: i64, hours: f64) -> LineSpec {
    LineSpec {
        line_id: LineId::new(),
        line_type: LineType::Time,
        description: "Consulting hours".to_string(),
        quantity: Some(hours),
        rate: Some(Money::from_cents(20_000)),
        amount: Money::from_cents(amount_cents),
    }
}

fn open_batch(
    dispatcher: &Dispatcher,
    projection: &Projection,
    tenant_id: TenantId,
    lines: Vec<LineSpec>,
) -> BatchId {
    let batch_id = BatchId::new(AggregateId::new());
    let committed = dispatcher
        .dispatch::<InvoiceBatch>(
            tenant_id,
            batch_id.0,
            BATCH_AGGREGATE_TYPE,
            BatchCommand::OpenBatch(OpenBatch {
                tenant_id,
                batch_id,
                period: Some("2026-07".to_string()),
                lines,
                occurred_at: Utc::now(),
            }),
            |_, id| InvoiceBatch::empty(BatchId::new(id)),
        )
        .unwrap();
    project(projection, &committed);
    batch_id
}

fn apply_adjustment(
    dispatcher: &Dispatcher,
    tenant_id: TenantId,
    batch_id: BatchId,
    target_cents: i64,
    method: AllocationMethod,
    reason: &str,
) -> Result<(AdjustmentId, Vec<StoredEvent>), DispatchError> {
    let adjustment_id = AdjustmentId::new();
    let committed = dispatcher.dispatch::<InvoiceBatch>(
        tenant_id,
        batch_id.0,
        BATCH_AGGREGATE_TYPE,
        BatchCommand::ApplyAdjustment(ApplyAdjustment {
            tenant_id,
            batch_id,
            adjustment_id,
            target_amount: Money::from_cents(target_cents),
            method,
            manual_amounts: None,
            reason: reason.to_string(),
            sow_id: None,
            applied_by: UserId::new(),
            occurred_at: Utc::now(),
        }),
        |_, id| InvoiceBatch::empty(BatchId::new(id)),
    )?;
    Ok((adjustment_id, committed))
}

#[test]
fn adjustment_commit_updates_read_model_and_history() {
    let (dispatcher, _store, projection) = setup();
    let tenant_id = TenantId::new();

    let batch_id = open_batch(
        &dispatcher,
        &projection,
        tenant_id,
        vec![line_spec(10_000, 5.0), line_spec(30_000, 15.0)],
    );

    let rm = projection.get(tenant_id, &batch_id).unwrap();
    assert_eq!(rm.current_total, Money::from_cents(40_000));
    assert!(rm.adjustments.is_empty());

    let (_, committed) = apply_adjustment(
        &dispatcher,
        tenant_id,
        batch_id,
        20_000,
        AllocationMethod::ProRataAmount,
        "Contract cap per SOW-14",
    )
    .unwrap();
    project(&projection, &committed);

    let rm = projection.get(tenant_id, &batch_id).unwrap();
    assert_eq!(rm.current_total, Money::from_cents(20_000));
    assert_eq!(rm.lines[0].billed_amount, Money::from_cents(5_000));
    assert_eq!(rm.lines[0].variance, Money::from_cents(-5_000));
    assert_eq!(rm.lines[1].billed_amount, Money::from_cents(15_000));

    let history = projection.history(tenant_id, &batch_id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, "Contract cap per SOW-14");
    assert_eq!(history[0].current_total_before, Money::from_cents(40_000));
    assert!(!history[0].is_reversed());

    let summary = projection.summary(tenant_id, &batch_id).unwrap();
    assert_eq!(summary.adjustment_count, 1);
    assert_eq!(summary.reversed_count, 0);
    // 50% variance, above the 40% advisory threshold.
    assert_eq!(summary.large_variance_count, 1);
    assert_eq!(summary.net_variance, Money::from_cents(-20_000));
    assert_eq!(summary.last_method, Some(AllocationMethod::ProRataAmount));
}

#[test]
fn reversal_restores_amounts_and_marks_history() {
    let (dispatcher, _store, projection) = setup();
    let tenant_id = TenantId::new();

    let batch_id = open_batch(
        &dispatcher,
        &projection,
        tenant_id,
        vec![line_spec(10_000, 5.0), line_spec(30_000, 15.0)],
    );

    let (adjustment_id, committed) = apply_adjustment(
        &dispatcher,
        tenant_id,
        batch_id,
        20_000,
        AllocationMethod::Flat,
        "Cap",
    )
    .unwrap();
    project(&projection, &committed);

    let committed = dispatcher
        .dispatch::<InvoiceBatch>(
            tenant_id,
            batch_id.0,
            BATCH_AGGREGATE_TYPE,
            BatchCommand::ReverseAdjustment(ReverseAdjustment {
                tenant_id,
                batch_id,
                adjustment_id,
                reversed_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
            |_, id| InvoiceBatch::empty(BatchId::new(id)),
        )
        .unwrap();
    project(&projection, &committed);

    let rm = projection.get(tenant_id, &batch_id).unwrap();
    assert_eq!(rm.current_total, Money::from_cents(40_000));
    assert_eq!(rm.lines[0].billed_amount, Money::from_cents(10_000));
    assert_eq!(rm.lines[0].variance, Money::ZERO);

    // The record is superseded, not deleted.
    let history = projection.history(tenant_id, &batch_id).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_reversed());
    assert!(history[0].reversed_by.is_some());

    let summary = projection.summary(tenant_id, &batch_id).unwrap();
    assert_eq!(summary.reversed_count, 1);
    assert_eq!(summary.net_variance, Money::ZERO);
}

#[test]
fn second_reversal_surfaces_concurrency_class_error() {
    let (dispatcher, _store, projection) = setup();
    let tenant_id = TenantId::new();
    let batch_id = open_batch(
        &dispatcher,
        &projection,
        tenant_id,
        vec![line_spec(10_000, 5.0)],
    );

    let (adjustment_id, committed) = apply_adjustment(
        &dispatcher,
        tenant_id,
        batch_id,
        5_000,
        AllocationMethod::Flat,
        "Cap",
    )
    .unwrap();
    project(&projection, &committed);

    let reverse = |dispatcher: &Dispatcher| {
        dispatcher.dispatch::<InvoiceBatch>(
            tenant_id,
            batch_id.0,
            BATCH_AGGREGATE_TYPE,
            BatchCommand::ReverseAdjustment(ReverseAdjustment {
                tenant_id,
                batch_id,
                adjustment_id,
                reversed_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
            |_, id| InvoiceBatch::empty(BatchId::new(id)),
        )
    };

    reverse(&dispatcher).unwrap();
    let err = reverse(&dispatcher).unwrap_err();
    // AlreadyReversed maps through DomainError::Conflict.
    assert!(matches!(err, DispatchError::Concurrency(_)));
}

#[test]
fn missing_reason_rejected_and_nothing_persisted() {
    let (dispatcher, store, projection) = setup();
    let tenant_id = TenantId::new();
    let batch_id = open_batch(
        &dispatcher,
        &projection,
        tenant_id,
        vec![line_spec(10_000, 5.0)],
    );

    let err = apply_adjustment(
        &dispatcher,
        tenant_id,
        batch_id,
        5_000,
        AllocationMethod::Flat,
        "  ",
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    // Stream still only holds the open event; read model untouched.
    let stream = store.load_stream(tenant_id, batch_id.0).unwrap();
    assert_eq!(stream.len(), 1);
    let rm = projection.get(tenant_id, &batch_id).unwrap();
    assert_eq!(rm.current_total, Money::from_cents(10_000));
}

#[test]
fn manual_adjustment_round_trips_through_dispatch() {
    let (dispatcher, _store, projection) = setup();
    let tenant_id = TenantId::new();
    let lines = vec![line_spec(10_000, 5.0), line_spec(30_000, 15.0)];
    let manual_target = lines[0].line_id;
    let batch_id = open_batch(&dispatcher, &projection, tenant_id, lines);

    let mut manual = BTreeMap::new();
    manual.insert(manual_target, Money::from_cents(2_500));

    let committed = dispatcher
        .dispatch::<InvoiceBatch>(
            tenant_id,
            batch_id.0,
            BATCH_AGGREGATE_TYPE,
            BatchCommand::ApplyAdjustment(ApplyAdjustment {
                tenant_id,
                batch_id,
                adjustment_id: AdjustmentId::new(),
                target_amount: Money::from_cents(32_500),
                method: AllocationMethod::Manual,
                manual_amounts: Some(manual),
                reason: "Negotiated line write-down".to_string(),
                sow_id: Some("SOW-7".to_string()),
                applied_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
            |_, id| InvoiceBatch::empty(BatchId::new(id)),
        )
        .unwrap();
    project(&projection, &committed);

    let rm = projection.get(tenant_id, &batch_id).unwrap();
    assert_eq!(rm.lines[0].billed_amount, Money::from_cents(2_500));
    assert_eq!(rm.lines[1].billed_amount, Money::from_cents(30_000));
    assert_eq!(rm.adjustments[0].sow_id.as_deref(), Some("SOW-7"));
}

#[test]
fn tenant_isolation_across_dispatch_and_read() {
    let (dispatcher, _store, projection) = setup();
    let tenant_a = TenantId::new();
    let tenant_b = TenantId::new();

    let batch_id = open_batch(
        &dispatcher,
        &projection,
        tenant_a,
        vec![line_spec(10_000, 5.0)],
    );

    // Tenant B cannot see tenant A's batch.
    assert!(projection.get(tenant_b, &batch_id).is_none());

    // Dispatching against tenant B finds no batch on that stream.
    let err = apply_adjustment(
        &dispatcher,
        tenant_b,
        batch_id,
        5_000,
        AllocationMethod::Flat,
        "Cap",
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));
}

#[test]
fn stale_expected_version_is_a_concurrency_error() {
    let (dispatcher, store, projection) = setup();
    let tenant_id = TenantId::new();
    let batch_id = open_batch(
        &dispatcher,
        &projection,
        tenant_id,
        vec![line_spec(10_000, 5.0)],
    );

    // Manually append with a stale expectation, as a concurrent writer would.
    let stream = store.load_stream(tenant_id, batch_id.0).unwrap();
    let stale = UncommittedEvent {
        event_id: uuid::Uuid::now_v7(),
        tenant_id,
        aggregate_id: batch_id.0,
        aggregate_type: BATCH_AGGREGATE_TYPE.to_string(),
        event_type: stream[0].event_type.clone(),
        event_version: 1,
        occurred_at: Utc::now(),
        payload: stream[0].payload.clone(),
    };
    let err = store
        .append(vec![stale], ExpectedVersion::Exact(0))
        .unwrap_err();
    assert!(matches!(
        err,
        crate::event_store::EventStoreError::Concurrency(_)
    ));
}

#[test]
fn projection_rebuild_reproduces_state() {
    let (dispatcher, store, projection) = setup();
    let tenant_id = TenantId::new();
    let batch_id = open_batch(
        &dispatcher,
        &projection,
        tenant_id,
        vec![line_spec(10_000, 5.0), line_spec(30_000, 15.0)],
    );
    let (_, committed) = apply_adjustment(
        &dispatcher,
        tenant_id,
        batch_id,
        20_000,
        AllocationMethod::ProRataAmount,
        "Cap",
    )
    .unwrap();
    project(&projection, &committed);

    let before = projection.get(tenant_id, &batch_id).unwrap();

    let stream = store.load_stream(tenant_id, batch_id.0).unwrap();
    projection
        .rebuild_from_scratch(stream.iter().map(|s| s.to_envelope()))
        .unwrap();

    let after = projection.get(tenant_id, &batch_id).unwrap();
    assert_eq!(before, after);
}
