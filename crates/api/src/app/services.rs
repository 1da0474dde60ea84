//! Infrastructure wiring for the API process.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use scdp_billing::{BatchCommand, BatchId, InvoiceBatch};
use scdp_core::TenantId;
use scdp_events::{EventBus, EventEnvelope, InMemoryEventBus};
use scdp_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{InMemoryEventStore, StoredEvent},
    projections::invoice_batches::{
        BATCH_AGGREGATE_TYPE, InvoiceBatchReadModel, InvoiceBatchesProjection,
    },
    read_model::{DirectorySettingsStore, InMemoryTenantStore},
};

type Dispatcher =
    CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;
type BatchesProjection =
    InvoiceBatchesProjection<Arc<InMemoryTenantStore<BatchId, InvoiceBatchReadModel>>>;

/// Shared service graph for the HTTP handlers.
pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    batches: Arc<BatchesProjection>,
    directory: Arc<DirectorySettingsStore>,
}

impl AppServices {
    /// In-memory wiring: store + bus + projection + settings store.
    pub fn build() -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> =
            Arc::new(InMemoryEventBus::new());

        let rm_store: Arc<InMemoryTenantStore<BatchId, InvoiceBatchReadModel>> =
            Arc::new(InMemoryTenantStore::new());
        let batches: Arc<BatchesProjection> =
            Arc::new(InvoiceBatchesProjection::new(rm_store));

        // Background subscriber: bus -> projection. Commits also project
        // inline for read-your-writes; the cursor check makes the duplicate
        // delivery from this subscriber a no-op.
        {
            let sub = bus.subscribe();
            let batches = batches.clone();
            std::thread::spawn(move || {
                loop {
                    match sub.recv() {
                        Ok(env) => {
                            if let Err(e) = batches.apply_envelope(&env) {
                                tracing::warn!("projection apply failed: {e}");
                            }
                        }
                        Err(_) => break,
                    }
                }
            });
        }

        let dispatcher: Arc<Dispatcher> = Arc::new(CommandDispatcher::new(store, bus));

        Self {
            dispatcher,
            batches,
            directory: Arc::new(DirectorySettingsStore::new()),
        }
    }

    /// Dispatch a batch command and project the committed events inline.
    pub fn dispatch_batch(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        command: BatchCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = self.dispatcher.dispatch::<InvoiceBatch>(
            tenant_id,
            batch_id.0,
            BATCH_AGGREGATE_TYPE,
            command,
            |_t, aggregate_id| InvoiceBatch::empty(BatchId::new(aggregate_id)),
        )?;

        for stored in &committed {
            if let Err(e) = self.batches.apply_envelope(&stored.to_envelope()) {
                tracing::warn!("inline projection apply failed: {e}");
            }
        }

        Ok(committed)
    }

    pub fn batches(&self) -> &BatchesProjection {
        &self.batches
    }

    pub fn directory(&self) -> &DirectorySettingsStore {
        &self.directory
    }
}
