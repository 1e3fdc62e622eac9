//! In-flight request registry.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use apc_wire::{Event, InvokeId};

/// One open request: the inbox the dispatcher delivers into and the handle
/// the shutdown path fires.
pub(crate) struct RequestSlot {
    pub(crate) event_tx: mpsc::Sender<Event>,
    pub(crate) cancel: CancellationToken,
}

#[derive(Debug)]
pub(crate) enum RegisterError {
    /// The registry was swept by shutdown; no new requests.
    Closed,
    /// The tag already has a live request.
    Occupied,
}

/// Invoke id → open request, shared between the dispatcher (lookups) and the
/// command surface (registration/removal). Lookups dominate, hence the
/// reader-writer lock.
#[derive(Default)]
pub(crate) struct RequestRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<u32, RequestSlot>,
    closed: bool,
}

impl RequestRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: InvokeId, slot: RequestSlot) -> Result<(), RegisterError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(RegisterError::Closed);
        }
        if inner.slots.contains_key(&id.raw()) {
            return Err(RegisterError::Occupied);
        }
        inner.slots.insert(id.raw(), slot);
        Ok(())
    }

    pub(crate) fn remove(&self, id: InvokeId) -> Option<RequestSlot> {
        self.inner.write().slots.remove(&id.raw())
    }

    /// Clone the inbox sender for `id`, if a request is registered there.
    /// The lock is released before the caller awaits the send.
    pub(crate) fn sender_for(&self, id: InvokeId) -> Option<mpsc::Sender<Event>> {
        self.inner.read().slots.get(&id.raw()).map(|slot| slot.event_tx.clone())
    }

    /// Sweep the registry: refuse new registrations and fire every in-flight
    /// request's cancellation handle. Returns how many were in flight.
    pub(crate) fn shutdown(&self) -> usize {
        let mut inner = self.inner.write();
        inner.closed = true;
        let swept = inner.slots.len();
        for (_, slot) in inner.slots.drain() {
            slot.cancel.cancel();
        }
        swept
    }
}
