//! Per-request event folding.
//!
//! Every command, from `AGTLogon` to the listing calls, drives the same
//! little machine: pending records are keep-alives, data records accumulate,
//! a response record terminates. Commands differ only in how they project
//! the accumulated segments afterwards.

use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use apc_wire::{Event, InvokeId};

use crate::client::SharedState;
use crate::errors::{AvayaError, ClientError};

/// Outcome of folding one event.
pub(crate) enum Step {
    /// Keep reading.
    Continue,
    /// Success response observed; the accumulated data segments.
    Done(Vec<String>),
    /// Terminal failure for this request.
    Failed(ClientError),
}

/// Folds a request's event stream into its data segments.
///
/// While the batch flag is up the previous data record ended in ETB, so the
/// next record is a continuation and its segments are taken wholesale (a
/// continuation carries no status/code prefix).
#[derive(Default)]
pub(crate) struct ResponseCollector {
    segments: Vec<String>,
    batching: bool,
}

impl ResponseCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fold(&mut self, event: Event) -> Step {
        if self.batching {
            self.batching = event.incomplete;
            self.segments.extend(event.segments);
            return Step::Continue;
        }

        if event.is_pending() {
            return Step::Continue;
        }
        if event.is_data_message() {
            self.batching = event.incomplete;
            self.segments.extend(event.segments.into_iter().skip(2));
            return Step::Continue;
        }
        if event.is_success_response() {
            return Step::Done(mem::take(&mut self.segments));
        }
        if event.is_error_response() {
            return Step::Failed(
                AvayaError {
                    code: event.segments[1].clone(),
                }
                .into(),
            );
        }
        Step::Failed(ClientError::UnexpectedEvent(Box::new(event)))
    }
}

/// A registered request: inbox, cancellation handle, and the duty to give
/// the invoke id back.
///
/// Dropping removes the request from the registry (if the shutdown sweep did
/// not already) and returns the tag to the pool, on every exit path.
pub(crate) struct PendingRequest {
    shared: Arc<SharedState>,
    invoke_id: InvokeId,
    inbox: mpsc::Receiver<Event>,
    cancel: CancellationToken,
}

impl PendingRequest {
    pub(crate) fn new(
        shared: Arc<SharedState>,
        invoke_id: InvokeId,
        inbox: mpsc::Receiver<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared,
            invoke_id,
            inbox,
            cancel,
        }
    }

    /// Drain events until the exchange terminates.
    ///
    /// The inbox is polled before the cancellation handle so a response that
    /// already arrived wins over a concurrent teardown.
    pub(crate) async fn collect(&mut self) -> Result<Vec<String>, ClientError> {
        let mut collector = ResponseCollector::new();
        loop {
            tokio::select! {
                biased;
                maybe = self.inbox.recv() => match maybe {
                    Some(event) => match collector.fold(event) {
                        Step::Continue => {}
                        Step::Done(segments) => return Ok(segments),
                        Step::Failed(err) => return Err(err),
                    },
                    None => return Err(ClientError::ConnectionClosed),
                },
                _ = self.cancel.cancelled() => {
                    return Err(if self.shared.is_open() {
                        ClientError::Canceled
                    } else {
                        ClientError::ConnectionClosed
                    });
                }
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.shared.registry.remove(self.invoke_id);
        self.shared.pool.release(self.invoke_id);
    }
}
