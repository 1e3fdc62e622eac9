//! The connection driver: reader task, dispatcher, shutdown supervisor.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use apc_stream::{FrameReader, TransportError};
use apc_wire::{decode_event, Event, EventType, InvokeId};

use crate::client::SharedState;
use crate::errors::ClientError;

/// Keyword whose success response ends the session from our side.
const KW_LOGOFF: &str = "AGTLogoff";

/// Drives one connection until it closes.
///
/// [`Driver::run`] owns the read side: a reader task decodes frames into an
/// event channel, and the dispatcher fans events out to the request
/// registered under their invoke id. Created by [`Client::establish`] and
/// spawned by the application.
///
/// [`Client::establish`]: crate::Client::establish
pub struct Driver {
    reader: FrameReader<Box<dyn AsyncRead + Send + Unpin>>,
    shared: Arc<SharedState>,
}

impl Driver {
    pub(crate) fn new(
        reader: FrameReader<Box<dyn AsyncRead + Send + Unpin>>,
        shared: Arc<SharedState>,
    ) -> Self {
        Self { reader, shared }
    }

    /// Run until the transport fails or the session logs off.
    ///
    /// Returns `Ok(())` after a graceful logoff,
    /// [`ClientError::ConnectionClosed`] when the server closed the stream,
    /// and the underlying error otherwise. By the time this returns the
    /// client is closed, every in-flight request has been cancelled, and the
    /// notification stream (if any) has ended.
    pub async fn run(self) -> Result<(), ClientError> {
        let Driver { mut reader, shared } = self;

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<Option<ClientError>>(1);

        let read_task = tokio::spawn(async move {
            loop {
                let raw = match reader.next_frame().await {
                    Ok(raw) => raw,
                    Err(TransportError::Closed) => {
                        let _ = shutdown_tx.send(Some(ClientError::ConnectionClosed)).await;
                        break;
                    }
                    Err(e) => {
                        let _ = shutdown_tx.send(Some(ClientError::Transport(e))).await;
                        break;
                    }
                };

                let event = match decode_event(&raw) {
                    Ok(event) => event,
                    Err(e) => {
                        // A malformed frame means the stream is
                        // desynchronized; there is no resync point.
                        warn!(error = %e, "frame did not decode, closing connection");
                        let _ = shutdown_tx.send(Some(ClientError::Decode(e))).await;
                        break;
                    }
                };
                debug!(
                    keyword = %event.keyword,
                    r#type = %event.event_type,
                    invoke_id = %event.invoke_id,
                    segments = ?event.segments,
                    incomplete = event.incomplete,
                    "event decoded"
                );

                let graceful = event.keyword == KW_LOGOFF && event.is_success_response();
                if event_tx.send(event).await.is_err() {
                    break;
                }
                if graceful {
                    let _ = shutdown_tx.send(None).await;
                    break;
                }
            }
        });

        // Events are drained before the shutdown cause is taken, so a
        // response that made it onto the wire is always delivered.
        let cause = loop {
            tokio::select! {
                biased;
                maybe = event_rx.recv() => match maybe {
                    Some(event) => dispatch(&shared, event).await,
                    None => {
                        break shutdown_rx
                            .recv()
                            .await
                            .unwrap_or(Some(ClientError::ConnectionClosed));
                    }
                },
                maybe = shutdown_rx.recv() => {
                    break maybe.unwrap_or(Some(ClientError::ConnectionClosed));
                }
            }
        };

        shutdown(&shared).await;
        read_task.abort();

        match cause {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

/// Route one event to the request registered under its invoke id.
async fn dispatch(shared: &SharedState, mut event: Event) {
    if event.event_type == EventType::Notification {
        event.invoke_id = InvokeId::NOTIFICATION;
    }
    let invoke_id = event.invoke_id;

    let Some(event_tx) = shared.registry.sender_for(invoke_id) else {
        trace!(invoke_id = %invoke_id, keyword = %event.keyword, "no request registered, event dropped");
        return;
    };

    if invoke_id == InvokeId::NOTIFICATION {
        // Never block request dispatch behind a slow notification
        // subscriber; the slot inbox is deep and overflow is dropped.
        if event_tx.try_send(event).is_err() {
            warn!("notification inbox full, event dropped");
        }
        return;
    }

    if event_tx.send(event).await.is_err() {
        trace!(invoke_id = %invoke_id, "request inbox closed, event dropped");
    }
}

/// Tear the session down in order: mark closed, close the transport, end
/// the notification stream, cancel every in-flight request.
async fn shutdown(shared: &SharedState) {
    shared.set_closed();

    {
        let mut writer = shared.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    if let Some(slot) = shared.registry.remove(InvokeId::NOTIFICATION) {
        slot.cancel.cancel();
    }

    let in_flight = shared.registry.shutdown();
    if in_flight > 0 {
        debug!(in_flight, "cancelled in-flight requests");
    }

    // Children created after this point start out cancelled, closing the
    // window between the state check and registration.
    shared.scope.cancel();
}
