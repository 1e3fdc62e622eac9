//! The client handle and connection establishment.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use apc_stream::{
    Connector, FrameReader, IdentityDecoder, StreamDecoder, TlsConnector, TransportError,
};
use apc_wire::{decode_event, encode_command, InvokeId};

use crate::driver::Driver;
use crate::errors::ClientError;
use crate::notify::{self, NotificationStream};
use crate::pool::InvokeIdPool;
use crate::registry::{RegisterError, RequestRegistry, RequestSlot};
use crate::request::PendingRequest;
use crate::{NOTIFICATION_CHANNEL_SIZE, REQUEST_INBOX_SIZE};

/// Keyword of the startup banner.
const KW_START: &str = "AGTSTART";

const STATE_OPEN: u8 = 0;
const STATE_CLOSED: u8 = 1;

/// State shared between the client handle, the driver, and every in-flight
/// request.
pub(crate) struct SharedState {
    /// Write half of the transport. Held across exactly one framed write so
    /// frames never interleave on the wire.
    pub(crate) writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    /// `STATE_OPEN` until the driver shuts down.
    state: AtomicU8,
    pub(crate) pool: InvokeIdPool,
    pub(crate) registry: RequestRegistry,
    /// Parent cancellation scope for every request.
    pub(crate) scope: CancellationToken,
}

impl SharedState {
    pub(crate) fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_OPEN
    }

    pub(crate) fn set_closed(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
    }
}

/// Connection options.
pub struct ClientOptions {
    /// Per-read deadline on the transport; unset means no deadline.
    pub timeout: Option<Duration>,
    /// Charset decoder between the socket and the frame reader.
    pub decoder: Box<dyn StreamDecoder>,
    /// Accept any server certificate when dialing with [`Client::connect`].
    /// Agent servers are self-signed in practice.
    pub tls_skip_verify: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            decoder: Box::new(IdentityDecoder),
            tls_skip_verify: false,
        }
    }
}

/// Handle to one agent-server session.
///
/// Cheap to clone; all clones share the connection. The paired [`Driver`]
/// must be spawned for any command to make progress, and its return value is
/// the session outcome.
#[derive(Clone)]
pub struct Client {
    shared: Arc<SharedState>,
}

impl Client {
    /// Dial `addr` (`host:port`) over TLS and perform the startup handshake.
    pub async fn connect(addr: &str, options: ClientOptions) -> Result<(Client, Driver), ClientError> {
        let connector = if options.tls_skip_verify {
            TlsConnector::insecure(addr)
        } else {
            TlsConnector::new(addr)
        };
        Self::connect_with(&connector, options).await
    }

    /// Dial through a caller-supplied [`Connector`].
    ///
    /// This is the entry point for deployments that need the legacy TLS
    /// compatibility transport: implement [`Connector`] over it and the
    /// session layer consumes the byte stream without caring.
    pub async fn connect_with<C: Connector>(
        connector: &C,
        options: ClientOptions,
    ) -> Result<(Client, Driver), ClientError> {
        let transport = connector
            .connect()
            .await
            .map_err(|e| ClientError::Transport(TransportError::Io(e)))?;
        Self::establish(transport, options).await
    }

    /// Run the startup handshake over an already-connected stream.
    ///
    /// Exactly one event is read; anything but the `AGTSTART` banner fails
    /// with [`ClientError::HelloNotReceived`] and drops the transport.
    pub async fn establish<T>(transport: T, options: ClientOptions) -> Result<(Client, Driver), ClientError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let mut reader = FrameReader::new(
            Box::new(read_half) as Box<dyn AsyncRead + Send + Unpin>,
            options.decoder,
            options.timeout,
        );

        let banner = match reader.next_frame().await {
            Ok(raw) => match decode_event(&raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "handshake frame did not decode");
                    return Err(ClientError::HelloNotReceived);
                }
            },
            Err(e) => {
                warn!(error = %e, "transport failed before the startup banner");
                return Err(ClientError::HelloNotReceived);
            }
        };

        if banner.keyword != KW_START || !banner.is_startup_notification() {
            warn!(
                keyword = %banner.keyword,
                r#type = %banner.event_type,
                "server did not open with the startup banner"
            );
            return Err(ClientError::HelloNotReceived);
        }
        info!(
            client = %banner.client,
            process_id = banner.process_id,
            "agent server accepted the session"
        );

        let shared = Arc::new(SharedState {
            writer: Mutex::new(Box::new(write_half)),
            state: AtomicU8::new(STATE_OPEN),
            pool: InvokeIdPool::new(),
            registry: RequestRegistry::new(),
            scope: CancellationToken::new(),
        });

        let client = Client {
            shared: shared.clone(),
        };
        Ok((client, Driver::new(reader, shared)))
    }

    /// Whether the session is still usable.
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// The parent cancellation scope of every request.
    ///
    /// Cancelling it resolves all in-flight commands with
    /// [`ClientError::Canceled`]; the connection itself stays up.
    pub fn cancel_scope(&self) -> CancellationToken {
        self.shared.scope.clone()
    }

    /// Subscribe to server-initiated notifications.
    ///
    /// At most one subscription is active at a time; a dropped
    /// [`NotificationStream`] frees the slot.
    pub fn notifications(&self) -> Result<NotificationStream, ClientError> {
        let shared = &self.shared;
        if !shared.is_open() {
            return Err(ClientError::ConnectionClosed);
        }

        let (event_tx, inbox) = mpsc::channel(NOTIFICATION_CHANNEL_SIZE);
        let cancel = shared.scope.child_token();
        let slot = RequestSlot {
            event_tx,
            cancel: cancel.clone(),
        };
        match shared.registry.insert(InvokeId::NOTIFICATION, slot) {
            Ok(()) => {}
            Err(RegisterError::Occupied) => return Err(ClientError::AlreadySubscribed),
            Err(RegisterError::Closed) => return Err(ClientError::ConnectionClosed),
        }

        let (out_tx, out_rx) = mpsc::channel(NOTIFICATION_CHANNEL_SIZE);
        tokio::spawn(notify::run_processor(
            shared.clone(),
            inbox,
            out_tx,
            cancel.clone(),
        ));
        Ok(NotificationStream::new(out_rx, cancel))
    }

    /// Issue a command: take a tag, encode, register, write.
    ///
    /// The returned request owns the tag; dropping it on any path
    /// unregisters and releases.
    pub(crate) async fn invoke_command(
        &self,
        keyword: &str,
        args: Vec<String>,
    ) -> Result<PendingRequest, ClientError> {
        let invoke_id = self.shared.pool.get();
        match self.try_invoke(keyword, args, invoke_id).await {
            Ok(request) => Ok(request),
            Err(e) => {
                // The request guard was never constructed; clean up here.
                self.shared.registry.remove(invoke_id);
                self.shared.pool.release(invoke_id);
                Err(e)
            }
        }
    }

    async fn try_invoke(
        &self,
        keyword: &str,
        args: Vec<String>,
        invoke_id: InvokeId,
    ) -> Result<PendingRequest, ClientError> {
        let shared = &self.shared;
        if !shared.is_open() {
            return Err(ClientError::ConnectionClosed);
        }

        let frame = encode_command(keyword, invoke_id, &args)?;

        // Register before writing so the response cannot race registration.
        let (event_tx, inbox) = mpsc::channel(REQUEST_INBOX_SIZE);
        let cancel = shared.scope.child_token();
        let slot = RequestSlot {
            event_tx,
            cancel: cancel.clone(),
        };
        if shared.registry.insert(invoke_id, slot).is_err() {
            return Err(ClientError::ConnectionClosed);
        }

        {
            let mut writer = shared.writer.lock().await;
            writer
                .write_all(&frame)
                .await
                .map_err(|e| ClientError::Transport(TransportError::Io(e)))?;
            writer
                .flush()
                .await
                .map_err(|e| ClientError::Transport(TransportError::Io(e)))?;
        }
        debug!(keyword, invoke_id = %invoke_id, args = ?args, "command sent");

        Ok(PendingRequest::new(
            shared.clone(),
            invoke_id,
            inbox,
            cancel,
        ))
    }
}
