//! Server-initiated notification stream.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use apc_wire::{Event, InvokeId};

use crate::client::SharedState;

const KW_CALL_NOTIFY: &str = "AGTCallNotify";
const KW_RECEIVE_MESSAGE: &str = "AGTReceiveMessage";
const KW_JOB_TRANS_REQUEST: &str = "AGTJobTransRequest";
const KW_AUTO_RELEASE_LINE: &str = "AGTAutoReleaseLine";
const KW_JOB_END: &str = "AGTJobEnd";
const KW_HEADSET_CONN_BROKEN: &str = "AGTHeadsetConnBroken";
const KW_SYSTEM_ERROR: &str = "AGTSystemError";

/// A typed notification, keyed by the keyword the server sent it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A call was delivered to the agent; the customer record fields that
    /// were selected with `AGTSetNotifyKeyField`/`AGTSetDataField`.
    CallNotify { fields: HashMap<String, String> },
    /// A text message from a supervisor.
    ReceiveMessage { text: String },
    /// The supervisor asks the agent to move to another job.
    JobTransRequest { job_name: String },
    /// The line was released by the dialer.
    AutoReleaseLine,
    /// The attached job shut down.
    JobEnd,
    /// The headset connection dropped.
    HeadsetConnBroken,
    /// The server hit an internal error.
    SystemError,
    /// An error-classed notification; the six-character code.
    Error { code: String },
}

/// Receiving half of a notification subscription.
///
/// Dropping the stream cancels the processor, which unregisters the
/// notification slot; subscribing again afterwards is allowed.
pub struct NotificationStream {
    rx: mpsc::Receiver<Notification>,
    cancel: CancellationToken,
}

impl NotificationStream {
    pub(crate) fn new(rx: mpsc::Receiver<Notification>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Receive the next notification. `None` once the subscription or the
    /// connection is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drains the notification slot's inbox, assembles typed notifications, and
/// forwards them to the subscriber. Back-pressure from a slow subscriber is
/// absorbed here, never by the dispatcher.
pub(crate) async fn run_processor(
    shared: Arc<SharedState>,
    mut inbox: mpsc::Receiver<Event>,
    out: mpsc::Sender<Notification>,
    cancel: CancellationToken,
) {
    let mut assembly = Assembly::default();
    loop {
        let event = tokio::select! {
            biased;
            maybe = inbox.recv() => match maybe {
                Some(event) => event,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        if let Some(notification) = assembly.fold(event) {
            tokio::select! {
                result = out.send(notification) => {
                    if result.is_err() {
                        break;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }

    shared.registry.remove(InvokeId::NOTIFICATION);
}

/// Assembles multi-record notifications.
///
/// Data-stage records accumulate per keyword; the success record emits. An
/// error-classed record emits immediately.
#[derive(Default)]
struct Assembly {
    call_fields: HashMap<String, String>,
    message: Option<String>,
    job_name: Option<String>,
}

impl Assembly {
    fn fold(&mut self, event: Event) -> Option<Notification> {
        if event.is_error_notification() {
            return Some(Notification::Error {
                code: event.segments[1].clone(),
            });
        }
        if event.is_success_notification() {
            return self.complete(&event.keyword);
        }
        if event.is_data_notification() {
            self.accumulate(&event);
            return None;
        }
        tracing::debug!(
            keyword = %event.keyword,
            r#type = %event.event_type,
            "unclassified notification event dropped"
        );
        None
    }

    fn accumulate(&mut self, event: &Event) {
        match event.keyword.as_str() {
            KW_CALL_NOTIFY => {
                for segment in &event.segments[2..] {
                    if let Some((key, value)) = segment.split_once(',') {
                        self.call_fields.insert(key.to_owned(), value.to_owned());
                    }
                }
            }
            KW_RECEIVE_MESSAGE => {
                if let Some(text) = event.segments.get(2) {
                    self.message = Some(text.clone());
                }
            }
            KW_JOB_TRANS_REQUEST => {
                if let Some(job_name) = event.segments.get(2) {
                    self.job_name = Some(job_name.clone());
                }
            }
            other => {
                tracing::debug!(keyword = %other, "data record for unhandled notification keyword");
            }
        }
    }

    fn complete(&mut self, keyword: &str) -> Option<Notification> {
        match keyword {
            KW_CALL_NOTIFY => Some(Notification::CallNotify {
                fields: mem::take(&mut self.call_fields),
            }),
            KW_RECEIVE_MESSAGE => self
                .message
                .take()
                .map(|text| Notification::ReceiveMessage { text }),
            KW_JOB_TRANS_REQUEST => self
                .job_name
                .take()
                .map(|job_name| Notification::JobTransRequest { job_name }),
            KW_AUTO_RELEASE_LINE => Some(Notification::AutoReleaseLine),
            KW_JOB_END => Some(Notification::JobEnd),
            KW_HEADSET_CONN_BROKEN => Some(Notification::HeadsetConnBroken),
            KW_SYSTEM_ERROR => Some(Notification::SystemError),
            other => {
                tracing::debug!(keyword = %other, "success record for unhandled notification keyword");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apc_wire::EventType;

    fn notification_event(keyword: &str, segments: &[&str]) -> Event {
        Event {
            keyword: keyword.into(),
            event_type: EventType::Notification,
            client: String::new(),
            process_id: 0,
            invoke_id: InvokeId::NOTIFICATION,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            incomplete: false,
        }
    }

    #[test]
    fn call_notify_assembles_fields_across_data_records() {
        let mut assembly = Assembly::default();

        assert!(assembly
            .fold(notification_event(KW_CALL_NOTIFY, &["0", "M00001"]))
            .is_none());
        assert!(assembly
            .fold(notification_event(
                KW_CALL_NOTIFY,
                &["0", "M00001", "CURPHONE,3", "DEBT_ID,42"],
            ))
            .is_none());

        let notification = assembly
            .fold(notification_event(KW_CALL_NOTIFY, &["0", "M00000"]))
            .expect("success record emits");
        let Notification::CallNotify { fields } = notification else {
            panic!("expected a call notification");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["CURPHONE"], "3");
        assert_eq!(fields["DEBT_ID"], "42");
    }

    #[test]
    fn field_values_keep_embedded_commas() {
        let mut assembly = Assembly::default();
        assembly.fold(notification_event(
            KW_CALL_NOTIFY,
            &["0", "M00001", "FIO,Doe,John"],
        ));
        let Some(Notification::CallNotify { fields }) =
            assembly.fold(notification_event(KW_CALL_NOTIFY, &["0", "M00000"]))
        else {
            panic!("expected a call notification");
        };
        assert_eq!(fields["FIO"], "Doe,John");
    }

    #[test]
    fn receive_message_carries_the_text() {
        let mut assembly = Assembly::default();
        assembly.fold(notification_event(
            KW_RECEIVE_MESSAGE,
            &["0", "M00001", "wrap it up"],
        ));
        assert_eq!(
            assembly.fold(notification_event(KW_RECEIVE_MESSAGE, &["0", "M00000"])),
            Some(Notification::ReceiveMessage {
                text: "wrap it up".into()
            })
        );
    }

    #[test]
    fn unit_notifications_emit_on_success_record() {
        let mut assembly = Assembly::default();
        assert_eq!(
            assembly.fold(notification_event(KW_AUTO_RELEASE_LINE, &["0", "M00000"])),
            Some(Notification::AutoReleaseLine)
        );
        assert_eq!(
            assembly.fold(notification_event(KW_JOB_END, &["0", "M00000"])),
            Some(Notification::JobEnd)
        );
    }

    #[test]
    fn error_notification_emits_immediately() {
        let mut assembly = Assembly::default();
        assert_eq!(
            assembly.fold(notification_event(KW_SYSTEM_ERROR, &["1", "E70000"])),
            Some(Notification::Error {
                code: "E70000".into()
            })
        );
    }

    #[test]
    fn unknown_keyword_is_dropped() {
        let mut assembly = Assembly::default();
        assert!(assembly
            .fold(notification_event("AGTSomethingNew", &["0", "M00000"]))
            .is_none());
    }
}
