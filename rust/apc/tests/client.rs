//! End-to-end scenarios against a scripted in-memory server.

use std::time::Duration;

use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use apc::{
    Client, ClientError, ClientOptions, JobStatus, JobType, Notification, TransportError,
};
use apc_wire::{decode_event, Event, EventType, ETB, ETX, RS};

fn push_padded(buf: &mut Vec<u8>, value: &str, width: usize) {
    buf.extend_from_slice(value.as_bytes());
    for _ in value.len()..width {
        buf.push(b' ');
    }
}

fn server_frame(
    keyword: &str,
    event_type: EventType,
    invoke_id: u32,
    segments: &[&str],
    terminator: u8,
) -> Vec<u8> {
    let mut buf = Vec::new();
    push_padded(&mut buf, keyword, 20);
    buf.push(event_type.as_byte());
    push_padded(&mut buf, "dialer", 20);
    push_padded(&mut buf, "4242", 6);
    push_padded(&mut buf, &invoke_id.to_string(), 4);
    push_padded(&mut buf, &segments.len().to_string(), 4);
    for segment in segments {
        buf.push(RS);
        buf.extend_from_slice(segment.as_bytes());
    }
    buf.push(terminator);
    buf
}

fn banner() -> Vec<u8> {
    server_frame(
        "AGTSTART",
        EventType::Notification,
        0,
        &["0", "AGENT_STARTUP"],
        ETX,
    )
}

async fn read_command<S: AsyncRead + Unpin>(stream: &mut S) -> Event {
    let mut raw = Vec::new();
    loop {
        let byte = stream.read_u8().await.expect("command byte");
        raw.push(byte);
        if byte == ETX || byte == ETB {
            break;
        }
    }
    decode_event(&raw).expect("client frames decode")
}

async fn start_session() -> (
    Client,
    JoinHandle<Result<(), ClientError>>,
    DuplexStream,
) {
    let (client_side, mut server_side) = duplex(16 * 1024);
    server_side.write_all(&banner()).await.unwrap();

    let (client, driver) = Client::establish(client_side, ClientOptions::default())
        .await
        .expect("handshake succeeds");
    (client, tokio::spawn(driver.run()), server_side)
}

#[tokio::test]
async fn logon_succeeds_after_pending() {
    let (client, _driver, mut server) = start_session().await;

    let server_task = tokio::spawn(async move {
        let command = read_command(&mut server).await;
        assert_eq!(command.keyword, "AGTLogon");
        assert_eq!(command.segments, vec!["alice", "pw"]);
        let id = command.invoke_id.raw();
        assert_eq!(id, 1);

        let pending = server_frame("AGTLogon", EventType::Pending, id, &["0", "S28833"], ETX);
        let success = server_frame("AGTLogon", EventType::Response, id, &["0", "M00000"], ETX);
        server.write_all(&pending).await.unwrap();
        server.write_all(&success).await.unwrap();
        server
    });

    client.logon("alice", "pw").await.expect("logon succeeds");
    server_task.await.unwrap();
}

#[tokio::test]
async fn logon_surfaces_the_server_error_code() {
    let (client, _driver, mut server) = start_session().await;

    let server_task = tokio::spawn(async move {
        let command = read_command(&mut server).await;
        let id = command.invoke_id.raw();
        let error = server_frame("AGTLogon", EventType::Response, id, &["1", "E12345"], ETX);
        server.write_all(&error).await.unwrap();
        server
    });

    match client.logon("alice", "pw").await {
        Err(ClientError::Avaya(e)) => assert_eq!(e.code, "E12345"),
        other => panic!("expected a server error, got {other:?}"),
    }
    server_task.await.unwrap();
}

#[tokio::test]
async fn invoke_ids_are_recycled_across_commands() {
    let (client, _driver, mut server) = start_session().await;

    let server_task = tokio::spawn(async move {
        for _ in 0..2 {
            let command = read_command(&mut server).await;
            assert_eq!(command.invoke_id.raw(), 1, "lowest free tag is reused");
            let success = server_frame(
                &command.keyword,
                EventType::Response,
                command.invoke_id.raw(),
                &["0", "M00000"],
                ETX,
            );
            server.write_all(&success).await.unwrap();
        }
        server
    });

    client.avail_work().await.unwrap();
    client.ready_next_item().await.unwrap();
    server_task.await.unwrap();
}

#[tokio::test]
async fn events_for_unknown_tags_are_dropped() {
    let (client, _driver, mut server) = start_session().await;

    let server_task = tokio::spawn(async move {
        let command = read_command(&mut server).await;
        let id = command.invoke_id.raw();

        // Stale response for a long-gone request; nobody is registered
        // under tag 99, so dispatch drops it on the floor.
        let stale = server_frame("AGTListJobs", EventType::Response, 99, &["1", "E99999"], ETX);
        let success = server_frame("AGTLogon", EventType::Response, id, &["0", "M00000"], ETX);
        server.write_all(&stale).await.unwrap();
        server.write_all(&success).await.unwrap();
        server
    });

    client.logon("alice", "pw").await.expect("stale event is invisible");
    server_task.await.unwrap();
}

#[tokio::test]
async fn batched_job_list_is_assembled_in_order() {
    let (client, _driver, mut server) = start_session().await;

    let server_task = tokio::spawn(async move {
        let command = read_command(&mut server).await;
        assert_eq!(command.keyword, "AGTListJobs");
        assert_eq!(command.segments, vec!["A"]);
        let id = command.invoke_id.raw();

        let frames = [
            server_frame(
                "AGTListJobs",
                EventType::Data,
                id,
                &["0", "M00001", "A,JOB_A,A", "A,JOB_B,A"],
                ETB,
            ),
            server_frame("AGTListJobs", EventType::Data, id, &["A,JOB_C,I"], ETB),
            server_frame("AGTListJobs", EventType::Data, id, &["A,JOB_D,A"], ETX),
            server_frame("AGTListJobs", EventType::Response, id, &["0", "M00000"], ETX),
        ];
        for frame in frames {
            server.write_all(&frame).await.unwrap();
        }
        server
    });

    let jobs = client.list_jobs(JobType::All).await.unwrap();
    assert_eq!(
        jobs.iter().map(|j| j.name.as_str()).collect::<Vec<_>>(),
        vec!["JOB_A", "JOB_B", "JOB_C", "JOB_D"]
    );
    assert_eq!(jobs[2].status, JobStatus::Inactive);
    server_task.await.unwrap();
}

#[tokio::test]
async fn call_notification_is_assembled_and_delivered() {
    let (client, _driver, mut server) = start_session().await;
    let mut notifications = client.notifications().expect("first subscription");

    // Notifications carry invoke id 0 on the wire.
    let frames = [
        server_frame(
            "AGTCallNotify",
            EventType::Notification,
            0,
            &["0", "M00001"],
            ETX,
        ),
        server_frame(
            "AGTCallNotify",
            EventType::Notification,
            0,
            &["0", "M00001", "CURPHONE,3", "DEBT_ID,42"],
            ETX,
        ),
        server_frame(
            "AGTCallNotify",
            EventType::Notification,
            0,
            &["0", "M00000"],
            ETX,
        ),
    ];
    for frame in frames {
        server.write_all(&frame).await.unwrap();
    }

    match notifications.recv().await {
        Some(Notification::CallNotify { fields }) => {
            assert_eq!(fields.len(), 2);
            assert_eq!(fields["CURPHONE"], "3");
            assert_eq!(fields["DEBT_ID"], "42");
        }
        other => panic!("expected a call notification, got {other:?}"),
    }
}

#[tokio::test]
async fn second_subscription_is_rejected_until_the_first_is_dropped() {
    let (client, _driver, _server) = start_session().await;

    let stream = client.notifications().expect("first subscription");
    assert!(matches!(
        client.notifications(),
        Err(ClientError::AlreadySubscribed)
    ));

    drop(stream);
    // The processor unregisters the slot on cancellation; give it a moment.
    for _ in 0..100 {
        match client.notifications() {
            Ok(_) => return,
            Err(ClientError::AlreadySubscribed) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    panic!("slot was never freed after the stream was dropped");
}

#[tokio::test]
async fn handshake_rejects_anything_but_the_startup_banner() {
    let (client_side, mut server_side) = duplex(16 * 1024);
    let wrong = server_frame("AGTLogon", EventType::Response, 1, &["0", "M00000"], ETX);
    server_side.write_all(&wrong).await.unwrap();

    match Client::establish(client_side, ClientOptions::default()).await {
        Err(ClientError::HelloNotReceived) => {}
        Ok(_) => panic!("handshake must fail"),
        Err(other) => panic!("expected HelloNotReceived, got {other:?}"),
    }
}

#[tokio::test]
async fn graceful_logoff_shuts_the_session_down() {
    let (client, driver, mut server) = start_session().await;

    let server_task = tokio::spawn(async move {
        let command = read_command(&mut server).await;
        assert_eq!(command.keyword, "AGTLogoff");
        let id = command.invoke_id.raw();

        let pending = server_frame("AGTLogoff", EventType::Pending, id, &["0", "S28833"], ETX);
        let success = server_frame("AGTLogoff", EventType::Response, id, &["0", "M00000"], ETX);
        server.write_all(&pending).await.unwrap();
        server.write_all(&success).await.unwrap();
        server
    });

    client.logoff().await.expect("logoff succeeds");
    assert!(matches!(driver.await.unwrap(), Ok(())));
    assert!(!client.is_open());

    // The session is gone; submissions fail fast.
    assert!(matches!(
        client.avail_work().await,
        Err(ClientError::ConnectionClosed)
    ));
    server_task.await.unwrap();
}

#[tokio::test]
async fn server_eof_fails_in_flight_requests_and_the_driver() {
    let (client, driver, mut server) = start_session().await;

    let server_task = tokio::spawn(async move {
        let _command = read_command(&mut server).await;
        drop(server);
    });

    assert!(matches!(
        client.avail_work().await,
        Err(ClientError::ConnectionClosed)
    ));
    assert!(matches!(
        driver.await.unwrap(),
        Err(ClientError::ConnectionClosed)
    ));
    assert!(!client.is_open());
    server_task.await.unwrap();
}

#[tokio::test]
async fn shutdown_ends_the_notification_stream() {
    let (client, driver, server) = start_session().await;
    let mut notifications = client.notifications().unwrap();

    drop(server);
    assert!(notifications.recv().await.is_none());
    assert!(driver.await.unwrap().is_err());
    assert!(matches!(
        client.notifications(),
        Err(ClientError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn cancelling_the_scope_resolves_in_flight_requests() {
    let (client, _driver, mut server) = start_session().await;

    let server_task = tokio::spawn(async move {
        // Swallow the command and never answer.
        let _command = read_command(&mut server).await;
        server
    });

    let command = tokio::spawn({
        let client = client.clone();
        async move { client.avail_work().await }
    });

    // Once the frame reached the server the request is registered.
    let _server = server_task.await.unwrap();
    client.cancel_scope().cancel();

    assert!(matches!(
        command.await.unwrap(),
        Err(ClientError::Canceled)
    ));
    assert!(client.is_open(), "cancellation does not close the session");
}

#[tokio::test]
async fn read_deadline_tears_the_connection_down() {
    let (client_side, mut server_side) = duplex(16 * 1024);
    server_side.write_all(&banner()).await.unwrap();

    let options = ClientOptions {
        timeout: Some(Duration::from_millis(100)),
        ..ClientOptions::default()
    };
    let (client, driver) = Client::establish(client_side, options).await.unwrap();
    let driver = tokio::spawn(driver.run());

    assert!(matches!(
        driver.await.unwrap(),
        Err(ClientError::Transport(TransportError::TimedOut))
    ));
    assert!(!client.is_open());
    drop(server_side);
}

#[tokio::test]
async fn undecodable_frame_aborts_the_connection() {
    let (client, driver, mut server) = start_session().await;

    server.write_all(b"junk\x03").await.unwrap();

    assert!(matches!(driver.await.unwrap(), Err(ClientError::Decode(_))));
    assert!(!client.is_open());
}
