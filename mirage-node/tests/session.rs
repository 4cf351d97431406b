mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Camera, ble_session};
use mirage_node::catalog::{self, ListMedia, TimeConfig};
use mirage_node::mirage_keys::{CryptoProvider, MemoryKeyStore, P256Provider};
use mirage_node::mirage_proto::{CameraApiRequest, CameraApiResponse, RequestType, StatusCode, frame};
use mirage_node::{Command, CommandOutput, Error, PairingHandshake};

async fn paired(camera: Arc<Camera>) -> common::BleSession {
    let mut session = ble_session(camera);
    PairingHandshake::new(Arc::new(MemoryKeyStore::new()), "me", "cam")
        .with_confirmation_delay(Duration::ZERO)
        .run(&mut session)
        .await
        .unwrap();
    session
}

#[tokio::test]
async fn commands_before_pairing_are_plaintext() {
    let camera = Arc::new(Camera::new());
    let session = ble_session(camera.clone());

    let request = catalog::build(session.ids(), &Command::Status).unwrap();
    let response = session.send(&request).await.unwrap();

    assert!(response.is_ok());
    assert_eq!(camera.payloads(), vec![request.to_bytes()]);
}

#[tokio::test]
async fn commands_after_pairing_are_encrypted() {
    let camera = Arc::new(Camera::new());
    let session = paired(camera.clone()).await;
    let key = camera.shared_key().unwrap();

    let output = session.execute(&Command::Status).await.unwrap();
    assert_eq!(output, CommandOutput::Status(b"ready".to_vec()));
    session.execute(&Command::ConfigTime(TimeConfig::default())).await.unwrap();

    let payloads = camera.payloads();
    assert_eq!(payloads.len(), 4);
    for payload in &payloads[2..] {
        let plain = P256Provider::new().decrypt(&key, payload).unwrap();
        assert!(CameraApiRequest::from_bytes(&plain).unwrap().request_id().unwrap() > 2000);
    }
    assert_eq!(
        camera.handled()[2..],
        [RequestType::Status, RequestType::Configure]
    );
}

#[tokio::test]
async fn list_media_end_to_end() {
    let camera = Arc::new(Camera::new());
    let session = paired(camera.clone()).await;

    let command = Command::ListMedia(ListMedia { start: 0, count: 10 });
    let request = catalog::build(session.ids(), &command).unwrap();
    let list = request.list_media_request.clone().unwrap();
    assert_eq!((list.start_index, list.media_count), (0, 10));

    let response = session.send(&request).await.unwrap();
    let CommandOutput::Media(items) = command.interpret(response).unwrap() else {
        panic!("expected a media listing");
    };

    let rows: Vec<[String; 5]> = items.iter().map(|item| item.columns()).collect();
    assert_eq!(
        rows,
        vec![
            ["VID_20240101_120000.mp4", "52428800", "30000", "5760", "2880"].map(String::from),
            ["IMG_20240101_120100.jpg", "4194304", "0", "7680", "3840"].map(String::from),
        ]
    );
}

#[tokio::test]
async fn concurrent_sends_are_serialized() {
    let camera = Arc::new(Camera::new());
    let session = paired(camera.clone()).await;

    let (a, b, c) = tokio::join!(
        session.execute(&Command::Status),
        session.execute(&Command::StopCapture),
        session.execute(&Command::GetDebugLogs),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(camera.handled().len(), 5);
}

#[tokio::test]
async fn invalid_command_never_reaches_the_camera() {
    let camera = Arc::new(Camera::new());
    let session = ble_session(camera.clone());

    let err = session
        .execute(&Command::ListMedia(ListMedia { start: 0, count: 0 }))
        .await
        .unwrap_err();

    assert!(matches!(err, mirage_node::Error::Validation(_)));
    assert!(camera.payloads().is_empty());
}

#[tokio::test]
async fn request_ids_keep_increasing_across_commands() {
    let camera = Arc::new(Camera::new());
    let session = ble_session(camera.clone());

    session.execute(&Command::Status).await.unwrap();
    session.execute(&Command::Status).await.unwrap();

    let ids: Vec<i64> = camera
        .payloads()
        .iter()
        .map(|p| CameraApiRequest::from_bytes(p).unwrap().request_id().unwrap())
        .collect();
    assert!(ids[0] > 2000);
    assert!(ids[1] > ids[0]);
}

#[tokio::test(start_paused = true)]
async fn abandoned_send_never_answers_the_next_one() {
    let (session, notify) = common::quiet_ble_session();
    let first = session.ids().new_request(RequestType::Status);

    let abandoned = tokio::time::timeout(Duration::from_millis(20), session.send(&first)).await;
    assert!(abandoned.is_err());
    assert!(!session.is_usable());

    // The camera's late reply to the first request finally shows up
    let mut late = CameraApiResponse::with_status(StatusCode::Ok);
    late.request_id = first.request_id().unwrap();
    notify.unbounded_send(frame::encode(&late.to_bytes())).unwrap();

    let second = session.ids().new_request(RequestType::Status);
    assert!(matches!(session.send(&second).await, Err(Error::SessionUnusable)));
}
