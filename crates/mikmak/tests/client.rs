//! Integration tests for the facade: a session driven purely through the
//! prelude against a scripted login server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mikmak::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const API_OK: &[u8] = b"<msg t='sys'><body action='apiOK' r='0'></body></msg>\0";

const SERVER_LIST: &str = r#"{"b":{"r":-1,"o":{"safeChat":false,"_cmd":"server_list","rank":1,"userName":"bot","list":"[{\"id\":10,\"name\":'מנהלים',\"ip\":'127.0.0.1',\"port\":1,\"capicity\":-1.0,\"dt\":1}]"}},"t":"xt"}"#;

// =========================================================================
// Session through the prelude
// =========================================================================

#[tokio::test]
async fn test_server_list_reaches_subscribers_through_prelude() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(API_OK).await.unwrap();
        stream.write_all(SERVER_LIST.as_bytes()).await.unwrap();
        stream.write_all(&[0]).await.unwrap();
        let mut sink = Vec::new();
        let _ = stream.read_to_end(&mut sink).await;
    });

    let mut client = MikmakClient::builder("bot", "pw")
        .bootstrap("127.0.0.1", port)
        .server(KnownServer::Kiwi)
        .read_timeout(Duration::from_secs(1))
        .build();

    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    client.events().on_server_list(move |servers: &[ServerDescriptor]| {
        sink.lock()
            .unwrap()
            .extend(servers.iter().map(|s| s.name.clone()))
    });

    let end = client.connect().await.unwrap();

    // Only the admins' server was offered, so there was nothing to join.
    assert_eq!(end, SessionEnd::ServerNotFound);
    assert_eq!(*names.lock().unwrap(), [KnownServer::Admins.name()]);
    assert_eq!(client.state().username.as_deref(), Some("bot"));
    assert_eq!(client.phase(), Phase::Stopped);
}

#[tokio::test]
async fn test_session_errors_convert_with_question_mark() {
    async fn run() -> Result<SessionEnd, MikmakError> {
        let mut client = MikmakClient::new(ClientConfig::default());
        Ok(client.connect().await?)
    }

    let err = run().await.unwrap_err();
    assert!(matches!(err, MikmakError::Session(_)));
}
