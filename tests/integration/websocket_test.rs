//! WebSocket protocol over a served router
//!
//! Each test binds the app on an ephemeral loopback port and talks to it
//! with tokio-tungstenite.

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::common::*;
use docsync::backend::error::types::{CODE_AUTHORIZATION, CODE_PROTOCOL};
use docsync::backend::server::create_app_with;
use docsync::shared::config::SyncConfig;
use docsync::shared::document::{CreateData, RawOp};
use docsync::shared::ot::OtType;
use docsync::shared::protocol::{ClientRequest, ServerMessage, PROTOCOL_VERSION};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(config: SyncConfig) -> SocketAddr {
    let (builder, _store) = backend_builder(config);
    let app = create_app_with(builder).await.expect("app builds");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    addr
}

/// Open a socket and consume the `init` message; returns the client id
async fn open(url: String) -> (Socket, String) {
    let (mut socket, _) = connect_async(url).await.expect("handshake succeeds");
    match recv(&mut socket).await {
        ServerMessage::Init { protocol, id } => {
            assert_eq!(protocol, PROTOCOL_VERSION);
            (socket, id)
        }
        other => panic!("expected init, got {:?}", other),
    }
}

async fn send(socket: &mut Socket, request: &ClientRequest) {
    let text = serde_json::to_string(request).unwrap();
    socket.send(Message::text(text)).await.unwrap();
}

async fn recv(socket: &mut Socket) -> ServerMessage {
    loop {
        let frame = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("server answered in time")
            .expect("socket open")
            .expect("valid frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("valid server message");
        }
    }
}

fn create_text(id: &str, seq: u64, content: &str) -> ClientRequest {
    ClientRequest::Op {
        c: "texts".to_string(),
        d: id.to_string(),
        v: 0,
        seq,
        body: RawOp {
            create: Some(CreateData {
                ot_type: OtType::RichText,
                data: json!({"ops": [{"insert": content}]}),
            }),
            ..Default::default()
        },
    }
}

fn edit_text(id: &str, base: u64, seq: u64, op: serde_json::Value) -> ClientRequest {
    ClientRequest::Op {
        c: "texts".to_string(),
        d: id.to_string(),
        v: base,
        seq,
        body: RawOp {
            op: Some(op),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_loopback_client_creates_edits_and_fans_out() {
    let addr = serve(test_config()).await;
    let (mut writer, writer_id) = open(format!("ws://{}/ws", addr)).await;
    let (mut reader, _) = open(format!("ws://{}/ws", addr)).await;

    send(&mut writer, &create_text("t1", 1, "hi")).await;
    assert_eq!(
        recv(&mut writer).await,
        ServerMessage::Ack {
            c: "texts".to_string(),
            d: "t1".to_string(),
            v: 0,
            seq: 1
        }
    );

    send(
        &mut reader,
        &ClientRequest::Subscribe {
            c: "texts".to_string(),
            d: "t1".to_string(),
        },
    )
    .await;
    match recv(&mut reader).await {
        ServerMessage::Subscribe { data, .. } => assert_eq!(data.version, 1),
        other => panic!("expected subscribe reply, got {:?}", other),
    }

    send(&mut writer, &edit_text("t1", 1, 2, json!([{"retain": 2}, {"insert": "!"}]))).await;
    assert!(matches!(recv(&mut writer).await, ServerMessage::Ack { v: 1, seq: 2, .. }));

    match recv(&mut reader).await {
        ServerMessage::Op { v, src, seq, body, .. } => {
            assert_eq!(v, 1);
            assert_eq!(src, writer_id);
            assert_eq!(seq, 2);
            assert_eq!(body.op, Some(json!([{"retain": 2}, {"insert": "!"}])));
        }
        other => panic!("expected op, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_frame_answers_protocol_error() {
    let addr = serve(test_config()).await;
    let (mut socket, _) = open(format!("ws://{}/ws", addr)).await;

    socket.send(Message::text("{\"a\":\"teleport\"}")).await.unwrap();
    match recv(&mut socket).await {
        ServerMessage::Error { error, .. } => assert_eq!(error.code, CODE_PROTOCOL),
        other => panic!("expected error, got {:?}", other),
    }

    // The connection stays usable
    send(
        &mut socket,
        &ClientRequest::Fetch {
            c: "texts".to_string(),
            d: "nothing".to_string(),
            v: None,
        },
    )
    .await;
    match recv(&mut socket).await {
        ServerMessage::Fetch { data, .. } => assert_eq!(data.version, 0),
        other => panic!("expected fetch reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_expired_token_refuses_upgrade() {
    let (_idp, jwks_url) = start_jwks_server().await;
    let addr = serve(config_with_jwks(&jwks_url)).await;

    let url = format!("ws://{}/ws?access_token={}", addr, expired_token("u1"));
    match connect_async(url).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        Err(other) => panic!("expected HTTP refusal, got {:?}", other),
        Ok(_) => panic!("expired token was accepted"),
    }
}

#[tokio::test]
async fn test_end_user_socket_is_subject_to_rules() {
    let (_idp, jwks_url) = start_jwks_server().await;
    let addr = serve(config_with_jwks(&jwks_url)).await;

    let (mut server, _) = open(format!("ws://{}/ws", addr)).await;
    send(&mut server, &create_text("t1", 1, "secret")).await;
    assert!(matches!(recv(&mut server).await, ServerMessage::Ack { .. }));

    let url = format!("ws://{}/ws?access_token={}", addr, user_token("u1"));
    let (mut user, _) = open(url).await;
    send(
        &mut user,
        &ClientRequest::Fetch {
            c: "texts".to_string(),
            d: "t1".to_string(),
            v: None,
        },
    )
    .await;
    match recv(&mut user).await {
        ServerMessage::Error { d, error, .. } => {
            assert_eq!(d.as_deref(), Some("t1"));
            assert_eq!(error.code, CODE_AUTHORIZATION);
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_health_reports_open_connections() {
    let addr = serve(test_config()).await;
    let (_socket, _) = open(format!("ws://{}/ws", addr)).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["connections"], json!(1));
}
