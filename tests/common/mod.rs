//! Shared mock WebSocket server for driving `RtSession`/`VoiceAgent`
//! against scripted scenarios without a real recognition service.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

pub type ServerStream = WebSocketStream<TcpStream>;

/// Bind a loopback listener on an OS-assigned port and return its `ws://`
/// endpoint plus a handle that accepts exactly one client connection.
pub struct MockServer {
    pub endpoint: String,
    listener: TcpListener,
}

impl MockServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        Self {
            endpoint: format!("ws://{addr}"),
            listener,
        }
    }

    /// Accept the next incoming client and upgrade it to a WebSocket.
    pub async fn accept(&self) -> ServerStream {
        let (stream, _) = self.listener.accept().await.expect("accept tcp");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("ws handshake")
    }

    /// Spawn a background task driving a scripted conversation against
    /// the next accepted client.
    pub fn spawn_script<F, Fut>(self, script: F) -> (String, JoinHandle<()>)
    where
        F: FnOnce(ServerStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let endpoint = self.endpoint.clone();
        let handle = tokio::spawn(async move {
            let ws = self.accept().await;
            script(ws).await;
        });
        (endpoint, handle)
    }
}

/// Receive the next text frame, panicking on anything else (used by
/// scripts to assert on upstream control/audio ordering).
pub async fn recv_text(ws: &mut ServerStream) -> String {
    loop {
        match ws.next().await.expect("stream ended").expect("ws error") {
            WsMessage::Text(text) => return text.to_string(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Receive the next binary (audio) frame.
pub async fn recv_binary(ws: &mut ServerStream) -> Vec<u8> {
    loop {
        match ws.next().await.expect("stream ended").expect("ws error") {
            WsMessage::Binary(bytes) => return bytes.to_vec(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("expected binary frame, got {other:?}"),
        }
    }
}

pub async fn send_text(ws: &mut ServerStream, text: &str) {
    ws.send(WsMessage::Text(text.to_string().into()))
        .await
        .expect("send text");
}

pub async fn close(ws: &mut ServerStream) {
    let _ = ws.close(None).await;
}
