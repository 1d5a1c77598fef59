use std::sync::Arc;
use axum::{
    extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    routing::get,
    Extension, Router
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

//allows to split the websocket stream into separate TX and RX branches
use futures::{sink::SinkExt, stream::StreamExt};

use crate::worker::ShellEvent;

/// Latest serialized banner and badge events, replayed to new clients so
/// they render the current state without waiting for the next change.
#[derive(Default)]
pub struct Snapshot {
    banner: Option<String>,
    pending_count: Option<String>,
}

impl Snapshot {
    fn messages(&self) -> impl Iterator<Item = &String> {
        self.banner.iter().chain(self.pending_count.iter())
    }
}

pub struct ClientSender {
    pub tx: broadcast::Sender<String>,
    pub snapshot: Arc<Mutex<Snapshot>>,
}

pub struct WebSocketState {
    pub client: ClientSender,
}

pub async fn start_websocket_server(
    port: u16,
) -> std::io::Result<(ClientSender, tokio::task::JoinHandle<()>)> {
    let (tx, _) = broadcast::channel::<String>(100);

    let client = ClientSender {
        tx: tx.clone(),
        snapshot: Arc::new(Mutex::new(Snapshot::default())),
    };

    let state = Arc::new(WebSocketState {
        client: ClientSender {
            tx: tx.clone(),
            snapshot: client.snapshot.clone(),
        }
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(Extension(state));

    let server_addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(server_addr).await?;
    info!("Starting WebSocket server on {}", listener.local_addr()?);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service()).await
        {
            warn!("Server error: {}", e);
        }
    });

    Ok((client, handle))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<WebSocketState>>,
) -> axum::response::Response {
    info!("New dashboard client connected");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<WebSocketState>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before replaying so no change slips in between
    let mut rx = state.client.tx.subscribe();

    {
        let snapshot = state.client.snapshot.lock().await;
        for msg in snapshot.messages() {
            if let Err(e) = sender.send(Message::Text(Utf8Bytes::from(msg.clone()))).await {
                warn!("Failed to send snapshot to client: {}", e);
                return;
            }
        }
        debug!("Sent current state to new client");
    }

    let mut send_task = tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            if let Err(e) = sender.send(Message::Text(Utf8Bytes::from(msg))).await {
                warn!("Failed to send message to client: {}", e);
                break;
            }
        }
    });

    // Dashboards only listen, anything they send is ignored
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(_)) = receiver.next().await {}
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }
}

/// Records `event` as the latest state of its kind and broadcasts it.
pub async fn broadcast_event(client: &ClientSender, event: ShellEvent) {
    let message = serde_json::to_string(&event).unwrap_or_default();
    {
        let mut snapshot = client.snapshot.lock().await;
        match event {
            ShellEvent::Banner(_) => snapshot.banner = Some(message.clone()),
            ShellEvent::PendingCount(_) => snapshot.pending_count = Some(message.clone()),
        }
    }
    // no receivers just means no dashboard is connected
    let _ = client.tx.send(message);
}
