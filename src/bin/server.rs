use std::{
  collections::HashMap,
  net::SocketAddr,
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
  },
  thread,
};

use anyhow::{Context, Error};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use signal_hook::{consts::SIGTERM, iterator::Signals};
use tokenseed::{
  config::ServerConfig,
  sampler::{sample_sequence, SampleCall, SampleValue},
  token_hash::{TokenData, TokenHash},
};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};
use warp::{ws, Filter};

static IS_SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);
static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(1);

type ConnectionId = usize;

#[derive(Deserialize, ts_rs::TS)]
#[serde(rename_all = "camelCase", tag = "kind")]
#[ts(export)]
enum WebSocketRequest {
  Ping,
  Sample {
    hash:  String,
    calls: Vec<SampleCall>,
  },
  RandomToken {
    #[serde(rename = "projectId")]
    project_id: u64,
  },
}

#[derive(Serialize, ts_rs::TS)]
#[serde(rename_all = "camelCase", tag = "kind")]
#[ts(export)]
enum WebSocketResponse {
  Pong,
  SampleResult {
    seed:   i64,
    values: Vec<SampleValue>,
  },
  Token { token: TokenData },
  Error { message: String },
}

enum ConnectionMessage {
  Sunset,
}

struct ConnectionEntry {
  pub notification_channel: mpsc::Sender<ConnectionMessage>,
}

struct GlobalState {
  config:      ServerConfig,
  connections: RwLock<HashMap<ConnectionId, Arc<ConnectionEntry>>>,
}

impl GlobalState {
  fn new(config: ServerConfig) -> Self {
    Self {
      config,
      connections: RwLock::new(HashMap::new()),
    }
  }

  /// Tells every open connection to close. Called from the signal thread.
  fn sunset_connections(&self) {
    let connections = self.connections.blocking_read();
    for entry in connections.values() {
      let _ = entry.notification_channel.try_send(ConnectionMessage::Sunset);
    }
    info!(count = connections.len(), "server.sunset");
  }
}

struct ConnectionState {
  connection_id:     ConnectionId,
  wakeup_channel_rx: mpsc::Receiver<ConnectionMessage>,
  wakeup_channel_tx: mpsc::Sender<ConnectionMessage>,
}

impl ConnectionState {
  fn new() -> Self {
    let (wakeup_channel_tx, wakeup_channel_rx) = mpsc::channel(8);
    Self {
      connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
      wakeup_channel_rx,
      wakeup_channel_tx,
    }
  }

  async fn send_response(
    tx: &mut futures_util::stream::SplitSink<ws::WebSocket, ws::Message>,
    response: WebSocketResponse,
  ) -> Result<(), Error> {
    let message = ws::Message::text(serde_json::to_string(&response)?);
    tx.send(message).await.map_err(|e| e.into())
  }

  fn respond(&self, request: WebSocketRequest, global_state: &GlobalState) -> WebSocketResponse {
    match request {
      WebSocketRequest::Ping => WebSocketResponse::Pong,
      WebSocketRequest::Sample { hash, calls } => {
        let result = TokenHash::parse(&hash)
          .and_then(|hash| sample_sequence(&hash, &calls, global_state.config.max_calls));
        match result {
          Ok(trace) => WebSocketResponse::SampleResult {
            seed:   trace.seed,
            values: trace.values,
          },
          Err(err) => {
            debug!(connection = self.connection_id, error = %err, "connection.sample_rejected");
            WebSocketResponse::Error {
              message: format!("{:#}", err),
            }
          }
        }
      }
      WebSocketRequest::RandomToken { project_id } => {
        match TokenData::random(project_id, &mut rand::thread_rng()) {
          Ok(token) => WebSocketResponse::Token { token },
          Err(err) => WebSocketResponse::Error {
            message: err.to_string(),
          },
        }
      }
    }
  }

  /// Maps one text frame to its reply. Bad input becomes an `Error` reply, never a disconnect.
  fn response_for_text(&self, text: &str, global_state: &GlobalState) -> WebSocketResponse {
    match serde_json::from_str::<WebSocketRequest>(text) {
      Ok(request) => self.respond(request, global_state),
      Err(err) => WebSocketResponse::Error {
        message: format!("Malformed request: {}", err),
      },
    }
  }

  async fn handle_message(
    &mut self,
    text: &str,
    tx: &mut futures_util::stream::SplitSink<ws::WebSocket, ws::Message>,
    global_state: &GlobalState,
  ) -> Result<(), Error> {
    let response = self.response_for_text(text, global_state);
    Self::send_response(tx, response).await
  }

  async fn main_loop(&mut self, ws: ws::WebSocket, global_state: &GlobalState) {
    let (mut tx, mut rx) = ws.split();
    loop {
      tokio::select! {
        // Handle messages from the client.
        ws_message = rx.next() => {
          match ws_message {
            Some(Ok(msg)) => {
              if let Ok(text) = msg.to_str() {
                if let Err(err) = self.handle_message(text, &mut tx, global_state).await {
                  warn!(connection = self.connection_id, error = %err, "connection.send_failed");
                  break;
                }
              } else if msg.is_close() {
                debug!(connection = self.connection_id, "connection.close_received");
                break;
              } else if msg.is_ping() || msg.is_pong() {
                continue;
              } else {
                warn!(connection = self.connection_id, "connection.non_text_message");
                break;
              }
            }
            Some(Err(err)) => {
              warn!(connection = self.connection_id, error = %err, "connection.read_failed");
              break;
            }
            None => {
              debug!(connection = self.connection_id, "connection.closed");
              break;
            }
          }
        }

        // Handle a message from another thread.
        connection_message = self.wakeup_channel_rx.recv() => {
          match connection_message {
            Some(ConnectionMessage::Sunset) | None => {
              debug!(connection = self.connection_id, "connection.sunset");
              let _ = tx.send(ws::Message::close()).await;
              break;
            }
          }
        }
      }
    }
  }
}

async fn user_connected(ws: ws::WebSocket, global_state: &GlobalState) {
  let mut connection_state = ConnectionState::new();
  let connection_entry = Arc::new(ConnectionEntry {
    notification_channel: connection_state.wakeup_channel_tx.clone(),
  });
  info!(connection = connection_state.connection_id, "connection.opened");

  // Add us to the global connections list.
  global_state
    .connections
    .write()
    .await
    .insert(connection_state.connection_id, connection_entry);

  if !IS_SHUTTING_DOWN.load(Ordering::Relaxed) {
    connection_state.main_loop(ws, global_state).await;
  }

  // Remove us from the global connections list.
  global_state.connections.write().await.remove(&connection_state.connection_id);
  info!(connection = connection_state.connection_id, "connection.removed");
}

#[tokio::main]
async fn main() -> Result<(), Error> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let config = ServerConfig::from_env().context("Failed to load server configuration")?;
  let addr = SocketAddr::new(config.host, config.port);

  let global_state: &'static GlobalState = Box::leak(Box::new(GlobalState::new(config)));
  let warp_global_state = warp::any().map(move || global_state);

  // Handle SIGTERM, which is sent by Kubernetes when it wants to shut down the pod.
  let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
  let mut signals = Signals::new(&[SIGTERM]).context("Failed to register SIGTERM handler")?;
  thread::spawn(move || {
    if let Some(SIGTERM) = signals.forever().next() {
      IS_SHUTTING_DOWN.store(true, Ordering::Relaxed);
      info!("server.sigterm");
      global_state.sunset_connections();
      let _ = shutdown_tx.send(());
    }
  });

  let cors = warp::cors()
    .allow_any_origin()
    .allow_methods(&[warp::http::Method::GET, warp::http::Method::POST])
    .allow_headers(vec![
      "User-Agent",
      "Sec-Fetch-Mode",
      "Referer",
      "Origin",
      "Access-Control-Request-Method",
      "Access-Control-Request-Headers",
      "Content-Type",
      "X-Requested-With",
    ]);

  let ws_endpoint = warp::path!("api" / "sample-connection")
    .and(warp::ws())
    .and(warp_global_state)
    .map(|ws: warp::ws::Ws, gs: &'static GlobalState| {
      ws.on_upgrade(move |socket| user_connected(socket, gs))
    });

  let (bound_addr, server) =
    warp::serve(ws_endpoint.with(cors)).try_bind_with_graceful_shutdown(addr, async {
      shutdown_rx.await.ok();
    })?;
  info!(addr = %bound_addr, "server.listening");
  server.await;
  info!("server.stopped");

  Ok(())
}
