use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use sync::{ClientMessage, DocumentStore, ErrorCode, ServerMessage, WatchGuard, WriteMeta};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use trip::Identity;

use crate::AppState;

type Tx = mpsc::UnboundedSender<ServerMessage>;

/// One live subscription owned by a connection
struct SubEntry {
    task: JoinHandle<()>,
    _guard: WatchGuard,
}

impl Drop for SubEntry {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Per-connection session state
#[derive(Default)]
struct ConnSession {
    identity: Option<Identity>,
    doc_subs: HashMap<String, SubEntry>,
    query_subs: HashMap<String, SubEntry>,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let open = state.connection_opened();
    info!(connections = open, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Task to serialize and send outgoing messages
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    error!(%err, "failed to serialize message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                debug!("send failed, connection gone");
                break;
            }
        }
    });

    let mut session = ConnSession::default();

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(err) = handle_client_message(&text, &state, &tx, &mut session).await {
                    error!(%err, "error handling message");
                    let _ = tx.send(ServerMessage::Error {
                        code: ErrorCode::Internal,
                        message: err.to_string(),
                    });
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!("ws heartbeat");
            }
            Ok(Message::Binary(data)) => {
                debug!(bytes = data.len(), "ignoring binary message");
            }
            Ok(Message::Close(_)) => {
                info!("client requested close");
                break;
            }
            Err(err) => {
                warn!(%err, "websocket error");
                break;
            }
        }
    }

    // Dropping the session aborts every pump task and unsubscribes
    drop(session);
    send_task.abort();
    let left = state.connection_closed();
    info!(connections = left, "client disconnected");
}

async fn handle_client_message(
    text: &str,
    state: &AppState,
    tx: &Tx,
    session: &mut ConnSession,
) -> anyhow::Result<()> {
    let msg: ClientMessage = serde_json::from_str(text)?;

    match msg {
        ClientMessage::Hello { identity } => {
            if let Some(identity) = &identity {
                info!(user = %identity.name, "client identified");
            }
            session.identity = identity;
        }

        ClientMessage::SubscribeDoc { path } => {
            // Re-subscribing to the same path replaces the old channel
            session.doc_subs.remove(&path);

            match state.store.watch(&path).await {
                Ok(watch) => {
                    let _ = tx.send(ServerMessage::Snapshot {
                        snapshot: watch.initial,
                    });

                    let tx = tx.clone();
                    let mut rx = watch.rx;
                    let task = tokio::spawn(async move {
                        loop {
                            match rx.recv().await {
                                Ok(snapshot) => {
                                    if tx.send(ServerMessage::Snapshot { snapshot }).is_err() {
                                        break;
                                    }
                                }
                                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                                    continue;
                                }
                                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                            }
                        }
                    });

                    debug!(path, "doc subscription established");
                    session.doc_subs.insert(
                        path,
                        SubEntry {
                            task,
                            _guard: watch.guard,
                        },
                    );
                }
                Err(err) => {
                    let _ = tx.send(ServerMessage::Error {
                        code: (&err).into(),
                        message: err.to_string(),
                    });
                }
            }
        }

        ClientMessage::UnsubscribeDoc { path } => {
            session.doc_subs.remove(&path);
            debug!(path, "doc subscription removed");
        }

        ClientMessage::SubscribeQuery { query } => {
            let key = query.collection.clone();
            session.query_subs.remove(&key);

            match state.store.watch_query(&query).await {
                Ok(watch) => {
                    let _ = tx.send(ServerMessage::QuerySnapshot {
                        collection: key.clone(),
                        docs: watch.initial,
                    });

                    let tx = tx.clone();
                    let collection = key.clone();
                    let mut rx = watch.rx;
                    let task = tokio::spawn(async move {
                        loop {
                            match rx.recv().await {
                                Ok(docs) => {
                                    let msg = ServerMessage::QuerySnapshot {
                                        collection: collection.clone(),
                                        docs,
                                    };
                                    if tx.send(msg).is_err() {
                                        break;
                                    }
                                }
                                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                                    continue;
                                }
                                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                            }
                        }
                    });

                    debug!(collection = %key, "query subscription established");
                    session.query_subs.insert(
                        key,
                        SubEntry {
                            task,
                            _guard: watch.guard,
                        },
                    );
                }
                Err(err) => {
                    let _ = tx.send(ServerMessage::Error {
                        code: (&err).into(),
                        message: err.to_string(),
                    });
                }
            }
        }

        ClientMessage::UnsubscribeQuery { collection } => {
            session.query_subs.remove(&collection);
        }

        ClientMessage::WriteDoc {
            path,
            payload,
            expected_revision,
        } => {
            let meta = WriteMeta {
                updated_by: session.identity.as_ref().map(|identity| identity.id),
                merge: false,
                expected_revision,
            };

            match state.store.set(&path, payload, meta).await {
                Ok(revision) => {
                    let _ = tx.send(ServerMessage::Ack { path, revision });
                }
                Err(err) => {
                    let _ = tx.send(ServerMessage::Error {
                        code: (&err).into(),
                        message: err.to_string(),
                    });
                }
            }
        }

        ClientMessage::DeleteDoc { path } => match state.store.delete(&path).await {
            Ok(()) => {
                let _ = tx.send(ServerMessage::Ack { path, revision: 0 });
            }
            Err(err) => {
                let _ = tx.send(ServerMessage::Error {
                    code: (&err).into(),
                    message: err.to_string(),
                });
            }
        },

        ClientMessage::Append {
            collection,
            payload,
        } => {
            let meta = WriteMeta {
                updated_by: session.identity.as_ref().map(|identity| identity.id),
                ..WriteMeta::default()
            };

            match state.store.add(&collection, payload, meta).await {
                Ok(snapshot) => {
                    let _ = tx.send(ServerMessage::Ack {
                        path: snapshot.path,
                        revision: snapshot.revision,
                    });
                }
                Err(err) => {
                    let _ = tx.send(ServerMessage::Error {
                        code: (&err).into(),
                        message: err.to_string(),
                    });
                }
            }
        }

        ClientMessage::Ping => {
            let _ = tx.send(ServerMessage::Pong);
        }
    }

    Ok(())
}
