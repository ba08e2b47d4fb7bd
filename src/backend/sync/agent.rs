/**
 * Wire Agent
 *
 * Translates `ClientRequest` messages of one WebSocket peer into calls on
 * its `Connection`, and writes replies, acks, forwarded ops and errors to
 * the peer's outbound queue. Every subscribed document gets a forwarder
 * task that drains its `Subscription` into the queue.
 *
 * A failed request produces one `error` message addressed to that request;
 * the connection stays open.
 */

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::error::types::CODE_PROTOCOL;
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::sync::{Connection, Subscription};
use crate::shared::document::{DocKey, RawOp};
use crate::shared::protocol::{ClientRequest, ServerMessage, PROTOCOL_VERSION};

pub struct Agent {
    connection: Arc<Connection>,
    outbound: mpsc::Sender<ServerMessage>,
    forwarders: HashMap<DocKey, JoinHandle<()>>,
}

impl Agent {
    pub fn new(connection: Arc<Connection>, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            connection,
            outbound,
            forwarders: HashMap::new(),
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Announce the protocol version and this connection's client id
    pub async fn init(&self) -> bool {
        self.send(ServerMessage::Init {
            protocol: PROTOCOL_VERSION,
            id: self.connection.client_id().to_string(),
        })
        .await
    }

    /// Handle one text frame; returns false once the peer is gone
    pub async fn handle_text(&mut self, text: &str) -> bool {
        match serde_json::from_str::<ClientRequest>(text) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                tracing::debug!("Connection {} sent an unparseable message: {}", self.connection.handle(), err);
                self.protocol_error(format!("Invalid message: {}", err)).await
            }
        }
    }

    /// Report a frame that is not a request
    pub async fn protocol_error(&self, message: impl Into<String>) -> bool {
        self.send(ServerMessage::error(None, CODE_PROTOCOL, message)).await
    }

    pub async fn handle(&mut self, request: ClientRequest) -> bool {
        let reply = match self.dispatch(&request).await {
            Ok(reply) => reply,
            Err(err) => {
                if err.is_transient() {
                    tracing::warn!("Request on {}/{} failed: {}", request.collection(), request.id(), err);
                } else {
                    tracing::debug!("Request on {}/{} rejected: {}", request.collection(), request.id(), err);
                }
                ServerMessage::error(Some(&request), err.code(), err.wire_message())
            }
        };
        self.send(reply).await
    }

    async fn dispatch(&mut self, request: &ClientRequest) -> BackendResult<ServerMessage> {
        match request {
            ClientRequest::Fetch { c, d, v } => {
                let data = match v {
                    Some(version) => self.connection.fetch_at(c, d, *version).await?,
                    None => self.connection.fetch(c, d).await?,
                };
                Ok(ServerMessage::Fetch {
                    c: c.clone(),
                    d: d.clone(),
                    data,
                })
            }
            ClientRequest::Subscribe { c, d } => {
                let (data, subscription) = self.connection.subscribe(c, d).await?;
                self.forward(subscription);
                Ok(ServerMessage::Subscribe {
                    c: c.clone(),
                    d: d.clone(),
                    data,
                })
            }
            ClientRequest::Unsubscribe { c, d } => {
                if let Some(forwarder) = self.forwarders.remove(&DocKey::new(c.clone(), d.clone())) {
                    forwarder.abort();
                }
                Ok(ServerMessage::Unsubscribe {
                    c: c.clone(),
                    d: d.clone(),
                })
            }
            ClientRequest::Op { c, d, v, seq, body } => {
                let version = self.connection.submit_raw(c, d, *v, *seq, body.clone()).await?;
                Ok(ServerMessage::Ack {
                    c: c.clone(),
                    d: d.clone(),
                    v: version,
                    seq: *seq,
                })
            }
        }
    }

    /// Spawn the task draining a subscription into the outbound queue
    fn forward(&mut self, mut subscription: Subscription) {
        let key = subscription.key().clone();
        let outbound = self.outbound.clone();
        let handle = self.connection.handle();
        let forwarder_key = key.clone();

        let task = tokio::spawn(async move {
            loop {
                let message = match subscription.next().await {
                    Ok(Some(op)) => match RawOp::try_from(&op.payload) {
                        Ok(body) => ServerMessage::Op {
                            c: forwarder_key.collection.clone(),
                            d: forwarder_key.id.clone(),
                            v: op.version,
                            src: op.src,
                            seq: op.seq,
                            body,
                        },
                        Err(err) => error_message(&forwarder_key, &BackendError::from(err)),
                    },
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!("Forwarding {} to connection {} stopped: {}", forwarder_key, handle, err);
                        let _ = outbound.send(error_message(&forwarder_key, &err)).await;
                        break;
                    }
                };
                if outbound.send(message).await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.forwarders.insert(key, task) {
            previous.abort();
        }
    }

    async fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(message).await.is_ok()
    }

    pub fn subscribed(&self) -> usize {
        self.forwarders.len()
    }

    /// Stop every forwarder
    pub fn close(&mut self) {
        for (_, forwarder) in self.forwarders.drain() {
            forwarder.abort();
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.close();
    }
}

fn error_message(key: &DocKey, err: &BackendError) -> ServerMessage {
    ServerMessage::Error {
        c: Some(key.collection.clone()),
        d: Some(key.id.clone()),
        seq: None,
        error: err.to_error_object(),
    }
}
