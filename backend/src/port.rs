//! Named, bidirectional message channels.
//!
//! A `Port` is the backend's end of one client connection; a `PortHandle`
//! is the client's end. Messages are JSON values so any transport that can
//! carry JSON (the WebSocket server, an in-process test) can drive a session.

use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, error};
use uuid::Uuid;

pub struct Port {
    pub id: Uuid,
    pub name: String,
    pub inbound: Receiver<Value>,
    pub outbound: Sender<Value>,
}

pub struct PortHandle {
    pub id: Uuid,
    pub tx: Sender<Value>,
    pub rx: Receiver<Value>,
}

/// Creates both ends of a port with bounded queues in each direction.
pub fn port_pair(name: impl Into<String>, capacity: usize) -> (Port, PortHandle) {
    let id = Uuid::new_v4();
    let (to_backend, inbound) = mpsc::channel(capacity);
    let (outbound, to_client) = mpsc::channel(capacity);

    let port = Port {
        id,
        name: name.into(),
        inbound,
        outbound,
    };
    let handle = PortHandle {
        id,
        tx: to_backend,
        rx: to_client,
    };
    (port, handle)
}

/// Typed sending half of a port.
///
/// Sending never fails loudly: once the client is gone, messages are
/// dropped and `send` reports `false`.
pub struct Outbox<M> {
    tx: Sender<Value>,
    _msg: PhantomData<fn(M)>,
}

impl<M> Clone for Outbox<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _msg: PhantomData,
        }
    }
}

impl<M: Serialize> Outbox<M> {
    pub fn new(tx: Sender<Value>) -> Self {
        Self {
            tx,
            _msg: PhantomData,
        }
    }

    pub async fn send(&self, msg: M) -> bool {
        let value = match serde_json::to_value(&msg) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "failed to encode outbound message");
                return false;
            }
        };

        if self.tx.send(value).await.is_err() {
            debug!("port closed; dropping outbound message");
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
