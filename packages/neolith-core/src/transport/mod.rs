//! # Transport Module
//!
//! The two collaborators a session needs from its host.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SESSION SEAMS                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │     host ── bytes in ──► Session::handle_payload                       │
//! │     host ── connect ───► Session::on_connected                         │
//! │     host ── close ─────► Session::on_transport_closed                  │
//! │                                                                         │
//! │     Session ── Transport::send(bytes) ──► host ──► server              │
//! │     Session ── Directory::member_keys(id) ──► current public keys      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Framing, reconnection and socket handling belong to the host. A
//! transport only moves whole payloads.

mod directory;

pub use directory::{Directory, MemoryDirectory};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Outbound queue depth for [`MemoryTransport`]
pub const MEMORY_TRANSPORT_CAPACITY: usize = 256;

/// Delivers complete payloads to the server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one payload
    async fn send(&self, payload: Vec<u8>) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// In-process transport backed by a tokio channel
///
/// The receiving half stands in for the server.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl MemoryTransport {
    /// Create a transport and the receiver that sees everything it sends
    pub fn new() -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(MEMORY_TRANSPORT_CAPACITY);
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: Vec<u8>) -> Result<()> {
        // clone out of the lock so it is not held across the await
        let tx = self.tx.lock().clone().ok_or(Error::NotConnected)?;
        tx.send(payload)
            .await
            .map_err(|_| Error::TransportError("Receiver dropped".into()))
    }

    async fn close(&self) -> Result<()> {
        if self.tx.lock().take().is_some() {
            tracing::debug!("Memory transport closed");
        }
        Ok(())
    }
}
