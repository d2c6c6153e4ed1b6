//! Same-device delivery of [`Command`]s between participants.
//!
//! Three paths, used together:
//! - the broadcast bus, reaching every other open endpoint;
//! - a local echo, so the sender also observes its own command;
//! - storage change notifications, decoded into `ReportState` updates.
//!
//! Delivery is at-most-once per path and unordered across paths.

use crate::config::KioskConfig;
use crate::kiosk::command::Command;
use crate::kiosk::storage::StorageChange;
use crate::kiosk::types::DisplayState;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A bus message: the encoded command plus the endpoint that sent it
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Uuid,
    pub payload: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    Bus,
    Local,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub command: Command,
    pub path: DeliveryPath,
}

pub struct Transport {
    origin: Uuid,
    channel_name: String,
    key_prefix: String,
    bus: Option<broadcast::Sender<Envelope>>,
    bus_rx: Option<broadcast::Receiver<Envelope>>,
    local_tx: mpsc::UnboundedSender<Command>,
    local_rx: mpsc::UnboundedReceiver<Command>,
    storage_rx: Option<broadcast::Receiver<StorageChange>>,
}

impl Transport {
    pub fn open(
        origin: Uuid,
        config: &KioskConfig,
        bus: Option<broadcast::Sender<Envelope>>,
        storage_rx: broadcast::Receiver<StorageChange>,
    ) -> Self {
        let bus_rx = bus.as_ref().map(|bus| bus.subscribe());
        if bus.is_none() {
            warn!(
                "Broadcast channel '{}' unavailable, using local and storage fallbacks",
                config.channel_name
            );
        }
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        debug!("Opened endpoint {} on '{}'", origin, config.channel_name);

        Self {
            origin,
            channel_name: config.channel_name.clone(),
            key_prefix: config.storage_key_prefix.clone(),
            bus,
            bus_rx,
            local_tx,
            local_rx,
            storage_rx: Some(storage_rx),
        }
    }

    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn is_bus_available(&self) -> bool {
        self.bus.is_some()
    }

    /// Post on the bus and echo to this endpoint.
    pub fn send(&self, command: &Command) {
        match command.encode() {
            Ok(payload) => self.post_raw(payload),
            Err(e) => warn!("Dropping {} command: {}", command.kind(), e),
        }
        // The receiver lives as long as self
        let _ = self.local_tx.send(command.clone());
        debug!("Sent {} to {:?}", command.kind(), command.target());
    }

    /// Post an already-encoded payload on the bus only
    pub fn post_raw(&self, payload: impl Into<Arc<str>>) {
        let Some(bus) = &self.bus else {
            return;
        };
        let envelope = Envelope {
            origin: self.origin,
            payload: payload.into(),
        };
        // Err only means nobody else is listening
        if bus.send(envelope).is_err() {
            debug!("No listeners on '{}'", self.channel_name);
        }
    }

    /// Next inbound message that is already waiting, without blocking.
    pub fn try_next(&mut self) -> Option<Inbound> {
        if let Ok(command) = self.local_rx.try_recv() {
            return Some(Inbound {
                command,
                path: DeliveryPath::Local,
            });
        }

        while let Some(rx) = self.bus_rx.as_mut() {
            match rx.try_recv() {
                Ok(envelope) => {
                    if let Some(inbound) = decode_envelope(self.origin, envelope) {
                        return Some(inbound);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("Endpoint {} missed {} bus messages", self.origin, missed);
                }
                Err(TryRecvError::Closed) => self.bus_rx = None,
            }
        }

        while let Some(rx) = self.storage_rx.as_mut() {
            match rx.try_recv() {
                Ok(change) => {
                    if let Some(inbound) = decode_change(self.origin, &self.key_prefix, change) {
                        return Some(inbound);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("Endpoint {} missed {} storage changes", self.origin, missed);
                }
                Err(TryRecvError::Closed) => self.storage_rx = None,
            }
        }

        None
    }

    /// Wait for the next inbound message. Local echoes are served first.
    pub async fn recv(&mut self) -> Option<Inbound> {
        loop {
            tokio::select! {
                biased;
                Some(command) = self.local_rx.recv() => {
                    return Some(Inbound { command, path: DeliveryPath::Local });
                }
                result = recv_or_pending(&mut self.bus_rx), if self.bus_rx.is_some() => match result {
                    Ok(envelope) => {
                        if let Some(inbound) = decode_envelope(self.origin, envelope) {
                            return Some(inbound);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Endpoint {} missed {} bus messages", self.origin, missed);
                    }
                    Err(RecvError::Closed) => self.bus_rx = None,
                },
                result = recv_or_pending(&mut self.storage_rx), if self.storage_rx.is_some() => match result {
                    Ok(change) => {
                        if let Some(inbound) = decode_change(self.origin, &self.key_prefix, change) {
                            return Some(inbound);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Endpoint {} missed {} storage changes", self.origin, missed);
                    }
                    Err(RecvError::Closed) => self.storage_rx = None,
                },
                else => return None,
            }
        }
    }

    /// Detach from the bus and storage notifications. Queued local echoes
    /// can still be drained.
    pub fn close(&mut self) {
        self.bus = None;
        self.bus_rx = None;
        self.storage_rx = None;
        self.local_rx.close();
        info!("Closed endpoint {} on '{}'", self.origin, self.channel_name);
    }
}

async fn recv_or_pending<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn decode_envelope(own_origin: Uuid, envelope: Envelope) -> Option<Inbound> {
    if envelope.origin == own_origin {
        return None;
    }
    match Command::decode(&envelope.payload) {
        Ok(command) => Some(Inbound {
            command,
            path: DeliveryPath::Bus,
        }),
        Err(e) => {
            warn!("Dropping bus message from {}: {}", envelope.origin, e);
            None
        }
    }
}

/// The written key names the display; a snapshot carrying another
/// identity is dropped.
fn decode_change(own_origin: Uuid, key_prefix: &str, change: StorageChange) -> Option<Inbound> {
    if change.origin == own_origin {
        return None;
    }
    let display_id = change.key.strip_prefix(key_prefix)?;
    match serde_json::from_str::<DisplayState>(&change.new_value) {
        Ok(state) if state.display_id == display_id => Some(Inbound {
            command: Command::ReportState {
                display_id: display_id.to_string(),
                state,
            },
            path: DeliveryPath::Storage,
        }),
        Ok(state) => {
            warn!(
                "Dropping storage change under {} carrying state of {}",
                change.key, state.display_id
            );
            None
        }
        Err(e) => {
            warn!("Dropping storage change for {}: {}", change.key, e);
            None
        }
    }
}
