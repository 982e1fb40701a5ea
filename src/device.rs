//! Open MIDI ports: `Input` wraps a `midir` input connection and a list of
//! subscribed handlers; `Output` wraps an output connection and exposes a
//! single `send`. Both carry their own open/closed state so callers that
//! hold a stale `Arc` after the registry closes the port observe that via
//! `is_open()` rather than touching freed resources.

use crate::error::RouterError;
use crate::message::Message;
use midir::{MidiIO, MidiInput, MidiOutput, MidiOutputConnection};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Identifies a single physical (or virtual) MIDI port. `port` disambiguates
/// same-named ports exposed by a multi-port interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRecord {
    pub name: String,
    pub port: u32,
    pub nickname: String,
}

pub trait Device {
    fn name(&self) -> &str;
    fn port(&self) -> u32;
    fn nickname(&self) -> &str;
    fn is_open(&self) -> bool;
    fn close(&self);
}

pub type MessageHandler = Box<dyn Fn(&Message) + Send + Sync>;

/// Identifies one `subscribe`d handler so it can later be removed with
/// `unsubscribe` without disturbing any other mapping's handler on the
/// same (possibly shared) input.
pub type HandlerId = u64;

pub struct Input {
    record: PortRecord,
    handlers: Arc<Mutex<Vec<(HandlerId, MessageHandler)>>>,
    next_handler_id: AtomicU64,
    connection: Mutex<Option<midir::MidiInputConnection<()>>>,
    open: AtomicBool,
}

impl Input {
    pub fn new(record: PortRecord) -> Arc<Self> {
        Arc::new(Input {
            record,
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_handler_id: AtomicU64::new(0),
            connection: Mutex::new(None),
            open: AtomicBool::new(false),
        })
    }

    pub fn record(&self) -> &PortRecord {
        &self.record
    }

    /// Registers a handler invoked (on the midir callback thread) for every
    /// inbound message, returning an id that unbinds just this handler.
    /// Several mappings may share one input, so handlers accumulate across
    /// `subscribe` calls rather than being limited to one.
    pub fn subscribe(&self, handler: MessageHandler) -> HandlerId {
        let id = self.next_handler_id.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().push((id, handler));
        id
    }

    /// Removes a single handler previously returned by `subscribe`, leaving
    /// any other mapping's handler on this (possibly shared) input intact.
    pub fn unsubscribe(&self, id: HandlerId) {
        self.handlers.lock().unwrap().retain(|(h, _)| *h != id);
    }

    pub fn connect(&self, client_name: &str) -> Result<(), RouterError> {
        let midi_in = MidiInput::new(client_name)
            .map_err(|e| RouterError::device(&self.record.name, e.to_string()))?;
        let port = find_port(&midi_in, &self.record)?;
        let handlers = self.handlers.clone();
        let conn = midi_in
            .connect(
                &port,
                &self.record.nickname,
                move |_stamp, bytes, _| {
                    if let Ok(msg) = Message::from_bytes(bytes) {
                        for (_, handler) in handlers.lock().unwrap().iter() {
                            handler(&msg);
                        }
                    }
                },
                (),
            )
            .map_err(|e| RouterError::device(&self.record.name, e.to_string()))?;
        *self.connection.lock().unwrap() = Some(conn);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Device for Input {
    fn name(&self) -> &str {
        &self.record.name
    }
    fn port(&self) -> u32 {
        self.record.port
    }
    fn nickname(&self) -> &str {
        &self.record.nickname
    }
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
    fn close(&self) {
        *self.connection.lock().unwrap() = None;
        self.open.store(false, Ordering::SeqCst);
    }
}

pub struct Output {
    record: PortRecord,
    connection: Mutex<Option<MidiOutputConnection>>,
    open: AtomicBool,
}

impl Output {
    pub fn new(record: PortRecord) -> Arc<Self> {
        Arc::new(Output {
            record,
            connection: Mutex::new(None),
            open: AtomicBool::new(false),
        })
    }

    pub fn record(&self) -> &PortRecord {
        &self.record
    }

    pub fn connect(&self, client_name: &str) -> Result<(), RouterError> {
        let midi_out = MidiOutput::new(client_name)
            .map_err(|e| RouterError::device(&self.record.name, e.to_string()))?;
        let port = find_port(&midi_out, &self.record)?;
        let conn = midi_out
            .connect(&port, &self.record.nickname)
            .map_err(|e| RouterError::device(&self.record.name, e.to_string()))?;
        *self.connection.lock().unwrap() = Some(conn);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn send(&self, bytes: &[u8]) -> Result<(), RouterError> {
        let mut guard = self.connection.lock().unwrap();
        match guard.as_mut() {
            Some(conn) => conn
                .send(bytes)
                .map_err(|e| RouterError::device(&self.record.name, e.to_string())),
            None => Err(RouterError::device(&self.record.name, "port not open")),
        }
    }
}

impl Device for Output {
    fn name(&self) -> &str {
        &self.record.name
    }
    fn port(&self) -> u32 {
        self.record.port
    }
    fn nickname(&self) -> &str {
        &self.record.nickname
    }
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
    fn close(&self) {
        *self.connection.lock().unwrap() = None;
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Finds the Nth (`record.port`) system port whose name matches
/// `record.name`, giving the "sub-index for multi-port devices" semantics
/// `PortRecord` documents.
fn find_port<T: midir::MidiIO>(backend: &T, record: &PortRecord) -> Result<T::Port, RouterError> {
    let mut seen = 0u32;
    for port in backend.ports() {
        let name = backend
            .port_name(&port)
            .map_err(|e| RouterError::device(&record.name, e.to_string()))?;
        if name == record.name {
            if seen == record.port {
                return Ok(port);
            }
            seen += 1;
        }
    }
    Err(RouterError::device(
        &record.name,
        format!("port index {} not found among system ports", record.port),
    ))
}
