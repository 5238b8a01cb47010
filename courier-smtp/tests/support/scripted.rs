//! An in-memory transport that plays back a scripted server.
//!
//! The first step is released when the client connects, and one more after
//! every write, so a script reads like the server side of a conversation.
//! Running out of steps (or hitting [`Step::Hang`]) leaves reads pending
//! forever, which is how the watchdog tests stall a session.
#![allow(dead_code)]

use std::{collections::VecDeque, io, sync::Arc};

use async_trait::async_trait;
use courier_smtp::{ClientError, Connection, Connector, ServerConfig};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub enum Step {
    /// Make these bytes readable.
    Reply(&'static str),
    /// Never answer.
    Hang,
    /// Fail the next read with this error kind.
    Fail(io::ErrorKind),
}

/// What the client did to the transport, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected { encrypted: bool },
    Wrote { data: String, encrypted: bool },
    Upgraded,
    Closed,
}

#[derive(Clone)]
pub struct ScriptedConnector {
    steps: Arc<Mutex<VecDeque<Step>>>,
    events: Arc<Mutex<Vec<Event>>>,
    refuse: bool,
}

impl ScriptedConnector {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            events: Arc::new(Mutex::new(Vec::new())),
            refuse: false,
        }
    }

    /// Every connect attempt fails with "Connection refused".
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new([])
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Only the writes, as text.
    pub fn written(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Wrote { data, .. } => Some(data),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Box<dyn Connection>, ClientError> {
        if self.refuse {
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "Connection refused",
            )));
        }

        self.record(Event::Connected {
            encrypted: config.use_ssl,
        });

        Ok(Box::new(ScriptedConnection {
            connector: self.clone(),
            pending: VecDeque::new(),
            released: 1,
            encrypted: config.use_ssl,
        }))
    }
}

struct ScriptedConnection {
    connector: ScriptedConnector,
    pending: VecDeque<u8>,
    released: usize,
    encrypted: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, data: &[u8]) -> Result<(), ClientError> {
        self.connector.record(Event::Wrote {
            data: String::from_utf8_lossy(data).into_owned(),
            encrypted: self.encrypted,
        });
        self.released += 1;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ClientError> {
        while self.pending.is_empty() {
            let step = if self.released > 0 {
                self.connector.steps.lock().pop_front()
            } else {
                None
            };

            match step {
                Some(Step::Reply(text)) => {
                    self.released -= 1;
                    self.pending.extend(text.as_bytes());
                }
                Some(Step::Fail(kind)) => {
                    self.released -= 1;
                    return Err(ClientError::Io(io::Error::new(kind, "scripted failure")));
                }
                Some(Step::Hang) | None => std::future::pending::<()>().await,
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn upgrade(mut self: Box<Self>, _domain: &str) -> Result<Box<dyn Connection>, ClientError> {
        self.connector.record(Event::Upgraded);
        self.encrypted = true;
        Ok(self as Box<dyn Connection>)
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    async fn close(&mut self) {
        self.connector.record(Event::Closed);
    }
}
