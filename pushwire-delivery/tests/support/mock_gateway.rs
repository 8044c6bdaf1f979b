//! Scripted in-memory gateway for driving the delivery loop
//!
//! The gateway records every connect, write and close it sees, and plays
//! back queued outcomes:
//! - connect failures, consumed one per connect attempt
//! - write failures, consumed one per write attempt, or pinned to a message
//! - replies, consumed one per error check (silent once the queue is empty)
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_gateway::{MockGateway, Reply};
//!
//! let gateway = MockGateway::new()
//!     .with_write_failures(2)
//!     .with_reply(Reply::Reject(Status::InvalidToken, 1));
//! ```
#![allow(dead_code)] // Test utility module - not all methods used in every test

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use pushwire_delivery::{
    ConnectionError, ConnectionResult, Connector, ErrorResponse, Status, Transport,
};
use pushwire_proto::Frame;

/// Something the gateway observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    /// A frame for this message id was accepted.
    Write(u32),
    /// A write was refused.
    WriteFailed,
    Close,
}

/// What the gateway does when the client checks for an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to read within the poll window.
    Silent,
    /// Send an error response for the given message id.
    Reject(Status, u32),
    /// Close the stream without sending anything.
    HangUp,
    /// Fail the poll with an I/O error.
    ReadFails,
}

#[derive(Debug, Default)]
struct Script {
    connect_failures: usize,
    write_failures: usize,
    always_fail_writes: bool,
    failing_messages: Vec<u32>,
    replies: VecDeque<Reply>,
    events: Vec<Event>,
}

/// A [`Connector`] whose connections share one script.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    script: Arc<Mutex<Script>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connection attempts.
    pub fn with_connect_failures(self, count: usize) -> Self {
        self.script.lock().unwrap().connect_failures = count;
        self
    }

    /// Fail the next `count` writes.
    pub fn with_write_failures(self, count: usize) -> Self {
        self.script.lock().unwrap().write_failures = count;
        self
    }

    pub fn failing_every_write(self) -> Self {
        self.script.lock().unwrap().always_fail_writes = true;
        self
    }

    /// Fail every write of the given message.
    pub fn failing_message(self, message_id: u32) -> Self {
        self.script.lock().unwrap().failing_messages.push(message_id);
        self
    }

    /// Queue the reply for the next error check.
    pub fn with_reply(self, reply: Reply) -> Self {
        self.script.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.script.lock().unwrap().events.clone()
    }

    /// Message ids of every accepted frame, in order.
    pub fn written(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Write(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Event::Connect)
            .count()
    }
}

#[async_trait]
impl Connector for MockGateway {
    type Transport = MockConnection;

    async fn connect(&self) -> ConnectionResult<Self::Transport> {
        let mut script = self.script.lock().unwrap();
        if script.connect_failures > 0 {
            script.connect_failures -= 1;
            return Err(ConnectionError::Connect {
                address: "mock:2195".to_string(),
                reason: "connection refused".to_string(),
            });
        }

        script.events.push(Event::Connect);
        Ok(MockConnection {
            script: Arc::clone(&self.script),
            closed: false,
        })
    }

    fn poll_timeout(&self) -> Duration {
        Duration::from_millis(10)
    }
}

#[derive(Debug)]
pub struct MockConnection {
    script: Arc<Mutex<Script>>,
    closed: bool,
}

#[async_trait]
impl Transport for MockConnection {
    async fn write(&mut self, bytes: &[u8]) -> ConnectionResult<()> {
        let frame = Frame::decode(bytes).expect("client wrote a malformed frame");

        let mut script = self.script.lock().unwrap();
        if script.always_fail_writes
            || script.write_failures > 0
            || script.failing_messages.contains(&frame.message_id)
        {
            script.write_failures = script.write_failures.saturating_sub(1);
            script.events.push(Event::WriteFailed);
            return Err(ConnectionError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }

        script.events.push(Event::Write(frame.message_id));
        Ok(())
    }

    async fn poll_readable(&mut self, _timeout: Duration) -> ConnectionResult<bool> {
        let mut script = self.script.lock().unwrap();
        match script.replies.front() {
            None => Ok(false),
            Some(Reply::Silent) => {
                script.replies.pop_front();
                Ok(false)
            }
            Some(Reply::ReadFails) => {
                script.replies.pop_front();
                Err(ConnectionError::Read(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )))
            }
            Some(Reply::Reject(..) | Reply::HangUp) => Ok(true),
        }
    }

    async fn read(&mut self, len: usize) -> ConnectionResult<Option<Vec<u8>>> {
        assert_eq!(len, ErrorResponse::LENGTH);

        let mut script = self.script.lock().unwrap();
        match script.replies.pop_front() {
            Some(Reply::Reject(status, message_id)) => {
                Ok(Some(ErrorResponse::new(status, message_id).encode().to_vec()))
            }
            _ => Ok(None),
        }
    }

    async fn close(&mut self) -> ConnectionResult<()> {
        if !self.closed {
            self.closed = true;
            self.script.lock().unwrap().events.push(Event::Close);
        }
        Ok(())
    }
}
