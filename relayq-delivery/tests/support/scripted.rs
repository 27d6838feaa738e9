//! In-process transport double with scripted outcomes.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use relayq_common::Signal;
use relayq_delivery::{Session, Transport, TransportError};
use tokio::sync::broadcast;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Calls {
    pub connects: usize,
    /// Recipients, in the order `send` was called.
    pub sends: Vec<String>,
    pub resets: usize,
    pub closes: usize,
}

#[derive(Default)]
struct Script {
    connects: VecDeque<TransportError>,
    refuse_every_login: bool,
    sends: VecDeque<Result<String, TransportError>>,
    resets: VecDeque<TransportError>,
    send_delay: Option<Duration>,
    signal_after_send: Option<broadcast::Sender<Signal>>,
    calls: Calls,
}

/// Sends succeed with `250 OK` unless scripted otherwise; scripted
/// outcomes are consumed in order.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connect_fails(self, error: TransportError) -> Self {
        self.script.lock().unwrap().connects.push_back(error);
        self
    }

    #[must_use]
    pub fn refuse_every_login(self) -> Self {
        self.script.lock().unwrap().refuse_every_login = true;
        self
    }

    #[must_use]
    pub fn send_ok(self, reply: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .sends
            .push_back(Ok(reply.to_string()));
        self
    }

    #[must_use]
    pub fn send_fails(self, error: TransportError) -> Self {
        self.script.lock().unwrap().sends.push_back(Err(error));
        self
    }

    #[must_use]
    pub fn reset_fails(self, error: TransportError) -> Self {
        self.script.lock().unwrap().resets.push_back(error);
        self
    }

    /// Each send takes this long (in tokio time).
    #[must_use]
    pub fn send_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().send_delay = Some(delay);
        self
    }

    /// Broadcast a shutdown after the first send completes.
    #[must_use]
    pub fn signal_after_send(self, sender: broadcast::Sender<Signal>) -> Self {
        self.script.lock().unwrap().signal_after_send = Some(sender);
        self
    }

    #[must_use]
    pub fn calls(&self) -> Calls {
        self.script.lock().unwrap().calls.clone()
    }

    #[must_use]
    pub fn into_transport(self) -> Arc<dyn Transport> {
        Arc::new(self)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self) -> Result<Box<dyn Session>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.calls.connects += 1;

        if script.refuse_every_login {
            return Err(TransportError::Authentication(
                "535 5.7.8 Authentication credentials invalid".to_string(),
            ));
        }
        if let Some(error) = script.connects.pop_front() {
            return Err(error);
        }

        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedSession {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn send(&mut self, _mail: &[u8], _from: &str, to: &str) -> Result<String, TransportError> {
        let delay = {
            let mut script = self.script.lock().unwrap();
            script.calls.sends.push(to.to_string());
            script.send_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        if let Some(sender) = script.signal_after_send.take() {
            let _ = sender.send(Signal::Shutdown);
        }
        script
            .sends
            .pop_front()
            .unwrap_or_else(|| Ok("250 OK".to_string()))
    }

    async fn reset(&mut self) -> Result<(), TransportError> {
        let mut script = self.script.lock().unwrap();
        script.calls.resets += 1;
        script.resets.pop_front().map_or(Ok(()), Err)
    }

    async fn close(self: Box<Self>) {
        self.script.lock().unwrap().calls.closes += 1;
    }
}
