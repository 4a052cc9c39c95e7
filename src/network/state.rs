//! Connection state and change notification
//!
//! State transitions are compare-and-set so that racing paths (a transport
//! error seen by the reader thread while the application disconnects) only
//! produce one event. Events are queued to a notifier thread which runs the
//! listeners and feeds subscribers in transition order, so a slow listener
//! never stalls the connection's reader.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::Result;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEvent {
    pub state: ConnectionState,

    /// Why the connection dropped; `None` for requested transitions
    pub reason: Option<String>,
}

/// Callback invoked on the notifier thread for every transition
pub type StateListener = Box<dyn Fn(&StateEvent) + Send + 'static>;

enum Message {
    Event(StateEvent),
    AddListener(StateListener),
    Subscribe(Sender<StateEvent>),
    Shutdown,
}

/// Owns the current state and the notifier thread
pub struct StateNotifier {
    state: Mutex<ConnectionState>,
    tx: Sender<Message>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl StateNotifier {
    pub fn new() -> Result<Self> {
        let (tx, rx) = unbounded();
        let dispatcher = thread::Builder::new()
            .name("cachewire-notifier".to_string())
            .spawn(move || dispatch(rx))?;

        Ok(Self {
            state: Mutex::new(ConnectionState::Disconnected),
            tx,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn add_listener(&self, listener: StateListener) {
        let _ = self.tx.send(Message::AddListener(listener));
    }

    /// Receive every transition made after this call
    pub fn subscribe(&self) -> Receiver<StateEvent> {
        let (tx, rx) = unbounded();
        let _ = self.tx.send(Message::Subscribe(tx));
        rx
    }

    /// Move to `to` if the current state is one of `from`
    ///
    /// Returns `false` (and emits nothing) when the current state is not in
    /// `from`.
    pub fn transition(
        &self,
        from: &[ConnectionState],
        to: ConnectionState,
        reason: Option<String>,
    ) -> bool {
        let mut state = self.state.lock();
        if !from.contains(&*state) {
            return false;
        }

        let previous = *state;
        match &reason {
            Some(reason) => {
                tracing::info!(from = %previous, to = %to, reason = %reason, "connection state changed")
            }
            None => tracing::info!(from = %previous, to = %to, "connection state changed"),
        }
        *state = to;

        // Queued under the state lock so events keep transition order
        let _ = self.tx.send(Message::Event(StateEvent { state: to, reason }));
        true
    }
}

impl Drop for StateNotifier {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(handle) = self.dispatcher.lock().take() {
            // A listener may hold the last reference to the client
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn dispatch(rx: Receiver<Message>) {
    let mut listeners: Vec<StateListener> = Vec::new();
    let mut subscribers: Vec<Sender<StateEvent>> = Vec::new();

    for message in rx.iter() {
        match message {
            Message::AddListener(listener) => listeners.push(listener),
            Message::Subscribe(subscriber) => subscribers.push(subscriber),
            Message::Event(event) => {
                for listener in &listeners {
                    if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                        tracing::error!(state = %event.state, "state listener panicked");
                    }
                }
                subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
            }
            Message::Shutdown => break,
        }
    }
}
