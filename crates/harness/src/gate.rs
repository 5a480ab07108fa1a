use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};

struct Parked {
    procedure: &'static str,
    release: oneshot::Sender<()>,
}

#[derive(Default)]
struct GateState {
    holding: bool,
    parked: VecDeque<Parked>,
}

/// Holds transport responses until a test lets them through, so requests
/// can be made to complete in any order.
///
/// The server side of a call has already run by the time its response is
/// parked: writes land in dispatch order, only their completions reorder.
#[derive(Default)]
pub struct ResponseGate {
    state: Mutex<GateState>,
    changed: Notify,
}

impl ResponseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start parking every response.
    pub fn hold(&self) {
        self.state.lock().holding = true;
    }

    /// Stop parking and release everything currently held.
    pub fn open(&self) {
        let parked: Vec<Parked> = {
            let mut state = self.state.lock();
            state.holding = false;
            state.parked.drain(..).collect()
        };
        for p in parked {
            let _ = p.release.send(());
        }
        self.changed.notify_waiters();
    }

    /// Release the response parked `index`-th in arrival order among those
    /// still held. Returns its procedure name.
    pub fn release(&self, index: usize) -> Option<&'static str> {
        let parked = self.state.lock().parked.remove(index)?;
        let _ = parked.release.send(());
        self.changed.notify_waiters();
        Some(parked.procedure)
    }

    pub fn release_first(&self) -> Option<&'static str> {
        self.release(0)
    }

    pub fn release_last(&self) -> Option<&'static str> {
        let len = self.parked_len();
        len.checked_sub(1).and_then(|last| self.release(last))
    }

    pub fn parked(&self) -> Vec<&'static str> {
        self.state.lock().parked.iter().map(|p| p.procedure).collect()
    }

    pub fn parked_len(&self) -> usize {
        self.state.lock().parked.len()
    }

    /// Wait until at least `count` responses are parked.
    pub async fn wait_for_parked(&self, count: usize) {
        loop {
            let notified = self.changed.notified();
            if self.parked_len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Called by the transport once the server has answered.
    pub(crate) async fn pass(&self, procedure: &'static str) {
        let receiver = {
            let mut state = self.state.lock();
            if !state.holding {
                return;
            }
            let (release, receiver) = oneshot::channel();
            state.parked.push_back(Parked { procedure, release });
            receiver
        };
        self.changed.notify_waiters();
        // A dropped gate releases everything.
        let _ = receiver.await;
    }
}

impl std::fmt::Debug for ResponseGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResponseGate")
            .field("holding", &state.holding)
            .field("parked", &state.parked.len())
            .finish()
    }
}
