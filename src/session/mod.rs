//! Per-connection session state (C1, spec §3/§4.1).
//!
//! A `Session` is created once per accepted connection and reused across every
//! request/response iteration on that connection via `reset()`. The handler task and
//! the worker task that eventually processes the request never touch the payload
//! fields directly -- everything goes through the mutex, and completion is signaled
//! through `notify` rather than a boolean alone, so the handler can block without
//! busy-waiting.

use tokio::sync::{Mutex, Notify};

/// Monotonically increasing connection id, assigned by the server on accept.
pub type SessionId = u64;

struct SessionState {
    input: String,
    result: String,
    data_ready: bool,
    result_ready: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            input: String::new(),
            result: String::new(),
            data_ready: false,
            result_ready: false,
        }
    }
}

pub struct Session {
    pub id: SessionId,
    state: Mutex<SessionState>,
    notify: Notify,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::new()),
            notify: Notify::new(),
        }
    }

    /// Stores the request payload read off the socket and marks it ready for a worker.
    pub async fn set_input(&self, input: String) {
        let mut state = self.state.lock().await;
        state.input = input;
        state.data_ready = true;
    }

    /// Takes the (already-ready) request payload for processing.
    pub async fn take_input(&self) -> String {
        let mut state = self.state.lock().await;
        state.data_ready = false;
        std::mem::take(&mut state.input)
    }

    /// Stores the response payload and wakes the session handler waiting on it.
    pub async fn set_result(&self, result: String) {
        let mut state = self.state.lock().await;
        state.result = result;
        state.result_ready = true;
        drop(state);
        self.notify.notify_one();
    }

    /// Blocks until a worker has set a result, then returns it.
    ///
    /// `Notify::notified()` only wakes tasks that are already parked when `notify_one`
    /// fires, so a bare `self.notify.notified().await` could miss a result that became
    /// ready in the gap between checking the flag and starting to wait. Looping on the
    /// flag under the lock (spec §9's `reset()` open question) closes that gap: if the
    /// result already landed we return immediately without ever parking.
    pub async fn wait_result(&self) -> String {
        loop {
            {
                let mut state = self.state.lock().await;
                if state.result_ready {
                    state.result_ready = false;
                    return std::mem::take(&mut state.result);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Clears payloads and flags for the next iteration on the same connection. The
    /// `Notify` itself carries no leftover "permit" across a `reset()` because
    /// `wait_result` always drains `result_ready` under the lock before returning.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.input.clear();
        state.result.clear();
        state.data_ready = false;
        state.result_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn result_round_trips_through_session() {
        let session = Arc::new(Session::new(1));
        session.set_input("payload".to_string()).await;

        let worker_session = session.clone();
        let handle = tokio::spawn(async move {
            let input = worker_session.take_input().await;
            worker_session.set_result(format!("echo:{input}")).await;
        });

        let result = session.wait_result().await;
        handle.await.unwrap();

        assert_eq!(result, "echo:payload");
    }

    #[tokio::test]
    async fn reset_clears_state_for_reuse() {
        let session = Session::new(1);
        session.set_input("first".to_string()).await;
        session.set_result("done".to_string()).await;
        let _ = session.wait_result().await;

        session.reset().await;
        session.set_input("second".to_string()).await;
        assert_eq!(session.take_input().await, "second");
    }

    #[tokio::test]
    async fn set_result_before_wait_is_not_missed() {
        let session = Arc::new(Session::new(1));
        session.set_result("ready".to_string()).await;
        let result = session.wait_result().await;
        assert_eq!(result, "ready");
    }
}
