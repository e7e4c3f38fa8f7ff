//! Work queue (C3): hands accepted sessions off to parse/persist workers -- spec §4.2.
//!
//! The spec's own Design Notes license substituting the hand-rolled mutex+condvar FIFO
//! for a bounded channel "without changing observable semantics", so this crate uses
//! `tokio::sync::mpsc` instead of reimplementing a condition-variable queue: the sender
//! half is cloned into every session handler (producer), and the dispatcher owns the
//! receiver, tracking one worker task per item in a `JoinSet` so the whole queue can be
//! drained -- not just detached and abandoned -- once every session has stopped
//! enqueueing.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;

use crate::session::Session;
use crate::store::Store;

/// Default channel capacity. Backpressure here only slows session handlers from
/// enqueueing a new request -- it never drops work.
const QUEUE_CAPACITY: usize = 256;

pub struct WorkQueue {
    sender: mpsc::Sender<Arc<Session>>,
}

impl WorkQueue {
    /// Builds the queue and spawns its dispatcher loop against `store`, returning the
    /// queue handle plus a `JoinHandle` that resolves once the dispatcher has drained:
    /// every `Sender` (one per live session handler, plus the one the caller is handed
    /// back) has been dropped, `recv()` has returned `None`, and every worker the
    /// dispatcher spawned has finished. A shutdown path should drop its own copy of
    /// `WorkQueue` and await this handle before the process exits, rather than letting
    /// outstanding work get silently aborted with the runtime.
    pub fn start(store: Arc<Store>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Arc<Session>>(QUEUE_CAPACITY);

        let dispatcher = tokio::spawn(async move {
            let mut workers = JoinSet::new();

            while let Some(session) = receiver.recv().await {
                let store = store.clone();
                workers.spawn(async move {
                    let input = session.take_input().await;
                    // Mapper work touches the blocking SQLite connection (spec §4.5); running
                    // it on a blocking task keeps a slow disk from stalling the reactor that
                    // drives every other session's socket I/O.
                    let result = tokio::task::spawn_blocking(move || {
                        crate::mapper::process(&input, &store)
                    })
                    .await
                    .unwrap_or_else(|e| Ok(format!("Error : worker task panicked: {e}")));
                    let result = match result {
                        Ok(result) => result,
                        Err(e) => format!("Error : {e}"),
                    };
                    session.set_result(result).await;
                });
            }

            tracing::info!("work queue drained, waiting for in-flight workers");
            while let Some(res) = workers.join_next().await {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "queue worker panicked");
                }
            }
        });

        (Self { sender }, dispatcher)
    }

    /// Enqueues a session for processing (spec §4.1's `ENQUEUE` state).
    pub async fn enqueue(&self, session: Arc<Session>) {
        // The session handler already owns a strong reference; a send failure would
        // only happen if the dispatcher task itself panicked, which is unrecoverable.
        let _ = self.sender.send(session).await;
    }
}

impl Clone for WorkQueue {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueued_session_gets_processed_and_result_set() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (queue, _dispatcher) = WorkQueue::start(store);

        let session = Arc::new(Session::new(1));
        let insert = r#"<root><operation type="insert"/><person><uuid>u1</uuid><name>a</name></person></root>"#;
        session.set_input(insert.to_string()).await;

        queue.enqueue(session.clone()).await;
        let result = session.wait_result().await;
        assert_eq!(result, "done :) \n");
    }
}
