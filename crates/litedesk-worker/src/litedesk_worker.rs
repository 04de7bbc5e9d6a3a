//! Single-slot background worker
//!
//! One worker per owner: submitting a task signals the in-flight one to
//! stop, queues the new one, and lazily starts the thread. Cancellation
//! is cooperative; tasks poll their `CancelToken` between units of work
//! (a cursor chunk, an inserted row) and bail out early. Results land
//! in a mailbox the owner drains on its own thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

/// Cooperative cancellation token handed to every task.
#[derive(Clone, Default)]
pub struct CancelToken {
    stop: Arc<AtomicBool>,
    drop_results: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the task should finish early. Partial results obtained so
    /// far are still delivered unless `results_dropped`.
    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Whether results of the current task should be discarded.
    pub fn results_dropped(&self) -> bool {
        self.drop_results.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Release);
    }

    fn drop_results(&self) {
        self.drop_results.store(true, Ordering::Release);
    }
}

/// A unit of background work.
pub type Task<R> = Box<dyn FnOnce(&CancelToken) -> R + Send + 'static>;

struct Slot<R> {
    queue: VecDeque<(Task<R>, CancelToken)>,
    shutdown: bool,
}

struct Shared<R> {
    slot: Mutex<Slot<R>>,
    wakeup: Condvar,
}

/// Single-slot background worker delivering results to a mailbox.
pub struct Worker<R: Send + 'static> {
    shared: Arc<Shared<R>>,
    results: Receiver<R>,
    sender: Sender<R>,
    /// Token of the most recently submitted task.
    current: Mutex<CancelToken>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Send + 'static> Worker<R> {
    pub fn new() -> Self {
        let (sender, results) = channel();
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    queue: VecDeque::new(),
                    shutdown: false,
                }),
                wakeup: Condvar::new(),
            }),
            results,
            sender,
            current: Mutex::new(CancelToken::new()),
            thread: Mutex::new(None),
        }
    }

    /// Register new work. Any in-flight task is signalled to stop; the
    /// worker thread starts on first use.
    pub fn submit(&self, task: impl FnOnce(&CancelToken) -> R + Send + 'static) {
        let token = CancelToken::new();
        {
            let mut current = self.current.lock();
            current.cancel();
            *current = token.clone();
        }
        {
            let mut slot = self.shared.slot.lock();
            // Single slot: anything still queued is superseded.
            slot.queue.clear();
            slot.queue.push_back((Box::new(task), token));
        }
        self.shared.wakeup.notify_one();
        self.ensure_thread();
    }

    /// Signal the current task to finish early. Results it obtained are
    /// delivered unless `drop_results`.
    pub fn stop_work(&self, drop_results: bool) {
        let current = self.current.lock();
        current.cancel();
        if drop_results {
            current.drop_results();
        }
    }

    /// Stop the worker thread and drop all future results.
    pub fn stop(&self) {
        {
            let current = self.current.lock();
            current.cancel();
            current.drop_results();
        }
        {
            let mut slot = self.shared.slot.lock();
            slot.shutdown = true;
            slot.queue.clear();
        }
        self.shared.wakeup.notify_one();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// The mailbox the owner drains for finished-task results.
    pub fn results(&self) -> &Receiver<R> {
        &self.results
    }

    fn ensure_thread(&self) {
        let mut thread = self.thread.lock();
        if thread.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let sender = self.sender.clone();
        *thread = Some(std::thread::spawn(move || {
            loop {
                let work = {
                    let mut slot = shared.slot.lock();
                    loop {
                        if slot.shutdown {
                            return;
                        }
                        if let Some(work) = slot.queue.pop_front() {
                            break work;
                        }
                        shared.wakeup.wait(&mut slot);
                    }
                };
                let (task, token) = work;
                tracing::debug!("worker picked up a task");
                let result = task(&token);
                if !token.results_dropped() {
                    // The owner may be gone; a dead mailbox ends the thread.
                    if sender.send(result).is_err() {
                        return;
                    }
                }
            }
        }));
    }
}

impl<R: Send + 'static> Default for Worker<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Send + 'static> Drop for Worker<R> {
    fn drop(&mut self) {
        let current = self.current.lock();
        current.cancel();
        current.drop_results();
        drop(current);
        let mut slot = self.shared.slot.lock();
        slot.shutdown = true;
        slot.queue.clear();
        drop(slot);
        self.shared.wakeup.notify_one();
        // The thread exits on its own; joining here could block the UI.
    }
}
