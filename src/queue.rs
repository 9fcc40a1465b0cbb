//! Single-consumer work queue with pause, throttle and cancellation.
//!
//! One worker thread drains an unbounded channel in FIFO order and runs the
//! handler for one item at a time. A gate decides whether a dequeued item is
//! executed or dropped; the very first item ever dequeued always executes.
//!
//! ```text
//! NotStarted --launch--> Idle <--> Processing
//!                          |
//!                      shutdown --> Cancelling --> Terminated
//! ```
//!
//! Pausing only holds back the Idle -> Processing step; accepted items keep
//! accumulating meanwhile.

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    NotStarted,
    Idle,
    Processing,
    Cancelling,
    Terminated,
}

type Handler<T> = Box<dyn FnMut(T) + Send>;
type Gate = Box<dyn Fn() -> bool + Send + Sync>;

struct Shared<T> {
    state: Mutex<ExecutorState>,
    paused: Mutex<bool>,
    resumed: Condvar,
    cancelled: AtomicBool,
    first_item_taken: AtomicBool,
    // item dequeued by the worker but not run because of cancellation
    in_flight: Mutex<Option<T>>,
    gate: Gate,
    throttle: Duration,
}

impl<T> Shared<T> {
    fn set_state(&self, state: ExecutorState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Block while paused. False if cancelled while waiting.
    fn wait_until_resumed(&self) -> bool {
        let Ok(paused) = self.paused.lock() else {
            return false;
        };
        let _guard = self
            .resumed
            .wait_while(paused, |paused| *paused && !self.is_cancelled());
        !self.is_cancelled()
    }

    /// Run `item` if the gate allows it, or if it is the first item ever.
    fn run_gated(&self, handler: &mut Handler<T>, item: T) {
        let first = !self.first_item_taken.swap(true, Ordering::SeqCst);
        if first || (self.gate)() {
            handler(item);
        } else {
            trace!("gate closed, dropping queued item");
        }
    }
}

enum Event<T> {
    Item(T),
    Wake,
    Closed,
}

pub struct QueueExecutor<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    sender: Sender<T>,
    receiver: Receiver<T>,
    wake: Sender<()>,
    wake_rx: Receiver<()>,
    worker: Mutex<Option<JoinHandle<Handler<T>>>>,
}

impl<T: Send + 'static> QueueExecutor<T> {
    /// `gate` is consulted for every dequeued item after the first.
    pub fn new(throttle: Duration, gate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        let (sender, receiver) = unbounded();
        let (wake, wake_rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ExecutorState::NotStarted),
                paused: Mutex::new(false),
                resumed: Condvar::new(),
                cancelled: AtomicBool::new(false),
                first_item_taken: AtomicBool::new(false),
                in_flight: Mutex::new(None),
                gate: Box::new(gate),
                throttle,
            }),
            sender,
            receiver,
            wake,
            wake_rx,
            worker: Mutex::new(None),
        }
    }

    /// Start consuming with `handler`. Items accepted earlier are processed
    /// first. Returns false if already launched or shut down.
    pub fn launch(&self, handler: impl FnMut(T) + Send + 'static) -> bool {
        let Ok(mut worker) = self.worker.lock() else {
            return false;
        };
        if worker.is_some() || self.shared.is_cancelled() {
            return false;
        }

        let shared = Arc::clone(&self.shared);
        let receiver = self.receiver.clone();
        let wake_rx = self.wake_rx.clone();
        let mut handler: Handler<T> = Box::new(handler);

        shared.set_state(ExecutorState::Idle);
        let spawned = std::thread::Builder::new()
            .name("mfsync-queue".to_string())
            .spawn(move || {
                Self::consume(&shared, &receiver, &wake_rx, &mut handler);
                handler
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                true
            }
            Err(e) => {
                warn!(error = %e, "cannot spawn queue worker");
                self.shared.set_state(ExecutorState::NotStarted);
                false
            }
        }
    }

    fn consume(
        shared: &Shared<T>,
        receiver: &Receiver<T>,
        wake_rx: &Receiver<()>,
        handler: &mut Handler<T>,
    ) {
        while !shared.is_cancelled() {
            let event = select! {
                recv(receiver) -> item => item.map(Event::Item).unwrap_or(Event::Closed),
                recv(wake_rx) -> signal => if signal.is_ok() { Event::Wake } else { Event::Closed },
            };

            let item = match event {
                Event::Item(item) => item,
                Event::Wake => continue,
                Event::Closed => break,
            };

            if !shared.wait_until_resumed() || shared.is_cancelled() {
                if let Ok(mut in_flight) = shared.in_flight.lock() {
                    *in_flight = Some(item);
                }
                break;
            }

            shared.set_state(ExecutorState::Processing);
            shared.run_gated(handler, item);
            shared.set_state(ExecutorState::Idle);

            if !shared.throttle.is_zero() {
                // Shutdown interrupts the delay through the wake channel.
                let _ = wake_rx.recv_timeout(shared.throttle);
            }
        }
        debug!("queue worker stopped");
    }

    /// Enqueue `input`. False once the executor is shutting down.
    pub fn accept(&self, input: T) -> bool {
        if self.shared.is_cancelled() {
            return false;
        }
        self.sender.send(input).is_ok()
    }

    pub fn pause(&self) {
        if let Ok(mut paused) = self.shared.paused.lock() {
            *paused = true;
        }
    }

    pub fn resume(&self) {
        if let Ok(mut paused) = self.shared.paused.lock() {
            *paused = false;
            self.shared.resumed.notify_all();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.lock().map(|p| *p).unwrap_or(false)
    }

    pub fn state(&self) -> ExecutorState {
        self.shared
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(ExecutorState::Terminated)
    }

    /// Items waiting in the channel.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Stop the worker, then run at most one leftover item under the gate.
    pub fn shutdown(&self) {
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.set_state(ExecutorState::Cancelling);
        let _ = self.wake.send(());
        if let Ok(_paused) = self.shared.paused.lock() {
            self.shared.resumed.notify_all();
        }

        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = worker {
            match handle.join() {
                Ok(mut handler) => {
                    let leftover = self
                        .shared
                        .in_flight
                        .lock()
                        .ok()
                        .and_then(|mut f| f.take())
                        .or_else(|| self.receiver.try_recv().ok());
                    if let Some(item) = leftover {
                        debug!("flushing one queued item on shutdown");
                        self.shared.run_gated(&mut handler, item);
                    }
                }
                Err(_) => warn!("queue worker panicked"),
            }
        }
        self.shared.set_state(ExecutorState::Terminated);
    }
}

impl<T: Send + 'static> Drop for QueueExecutor<T> {
    fn drop(&mut self) {
        // Let a still-running worker exit on its own; no flush.
        self.shared.cancelled.store(true, Ordering::SeqCst);
        let _ = self.wake.send(());
        if let Ok(_paused) = self.shared.paused.lock() {
            self.shared.resumed.notify_all();
        }
    }
}
