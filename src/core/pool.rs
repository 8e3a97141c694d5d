//! Bounded pool of concurrent chain executors.
//!
//! Workers are tokio tasks pulling chains from a shared FIFO queue; each runs
//! one chain to completion before pulling the next. Every event of every
//! chain goes through one unbounded channel, followed by a `Drained` marker
//! whenever all submitted work has reached a terminal state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::domain::{ExecutionEvent, RunSettings};
use crate::tools::ToolRegistry;

use super::chain::ToolChain;
use super::conflict::UniqueNames;
use super::executor::{EventSink, StepExecutor};

/// Everything the pool reports to its consumer
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// An event from one of the chains
    Execution(ExecutionEvent),

    /// All chains submitted so far reached a terminal event and the pool is idle
    Drained,
}

impl EventSink for mpsc::UnboundedSender<PoolEvent> {
    fn emit(&self, event: ExecutionEvent) {
        let _ = self.send(PoolEvent::Execution(event));
    }
}

struct PoolState {
    settings: Arc<RunSettings>,
    names: Arc<UniqueNames>,
    concurrency: usize,
    queue: VecDeque<ToolChain>,
    /// Worker tasks alive
    workers: usize,
    /// Chains currently executing
    in_flight: usize,
    /// Chains submitted and not yet terminal (queued + in flight)
    outstanding: usize,
    /// Parent of every in-flight chain's token
    cancel: CancellationToken,
}

struct Shared {
    registry: Arc<ToolRegistry>,
    events: mpsc::UnboundedSender<PoolEvent>,
    sink: Arc<dyn EventSink>,
    state: Mutex<PoolState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drained(&self) {
        debug!("Pool drained");
        let _ = self.events.send(PoolEvent::Drained);
    }
}

/// Pool of chain executors
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a pool and the receiving end of its event stream
    pub fn new(
        registry: Arc<ToolRegistry>,
        settings: RunSettings,
    ) -> (Self, mpsc::UnboundedReceiver<PoolEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let sink: Arc<dyn EventSink> = Arc::new(events.clone());

        let state = PoolState {
            concurrency: settings.concurrency(),
            settings: Arc::new(settings),
            names: Arc::new(UniqueNames::new()),
            queue: VecDeque::new(),
            workers: 0,
            in_flight: 0,
            outstanding: 0,
            cancel: CancellationToken::new(),
        };

        let pool = Self {
            shared: Arc::new(Shared {
                registry,
                events,
                sink,
                state: Mutex::new(state),
            }),
        };

        (pool, receiver)
    }

    /// Apply new run settings to chains started from now on.
    ///
    /// Starts a new run: the unique-name ledger is reset.
    pub fn configure(&self, settings: RunSettings) {
        let mut state = self.shared.state();
        state.concurrency = settings.concurrency();
        state.settings = Arc::new(settings);
        state.names = Arc::new(UniqueNames::new());
        info!(concurrency = state.concurrency, "Pool configured");
    }

    /// Maximum number of chains running at once
    pub fn concurrency(&self) -> usize {
        self.shared.state().concurrency
    }

    /// Settings chains started from now on will run with
    pub fn settings(&self) -> Arc<RunSettings> {
        self.shared.state().settings.clone()
    }

    /// Enqueue chains; workers start right away.
    ///
    /// Must be called from within a tokio runtime. Returns the number of
    /// chains queued.
    pub fn submit<I>(&self, chains: I) -> usize
    where
        I: IntoIterator<Item = ToolChain>,
    {
        let mut state = self.shared.state();
        let before = state.queue.len();
        state.queue.extend(chains);
        let added = state.queue.len() - before;
        state.outstanding += added;

        if state.outstanding == 0 {
            self.shared.drained();
            return 0;
        }

        let idle_slots = state.concurrency.saturating_sub(state.workers);
        let spawn = idle_slots.min(state.queue.len());
        for _ in 0..spawn {
            state.workers += 1;
            tokio::spawn(worker(self.shared.clone()));
        }

        info!(
            added,
            queued = state.queue.len(),
            workers = state.workers,
            "Chains submitted"
        );

        added
    }

    /// Cancel every in-flight chain and drop the pending queue.
    ///
    /// In-flight chains stop at their next checkpoint and still emit their
    /// terminal event. Returns the chains that were never started.
    pub fn cancel_all(&self) -> Vec<ToolChain> {
        let mut state = self.shared.state();

        let dropped: Vec<ToolChain> = state.queue.drain(..).collect();
        state.outstanding -= dropped.len();

        state.cancel.cancel();
        state.cancel = CancellationToken::new();

        info!(
            dropped = dropped.len(),
            in_flight = state.in_flight,
            "Cancelling all chains"
        );

        if !dropped.is_empty() && state.outstanding == 0 {
            self.shared.drained();
        }

        dropped
    }

    /// Chains waiting for a worker
    pub fn pending(&self) -> usize {
        self.shared.state().queue.len()
    }

    /// Chains currently executing
    pub fn in_flight(&self) -> usize {
        self.shared.state().in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.shared.state().outstanding == 0
    }
}

#[instrument(name = "pool_worker", skip_all)]
async fn worker(shared: Arc<Shared>) {
    loop {
        let (chain, executor, token) = {
            let mut state = shared.state();
            let Some(chain) = state.queue.pop_front() else {
                state.workers -= 1;
                return;
            };

            state.in_flight += 1;
            let executor = StepExecutor::new(
                shared.registry.clone(),
                state.settings.clone(),
                shared.sink.clone(),
            )
            .with_unique_names(state.names.clone());

            (chain, executor, state.cancel.child_token())
        };

        executor.run(chain, token).await;

        let mut state = shared.state();
        state.in_flight -= 1;
        state.outstanding -= 1;
        if state.outstanding == 0 {
            shared.drained();
        }
    }
}
