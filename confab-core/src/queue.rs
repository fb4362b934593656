//! Output queue and adaptive flush loop.
//!
//! Producers (the router, I/O callbacks) push [`OutputItem`]s into an
//! unbounded FIFO. One flush worker per console drains it on a timer and
//! hands bounded slices to an [`OutputSink`]. The worker owns all drain
//! state: the carried-over remainder, a held-back clear, and the adaptive
//! sleep interval.

use crate::item::OutputItem;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// The presentation side of the relay.
pub trait OutputSink: Send {
    /// Lines the render surface can take in one cycle. `None` is unbounded.
    fn max_lines(&self) -> Option<usize>;

    /// Called once per emitted piece, in order.
    fn receive(&mut self, item: OutputItem);
}

// ════════════════════════════════════════════════════════════════════
// Producer side
// ════════════════════════════════════════════════════════════════════

/// Cloneable producer handle.
#[derive(Debug, Clone)]
pub struct OutputQueue {
    tx: mpsc::UnboundedSender<OutputItem>,
}

impl OutputQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutputItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue an item. Returns false once the flush worker is gone.
    pub fn push(&self, item: OutputItem) -> bool {
        match self.tx.send(item) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("output queue closed; item dropped");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ════════════════════════════════════════════════════════════════════
// Stop signal
// ════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct StopSignal {
    flag: AtomicBool,
    wake: Notify,
}

/// Cooperative stop for a flush worker. Checked between cycles only.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<StopSignal>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.flag.store(true, Ordering::SeqCst);
        // Stores a permit if the worker is not parked yet.
        self.0.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.flag.load(Ordering::SeqCst)
    }
}

// ════════════════════════════════════════════════════════════════════
// Flush loop
// ════════════════════════════════════════════════════════════════════

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub lines: usize,
    pub pieces: usize,
    pub emit_time: Duration,
}

pub struct FlushLoop<S> {
    queue: mpsc::UnboundedReceiver<OutputItem>,
    sink: S,
    /// Remainder of a partly emitted item, or the queue head pulled in
    /// while the worker was parked. Always drained before the queue.
    carry_over: Option<OutputItem>,
    /// A `ClearOutput { wait: true }` waiting for real content.
    pending_clear: Option<OutputItem>,
    default_interval: Duration,
    sleep_interval: Duration,
    stop: StopHandle,
}

impl<S> std::fmt::Debug for FlushLoop<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushLoop")
            .field("carry_over", &self.carry_over)
            .field("pending_clear", &self.pending_clear)
            .field("sleep_interval", &self.sleep_interval)
            .finish()
    }
}

impl<S: OutputSink> FlushLoop<S> {
    pub fn new(
        queue: mpsc::UnboundedReceiver<OutputItem>,
        sink: S,
        default_interval: Duration,
    ) -> Self {
        Self {
            queue,
            sink,
            carry_over: None,
            pending_clear: None,
            default_interval,
            sleep_interval: default_interval,
            stop: StopHandle::default(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sleep_interval(&self) -> Duration {
        self.sleep_interval
    }

    /// True while a partial item or a held-back clear is waiting.
    pub fn has_pending(&self) -> bool {
        self.carry_over.is_some() || self.pending_clear.is_some()
    }

    /// Run one drain cycle without sleeping, then resize the next sleep.
    pub fn flush_cycle(&mut self) -> CycleReport {
        let mut budget = match self.sink.max_lines() {
            None => usize::MAX,
            Some(0) => 1,
            Some(n) => n,
        };
        let mut report = CycleReport::default();

        while budget > 0 {
            let Some(item) = self.next_item() else {
                break;
            };

            if matches!(item, OutputItem::ClearOutput { wait: true }) {
                self.pending_clear = Some(item);
                continue;
            }

            // Nothing to show, so nothing to clear for.
            if item.is_empty() {
                continue;
            }

            if let Some(clear) = self.pending_clear.take() {
                self.emit(clear, &mut report);
            }

            let split = item.split(budget);
            budget = budget.saturating_sub(split.consumed);
            report.lines += split.consumed;

            if let Some(head) = split.head.filter(|h| !h.is_empty()) {
                self.emit(head, &mut report);
            }
            self.carry_over = split.tail;
        }

        // Next sleep is never shorter than the time spent emitting.
        self.sleep_interval = self.default_interval.max(report.emit_time);
        report
    }

    /// Drive cycles until stopped or until every producer is gone.
    /// Returns the sink so callers can inspect or reuse it.
    pub async fn run(mut self) -> S {
        tracing::info!(interval_ms = self.default_interval.as_millis() as u64, "flush loop started");

        loop {
            if self.stop.is_stopped() {
                break;
            }
            if self.carry_over.is_none() && !self.park().await {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.sleep_interval) => {}
                _ = self.stop.0.wake.notified() => {}
            }
            if self.stop.is_stopped() {
                break;
            }

            let report = self.flush_cycle();
            if report.pieces > 0 {
                tracing::trace!(
                    lines = report.lines,
                    pieces = report.pieces,
                    next_sleep_ms = self.sleep_interval.as_millis() as u64,
                    "flush cycle"
                );
            }
        }

        if self.carry_over.is_some() {
            tracing::debug!("discarding carried-over output on shutdown");
        }
        tracing::info!("flush loop stopped");
        self.sink
    }

    /// Spawn the loop on the given runtime.
    pub fn spawn_on(self, handle: &tokio::runtime::Handle) -> FlushHandle<S>
    where
        S: 'static,
    {
        let stop = self.stop_handle();
        let task = handle.spawn(self.run());
        FlushHandle { stop, task }
    }

    /// Wait for work while idle. False means stop or all producers dropped.
    async fn park(&mut self) -> bool {
        tokio::select! {
            biased;
            _ = self.stop.0.wake.notified() => false,
            item = self.queue.recv() => match item {
                Some(item) => {
                    self.carry_over = Some(item);
                    true
                }
                None => false,
            },
        }
    }

    fn next_item(&mut self) -> Option<OutputItem> {
        self.carry_over
            .take()
            .or_else(|| self.queue.try_recv().ok())
    }

    fn emit(&mut self, item: OutputItem, report: &mut CycleReport) {
        let started = Instant::now();
        self.sink.receive(item);
        report.emit_time += started.elapsed();
        report.pieces += 1;
    }
}

/// A running flush worker.
#[derive(Debug)]
pub struct FlushHandle<S> {
    stop: StopHandle,
    task: JoinHandle<S>,
}

impl<S> FlushHandle<S> {
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<S> {
        self.task.await.context("Flush worker panicked")
    }

    pub async fn shutdown(self) -> Result<S> {
        self.stop();
        self.join().await
    }
}

// ════════════════════════════════════════════════════════════════════
// Channel sink
// ════════════════════════════════════════════════════════════════════

/// Line budget shared between the UI thread (writer) and the flush worker.
#[derive(Debug, Clone)]
pub struct LineBudget(Arc<AtomicUsize>);

impl LineBudget {
    const UNBOUNDED: usize = usize::MAX;

    pub fn new(lines: usize) -> Self {
        Self(Arc::new(AtomicUsize::new(lines)))
    }

    pub fn unbounded() -> Self {
        Self::new(Self::UNBOUNDED)
    }

    pub fn set(&self, lines: usize) {
        self.0.store(lines, Ordering::Relaxed);
    }

    pub fn set_unbounded(&self) {
        self.set(Self::UNBOUNDED);
    }

    pub fn get(&self) -> Option<usize> {
        match self.0.load(Ordering::Relaxed) {
            Self::UNBOUNDED => None,
            n => Some(n),
        }
    }
}

/// Forwards pieces to the UI thread, which polls the receiver on its tick.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutputItem>,
    budget: LineBudget,
}

impl ChannelSink {
    pub fn new(budget: LineBudget) -> (Self, mpsc::UnboundedReceiver<OutputItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, budget }, rx)
    }

    pub fn budget(&self) -> &LineBudget {
        &self.budget
    }
}

impl OutputSink for ChannelSink {
    fn max_lines(&self) -> Option<usize> {
        self.budget.get()
    }

    fn receive(&mut self, item: OutputItem) {
        if self.tx.send(item).is_err() {
            tracing::debug!("presentation channel closed; piece dropped");
        }
    }
}
