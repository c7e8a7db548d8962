/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Restbus scheduler.
//!
//! [`Restbus`] publishes a static selection of frames at their cycle times.
//! All frames share one schedule — a `Vec<`[`FrameTask`]`>` kept sorted by
//! next fire time — and one [`E2eCounters`] ledger, both owned by a single
//! loop:
//!
//! ```text
//! ┌──────────────► peek earliest next_fire ──► sleep until then (or cancel)
//! │                                                   │
//! │  publish wave ◄── stable sort ◄── fire every task with next_fire <= now
//! └───────┘                               (E2E counters, round-robin values,
//!                                          next_fire += cycle)
//! ```
//!
//! # Design decisions
//!
//! | Topic | Choice |
//! |---|---|
//! | Concurrency | One task owns schedule and counters — no locking |
//! | Clock | `tokio::time::Instant` (monotonic; virtualised in tests) |
//! | Rescheduling | `next_fire + cycle`, not `now + cycle` — no drift, catch-up bursts after a stall |
//! | Publishing | One call per wave carrying every due frame |
//! | Ordering | Stable sort on `next_fire` — equal deadlines keep insertion order |
//! | Publish failure | Fatal, returned as [`RestbusError::Publish`]; schedule already sorted |
//!
//! # Example
//! ```rust,ignore
//! let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//! let mut restbus = Restbus::new(selection, counters, publisher)?.with_verbose(true);
//! let summary = restbus.run(stop_rx).await?;
//! ```

pub mod e2e;
pub mod error;
pub mod publisher;

pub use e2e::{E2eCounters, E2E_COUNTER_MAX};
pub use error::{PublishError, RestbusError};
pub use publisher::SignalPublisher;

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, trace};

use crate::signal::{FrameSelection, SignalValue, SignalValueSeries};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Client identity used for publish calls unless overridden.
pub const DEFAULT_CLIENT_ID: &str = "MyRestbus";

// ── FrameTask ─────────────────────────────────────────────────────────────────

/// One scheduled frame.
#[derive(Debug, Clone)]
pub struct FrameTask {
    name: String,
    /// Zero for frames that are sent once and then dropped.
    cycle: Duration,
    signals: Vec<SignalValueSeries>,
    next_fire: Instant,
}

impl FrameTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    pub fn next_fire(&self) -> Instant {
        self.next_fire
    }

    pub fn signals(&self) -> &[SignalValueSeries] {
        &self.signals
    }

    /// Update E2E counters carried by this frame, then take one value from
    /// every signal.
    fn fire(&mut self, counters: &mut E2eCounters) -> Vec<SignalValue> {
        for series in &mut self.signals {
            if let Some(counter) = counters.advance(series.name()) {
                series.set_counter(counter);
            }
        }
        self.signals
            .iter_mut()
            .map(SignalValueSeries::next_value)
            .collect()
    }
}

/// Convert a cycle time in milliseconds into a `Duration`.
///
/// Returns `None` for negative, NaN, infinite or out-of-range values.
fn cycle_from_millis(cycle_time_ms: f64) -> Option<Duration> {
    if !cycle_time_ms.is_finite() || cycle_time_ms < 0.0 {
        return None;
    }
    // Whole nanoseconds, so e.g. 150 ms is exactly 150_000_000 ns.
    let mut nanos = (cycle_time_ms * 1_000_000.0).round();
    if nanos > u64::MAX as f64 {
        return None;
    }
    // A positive cycle must stay cyclic, however short.
    if cycle_time_ms > 0.0 {
        nanos = nanos.max(1.0);
    }
    Some(Duration::from_nanos(nanos as u64))
}

/// Milliseconds rounded up, for the verbose sleep report.
fn ceil_millis(d: Duration) -> u128 {
    d.as_nanos().div_ceil(1_000_000)
}

/// Resolves once `shutdown` reads `true`.  Never resolves if the sender is
/// dropped without requesting cancellation.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ── Run results ───────────────────────────────────────────────────────────────

/// Why [`Restbus::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every remaining frame was non-cyclic and has been sent.
    Exhausted,
    /// Cancellation was requested through the shutdown channel.
    Cancelled,
}

/// Totals reported when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Number of publish calls made.
    pub waves: u64,
    /// Number of frames sent across all waves.
    pub frames_sent: u64,
}

// ── Restbus ───────────────────────────────────────────────────────────────────

/// The restbus scheduler.
///
/// Owns the schedule, the E2E counter ledger and the publish sink.  Nothing
/// is shared, so no interior mutability is needed.
pub struct Restbus<P> {
    schedule: Vec<FrameTask>,
    counters: E2eCounters,
    publisher: P,
    client_id: String,
    verbose: bool,
    publish_timeout: Option<Duration>,
    waves: u64,
    frames_sent: u64,
}

impl<P: SignalPublisher> Restbus<P> {
    /// Build the schedule from `selection`.  Every frame is due immediately.
    ///
    /// # Errors
    /// * [`RestbusError::NoFramesSelected`] if `selection` is empty.
    /// * [`RestbusError::InvalidCycleTime`] if a cycle time is negative or not
    ///   a finite number.
    pub fn new(
        selection: Vec<FrameSelection>,
        counters: E2eCounters,
        publisher: P,
    ) -> Result<Self, RestbusError> {
        if selection.is_empty() {
            return Err(RestbusError::NoFramesSelected);
        }

        let now = Instant::now();
        let mut schedule = Vec::with_capacity(selection.len());
        for frame in selection {
            let cycle = cycle_from_millis(frame.cycle_time_ms).ok_or_else(|| {
                RestbusError::InvalidCycleTime {
                    frame: frame.name.clone(),
                    cycle_time_ms: frame.cycle_time_ms,
                }
            })?;
            schedule.push(FrameTask {
                name: frame.name,
                cycle,
                signals: frame.signals,
                next_fire: now,
            });
        }

        Ok(Self {
            schedule,
            counters,
            publisher,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            verbose: false,
            publish_timeout: None,
            waves: 0,
            frames_sent: 0,
        })
    }

    /// Client identity sent with every publish call.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Report frames sent and sleep length before every sleep.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Fail with [`RestbusError::PublishTimeout`] if a publish call takes
    /// longer than `limit`.  Without it a hung transport hangs the loop.
    pub fn with_publish_timeout(mut self, limit: Option<Duration>) -> Self {
        self.publish_timeout = limit;
        self
    }

    /// Pending frames, earliest first.
    pub fn schedule(&self) -> &[FrameTask] {
        &self.schedule
    }

    pub fn counters(&self) -> &E2eCounters {
        &self.counters
    }

    /// Earliest pending fire time, or `None` once the schedule is empty.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedule.first().map(|task| task.next_fire)
    }

    // ── Main loop ─────────────────────────────────────────────────────────────

    /// Run until the schedule is empty or `shutdown` becomes `true`.
    ///
    /// Cancellation is checked before every wave and interrupts the sleep
    /// between waves; an in-flight publish call is always awaited.
    ///
    /// # Errors
    /// A failed or timed-out publish call stops the loop and is returned; no
    /// further publish calls are made.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, RestbusError> {
        info!(
            frames = self.schedule.len(),
            e2e_counters = self.counters.len(),
            client_id = %self.client_id,
            "restbus scheduler started"
        );

        let mut sent_since_sleep = 0usize;

        loop {
            if *shutdown.borrow_and_update() {
                return Ok(self.stop(RunOutcome::Cancelled));
            }

            let Some(next_fire) = self.next_deadline() else {
                return Ok(self.stop(RunOutcome::Exhausted));
            };

            let now = Instant::now();
            if next_fire > now {
                let wait = next_fire - now;
                if self.verbose {
                    info!(
                        "Sent {} frames, sleeping for {} ms",
                        sent_since_sleep,
                        ceil_millis(wait)
                    );
                }
                sent_since_sleep = 0;

                tokio::select! {
                    _ = sleep_until(next_fire) => {}
                    _ = cancelled(&mut shutdown) => {
                        return Ok(self.stop(RunOutcome::Cancelled));
                    }
                }
            }

            // One clock reading for the whole wave.
            let now = Instant::now();
            sent_since_sleep += self.fire_due(now).await?;
        }
    }

    /// Fire every frame due at `now` and publish them as one batch.
    ///
    /// Returns the number of frames fired (`0` means nothing was due and no
    /// publish call was made).
    pub async fn fire_due(&mut self, now: Instant) -> Result<usize, RestbusError> {
        let (triggers, mut pending): (Vec<FrameTask>, Vec<FrameTask>) =
            std::mem::take(&mut self.schedule)
                .into_iter()
                .partition(|task| task.next_fire <= now);

        if triggers.is_empty() {
            self.schedule = pending;
            return Ok(0);
        }

        let fired = triggers.len();
        let mut batch = Vec::new();

        for mut task in triggers {
            batch.extend(task.fire(&mut self.counters));
            trace!(frame = %task.name, signals = task.signals.len(), "frame due");

            if task.cycle.is_zero() {
                debug!(frame = %task.name, "non-cyclic frame sent, removed from schedule");
            } else {
                task.next_fire += task.cycle;
                pending.push(task);
            }
        }
        pending.sort_by_key(|task| task.next_fire);
        self.schedule = pending;

        self.publish(batch, fired).await?;

        self.waves += 1;
        self.frames_sent += fired as u64;

        Ok(fired)
    }

    async fn publish(
        &mut self,
        batch: Vec<SignalValue>,
        frames: usize,
    ) -> Result<(), RestbusError> {
        debug!(frames, signals = batch.len(), "publishing wave");

        let call = self.publisher.publish(&self.client_id, batch);
        let result = match self.publish_timeout {
            Some(limit) => timeout(limit, call)
                .await
                .map_err(|_| RestbusError::PublishTimeout {
                    timeout_ms: limit.as_millis(),
                })?,
            None => call.await,
        };

        result.map_err(|source| RestbusError::Publish { frames, source })
    }

    fn stop(&self, outcome: RunOutcome) -> RunSummary {
        match outcome {
            RunOutcome::Exhausted => info!("No more schedules..."),
            RunOutcome::Cancelled => info!("Cancellation received. Closing scheduler."),
        }
        let summary = RunSummary {
            outcome,
            waves: self.waves,
            frames_sent: self.frames_sent,
        };
        info!(
            waves = summary.waves,
            frames_sent = summary.frames_sent,
            "restbus scheduler stopped"
        );
        summary
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
