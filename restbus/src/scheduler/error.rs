/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the restbus scheduler.
//!
//! Two error enums model the two failure layers:
//!
//! * [`PublishError`] — a single publish call failed at the transport
//!   (low-level, produced by a [`SignalPublisher`](super::SignalPublisher)).
//! * [`RestbusError`] — top-level failure returned from
//!   [`Restbus::new()`](super::Restbus::new) or
//!   [`Restbus::run()`](super::Restbus::run).
//!
//! Cancellation is not an error: it is reported as
//! [`RunOutcome::Cancelled`](super::RunOutcome::Cancelled).

use thiserror::Error;

// ── Publish sink ──────────────────────────────────────────────────────────────

/// Why one publish call failed.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The broker answered the `PublishSignals` RPC with an error status.
    #[error("broker rejected publish: {0}")]
    Status(#[from] tonic::Status),

    /// The sink can no longer accept batches (e.g. a test recorder that was
    /// told to fail, or a transport that was shut down).
    #[error("publish sink is closed")]
    Closed,
}

// ── Top-level restbus errors ──────────────────────────────────────────────────

/// Top-level error type of the restbus.
///
/// | Variant | Layer |
/// |---|---|
/// | `NoFramesSelected` / `InvalidCycleTime` / `EmptySignalValues` | configuration — the loop never starts |
/// | `Publish` / `PublishTimeout` | transport — fatal, the loop stops |
#[derive(Debug, Error)]
pub enum RestbusError {
    /// The frame selection was empty.
    #[error("no frames selected")]
    NoFramesSelected,

    /// A frame carried a negative, NaN or infinite cycle time.
    #[error("frame '{frame}' has invalid cycle time {cycle_time_ms} ms")]
    InvalidCycleTime { frame: String, cycle_time_ms: f64 },

    /// A signal ended up with no value to publish.
    #[error("signal '{signal}' in frame '{frame}' has no values to publish")]
    EmptySignalValues { frame: String, signal: String },

    /// The publish sink failed.  Cyclic traffic is not continued after this.
    #[error("publish failed after {frames} frame(s) in wave: {source}")]
    Publish {
        frames: usize,
        #[source]
        source: PublishError,
    },

    /// The publish call did not complete within the configured deadline.
    #[error("publish did not complete within {timeout_ms} ms")]
    PublishTimeout { timeout_ms: u128 },
}
