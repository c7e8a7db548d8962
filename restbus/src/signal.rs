/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Signal value types shared by frame selection, the scheduler and the
//! broker client.
//!
//! ```text
//! broker metadata ──(selection)──►  FrameSelection  ──(Restbus::new)──►  FrameTask
//!                                    └ SignalValueSeries ─(next)─► SignalValue ─► publish batch
//! ```
//!
//! # Ownership model
//! A [`FrameSelection`] is **moved** into the scheduler at construction.  From
//! then on every [`SignalValueSeries`] (and its round-robin cursor) is owned by
//! exactly one scheduled frame; only the scheduler advances it.

use std::fmt;

use crate::proto::broker_v1::{self as pb, signal::Payload};

// ── Payload ───────────────────────────────────────────────────────────────────

/// Typed value of one signal.
///
/// Mirrors the `payload` oneof of the proto `Signal`, plus the separate `raw`
/// bytes field.  Raw takes precedence when converting from the wire, matching
/// how the broker reports raw frames.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SignalPayload {
    Raw(Vec<u8>),
    Integer(i64),
    Double(f64),
    Arbitration(bool),
    #[default]
    Empty,
}

impl SignalPayload {
    /// Returns the integer value, if this is an `Integer` payload.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SignalPayload::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the double value, if this is a `Double` payload.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            SignalPayload::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SignalPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalPayload::Raw(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            SignalPayload::Integer(v) => write!(f, "{}", v),
            SignalPayload::Double(v) => write!(f, "{}", v),
            SignalPayload::Arbitration(v) => write!(f, "{}", v),
            SignalPayload::Empty => write!(f, "empty"),
        }
    }
}

// ── SignalValue ───────────────────────────────────────────────────────────────

/// One named value, ready to be placed in a publish batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalValue {
    pub name: String,
    pub namespace: String,
    pub payload: SignalPayload,
}

impl SignalValue {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        payload: SignalPayload,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            payload,
        }
    }

    /// Convenience constructor for the common `Double` case (start values and
    /// manual overrides are always doubles).
    pub fn double(name: impl Into<String>, namespace: impl Into<String>, value: f64) -> Self {
        Self::new(name, namespace, SignalPayload::Double(value))
    }

    /// Convert into the wire `Signal` message.
    pub fn to_proto(&self) -> pb::Signal {
        let (payload, raw) = match &self.payload {
            SignalPayload::Raw(bytes) => (None, bytes.clone()),
            SignalPayload::Integer(v) => (Some(Payload::Integer(*v)), Vec::new()),
            SignalPayload::Double(v) => (Some(Payload::Double(*v)), Vec::new()),
            SignalPayload::Arbitration(v) => (Some(Payload::Arbitration(*v)), Vec::new()),
            SignalPayload::Empty => (Some(Payload::Empty(true)), Vec::new()),
        };
        pb::Signal {
            id: Some(pb::SignalId {
                name: self.name.clone(),
                namespace: Some(pb::NameSpace {
                    name: self.namespace.clone(),
                }),
            }),
            payload,
            raw,
            timestamp: 0,
        }
    }

    /// Convert from a wire `Signal` message.
    ///
    /// Non-empty `raw` bytes win over the oneof; a missing oneof is `Empty`.
    pub fn from_proto(signal: &pb::Signal) -> Self {
        let (name, namespace) = match &signal.id {
            Some(id) => (
                id.name.clone(),
                id.namespace
                    .as_ref()
                    .map(|ns| ns.name.clone())
                    .unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };
        let payload = if !signal.raw.is_empty() {
            SignalPayload::Raw(signal.raw.clone())
        } else {
            match signal.payload {
                Some(Payload::Integer(v)) => SignalPayload::Integer(v),
                Some(Payload::Double(v)) => SignalPayload::Double(v),
                Some(Payload::Arbitration(v)) => SignalPayload::Arbitration(v),
                Some(Payload::Empty(_)) | None => SignalPayload::Empty,
            }
        };
        Self {
            name,
            namespace,
            payload,
        }
    }
}

// ── SignalValueSeries ─────────────────────────────────────────────────────────

/// The candidate values of one signal, published round-robin.
///
/// Normally holds a single default value; a manual override can supply
/// several, which are then cycled through on consecutive publishes.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalValueSeries {
    name: String,
    values: Vec<SignalValue>,
    cursor: usize,
}

impl SignalValueSeries {
    /// Create a series.  Returns `None` when `values` is empty — a series must
    /// always have something to publish.
    pub fn new(name: impl Into<String>, values: Vec<SignalValue>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            name: name.into(),
            values,
            cursor: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[SignalValue] {
        &self.values
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns the value under the cursor and advances the cursor, wrapping
    /// at the end of the list.
    pub fn next_value(&mut self) -> SignalValue {
        let value = self.values[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.values.len();
        value
    }

    /// Write an E2E counter into the first value of the series.
    pub fn set_counter(&mut self, counter: u8) {
        self.values[0].payload = SignalPayload::Integer(i64::from(counter));
    }
}

// ── FrameSelection ────────────────────────────────────────────────────────────

/// One frame chosen for the restbus, as handed to
/// [`Restbus::new`](crate::scheduler::Restbus::new).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSelection {
    /// Cycle time in milliseconds; `0.0` means publish once.
    pub cycle_time_ms: f64,
    pub name: String,
    pub signals: Vec<SignalValueSeries>,
}

impl FrameSelection {
    pub fn new(
        cycle_time_ms: f64,
        name: impl Into<String>,
        signals: Vec<SignalValueSeries>,
    ) -> Self {
        Self {
            cycle_time_ms,
            name: name.into(),
            signals,
        }
    }

    pub fn is_cyclic(&self) -> bool {
        self.cycle_time_ms > 0.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn series(name: &str, values: &[f64]) -> SignalValueSeries {
        let values = values
            .iter()
            .map(|v| SignalValue::double(name, "body", *v))
            .collect();
        SignalValueSeries::new(name, values).unwrap()
    }

    #[test]
    fn empty_series_is_rejected() {
        assert!(SignalValueSeries::new("s", vec![]).is_none());
    }

    #[test]
    fn next_value_cycles_in_order_and_wraps() {
        let mut s = series("s", &[1.0, 2.0, 3.0]);
        let seen: Vec<f64> = (0..7)
            .map(|_| s.next_value().payload.as_double().unwrap())
            .collect();
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
        assert_eq!(s.cursor(), 1);
    }

    #[test]
    fn single_value_series_always_returns_same_value() {
        let mut s = series("s", &[3.0]);
        for _ in 0..5 {
            assert_eq!(s.next_value().payload, SignalPayload::Double(3.0));
            assert_eq!(s.cursor(), 0);
        }
    }

    #[test]
    fn set_counter_overwrites_first_value_only() {
        let mut s = series("cnt", &[0.0, 5.0]);
        s.set_counter(7);
        assert_eq!(s.values()[0].payload, SignalPayload::Integer(7));
        assert_eq!(s.values()[1].payload, SignalPayload::Double(5.0));
    }

    #[test]
    fn display_formats_each_variant() {
        assert_eq!(SignalPayload::Raw(vec![0x0a, 0xff]).to_string(), "0x0aff");
        assert_eq!(SignalPayload::Integer(-4).to_string(), "-4");
        assert_eq!(SignalPayload::Double(2.5).to_string(), "2.5");
        assert_eq!(SignalPayload::Arbitration(true).to_string(), "true");
        assert_eq!(SignalPayload::Empty.to_string(), "empty");
    }

    #[test]
    fn proto_conversion_keeps_identity_and_payload() {
        let value = SignalValue::new("Speed", "body", SignalPayload::Integer(12));
        let wire = value.to_proto();
        assert_eq!(wire.id.as_ref().unwrap().name, "Speed");
        assert_eq!(wire.payload, Some(Payload::Integer(12)));
        assert_eq!(SignalValue::from_proto(&wire), value);
    }

    #[test]
    fn raw_bytes_take_precedence_over_oneof() {
        let wire = pb::Signal {
            id: None,
            payload: Some(Payload::Double(1.0)),
            raw: vec![1, 2],
            timestamp: 0,
        };
        assert_eq!(
            SignalValue::from_proto(&wire).payload,
            SignalPayload::Raw(vec![1, 2])
        );
    }

    #[test]
    fn frame_with_zero_cycle_is_not_cyclic() {
        assert!(!FrameSelection::new(0.0, "f", vec![]).is_cyclic());
        assert!(FrameSelection::new(10.0, "f", vec![]).is_cyclic());
    }
}
