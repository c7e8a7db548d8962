/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Restbus – keeps frames alive on a vehicle network by publishing their
//! default (or overridden) signal values through a signal broker at each
//! frame's cycle time.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── proto/      – generated gRPC/protobuf types & stubs
//! ├── config/     – YAML configuration + NAME=VALUES overrides
//! ├── broker/     – tonic client: ListSignals / PublishSignals
//! ├── selection/  – broker metadata → frame selection, E2E counters
//! ├── scheduler/  – the cyclic publish loop
//! └── signal.rs   – signal payloads and round-robin value series
//! ```

pub mod broker;
pub mod config;
pub mod proto;
pub mod scheduler;
pub mod selection;
pub mod signal;
