/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The publish sink seen by the scheduler.

use std::future::Future;

use super::error::PublishError;
use crate::signal::SignalValue;

/// Sends one batch of signal values to the network.
///
/// The scheduler calls [`publish`](Self::publish) exactly once per wave with
/// the values of every frame due in that wave, and awaits it before doing
/// anything else, so implementations never see overlapping calls.
pub trait SignalPublisher {
    fn publish(
        &mut self,
        client_id: &str,
        batch: Vec<SignalValue>,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}
