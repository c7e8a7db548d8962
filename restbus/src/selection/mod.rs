/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Frame and E2E counter selection from broker signal metadata.
//!
//! Turns the `Frames` answer of `SystemService.ListSignals` into the inputs
//! of [`Restbus::new`](crate::scheduler::Restbus::new):
//!
//! * [`select_frames`] — the frames to keep alive, each with its cycle time
//!   and one [`SignalValueSeries`] per child signal (start value or manual
//!   override values).
//! * [`select_e2e_counters`] — every signal named as an E2E counter, on the
//!   frame itself or on one of its signal groups.

use std::collections::HashMap;

use tracing::debug;

use crate::proto::broker_v1::{FrameInfo, MetaData, SignalInfo};
use crate::scheduler::{E2eCounters, RestbusError};
use crate::signal::{FrameSelection, SignalValue, SignalValueSeries};

/// Manual override values, keyed by signal name.
pub type OverrideValues = HashMap<String, Vec<f64>>;

fn signal_name(info: &SignalInfo) -> &str {
    info.id.as_ref().map(|id| id.name.as_str()).unwrap_or("")
}

fn signal_namespace(info: &SignalInfo) -> &str {
    info.id
        .as_ref()
        .and_then(|id| id.namespace.as_ref())
        .map(|ns| ns.name.as_str())
        .unwrap_or("")
}

fn meta_data(info: &SignalInfo) -> Option<&MetaData> {
    info.meta_data.as_ref()
}

/// Build the values one child signal will publish: its override list if one
/// was given, else its start value (`0.0` when the broker has none).
fn signal_series(
    frame_name: &str,
    child: &SignalInfo,
    overrides: &OverrideValues,
) -> Result<SignalValueSeries, RestbusError> {
    let name = signal_name(child);
    let namespace = signal_namespace(child);

    let values: Vec<f64> = match overrides.get(name) {
        Some(values) => values.clone(),
        None => vec![meta_data(child).map(|m| m.start_value).unwrap_or(0.0)],
    };

    let values = values
        .into_iter()
        .map(|v| SignalValue::double(name, namespace, v))
        .collect();

    SignalValueSeries::new(name, values).ok_or_else(|| RestbusError::EmptySignalValues {
        frame: frame_name.to_string(),
        signal: name.to_string(),
    })
}

/// Select the frames to publish.
///
/// A frame matches when its name is in `match_frames`; `exclude` inverts the
/// match.  An empty `match_frames` selects every frame.
///
/// # Errors
/// [`RestbusError::EmptySignalValues`] if an override list is empty.
pub fn select_frames(
    frames: &[FrameInfo],
    match_frames: &[String],
    exclude: bool,
    overrides: &OverrideValues,
) -> Result<Vec<FrameSelection>, RestbusError> {
    // Nothing named → exclude nothing → everything.
    let exclude = exclude || match_frames.is_empty();

    let mut selection = Vec::new();
    for frame in frames {
        let Some(info) = frame.signal_info.as_ref() else {
            continue;
        };
        let name = signal_name(info);

        let listed = match_frames.iter().any(|m| m == name);
        if listed == exclude {
            continue;
        }

        let cycle_time_ms = meta_data(info)
            .map(|m| f64::from(m.cycle_time))
            .unwrap_or(0.0);

        let signals = frame
            .child_info
            .iter()
            .map(|child| signal_series(name, child, overrides))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            frame = %name,
            cycle_time_ms,
            signals = signals.len(),
            "frame selected"
        );
        selection.push(FrameSelection::new(cycle_time_ms, name, signals));
    }

    Ok(selection)
}

/// Collect every E2E counter signal named in the frames' metadata, seeded at
/// `0`.  Blank names are ignored.
pub fn select_e2e_counters(frames: &[FrameInfo]) -> E2eCounters {
    let mut counters = E2eCounters::new();

    let metas = frames
        .iter()
        .filter_map(|f| f.signal_info.as_ref())
        .filter_map(meta_data);

    for meta in metas {
        let frame_counter = meta.e2e.as_ref().map(|e| e.signal_counter.as_str());
        let group_counters = meta
            .groups
            .iter()
            .filter_map(|g| g.e2e.as_ref())
            .map(|e| e.signal_counter.as_str());

        for name in frame_counter.into_iter().chain(group_counters) {
            if !name.is_empty() {
                counters.register(name);
            }
        }
    }

    debug!(counters = ?counters.names(), "E2E counters selected");
    counters
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::broker_v1::{E2e, NameSpace, SignalGroup, SignalId};
    use crate::signal::SignalPayload;

    // ── Test helpers ──────────────────────────────────────────────────────────

    fn info(name: &str, meta: MetaData) -> SignalInfo {
        SignalInfo {
            id: Some(SignalId {
                name: name.to_string(),
                namespace: Some(NameSpace {
                    name: "ChassisBus".to_string(),
                }),
            }),
            meta_data: Some(meta),
        }
    }

    fn signal(name: &str, start_value: f64) -> SignalInfo {
        info(
            name,
            MetaData {
                start_value,
                ..Default::default()
            },
        )
    }

    fn frame(name: &str, cycle_time: f32, children: Vec<SignalInfo>) -> FrameInfo {
        FrameInfo {
            signal_info: Some(info(
                name,
                MetaData {
                    cycle_time,
                    ..Default::default()
                },
            )),
            child_info: children,
        }
    }

    fn e2e(counter: &str) -> Option<E2e> {
        Some(E2e {
            signal_counter: counter.to_string(),
            signal_checksum: String::new(),
        })
    }

    fn sample_frames() -> Vec<FrameInfo> {
        vec![
            frame("Brake", 20.0, vec![signal("BrakePressure", 1.5)]),
            frame(
                "Speed",
                100.0,
                vec![signal("VehicleSpeed", 0.0), signal("SpeedQf", 3.0)],
            ),
            frame("Wake", 0.0, vec![signal("WakeReq", 1.0)]),
        ]
    }

    fn frame_names(sel: &[FrameSelection]) -> Vec<&str> {
        sel.iter().map(|f| f.name.as_str()).collect()
    }

    // ── select_frames ─────────────────────────────────────────────────────────

    #[test]
    fn no_frame_names_selects_everything() {
        let sel = select_frames(&sample_frames(), &[], false, &OverrideValues::new()).unwrap();
        assert_eq!(frame_names(&sel), vec!["Brake", "Speed", "Wake"]);
    }

    #[test]
    fn named_frames_are_selected() {
        let names = vec!["Speed".to_string()];
        let sel = select_frames(&sample_frames(), &names, false, &OverrideValues::new()).unwrap();
        assert_eq!(frame_names(&sel), vec!["Speed"]);
        assert_eq!(sel[0].cycle_time_ms, 100.0);
        assert_eq!(sel[0].signals.len(), 2);
    }

    #[test]
    fn exclude_inverts_the_match() {
        let names = vec!["Speed".to_string()];
        let sel = select_frames(&sample_frames(), &names, true, &OverrideValues::new()).unwrap();
        assert_eq!(frame_names(&sel), vec!["Brake", "Wake"]);
    }

    #[test]
    fn unknown_frame_name_selects_nothing() {
        let names = vec!["Nope".to_string()];
        let sel = select_frames(&sample_frames(), &names, false, &OverrideValues::new()).unwrap();
        assert!(sel.is_empty());
    }

    #[test]
    fn start_value_becomes_single_double_value() {
        let names = vec!["Brake".to_string()];
        let sel = select_frames(&sample_frames(), &names, false, &OverrideValues::new()).unwrap();
        let series = &sel[0].signals[0];
        assert_eq!(series.name(), "BrakePressure");
        assert_eq!(series.values().len(), 1);
        assert_eq!(series.values()[0].payload, SignalPayload::Double(1.5));
        assert_eq!(series.values()[0].namespace, "ChassisBus");
    }

    #[test]
    fn override_replaces_start_value() {
        let mut overrides = OverrideValues::new();
        overrides.insert("VehicleSpeed".to_string(), vec![1.0, 2.0, 3.0]);
        let names = vec!["Speed".to_string()];
        let sel = select_frames(&sample_frames(), &names, false, &overrides).unwrap();

        let speed: Vec<f64> = sel[0].signals[0]
            .values()
            .iter()
            .map(|v| v.payload.as_double().unwrap())
            .collect();
        assert_eq!(speed, vec![1.0, 2.0, 3.0]);
        // untouched sibling keeps its start value
        assert_eq!(
            sel[0].signals[1].values()[0].payload,
            SignalPayload::Double(3.0)
        );
    }

    #[test]
    fn empty_override_list_is_an_error() {
        let mut overrides = OverrideValues::new();
        overrides.insert("WakeReq".to_string(), vec![]);
        let err = select_frames(&sample_frames(), &[], false, &overrides).unwrap_err();
        assert!(matches!(err, RestbusError::EmptySignalValues { .. }));
    }

    #[test]
    fn missing_metadata_defaults_to_zero() {
        let frames = vec![FrameInfo {
            signal_info: Some(SignalInfo {
                id: Some(SignalId {
                    name: "Bare".to_string(),
                    namespace: None,
                }),
                meta_data: None,
            }),
            child_info: vec![SignalInfo {
                id: Some(SignalId {
                    name: "BareSig".to_string(),
                    namespace: None,
                }),
                meta_data: None,
            }],
        }];
        let sel = select_frames(&frames, &[], false, &OverrideValues::new()).unwrap();
        assert_eq!(sel[0].cycle_time_ms, 0.0);
        assert_eq!(
            sel[0].signals[0].values()[0].payload,
            SignalPayload::Double(0.0)
        );
    }

    // ── select_e2e_counters ───────────────────────────────────────────────────

    #[test]
    fn counters_from_frames_and_groups() {
        let mut frames = sample_frames();
        frames[0].signal_info.as_mut().unwrap().meta_data = Some(MetaData {
            e2e: e2e("BrakeCnt"),
            ..Default::default()
        });
        frames[1].signal_info.as_mut().unwrap().meta_data = Some(MetaData {
            groups: vec![
                SignalGroup {
                    name: "SpeedGroup".to_string(),
                    e2e: e2e("SpeedCnt"),
                },
                SignalGroup {
                    name: "Unprotected".to_string(),
                    e2e: None,
                },
                SignalGroup {
                    name: "Blank".to_string(),
                    e2e: e2e(""),
                },
            ],
            ..Default::default()
        });

        let counters = select_e2e_counters(&frames);
        assert_eq!(counters.names(), vec!["BrakeCnt", "SpeedCnt"]);
        assert_eq!(counters.get("BrakeCnt"), Some(0));
    }

    #[test]
    fn no_e2e_metadata_gives_empty_ledger() {
        assert!(select_e2e_counters(&sample_frames()).is_empty());
    }
}
