/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! broker-sim – a stand-in for the vehicle-signal broker.
//!
//! Serves just enough of the broker API to run the restbus against it:
//!
//! * `SystemService.ListSignals` answers from a YAML signal database
//!   (see `test-tools/config/signal_db.yaml`);
//! * `NetworkService.PublishSignals` logs every batch together with the time
//!   since the previous batch from the same client;
//! * `SystemService.UploadFile` keeps uploaded files in memory after checking
//!   their SHA-256, and `ReloadConfiguration` swaps in an uploaded
//!   `/signal_db.yaml` as the new database.
//!
//! `--fail-after N` makes every publish after the N-th fail with
//! `UNAVAILABLE`, to exercise the restbus' fatal-transport path.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use restbus::proto::broker_v1::network_service_server::{NetworkService, NetworkServiceServer};
use restbus::proto::broker_v1::system_service_server::{SystemService, SystemServiceServer};
use restbus::broker::upload::sha256_hex;
use restbus::proto::broker_v1::file_upload_request::Data as UploadData;
use restbus::proto::broker_v1::file_upload_response::Data as UploadReply;
use restbus::proto::broker_v1::reload_message::Status as ReloadStatus;
use restbus::proto::broker_v1::{
    E2e, Empty, FileDescription, FileUploadRequest, FileUploadResponse, FrameInfo, Frames,
    MetaData, NameSpace, PublisherConfig, ReloadMessage, SignalGroup, SignalId, SignalInfo,
};
use restbus::signal::SignalValue;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "broker-sim", about = "Signal broker simulator for restbus testing")]
struct Cli {
    /// Address to listen on.
    #[arg(short = 'l', long = "listen", default_value = "127.0.0.1:50051")]
    listen: SocketAddr,

    /// YAML signal database.
    #[arg(short = 'd', long = "signal-db")]
    signal_db: PathBuf,

    /// Fail every publish after this many successful ones.
    #[arg(long = "fail-after")]
    fail_after: Option<u64>,
}

// ── Signal database (YAML) ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SignalDbFile {
    namespaces: BTreeMap<String, Vec<FrameEntry>>,
}

#[derive(Debug, Deserialize)]
struct FrameEntry {
    name: String,
    #[serde(default)]
    cycle_time_ms: f32,
    e2e_counter: Option<String>,
    #[serde(default)]
    groups: Vec<GroupEntry>,
    #[serde(default)]
    signals: Vec<SignalEntry>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    name: String,
    e2e_counter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignalEntry {
    name: String,
    #[serde(default)]
    start_value: f64,
}

fn e2e(counter: Option<String>) -> Option<E2e> {
    counter.map(|signal_counter| E2e {
        signal_counter,
        signal_checksum: String::new(),
    })
}

fn signal_info(namespace: &str, name: String, meta: MetaData) -> SignalInfo {
    SignalInfo {
        id: Some(SignalId {
            name,
            namespace: Some(NameSpace {
                name: namespace.to_string(),
            }),
        }),
        meta_data: Some(meta),
    }
}

fn frame_info(namespace: &str, entry: FrameEntry) -> FrameInfo {
    let frame_meta = MetaData {
        cycle_time: entry.cycle_time_ms,
        e2e: e2e(entry.e2e_counter),
        groups: entry
            .groups
            .into_iter()
            .map(|g| SignalGroup {
                name: g.name,
                e2e: e2e(g.e2e_counter),
            })
            .collect(),
        ..Default::default()
    };

    let child_info = entry
        .signals
        .into_iter()
        .map(|s| {
            let meta = MetaData {
                start_value: s.start_value,
                ..Default::default()
            };
            signal_info(namespace, s.name, meta)
        })
        .collect();

    FrameInfo {
        signal_info: Some(signal_info(namespace, entry.name, frame_meta)),
        child_info,
    }
}

type SignalDb = BTreeMap<String, Vec<FrameInfo>>;

/// Upload destination that replaces the database on reload.
const SIGNAL_DB_UPLOAD_PATH: &str = "/signal_db.yaml";

fn parse_signal_db(content: &str) -> Result<SignalDb> {
    let file: SignalDbFile = serde_yaml::from_str(content)?;
    Ok(file
        .namespaces
        .into_iter()
        .map(|(ns, frames)| {
            let infos = frames.into_iter().map(|f| frame_info(&ns, f)).collect();
            (ns, infos)
        })
        .collect())
}

fn load_signal_db(path: &Path) -> Result<SignalDb> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open signal database: {}", path.display()))?;
    parse_signal_db(&content)
        .with_context(|| format!("Failed to parse signal database: {}", path.display()))
}

// ── Configuration upload ──────────────────────────────────────────────────────

type Uploads = BTreeMap<String, Vec<u8>>;

/// Check an uploaded file against its description.  `Err` carries the reason
/// reported back as `cancelled`.
fn verify_upload(description: &FileDescription, content: &[u8]) -> Result<(), String> {
    if description.path.is_empty() {
        return Err("empty destination path".to_string());
    }
    let actual = sha256_hex(content);
    if actual != description.sha256 {
        return Err(format!(
            "checksum mismatch for {}: expected {}, got {}",
            description.path, description.sha256, actual
        ));
    }
    Ok(())
}

/// The database to serve after a reload, if one was uploaded.
fn uploaded_signal_db(uploads: &Uploads) -> Result<Option<SignalDb>> {
    let Some(content) = uploads.get(SIGNAL_DB_UPLOAD_PATH) else {
        return Ok(None);
    };
    let content = std::str::from_utf8(content).context("signal database is not UTF-8")?;
    parse_signal_db(content).map(Some)
}

// ── Services ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct SimBroker {
    db: Arc<RwLock<SignalDb>>,
    uploads: Arc<Mutex<Uploads>>,
    published: Arc<AtomicU64>,
    fail_after: Option<u64>,
    last_seen: Arc<Mutex<HashMap<String, Instant>>>,
}

#[tonic::async_trait]
impl SystemService for SimBroker {
    async fn list_signals(&self, request: Request<NameSpace>) -> Result<Response<Frames>, Status> {
        let namespace = request.into_inner().name;
        let db = self.db.read().unwrap_or_else(|p| p.into_inner());
        match db.get(&namespace) {
            Some(frames) => {
                info!(namespace = %namespace, frames = frames.len(), "ListSignals");
                Ok(Response::new(Frames {
                    frame: frames.clone(),
                }))
            }
            None => {
                warn!(namespace = %namespace, "ListSignals: unknown namespace");
                Err(Status::not_found(format!("namespace '{}' not found", namespace)))
            }
        }
    }

    async fn upload_file(
        &self,
        request: Request<Streaming<FileUploadRequest>>,
    ) -> Result<Response<FileUploadResponse>, Status> {
        let mut stream = request.into_inner();
        let mut description = None;
        let mut content = Vec::new();

        while let Some(message) = stream.message().await? {
            match message.data {
                Some(UploadData::FileDescription(d)) => description = Some(d),
                Some(UploadData::Chunk(chunk)) => content.extend_from_slice(&chunk),
                None => {}
            }
        }

        let Some(description) = description else {
            return Err(Status::invalid_argument("upload without file description"));
        };

        let data = match verify_upload(&description, &content) {
            Ok(()) => {
                info!(path = %description.path, bytes = content.len(), "UploadFile");
                self.uploads
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .insert(description.path, content);
                UploadReply::Finished(true)
            }
            Err(reason) => {
                warn!(reason = %reason, "UploadFile: rejected");
                UploadReply::Cancelled(reason)
            }
        };

        Ok(Response::new(FileUploadResponse { data: Some(data) }))
    }

    async fn reload_configuration(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ReloadMessage>, Status> {
        let reloaded = {
            let uploads = self.uploads.lock().unwrap_or_else(|p| p.into_inner());
            uploaded_signal_db(&uploads)
        };

        let status = match reloaded {
            Ok(new_db) => {
                let mut db = self.db.write().unwrap_or_else(|p| p.into_inner());
                if let Some(new_db) = new_db {
                    *db = new_db;
                }
                info!(namespaces = db.len(), "ReloadConfiguration");
                ReloadStatus::Namespaces(db.len() as u32)
            }
            Err(e) => {
                warn!("ReloadConfiguration: {:#}", e);
                ReloadStatus::ErrorMessage(format!("{:#}", e))
            }
        };

        Ok(Response::new(ReloadMessage {
            status: Some(status),
        }))
    }
}

#[tonic::async_trait]
impl NetworkService for SimBroker {
    async fn publish_signals(
        &self,
        request: Request<PublisherConfig>,
    ) -> Result<Response<Empty>, Status> {
        let config = request.into_inner();
        let client = config.client_id.map(|c| c.id).unwrap_or_default();
        let signals: Vec<SignalValue> = config
            .signals
            .map(|s| s.signal.iter().map(SignalValue::from_proto).collect())
            .unwrap_or_default();

        let count = self.published.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if count >= limit {
                warn!(client = %client, "PublishSignals: failing as requested (--fail-after)");
                return Err(Status::unavailable("simulated transport failure"));
            }
        }

        let now = Instant::now();
        let since_last_ms = {
            let mut last_seen = self.last_seen.lock().unwrap_or_else(|p| p.into_inner());
            last_seen
                .insert(client.clone(), now)
                .map(|prev| now.duration_since(prev).as_secs_f64() * 1000.0)
        };

        info!(
            client        = %client,
            signals       = signals.len(),
            since_last_ms = ?since_last_ms,
            "PublishSignals"
        );
        for s in &signals {
            debug!("    {}/{} = {}", s.namespace, s.name, s.payload);
        }

        Ok(Response::new(Empty {}))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db = load_signal_db(&cli.signal_db)?;

    for (ns, frames) in &db {
        info!(namespace = %ns, frames = frames.len(), "namespace loaded");
    }

    let broker = SimBroker {
        db: Arc::new(RwLock::new(db)),
        uploads: Arc::new(Mutex::new(Uploads::new())),
        published: Arc::new(AtomicU64::new(0)),
        fail_after: cli.fail_after,
        last_seen: Arc::new(Mutex::new(HashMap::new())),
    };

    info!(listen = %cli.listen, "broker-sim listening");

    Server::builder()
        .add_service(SystemServiceServer::new(broker.clone()))
        .add_service(NetworkServiceServer::new(broker))
        .serve_with_shutdown(cli.listen, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("broker-sim shutting down");
        })
        .await
        .context("broker-sim server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: &str = r#"
namespaces:
  ChassisBus:
    - name: SpeedFrame
      cycle_time_ms: 100
      e2e_counter: SpeedCounter
      groups:
        - name: G
          e2e_counter: GroupCounter
      signals:
        - name: VehicleSpeed
          start_value: 4.5
        - name: SpeedCounter
    - name: WakeUpFrame
      signals:
        - name: WakeUpRequest
"#;

    #[test]
    fn signal_db_maps_onto_frame_infos() {
        let db = parse_signal_db(DB).unwrap();
        let frames = &db["ChassisBus"];
        assert_eq!(frames.len(), 2);

        let speed = &frames[0];
        let meta = speed.signal_info.as_ref().unwrap().meta_data.as_ref().unwrap();
        assert_eq!(meta.cycle_time, 100.0);
        assert_eq!(meta.e2e.as_ref().unwrap().signal_counter, "SpeedCounter");
        assert_eq!(
            meta.groups[0].e2e.as_ref().unwrap().signal_counter,
            "GroupCounter"
        );
        let child = &speed.child_info[0];
        assert_eq!(child.id.as_ref().unwrap().name, "VehicleSpeed");
        assert_eq!(child.meta_data.as_ref().unwrap().start_value, 4.5);
    }

    #[test]
    fn missing_cycle_time_means_non_cyclic() {
        let db = parse_signal_db(DB).unwrap();
        let wake = &db["ChassisBus"][1];
        let meta = wake.signal_info.as_ref().unwrap().meta_data.as_ref().unwrap();
        assert_eq!(meta.cycle_time, 0.0);
        assert!(meta.e2e.is_none());
    }

    #[test]
    fn restbus_selection_reads_simulated_metadata() {
        let db = parse_signal_db(DB).unwrap();
        let frames = &db["ChassisBus"];
        let counters = restbus::selection::select_e2e_counters(frames);
        assert_eq!(counters.names(), vec!["GroupCounter", "SpeedCounter"]);
    }

    #[test]
    fn upload_with_matching_checksum_is_accepted() {
        let description = FileDescription {
            sha256: sha256_hex(b"abc"),
            path: "/interfaces.json".to_string(),
        };
        assert!(verify_upload(&description, b"abc").is_ok());
    }

    #[test]
    fn upload_with_wrong_checksum_is_cancelled() {
        let description = FileDescription {
            sha256: sha256_hex(b"abc"),
            path: "/interfaces.json".to_string(),
        };
        let reason = verify_upload(&description, b"abd").unwrap_err();
        assert!(reason.contains("checksum mismatch"), "{reason}");
    }

    #[test]
    fn reload_uses_uploaded_signal_db() {
        let mut uploads = Uploads::new();
        assert!(uploaded_signal_db(&uploads).unwrap().is_none());

        uploads.insert("/other.json".to_string(), b"{}".to_vec());
        assert!(uploaded_signal_db(&uploads).unwrap().is_none());

        uploads.insert(SIGNAL_DB_UPLOAD_PATH.to_string(), DB.as_bytes().to_vec());
        let db = uploaded_signal_db(&uploads).unwrap().unwrap();
        assert_eq!(db["ChassisBus"].len(), 2);
    }

    #[test]
    fn reload_reports_broken_signal_db() {
        let mut uploads = Uploads::new();
        uploads.insert(SIGNAL_DB_UPLOAD_PATH.to_string(), b"namespaces: [".to_vec());
        assert!(uploaded_signal_db(&uploads).is_err());
    }
}
