/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! gRPC client wiring for the vehicle-signal broker.
//!
//! [`BrokerConnection`] opens one tonic [`Channel`] and hands out the
//! stubs the restbus needs:
//!
//! * `SystemService.UploadFile` / `ReloadConfiguration` — optional upload of a
//!   configuration folder before discovery (see [`upload`]);
//! * `SystemService.ListSignals` — frame/signal metadata for frame selection;
//! * `NetworkService.PublishSignals` — wrapped in [`GrpcPublisher`], the
//!   [`SignalPublisher`] used by the scheduler.
//!
//! Cloud brokers require an API key or an access token; both travel as
//! request metadata added by [`AuthInterceptor`].

pub mod upload;

use std::path::Path;

use anyhow::{bail, Context, Result};
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};
use tracing::{debug, info};

use crate::proto::broker_v1::file_upload_response::Data as UploadReply;
use crate::proto::broker_v1::network_service_client::NetworkServiceClient;
use crate::proto::broker_v1::reload_message::Status as ReloadStatus;
use crate::proto::broker_v1::system_service_client::SystemServiceClient;
use crate::proto::broker_v1::{ClientId, Empty, FrameInfo, NameSpace, PublisherConfig, Signals};
use crate::scheduler::{PublishError, SignalPublisher};
use crate::signal::SignalValue;

/// Channel type shared by every stub.
pub type AuthChannel = InterceptedService<Channel, AuthInterceptor>;

// ── AuthInterceptor ───────────────────────────────────────────────────────────

/// Adds `x-api-key` and `authorization: Bearer …` metadata when configured.
#[derive(Debug, Clone, Default)]
pub struct AuthInterceptor {
    api_key: Option<MetadataValue<Ascii>>,
    bearer: Option<MetadataValue<Ascii>>,
}

impl AuthInterceptor {
    /// # Errors
    /// Fails if a credential contains characters not allowed in gRPC metadata.
    pub fn new(api_key: Option<&str>, access_token: Option<&str>) -> Result<Self> {
        let api_key = api_key
            .map(|k| k.parse::<MetadataValue<Ascii>>())
            .transpose()
            .context("API key is not valid gRPC metadata")?;
        let bearer = access_token
            .map(|t| format!("Bearer {}", t).parse::<MetadataValue<Ascii>>())
            .transpose()
            .context("access token is not valid gRPC metadata")?;
        Ok(Self { api_key, bearer })
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(key) = &self.api_key {
            request.metadata_mut().insert("x-api-key", key.clone());
        }
        if let Some(bearer) = &self.bearer {
            request.metadata_mut().insert("authorization", bearer.clone());
        }
        Ok(request)
    }
}

// ── BrokerConnection ──────────────────────────────────────────────────────────

/// An open connection to the broker.
#[derive(Debug, Clone)]
pub struct BrokerConnection {
    channel: Channel,
    auth: AuthInterceptor,
}

impl BrokerConnection {
    /// Connect to the broker at `url` (e.g. `http://127.0.0.1:50051`).
    ///
    /// # Errors
    /// Fails if the URL is invalid, a credential is not valid metadata, or the
    /// broker cannot be reached.
    pub async fn connect(
        url: &str,
        api_key: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<Self> {
        let auth = AuthInterceptor::new(api_key, access_token)?;

        let channel = Channel::from_shared(url.to_string())
            .with_context(|| format!("Invalid broker URL: {}", url))?
            .connect()
            .await
            .with_context(|| format!("Cannot connect to broker at {}", url))?;

        info!(
            url = %url,
            api_key = api_key.is_some(),
            access_token = access_token.is_some(),
            "connected to broker"
        );

        Ok(Self { channel, auth })
    }

    fn system_client(&self) -> SystemServiceClient<AuthChannel> {
        SystemServiceClient::with_interceptor(self.channel.clone(), self.auth.clone())
    }

    fn network_client(&self) -> NetworkServiceClient<AuthChannel> {
        NetworkServiceClient::with_interceptor(self.channel.clone(), self.auth.clone())
    }

    /// Upload one file to `destination` on the broker.
    ///
    /// # Errors
    /// Fails if the file cannot be read, the call fails or the broker
    /// cancels the upload (e.g. checksum mismatch).
    pub async fn upload_file(&self, path: &Path, destination: &str) -> Result<()> {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let requests = upload::upload_requests(destination, &content);

        let reply = self
            .system_client()
            .upload_file(futures::stream::iter(requests))
            .await
            .with_context(|| format!("Upload of {} failed", path.display()))?
            .into_inner();

        match reply.data {
            Some(UploadReply::Finished(_)) => {
                debug!(
                    file = %path.display(),
                    destination,
                    bytes = content.len(),
                    "file uploaded"
                );
                Ok(())
            }
            Some(UploadReply::Cancelled(reason)) => {
                bail!("Broker cancelled upload of {}: {}", path.display(), reason)
            }
            None => bail!("Broker sent no upload result for {}", path.display()),
        }
    }

    /// Upload every file below `folder`, keeping its relative layout.
    /// Returns the number of files uploaded.
    ///
    /// # Errors
    /// Fails if the folder is missing or empty, or any file upload fails.
    pub async fn upload_folder(&self, folder: &Path) -> Result<usize> {
        let files = upload::collect_files(folder)?;
        for file in &files {
            let destination = upload::destination_path(folder, file)?;
            self.upload_file(file, &destination).await?;
        }
        info!(folder = %folder.display(), files = files.len(), "configuration uploaded");
        Ok(files.len())
    }

    /// Ask the broker to apply the uploaded configuration.  Returns the
    /// number of namespaces available afterwards.
    ///
    /// # Errors
    /// Fails if the call fails or the broker reports a configuration error.
    pub async fn reload_configuration(&self) -> Result<u32> {
        let reply = self
            .system_client()
            .reload_configuration(Empty {})
            .await
            .context("Configuration reload failed")?
            .into_inner();

        match reply.status {
            Some(ReloadStatus::Namespaces(namespaces)) => {
                info!(namespaces, "broker configuration reloaded");
                Ok(namespaces)
            }
            Some(ReloadStatus::ErrorMessage(message)) => {
                bail!("Broker rejected configuration: {}", message)
            }
            None => bail!("Broker sent no reload result"),
        }
    }

    /// List every frame (with its child signals and metadata) in `namespace`.
    ///
    /// # Errors
    /// Returns the broker's status, e.g. `NotFound` for an unknown namespace.
    pub async fn list_signals(&self, namespace: &str) -> Result<Vec<FrameInfo>, Status> {
        let request = NameSpace {
            name: namespace.to_string(),
        };
        let frames = self
            .system_client()
            .list_signals(request)
            .await?
            .into_inner()
            .frame;

        debug!(namespace = %namespace, frames = frames.len(), "signals listed");
        Ok(frames)
    }

    /// A publish sink on this connection.
    pub fn publisher(&self) -> GrpcPublisher {
        GrpcPublisher {
            client: self.network_client(),
        }
    }
}

// ── GrpcPublisher ─────────────────────────────────────────────────────────────

/// [`SignalPublisher`] that calls `NetworkService.PublishSignals`.
#[derive(Clone)]
pub struct GrpcPublisher {
    client: NetworkServiceClient<AuthChannel>,
}

/// Build the `PublisherConfig` for one batch.  `frequency` is `0`: the
/// broker publishes once, the restbus does its own cycling.
pub fn publisher_config(client_id: &str, batch: &[SignalValue]) -> PublisherConfig {
    PublisherConfig {
        signals: Some(Signals {
            signal: batch.iter().map(SignalValue::to_proto).collect(),
        }),
        client_id: Some(ClientId {
            id: client_id.to_string(),
        }),
        frequency: 0,
    }
}

impl SignalPublisher for GrpcPublisher {
    async fn publish(
        &mut self,
        client_id: &str,
        batch: Vec<SignalValue>,
    ) -> Result<(), PublishError> {
        let request = publisher_config(client_id, &batch);
        self.client.publish_signals(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalPayload;

    #[test]
    fn interceptor_adds_configured_metadata() {
        let mut auth = AuthInterceptor::new(Some("key-123"), Some("tok")).unwrap();
        let req = auth.call(Request::new(())).unwrap();
        assert_eq!(req.metadata().get("x-api-key").unwrap().to_str().unwrap(), "key-123");
        assert_eq!(
            req.metadata().get("authorization").unwrap().to_str().unwrap(),
            "Bearer tok"
        );
    }

    #[test]
    fn interceptor_without_credentials_adds_nothing() {
        let mut auth = AuthInterceptor::new(None, None).unwrap();
        let req = auth.call(Request::new(())).unwrap();
        assert!(req.metadata().is_empty());
    }

    #[test]
    fn credentials_with_newline_are_rejected() {
        assert!(AuthInterceptor::new(Some("bad\nkey"), None).is_err());
    }

    #[test]
    fn publisher_config_carries_client_and_signals() {
        let batch = vec![
            SignalValue::double("Speed", "ChassisBus", 12.5),
            SignalValue::new("Counter", "ChassisBus", SignalPayload::Integer(3)),
        ];
        let cfg = publisher_config("MyRestbus", &batch);

        assert_eq!(cfg.client_id.unwrap().id, "MyRestbus");
        assert_eq!(cfg.frequency, 0);
        let signals = cfg.signals.unwrap().signal;
        assert_eq!(signals.len(), 2);
        assert_eq!(SignalValue::from_proto(&signals[1]), batch[1]);
    }
}
