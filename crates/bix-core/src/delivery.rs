use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bix_config::PipelineConfig;
use bix_types::{DateWindow, DeliveryReceipt, PipelineError, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// A file to hand to the mailbox.
#[derive(Debug, Clone)]
pub struct MailboxMessage {
    pub to: String,
    pub workflow_id: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Failure reported by a mailbox transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("mailbox rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected mailbox response: {0}")]
    BadResponse(String),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Secure message-delivery collaborator.
#[async_trait]
pub trait MailboxTransport: Send + Sync {
    /// Send with the transport's default options and return the message id.
    async fn send(&self, message: MailboxMessage) -> TransportResult<DeliveryReceipt>;
}

/// Mailbox credentials, resolved once by the entry point.
///
/// The key vault identifier is opaque here; it is only carried so logs can
/// say where the certificate came from.
pub struct MeshCredentials {
    identity: Option<reqwest::Identity>,
    key_vault: Option<String>,
}

impl MeshCredentials {
    /// Load the client certificate named in the configuration, if any.
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let identity = match &config.mesh_certificate_path {
            Some(path) => {
                let pem = std::fs::read(path).map_err(|e| PipelineError::fs(path, e))?;
                let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                    PipelineError::Config(format!(
                        "Invalid mailbox certificate {}: {e}",
                        path.display()
                    ))
                })?;
                Some(identity)
            }
            None => None,
        };
        Ok(Self {
            identity,
            key_vault: config.mesh_key_vault.clone(),
        })
    }

    /// No client certificate.
    pub fn anonymous() -> Self {
        Self {
            identity: None,
            key_vault: None,
        }
    }
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(alias = "messageId", alias = "messageID")]
    message_id: String,
}

/// HTTP client for the MESH mailbox API.
pub struct MeshMailboxClient {
    http: reqwest::Client,
    outbox_url: String,
    from: Option<String>,
}

impl MeshMailboxClient {
    pub fn new(config: &PipelineConfig, credentials: MeshCredentials) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        let has_certificate = credentials.identity.is_some();
        if let Some(identity) = credentials.identity {
            builder = builder.identity(identity);
        }
        let http = builder
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build mailbox client: {e}")))?;

        info!(
            url = %config.mesh_api_url,
            has_certificate,
            key_vault = credentials.key_vault.as_deref().unwrap_or("-"),
            "Mailbox client ready"
        );

        Ok(Self {
            http,
            outbox_url: format!("{}/outbox", config.mesh_api_url.trim_end_matches('/')),
            from: config.mesh_mailbox_from.clone(),
        })
    }
}

#[async_trait]
impl MailboxTransport for MeshMailboxClient {
    async fn send(&self, message: MailboxMessage) -> TransportResult<DeliveryReceipt> {
        let mut request = self
            .http
            .post(&self.outbox_url)
            .header("content-type", "application/octet-stream")
            .header("mex-to", message.to.as_str())
            .header("mex-workflowid", message.workflow_id.as_str())
            .header("mex-filename", message.file_name.as_str());
        if let Some(from) = &self.from {
            request = request.header("mex-from", from.as_str());
        }

        let response = request.body(message.content).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| TransportError::BadResponse(e.to_string()))?;
        Ok(DeliveryReceipt {
            message_id: parsed.message_id,
        })
    }
}

/// Sends the encrypted extract and removes it once the mailbox has it.
pub struct SecureDelivery {
    transport: Arc<dyn MailboxTransport>,
    to: String,
    workflow_id: String,
}

impl SecureDelivery {
    pub fn new(config: &PipelineConfig, transport: Arc<dyn MailboxTransport>) -> Self {
        Self {
            transport,
            to: config.mesh_mailbox_to.clone(),
            workflow_id: config.mesh_workflow_id.clone(),
        }
    }

    /// Send the file at `ciphertext_path` exported for `window`, then delete it.
    ///
    /// The file is kept when the send fails.
    pub async fn deliver(
        &self,
        ciphertext_path: &Path,
        window: &DateWindow,
    ) -> Result<DeliveryReceipt> {
        let content = tokio::fs::read(ciphertext_path)
            .await
            .map_err(|e| PipelineError::fs(ciphertext_path, e))?;
        let file_name = file_name_of(ciphertext_path);
        debug!(%file_name, bytes = content.len(), "Sending encrypted extract");

        let message = MailboxMessage {
            to: self.to.clone(),
            workflow_id: self.workflow_id.clone(),
            file_name: file_name.clone(),
            content,
        };

        let receipt = self
            .transport
            .send(message)
            .await
            .map_err(|e| PipelineError::Delivery {
                file_name: file_name.clone(),
                window: *window,
                reason: e.to_string(),
            })?;
        info!(%file_name, message_id = %receipt.message_id, "Extract delivered");

        tokio::fs::remove_file(ciphertext_path)
            .await
            .map_err(|e| PipelineError::fs(ciphertext_path, e))?;
        Ok(receipt)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
