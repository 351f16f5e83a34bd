//! Shared fixtures for unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bix_config::PipelineConfig;
use bix_types::{DateWindow, DeliveryReceipt, ExtractBatch, ProcessOutcome, Result};

use crate::delivery::{MailboxMessage, MailboxTransport, TransportError, TransportResult};
use crate::encryption::{ToolInvocation, ToolRunner};
use crate::extract_fetcher::ExtractSource;

pub const TEST_MESSAGE_ID: &str = "00000000-0000-0000-0000-000000000001";

pub fn test_config(staging: &Path) -> PipelineConfig {
    PipelineConfig {
        staging_dir: staging.to_path_buf(),
        plaintext_filename: "testfile.csv".to_string(),
        ciphertext_filename: "testfile_enc.csv".to_string(),
        tool_path: PathBuf::from("/opt/agem/agem-pipe"),
        tool_working_dir: PathBuf::from("/opt/agem"),
        tool_config_name: "WMS Config".to_string(),
        tool_column_actions: "0:P,1:E".to_string(),
        tool_success_marker: "Success".to_string(),
        retain_plaintext_after_encryption: false,
        bi_api_url: "http://127.0.0.1:9/api/referrals".to_string(),
        bi_api_key: "key-123".to_string(),
        bi_api_key_header: "X-API-KEY".to_string(),
        bi_api_timeout_secs: 5,
        mesh_api_url: "http://127.0.0.1:9/mesh".to_string(),
        mesh_mailbox_from: Some("X26OT001".to_string()),
        mesh_mailbox_to: "X26OT123".to_string(),
        mesh_workflow_id: "WMS_REFERRALS".to_string(),
        mesh_certificate_path: None,
        mesh_key_vault: None,
        export_schedule: "0 2 * * *".to_string(),
        export_lookback_days: 7,
        log_level: "debug".to_string(),
        log_file: None,
        log_json: false,
    }
}

/// Extract source answering every window with the same closure.
pub struct StaticSource(Box<dyn Fn(&DateWindow) -> Result<ExtractBatch> + Send + Sync>);

impl StaticSource {
    pub fn new(f: impl Fn(&DateWindow) -> Result<ExtractBatch> + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }
}

#[async_trait]
impl ExtractSource for StaticSource {
    async fn fetch(&self, window: &DateWindow) -> Result<ExtractBatch> {
        (self.0)(window)
    }
}

/// Runner that returns a fixed outcome and optionally writes the output file.
pub struct FakeRunner {
    pub outcome: ProcessOutcome,
    pub write_output: bool,
    pub calls: AtomicUsize,
}

impl FakeRunner {
    pub fn new(outcome: ProcessOutcome, write_output: bool) -> Self {
        Self {
            outcome,
            write_output,
            calls: AtomicUsize::new(0),
        }
    }

    /// Tool that prints the success marker and produces the output file.
    pub fn succeeding() -> Self {
        Self::new(ProcessOutcome::exited("Success", Some(0)), true)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, invocation: &ToolInvocation, _timeout: Duration) -> ProcessOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.write_output {
            std::fs::write(&invocation.args[3], b"ENCRYPTED").unwrap();
        }
        self.outcome.clone()
    }
}

/// Transport that records what it was given.
pub struct RecordingTransport {
    pub sent: Mutex<Vec<MailboxMessage>>,
    pub fail: bool,
}

impl RecordingTransport {
    pub fn new(fail: bool) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail,
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailboxTransport for RecordingTransport {
    async fn send(&self, message: MailboxMessage) -> TransportResult<DeliveryReceipt> {
        if self.fail {
            return Err(TransportError::Rejected {
                status: 403,
                body: "mailbox locked".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(DeliveryReceipt {
            message_id: TEST_MESSAGE_ID.to_string(),
        })
    }
}

/// Spawn an axum app on an ephemeral port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
