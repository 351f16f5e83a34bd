use std::path::Path;
use std::sync::Arc;

use bix_config::PipelineConfig;
use bix_types::{DateWindow, Result, RunSummary};
use tracing::{debug, error, info, warn, Instrument};

use crate::delivery::{MailboxTransport, SecureDelivery};
use crate::encryption::{EncryptionOrchestrator, ToolRunner};
use crate::extract_fetcher::ExtractSource;
use crate::row_encoder::encode_batch;
use crate::workspace_guard::ensure_empty_staging;

/// Runs one export end to end.
///
/// Stages run strictly in order and the first failure ends the run:
/// staging guard → fetch → encode → encrypt → deliver.
pub struct RunCoordinator {
    config: PipelineConfig,
    source: Arc<dyn ExtractSource>,
    encryption: EncryptionOrchestrator,
    delivery: SecureDelivery,
}

impl RunCoordinator {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn ExtractSource>,
        runner: Arc<dyn ToolRunner>,
        transport: Arc<dyn MailboxTransport>,
    ) -> Self {
        let delivery = SecureDelivery::new(&config, transport);
        let encryption = EncryptionOrchestrator::new(config.clone(), runner);
        Self {
            config,
            source,
            encryption,
            delivery,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Export every referral in `window`.
    pub async fn run(&self, window: DateWindow) -> Result<RunSummary> {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("export_run", %run_id, %window);
        self.run_inner(window).instrument(span).await
    }

    async fn run_inner(&self, window: DateWindow) -> Result<RunSummary> {
        info!("Export run started");

        // Nothing this run created exists yet, so a guard failure needs no cleanup.
        if let Err(e) = ensure_empty_staging(&self.config.staging_dir).await {
            error!(kind = e.kind(), error = %e, "Export run refused");
            return Err(e);
        }

        match self.stages(window).await {
            Ok(summary) => {
                info!(%summary, "Export run finished");
                Ok(summary)
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Export run failed");
                if e.skips_cleanup() {
                    warn!(
                        dir = %self.config.staging_dir.display(),
                        "Staging files left in place for review"
                    );
                } else {
                    self.cleanup().await;
                }
                Err(e)
            }
        }
    }

    async fn stages(&self, window: DateWindow) -> Result<RunSummary> {
        let batch = self.source.fetch(&window).await?;
        if batch.is_empty() {
            info!("Reporting API returned no referrals");
            return Ok(RunSummary::NothingToSend { window });
        }

        let plaintext = encode_batch(&batch);
        debug!(rows = batch.len(), bytes = plaintext.len(), "Extract encoded");

        let ciphertext_path = self.encryption.encrypt(&plaintext).await?;
        drop(plaintext);

        let receipt = self.delivery.deliver(&ciphertext_path, &window).await?;

        Ok(RunSummary::Sent {
            file_name: self.config.ciphertext_filename.clone(),
            referrals: batch.len(),
            receipt,
        })
    }

    async fn cleanup(&self) {
        for path in [self.config.plaintext_path(), self.config.ciphertext_path()] {
            remove_if_present(&path).await;
        }
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "Removed staging file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!(path = %path.display(), error = %e, "Failed to remove staging file"),
    }
}
