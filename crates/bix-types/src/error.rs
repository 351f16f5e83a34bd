use std::path::PathBuf;

use thiserror::Error;

use crate::window::DateWindow;

/// Every way a pipeline run can fail.
///
/// Each variant is fatal to the run. Nothing here is retried internally.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Found {count} stray file(s) in staging directory {}. They have been deleted, but their \
         presence means an earlier run did not finish cleanly. Investigate before the next run.",
        dir.display()
    )]
    WorkspaceDirty { count: usize, dir: PathBuf },

    #[error("{method} {uri} failed: {reason}")]
    UpstreamTransport {
        method: String,
        uri: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Reporting API returned no content for window {window}")]
    UpstreamEmptyWindow { window: DateWindow },

    #[error("Malformed reporting API response: {0}")]
    UpstreamMalformed(String),

    #[error("Failed to start encryption tool with arguments [{arguments}]: {reason}")]
    ToolLaunch { arguments: String, reason: String },

    #[error("Encryption tool did not exit within {timeout_ms}ms, arguments [{arguments}]")]
    ToolTimeout { arguments: String, timeout_ms: u64 },

    #[error("Lost track of encryption tool with arguments [{arguments}]: {reason}")]
    ToolWait { arguments: String, reason: String },

    #[error("Encryption tool output '{actual}' does not match expected '{expected}'")]
    ToolOutputMismatch { actual: String, expected: String },

    #[error("Encryption tool reported success but {} does not exist", path.display())]
    MissingEncryptedOutput { path: PathBuf },

    #[error(
        "Plaintext file {} was retained because RetainPlaintextAfterEncryption is true. \
         Review and manually delete the plaintext and encrypted files.",
        path.display()
    )]
    RetainedPlaintext { path: PathBuf },

    #[error("Failed to deliver '{file_name}' for window {window} to the mailbox: {reason}")]
    Delivery {
        file_name: String,
        window: DateWindow,
        reason: String,
    },
}

impl PipelineError {
    /// Wrap an io error with the path it concerns.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Stable label for logs and exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::FileSystem { .. } => "file_system",
            Self::WorkspaceDirty { .. } => "workspace_dirty",
            Self::UpstreamTransport { .. } => "upstream_transport",
            Self::UpstreamEmptyWindow { .. } => "upstream_empty_window",
            Self::UpstreamMalformed(_) => "upstream_malformed",
            Self::ToolLaunch { .. } => "tool_launch",
            Self::ToolTimeout { .. } => "tool_timeout",
            Self::ToolWait { .. } => "tool_wait",
            Self::ToolOutputMismatch { .. } => "tool_output_mismatch",
            Self::MissingEncryptedOutput { .. } => "missing_encrypted_output",
            Self::RetainedPlaintext { .. } => "retained_plaintext",
            Self::Delivery { .. } => "delivery",
        }
    }

    /// Files created by the run must stay on disk for manual review.
    pub fn skips_cleanup(&self) -> bool {
        matches!(self, Self::RetainedPlaintext { .. })
    }
}

/// Convenience type alias.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PipelineError::Config("missing BI_API_URL".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing BI_API_URL");
    }

    #[test]
    fn workspace_dirty_names_count_and_dir() {
        let err = PipelineError::WorkspaceDirty {
            count: 2,
            dir: PathBuf::from("/srv/staging"),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 stray file(s)"));
        assert!(msg.contains("/srv/staging"));
        assert!(msg.contains("Investigate"));
    }

    #[test]
    fn mismatch_names_both_strings() {
        let err = PipelineError::ToolOutputMismatch {
            actual: "Success_NoMatchWithStandard".to_string(),
            expected: "Success".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'Success_NoMatchWithStandard'"));
        assert!(msg.contains("'Success'"));
    }

    #[test]
    fn retained_plaintext_names_flag() {
        let err = PipelineError::RetainedPlaintext {
            path: PathBuf::from("/srv/staging/testfile.csv"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/srv/staging/testfile.csv"));
        assert!(msg.contains("RetainPlaintextAfterEncryption is true"));
    }

    #[test]
    fn only_retention_skips_cleanup() {
        let retained = PipelineError::RetainedPlaintext {
            path: PathBuf::from("p"),
        };
        let missing = PipelineError::MissingEncryptedOutput {
            path: PathBuf::from("c"),
        };
        assert!(retained.skips_cleanup());
        assert!(!missing.skips_cleanup());
        assert_eq!(retained.kind(), "retained_plaintext");
    }

    #[test]
    fn delivery_names_file_and_window() {
        let window = DateWindow::from_dates(
            chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
        )
        .unwrap();
        let err = PipelineError::Delivery {
            file_name: "testfile_enc.csv".to_string(),
            window,
            reason: "mailbox locked".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to deliver 'testfile_enc.csv' for window \
             From 2024-03-01T00:00:00Z To 2024-03-08T00:00:00Z to the mailbox: mailbox locked"
        );
    }

    #[test]
    fn fs_error_carries_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = PipelineError::fs("/tmp/x.csv", io_err);
        assert!(err.to_string().contains("/tmp/x.csv"));
        assert!(err.to_string().contains("file not found"));
    }
}
