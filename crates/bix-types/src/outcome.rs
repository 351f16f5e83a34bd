use serde::{Deserialize, Serialize};

use crate::window::DateWindow;

/// Observed behaviour of one encryption tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// The process was spawned.
    pub started: bool,
    /// The process exited before the deadline.
    pub exited: bool,
    /// Everything the process wrote to stdout.
    pub stdout: String,
    pub exit_code: Option<i32>,
    /// Why the process could not be started or waited on.
    pub failure: Option<String>,
}

impl ProcessOutcome {
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn timed_out() -> Self {
        Self {
            started: true,
            ..Default::default()
        }
    }

    pub fn exited(stdout: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            started: true,
            exited: true,
            stdout: stdout.into(),
            exit_code,
            failure: None,
        }
    }
}

/// Identifier the mailbox assigned to a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSummary {
    Sent {
        file_name: String,
        referrals: usize,
        receipt: DeliveryReceipt,
    },
    /// The window held no referrals; no file was written or sent.
    NothingToSend { window: DateWindow },
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent {
                file_name,
                referrals,
                receipt,
            } => write!(
                f,
                "'{file_name}' containing {referrals} referrals sent successfully to \
                 MeshMailboxApi with message id: {}.",
                receipt.message_id
            ),
            Self::NothingToSend { window } => {
                write!(f, "No referrals found {window}; nothing was sent.")
            }
        }
    }
}
