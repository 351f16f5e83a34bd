pub mod coordinator;
pub mod delivery;
pub mod encryption;
pub mod extract_fetcher;
pub mod logging;
pub mod row_encoder;
pub mod scheduler;
pub mod utils;
pub mod workspace_guard;

#[cfg(test)]
mod test_support;

pub use coordinator::RunCoordinator;
pub use delivery::{
    MailboxMessage, MailboxTransport, MeshCredentials, MeshMailboxClient, SecureDelivery,
    TransportError, TransportResult,
};
pub use encryption::{
    EncryptionOrchestrator, ProcessToolRunner, ToolInvocation, ToolRunner, ENCRYPTION_TIMEOUT,
};
pub use extract_fetcher::{decode_batch, BiApiClient, ExtractSource};
pub use logging::init_logging;
pub use row_encoder::{encode_batch, encode_row, header_columns, ROW_MARKER};
pub use scheduler::{parse_schedule, ExportScheduler};
pub use utils::{ShutdownListener, ShutdownSignal};
pub use workspace_guard::ensure_empty_staging;
