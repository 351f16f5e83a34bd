pub mod shutdown;

pub use shutdown::{ShutdownListener, ShutdownSignal};
