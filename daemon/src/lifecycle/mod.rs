//! Process lifecycle: signal handling and cooperative shutdown

mod shutdown;

pub use shutdown::ShutdownSignal;
