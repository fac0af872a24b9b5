pub mod config;
pub mod entry;
pub mod pool;

pub use config::MempoolConfig;
pub use entry::{AdmitOutcome, MempoolEntry, MempoolStats};
pub use pool::Mempool;
