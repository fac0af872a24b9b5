pub mod checkpoint;
pub mod config;
pub mod log;
pub mod side;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::StoreConfig;
pub use log::{BlockLocator, BlockStore, FileId};
pub use side::{AddressIndex, AddressIndexSnapshot};
