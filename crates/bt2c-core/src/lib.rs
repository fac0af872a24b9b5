pub mod block;
pub mod codec;
pub mod constants;
pub mod error;
pub mod transaction;
pub mod types;

pub use block::Block;
pub use codec::CanonicalEncode;
pub use constants::*;
pub use error::Bt2cError;
pub use transaction::{Transaction, TxKind};
pub use types::*;
