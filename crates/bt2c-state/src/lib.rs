pub mod checks;
pub mod config;
pub mod machine;
pub mod rewards;

pub use checks::{run_checks, standard_checks, StateCheck};
pub use config::ChainConfig;
pub use machine::{Account, StateMachine, StateSnapshot};
pub use rewards::{capped_reward, scheduled_reward};
