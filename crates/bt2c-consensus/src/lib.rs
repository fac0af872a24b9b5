pub mod config;
pub mod election;
pub mod engine;
pub mod events;
pub mod registry;
pub mod slashing;
pub mod votes;

pub use config::ConsensusConfig;
pub use election::{select_proposer, validator_weight};
pub use engine::{CommitPipeline, ConsensusEngine, EngineHandle, EngineInput, GossipOut};
pub use events::ConsensusEvent;
pub use registry::{Validator, ValidatorRegistry, ValidatorState};
pub use slashing::{apply_offense, classify, Offense, Severity, SlashOutcome};
pub use votes::{RecordOutcome, Vote, VoteKind, VoteTracker};
