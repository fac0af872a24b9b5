//! Commit-time ledger checks.
//!
//! A fixed list of typed predicates, composed at construction and invoked
//! after every commit (and periodically by the node). A failing check is an
//! internal invariant break: the engine halts with a diagnostic.

use bt2c_core::error::Bt2cError;

use crate::machine::StateMachine;

pub type StateCheck = fn(&StateMachine) -> Result<(), Bt2cError>;

/// The standard check suite.
pub fn standard_checks() -> Vec<StateCheck> {
    vec![conservation, supply_cap]
}

/// Run every check, stopping at the first failure.
pub fn run_checks(state: &StateMachine, checks: &[StateCheck]) -> Result<(), Bt2cError> {
    for check in checks {
        check(state)?;
    }
    Ok(())
}

/// balances + stakes must equal issued rewards + genesis allocations,
/// less anything destroyed by slashing.
fn conservation(state: &StateMachine) -> Result<(), Bt2cError> {
    let held = state.sum_balances() + state.sum_stakes();
    let issued = state.minted_supply() + state.genesis_stake() - state.burned();
    if held != issued {
        return Err(Bt2cError::EngineHalted(format!(
            "conservation violated: held {held} sat, issued {issued} sat"
        )));
    }
    Ok(())
}

/// Issued supply must never exceed the cap.
fn supply_cap(state: &StateMachine) -> Result<(), Bt2cError> {
    let minted = state.minted_supply();
    let cap = state.config().max_supply;
    if minted > cap {
        return Err(Bt2cError::EngineHalted(format!(
            "supply cap exceeded: minted {minted} sat, cap {cap} sat"
        )));
    }
    Ok(())
}
