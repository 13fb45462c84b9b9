use anyhow::{Context, Result};
use tracing::info;

use crate::core::state::AppState;

// this runs at boot time, before the listener accepts connections
pub fn restore_users(state: &AppState) -> Result<()> {
    let operations = state
        .users
        .wal()
        .replay()
        .context("Failed to replay WAL")?;

    state.users.apply_operations(&operations);

    let mut kept = operations.len();
    if state.users.snapshot().len() < operations.len() {
        kept = state.users.compact().context("Failed to compact WAL")?;
    }

    info!(
        operations_replayed = operations.len(),
        operations_kept = kept,
        users_loaded = state.users.len(),
        "WAL replay completed"
    );

    Ok(())
}
