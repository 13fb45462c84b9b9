// Application state (AppState)

use crate::auth::session::SessionKey;
use crate::bonus::scheduler::DelayRange;
use crate::bonus::window::BonusWindow;
use crate::core::config::Config;
use crate::stores::user_store::UserStore;
use crate::wal::wal::Wal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Shared application state
///
/// Handed to every request handler behind an `Arc`.
pub struct AppState {
    /// Durable user records
    pub users: UserStore,

    /// Global bonus flag, also driven by the background scheduler
    pub bonus: Arc<BonusWindow>,

    /// Per-process key signing session cookies
    pub sessions: SessionKey,

    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, wal: Wal) -> Self {
        let config = Arc::new(config);

        let first_activation = Instant::now() + DelayRange::from_config(&config.bonus).sample();
        let bonus = Arc::new(BonusWindow::new(
            first_activation,
            Duration::from_secs(config.bonus.duration_secs),
        ));

        Self {
            users: UserStore::new(wal),
            bonus,
            sessions: SessionKey::generate(),
            config,
        }
    }
}
