//! Per-user command cooldown
//!
//! One entry per user. The command class is recorded but does not scope the
//! window: any command by the same user counts against the same cooldown.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Default cooldown between two commands from the same user
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);

/// Last allowed invocation for a user
#[derive(Debug, Clone)]
pub struct CooldownEntry {
    pub command_class: String,
    pub last_invoked: Instant,
}

/// Shared cooldown tracker
#[derive(Debug, Clone)]
pub struct ThrottleGuard {
    window: Duration,
    entries: Arc<DashMap<u64, CooldownEntry>>,
}

impl Default for ThrottleGuard {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl ThrottleGuard {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Check and record an invocation
    ///
    /// Returns true and records `(command_class, now)` when the user has no entry
    /// or the last one is at least one window old. Otherwise returns false and
    /// leaves the entry untouched. The check and the write happen under the same
    /// map entry lock.
    pub fn allow(&self, user_id: u64, command_class: &str) -> bool {
        let now = Instant::now();
        let fresh = CooldownEntry {
            command_class: command_class.to_string(),
            last_invoked: now,
        };

        match self.entries.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                let elapsed = now.saturating_duration_since(occupied.get().last_invoked);
                if elapsed < self.window {
                    debug!(
                        user_id,
                        command_class,
                        last_command = %occupied.get().command_class,
                        remaining_ms = u64::try_from((self.window - elapsed).as_millis()).unwrap_or_default(),
                        "Command throttled"
                    );
                    return false;
                }
                occupied.insert(fresh);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        }
    }

    /// The command class recorded for the user's last allowed invocation
    #[must_use]
    pub fn last_command(&self, user_id: u64) -> Option<String> {
        self.entries
            .get(&user_id)
            .map(|entry| entry.command_class.clone())
    }
}
