//! Display frequency limits for messages that were already shown.

use super::models::RedisplayStats;
use super::store::{InAppMessageStore, StoredDisplayStats};
use crate::clock::Clock;
use anyhow::Result;
use std::sync::Arc;

pub struct RedisplayGate {
    clock: Arc<dyn Clock>,
    store: Arc<dyn InAppMessageStore>,
}

impl RedisplayGate {
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn InAppMessageStore>) -> Self {
        Self { clock, store }
    }

    /// Under the display limit and past the delay since the last display.
    ///
    /// When no display time is recorded yet the delay check passes and records
    /// the current time as the last display, even if nothing is shown after.
    pub fn can_show_again(&self, stats: &mut RedisplayStats) -> bool {
        let under_limit = stats.display_quantity < stats.display_limit;
        let delay_passed = self.delay_passed(stats);
        under_limit && delay_passed
    }

    fn delay_passed(&self, stats: &mut RedisplayStats) -> bool {
        let now = self.clock.now_secs();
        if stats.last_display_time_seconds < 0 {
            stats.last_display_time_seconds = now;
            return true;
        }
        now - stats.last_display_time_seconds >= stats.display_delay_seconds
    }

    /// Count a display happening now and persist the result.
    pub fn record_display(&self, message_id: &str, stats: &mut RedisplayStats) -> Result<()> {
        stats.display_quantity += 1;
        stats.last_display_time_seconds = self.clock.now_secs();
        self.store.save_stats(
            message_id,
            StoredDisplayStats {
                display_quantity: stats.display_quantity,
                last_display_time: stats.last_display_time_seconds,
            },
        )
    }
}
