//! Fixed-window command quota, one per session.

use officeclaw_core::config::RateLimitConfig;

/// Command counter for the current window of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandQuota {
    window_start_ms: Option<i64>,
    count: u32,
}

impl CommandQuota {
    /// Take one command from the quota at time `now_ms`.
    ///
    /// Returns `Err(retry_after_ms)` when the window is exhausted; the
    /// rejected command does not count against the window.
    pub fn consume(&mut self, now_ms: i64, limit: RateLimitConfig) -> Result<(), u64> {
        let limit = limit.bounded();
        let window_ms = i64::try_from(limit.window_ms).unwrap_or(i64::MAX);

        let expired = self
            .window_start_ms
            .is_none_or(|start| now_ms.saturating_sub(start) >= window_ms);
        if expired {
            self.window_start_ms = Some(now_ms);
            self.count = 0;
        }

        if self.count >= limit.max_commands {
            let elapsed = self
                .window_start_ms
                .map_or(0, |start| now_ms.saturating_sub(start));
            let retry_after = window_ms.saturating_sub(elapsed).max(0);
            return Err(u64::try_from(retry_after).unwrap_or(0));
        }

        self.count = self.count.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: RateLimitConfig = RateLimitConfig {
        max_commands: 2,
        window_ms: 1000,
    };

    #[test]
    fn window_admits_up_to_the_limit() {
        let mut quota = CommandQuota::default();
        assert_eq!(quota.consume(10_000, LIMIT), Ok(()));
        assert_eq!(quota.consume(10_100, LIMIT), Ok(()));
        assert_eq!(quota.consume(10_400, LIMIT), Err(600));
        assert_eq!(quota.consume(10_999, LIMIT), Err(1));
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let mut quota = CommandQuota::default();
        assert!(quota.consume(0, LIMIT).is_ok());
        assert!(quota.consume(1, LIMIT).is_ok());
        assert!(quota.consume(2, LIMIT).is_err());
        assert!(quota.consume(1000, LIMIT).is_ok());
        assert!(quota.consume(1001, LIMIT).is_ok());
        assert!(quota.consume(1002, LIMIT).is_err());
    }

    #[test]
    fn limits_are_floored() {
        let mut quota = CommandQuota::default();
        let zero = RateLimitConfig {
            max_commands: 0,
            window_ms: 10,
        };
        assert!(quota.consume(0, zero).is_ok());
        // Window is raised to 250 ms.
        assert_eq!(quota.consume(100, zero), Err(150));
        assert!(quota.consume(250, zero).is_ok());
    }
}
