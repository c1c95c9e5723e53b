//! Run-loop settings for a router.
//!
//! These control how the router divides its time between tasks, timers and
//! the control channel. They are separate from the graph description so a
//! router built in code can use them too.

use crate::router::task::{DEFAULT_TICKETS, MAX_TICKETS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of tasks run per loop iteration before timers are checked again
pub const DEFAULT_TASKS_PER_ITERATION: usize = 64;

/// Default upper bound on how long the loop blocks when idle
pub const DEFAULT_MAX_TIMER_WAIT_MS: u64 = 1000;

/// Default depth of the control command channel
pub const DEFAULT_COMMAND_QUEUE_DEPTH: usize = 64;

/// Settings for the router's run loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Tasks run per loop iteration before timers and commands are checked
    #[serde(default = "default_tasks_per_iteration")]
    pub tasks_per_iteration: usize,

    /// Longest the loop blocks waiting for a timer or command, in milliseconds
    #[serde(default = "default_max_timer_wait_ms")]
    pub max_timer_wait_ms: u64,

    /// Tickets given to tasks that do not ask for a specific share
    #[serde(default = "default_tickets")]
    pub default_tickets: u32,

    /// Capacity of the control command channel
    #[serde(default = "default_command_queue_depth")]
    pub command_queue_depth: usize,
}

fn default_tasks_per_iteration() -> usize {
    DEFAULT_TASKS_PER_ITERATION
}

fn default_max_timer_wait_ms() -> u64 {
    DEFAULT_MAX_TIMER_WAIT_MS
}

fn default_tickets() -> u32 {
    DEFAULT_TICKETS
}

fn default_command_queue_depth() -> usize {
    DEFAULT_COMMAND_QUEUE_DEPTH
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            tasks_per_iteration: DEFAULT_TASKS_PER_ITERATION,
            max_timer_wait_ms: DEFAULT_MAX_TIMER_WAIT_MS,
            default_tickets: DEFAULT_TICKETS,
            command_queue_depth: DEFAULT_COMMAND_QUEUE_DEPTH,
        }
    }
}

impl RouterSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest the loop may block when idle
    pub fn max_timer_wait(&self) -> Duration {
        Duration::from_millis(self.max_timer_wait_ms)
    }

    /// Check values the run loop cannot work with
    pub fn validate(&self) -> Result<(), String> {
        if self.tasks_per_iteration == 0 {
            return Err("tasks_per_iteration must be at least 1".to_string());
        }
        if self.default_tickets == 0 || self.default_tickets > MAX_TICKETS {
            return Err(format!(
                "default_tickets must be between 1 and {}, got {}",
                MAX_TICKETS, self.default_tickets
            ));
        }
        if self.command_queue_depth == 0 {
            return Err("command_queue_depth must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RouterSettings::default();
        assert_eq!(settings.tasks_per_iteration, 64);
        assert_eq!(settings.max_timer_wait(), Duration::from_secs(1));
        assert_eq!(settings.default_tickets, 1024);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: RouterSettings = serde_json::from_str(r#"{"tasks_per_iteration": 8}"#).unwrap();
        assert_eq!(settings.tasks_per_iteration, 8);
        assert_eq!(settings.command_queue_depth, DEFAULT_COMMAND_QUEUE_DEPTH);
    }

    #[test]
    fn test_validate_rejects_bad_tickets() {
        let settings = RouterSettings {
            default_tickets: MAX_TICKETS + 1,
            ..Default::default()
        };
        assert!(settings.validate().unwrap_err().contains("default_tickets"));
    }
}
