//! Server configuration.
//!
//! Every tunable in the protocol engine reads from here: queue capacity,
//! history bounds, webhook retry policy, and the blocking-send / cancel
//! timeouts. Values can be embedded (struct literal or `Default`) or pulled
//! from the environment with [`ServerConfig::from_env`].

use std::time::Duration;

use tracing::warn;

/// Environment variable prefix for [`ServerConfig::from_env`].
const ENV_PREFIX: &str = "A2A_";

/// Configuration for an A2A server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of messages kept in a task's history; older entries
    /// are truncated from the front.
    pub max_history_length: usize,

    /// Per-attempt webhook read/open timeout in seconds.
    pub webhook_timeout_seconds: u64,

    /// Total delivery attempts before a push config is marked inactive.
    pub max_webhook_attempts: u32,

    /// Base delay for webhook retry backoff, in seconds.
    pub retry_base_seconds: f64,

    /// Cap on the webhook retry delay, in seconds.
    pub retry_max_seconds: f64,

    /// Bounded capacity of each per-request event queue.
    pub event_queue_capacity: usize,

    /// How long a blocking `message/send` waits for a terminal state.
    pub sync_send_timeout_seconds: u64,

    /// Grace period for the canceled status to appear after `tasks/cancel`,
    /// in milliseconds.
    pub cancel_grace_millis: u64,

    /// How long a publisher may block on a stalled subscriber before that
    /// subscriber is dropped, in seconds.
    pub idle_write_timeout_seconds: u64,

    /// Default MIME types the agent accepts.
    pub default_input_modes: Vec<String>,

    /// Default MIME types the agent produces.
    pub default_output_modes: Vec<String>,

    /// Whether `message/stream` / `tasks/resubscribe` are offered.
    pub streaming_enabled: bool,

    /// Whether webhook push notifications are offered.
    pub push_notifications_enabled: bool,

    /// Protocol version advertised in the agent card.
    pub protocol_version: String,

    /// Mount prefix for the RPC and extended-card routes.
    pub rpc_mount_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_history_length: 100,
            webhook_timeout_seconds: 30,
            max_webhook_attempts: 5,
            retry_base_seconds: 1.0,
            retry_max_seconds: 60.0,
            event_queue_capacity: 256,
            sync_send_timeout_seconds: 30,
            cancel_grace_millis: 100,
            idle_write_timeout_seconds: 10,
            default_input_modes: vec!["text/plain".to_string()],
            default_output_modes: vec!["text/plain".to_string()],
            streaming_enabled: true,
            push_notifications_enabled: true,
            protocol_version: "0.3.0".to_string(),
            rpc_mount_prefix: "/a2a".to_string(),
        }
    }
}

impl ServerConfig {
    /// Build a configuration from `A2A_*` environment variables, falling
    /// back to defaults for anything absent or unparseable (unparseable
    /// values are logged and ignored).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        read_env("MAX_HISTORY_LENGTH", &mut config.max_history_length);
        read_env("WEBHOOK_TIMEOUT_SECONDS", &mut config.webhook_timeout_seconds);
        read_env("MAX_WEBHOOK_ATTEMPTS", &mut config.max_webhook_attempts);
        read_env("RETRY_BASE_SECONDS", &mut config.retry_base_seconds);
        read_env("RETRY_MAX_SECONDS", &mut config.retry_max_seconds);
        read_env("EVENT_QUEUE_CAPACITY", &mut config.event_queue_capacity);
        read_env(
            "SYNC_SEND_TIMEOUT_SECONDS",
            &mut config.sync_send_timeout_seconds,
        );
        read_env("CANCEL_GRACE_MILLIS", &mut config.cancel_grace_millis);
        read_env(
            "IDLE_WRITE_TIMEOUT_SECONDS",
            &mut config.idle_write_timeout_seconds,
        );
        read_env("STREAMING_ENABLED", &mut config.streaming_enabled);
        read_env(
            "PUSH_NOTIFICATIONS_ENABLED",
            &mut config.push_notifications_enabled,
        );

        if let Ok(raw) = std::env::var(format!("{}PROTOCOL_VERSION", ENV_PREFIX)) {
            config.protocol_version = raw;
        }
        if let Ok(raw) = std::env::var(format!("{}RPC_MOUNT_PREFIX", ENV_PREFIX)) {
            config.rpc_mount_prefix = raw;
        }
        if let Ok(raw) = std::env::var(format!("{}DEFAULT_INPUT_MODES", ENV_PREFIX)) {
            config.default_input_modes = split_modes(&raw);
        }
        if let Ok(raw) = std::env::var(format!("{}DEFAULT_OUTPUT_MODES", ENV_PREFIX)) {
            config.default_output_modes = split_modes(&raw);
        }

        config
    }

    /// Per-attempt webhook timeout as a `Duration`.
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_seconds)
    }

    /// Blocking-send timeout as a `Duration`.
    pub fn sync_send_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_send_timeout_seconds)
    }

    /// Cancel grace period as a `Duration`.
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_millis)
    }

    /// Idle-write timeout as a `Duration`.
    pub fn idle_write_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_write_timeout_seconds)
    }
}

fn read_env<T: std::str::FromStr>(name: &str, slot: &mut T) {
    let key = format!("{}{}", ENV_PREFIX, name);
    if let Ok(raw) = std::env::var(&key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => warn!(var = %key, value = %raw, "Ignoring unparseable config value"),
        }
    }
}

fn split_modes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.max_history_length, 100);
        assert_eq!(config.webhook_timeout_seconds, 30);
        assert_eq!(config.max_webhook_attempts, 5);
        assert_eq!(config.retry_base_seconds, 1.0);
        assert_eq!(config.retry_max_seconds, 60.0);
        assert_eq!(config.event_queue_capacity, 256);
        assert_eq!(config.sync_send_timeout_seconds, 30);
        assert_eq!(config.cancel_grace_millis, 100);
        assert_eq!(config.idle_write_timeout_seconds, 10);
        assert!(config.streaming_enabled);
        assert!(config.push_notifications_enabled);
        assert_eq!(config.rpc_mount_prefix, "/a2a");
    }

    #[test]
    fn mode_lists_split_on_commas() {
        assert_eq!(
            split_modes("text/plain, application/json"),
            vec!["text/plain".to_string(), "application/json".to_string()]
        );
        assert!(split_modes("").is_empty());
    }
}
