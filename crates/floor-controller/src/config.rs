//! Floor Controller configuration.
//!
//! Configuration is loaded from environment variables. Per-room floor
//! parameters live in [`FloorConfig`]; the service-level [`Config`] carries
//! the defaults every new room starts with.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address (WebSocket sessions, floor state, health, metrics).
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "0.0.0.0:8090";

/// Default maximum number of rooms per instance.
pub const DEFAULT_MAX_ROOMS: usize = 1000;

/// Default maximum time a single grant may hold the floor, in seconds.
pub const DEFAULT_MAX_DURATION_SECONDS: u64 = 30;

/// Default grace interval between a release and the next grant, in milliseconds.
pub const DEFAULT_COOLDOWN_MS: u64 = 500;

/// Default time a holder may stay silent before the watchdog revokes the floor, in seconds.
pub const DEFAULT_ACTIVITY_TIMEOUT_SECONDS: u64 = 10;

/// Default lowest request priority.
pub const DEFAULT_PRIORITY_MIN: u8 = 0;

/// Default highest request priority.
pub const DEFAULT_PRIORITY_MAX: u8 = 10;

/// Default priority for requests that do not specify one.
pub const DEFAULT_PRIORITY: u8 = 1;

/// Default maximum number of queued requests per room.
pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 64;

/// Default graceful shutdown timeout, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 10;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "fc";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Floor parameters for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorConfig {
    /// Upper bound on a single grant's speaking time.
    pub max_duration: Duration,
    /// Grace interval in `cooldown` before the next grant.
    pub cooldown: Duration,
    /// Silence allowed before the watchdog revokes the floor.
    pub activity_timeout: Duration,
    pub priority_min: u8,
    pub priority_max: u8,
    pub default_priority: u8,
    pub max_queue_length: usize,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(DEFAULT_MAX_DURATION_SECONDS),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            activity_timeout: Duration::from_secs(DEFAULT_ACTIVITY_TIMEOUT_SECONDS),
            priority_min: DEFAULT_PRIORITY_MIN,
            priority_max: DEFAULT_PRIORITY_MAX,
            default_priority: DEFAULT_PRIORITY,
            max_queue_length: DEFAULT_MAX_QUEUE_LENGTH,
        }
    }
}

impl FloorConfig {
    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_duration.is_zero() {
            return Err(ConfigError::InvalidValue(
                "max_duration must be greater than zero".to_string(),
            ));
        }
        if self.activity_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "activity_timeout must be greater than zero".to_string(),
            ));
        }
        if self.priority_min > self.priority_max {
            return Err(ConfigError::InvalidValue(format!(
                "priority_min ({}) exceeds priority_max ({})",
                self.priority_min, self.priority_max
            )));
        }
        if !self.priority_in_range(self.default_priority) {
            return Err(ConfigError::InvalidValue(format!(
                "default_priority ({}) outside {}..={}",
                self.default_priority, self.priority_min, self.priority_max
            )));
        }
        if self.max_queue_length == 0 {
            return Err(ConfigError::InvalidValue(
                "max_queue_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn priority_in_range(&self, priority: u8) -> bool {
        (self.priority_min..=self.priority_max).contains(&priority)
    }

    /// Effective speaking time for a request: `min(requested, max_duration)`.
    #[must_use]
    pub fn effective_duration(&self, requested: Option<Duration>) -> Duration {
        requested.map_or(self.max_duration, |d| d.min(self.max_duration))
    }
}

/// Floor Controller service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:8090").
    pub http_bind_address: String,

    /// Unique identifier for this instance.
    pub instance_id: String,

    /// Maximum concurrent rooms this instance can coordinate.
    pub max_rooms: usize,

    /// Floor parameters applied to every new room.
    pub floor: FloorConfig,

    /// Emit JSON-formatted logs.
    pub log_json: bool,

    /// Deadline for draining rooms on shutdown.
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let http_bind_address = vars
            .get("FC_HTTP_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HTTP_BIND_ADDRESS.to_string());

        let max_rooms = parse_var(vars, "FC_MAX_ROOMS", DEFAULT_MAX_ROOMS)?;

        let floor = FloorConfig {
            max_duration: Duration::from_secs(parse_var(
                vars,
                "FC_FLOOR_MAX_DURATION_SECONDS",
                DEFAULT_MAX_DURATION_SECONDS,
            )?),
            cooldown: Duration::from_millis(parse_var(
                vars,
                "FC_FLOOR_COOLDOWN_MS",
                DEFAULT_COOLDOWN_MS,
            )?),
            activity_timeout: Duration::from_secs(parse_var(
                vars,
                "FC_FLOOR_ACTIVITY_TIMEOUT_SECONDS",
                DEFAULT_ACTIVITY_TIMEOUT_SECONDS,
            )?),
            priority_min: parse_var(vars, "FC_PRIORITY_MIN", DEFAULT_PRIORITY_MIN)?,
            priority_max: parse_var(vars, "FC_PRIORITY_MAX", DEFAULT_PRIORITY_MAX)?,
            default_priority: parse_var(vars, "FC_DEFAULT_PRIORITY", DEFAULT_PRIORITY)?,
            max_queue_length: parse_var(vars, "FC_MAX_QUEUE_LENGTH", DEFAULT_MAX_QUEUE_LENGTH)?,
        };
        floor.validate()?;

        let log_json = parse_var(vars, "FC_LOG_JSON", false)?;

        let shutdown_timeout = Duration::from_secs(parse_var(
            vars,
            "FC_SHUTDOWN_TIMEOUT_SECONDS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
        )?);

        // Generate instance ID
        let instance_id = vars.get("FC_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            http_bind_address,
            instance_id,
            max_rooms,
            floor,
            log_json,
            shutdown_timeout,
        })
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.http_bind_address, DEFAULT_HTTP_BIND_ADDRESS);
        assert_eq!(config.max_rooms, DEFAULT_MAX_ROOMS);
        assert_eq!(config.floor, FloorConfig::default());
        assert_eq!(config.floor.max_duration, Duration::from_secs(30));
        assert_eq!(config.floor.cooldown, Duration::from_millis(500));
        assert!(!config.log_json);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        // Instance ID should be auto-generated
        assert!(config.instance_id.starts_with("fc-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            (
                "FC_HTTP_BIND_ADDRESS".to_string(),
                "127.0.0.1:9000".to_string(),
            ),
            ("FC_INSTANCE_ID".to_string(), "fc-custom-001".to_string()),
            ("FC_MAX_ROOMS".to_string(), "20".to_string()),
            ("FC_FLOOR_MAX_DURATION_SECONDS".to_string(), "60".to_string()),
            ("FC_FLOOR_COOLDOWN_MS".to_string(), "0".to_string()),
            (
                "FC_FLOOR_ACTIVITY_TIMEOUT_SECONDS".to_string(),
                "5".to_string(),
            ),
            ("FC_PRIORITY_MIN".to_string(), "1".to_string()),
            ("FC_PRIORITY_MAX".to_string(), "3".to_string()),
            ("FC_DEFAULT_PRIORITY".to_string(), "2".to_string()),
            ("FC_MAX_QUEUE_LENGTH".to_string(), "8".to_string()),
            ("FC_LOG_JSON".to_string(), "true".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.http_bind_address, "127.0.0.1:9000");
        assert_eq!(config.instance_id, "fc-custom-001");
        assert_eq!(config.max_rooms, 20);
        assert_eq!(config.floor.max_duration, Duration::from_secs(60));
        assert!(config.floor.cooldown.is_zero());
        assert_eq!(config.floor.activity_timeout, Duration::from_secs(5));
        assert_eq!(config.floor.priority_min, 1);
        assert_eq!(config.floor.priority_max, 3);
        assert_eq!(config.floor.default_priority, 2);
        assert_eq!(config.floor.max_queue_length, 8);
        assert!(config.log_json);
    }

    #[test]
    fn test_from_vars_rejects_unparsable_value() {
        let vars = HashMap::from([("FC_MAX_ROOMS".to_string(), "lots".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(v)) if v.contains("FC_MAX_ROOMS")));
    }

    #[test]
    fn test_from_vars_rejects_inverted_priority_range() {
        let vars = HashMap::from([
            ("FC_PRIORITY_MIN".to_string(), "5".to_string()),
            ("FC_PRIORITY_MAX".to_string(), "2".to_string()),
        ]);

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_validate_default_priority_in_range() {
        let config = FloorConfig {
            default_priority: 11,
            ..FloorConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(FloorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let config = FloorConfig {
            max_duration: Duration::ZERO,
            ..FloorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FloorConfig {
            activity_timeout: Duration::ZERO,
            ..FloorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_duration_is_capped() {
        let config = FloorConfig::default();

        assert_eq!(config.effective_duration(None), Duration::from_secs(30));
        assert_eq!(
            config.effective_duration(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.effective_duration(Some(Duration::from_secs(300))),
            Duration::from_secs(30)
        );
    }
}
