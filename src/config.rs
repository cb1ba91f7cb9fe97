//! Bot configuration

use crate::error::{BotError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reply sent when an addressed message matches nothing
pub const DEFAULT_FALLBACK_MESSAGE: &str = "That is not a valid command...";

/// Top-level bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
    /// Reply for addressed messages that match no exchange or responder
    pub fallback_message: String,

    /// Channel or user (name, `#name`, `@name`, or id) that receives debug output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_channel: Option<String>,

    /// Outbound rate guard; disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    /// Idle time after which a suspended exchange is dropped; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_timeout_secs: Option<u64>,

    /// Attempts at fetching the bot identity after connecting
    pub connect_retries: u32,

    /// Delay between identity fetch attempts
    pub connect_retry_delay_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            debug_channel: None,
            circuit_breaker: None,
            exchange_timeout_secs: None,
            connect_retries: 10,
            connect_retry_delay_ms: 500,
        }
    }
}

impl BotConfig {
    /// Check the configuration for values the runtime cannot honor
    pub fn validate(&self) -> Result<()> {
        if let Some(cb) = &self.circuit_breaker {
            if cb.max_messages == 0 {
                return Err(BotError::Config(
                    "circuit breaker maxMessages must be greater than 0".to_string(),
                ));
            }
            if cb.window_secs == 0 {
                return Err(BotError::Config(
                    "circuit breaker windowSecs must be greater than 0".to_string(),
                ));
            }
        }
        if self.exchange_timeout_secs == Some(0) {
            return Err(BotError::Config(
                "exchangeTimeoutSecs must be greater than 0".to_string(),
            ));
        }
        if self.connect_retries == 0 {
            return Err(BotError::Config(
                "connectRetries must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Idle timeout for suspended exchanges
    pub fn exchange_timeout(&self) -> Option<Duration> {
        self.exchange_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Maximum sends allowed inside one window
    pub max_messages: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}
