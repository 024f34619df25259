//! Messaging configuration loaded from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// When a remote consumer acknowledges a delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge on receipt, before the handler runs. A failed handler
    /// loses the message.
    Immediate,
    /// Acknowledge after the handler succeeds; failures are redelivered and
    /// finally dead-lettered.
    #[default]
    AfterHandler,
}

impl FromStr for AckMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "after-handler" | "after_handler" => Ok(Self::AfterHandler),
            other => Err(format!("unknown ack mode '{other}'")),
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("immediate"),
            Self::AfterHandler => f.write_str("after-handler"),
        }
    }
}

/// How committed domain events reach the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The translator publishes from inside the local publisher, after the
    /// persistence write.
    #[default]
    Direct,
    /// Integration messages are written to an outbox in the same commit and
    /// published by a relay.
    Outbox,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "outbox" => Ok(Self::Outbox),
            other => Err(format!("unknown delivery mode '{other}'")),
        }
    }
}

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable was set to a value that does not parse.
    #[error("{name}={value:?} is invalid: expected {expected}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
        /// What was expected instead.
        expected: &'static str,
    },
}

/// Tunables for the messaging gateway, consumers and outbox relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingConfig {
    /// Deadline for one publish, measured from the caller's side.
    pub publish_timeout: Duration,
    /// Deadline for one remote handler invocation.
    pub handler_timeout: Duration,
    /// Competing worker tasks per subscription.
    pub consumer_concurrency: usize,
    /// Acknowledgement policy for remote consumers.
    pub ack_mode: AckMode,
    /// Deliveries of one message before it is dead-lettered.
    pub max_delivery_attempts: u32,
    /// Delay before the first retry of a failed delivery or outbox publish.
    /// Each further retry doubles it.
    pub retry_base_delay: Duration,
    /// Upper bound for the doubled retry delay.
    pub retry_max_delay: Duration,
    /// Capacity of the publish owner task's request queue.
    pub publish_queue_capacity: usize,
    /// How committed events reach the broker.
    pub delivery_mode: DeliveryMode,
    /// Sleep between outbox relay passes.
    pub outbox_poll_interval: Duration,
}

impl Default for MessagingConfig {
    /// With these values a failing delivery is retried for about a minute
    /// (0.5 s, 1 s, 2 s ... capped at 30 s) before it is dead-lettered.
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(5),
            handler_timeout: Duration::from_secs(30),
            consumer_concurrency: 2,
            ack_mode: AckMode::AfterHandler,
            max_delivery_attempts: 8,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            publish_queue_capacity: 256,
            delivery_mode: DeliveryMode::Direct,
            outbox_poll_interval: Duration::from_millis(200),
        }
    }
}

impl MessagingConfig {
    /// Reads `TASKLANE_*` variables from the process environment, falling back
    /// to [`MessagingConfig::default`] for unset ones.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a variable that is set but does not
    /// parse, or that is zero where a positive value is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`MessagingConfig::from_env`], reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a value that does not parse or is
    /// zero where a positive value is required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let millis = |name: &'static str, fallback: Duration| {
            positive::<u64>(&lookup, name, "a positive number of milliseconds")
                .map(|value| value.map_or(fallback, Duration::from_millis))
        };

        let retry_base_delay = millis("TASKLANE_RETRY_BASE_DELAY_MS", defaults.retry_base_delay)?;
        let retry_max_delay = millis("TASKLANE_RETRY_MAX_DELAY_MS", defaults.retry_max_delay)?;
        if retry_max_delay < retry_base_delay {
            return Err(ConfigError::Invalid {
                name: "TASKLANE_RETRY_MAX_DELAY_MS",
                value: retry_max_delay.as_millis().to_string(),
                expected: "at least TASKLANE_RETRY_BASE_DELAY_MS",
            });
        }

        Ok(Self {
            publish_timeout: millis("TASKLANE_PUBLISH_TIMEOUT_MS", defaults.publish_timeout)?,
            handler_timeout: millis("TASKLANE_HANDLER_TIMEOUT_MS", defaults.handler_timeout)?,
            consumer_concurrency: positive(
                &lookup,
                "TASKLANE_CONSUMER_CONCURRENCY",
                "a positive integer",
            )?
            .unwrap_or(defaults.consumer_concurrency),
            ack_mode: parse(&lookup, "TASKLANE_ACK_MODE", "'immediate' or 'after-handler'")?
                .unwrap_or(defaults.ack_mode),
            max_delivery_attempts: positive(
                &lookup,
                "TASKLANE_MAX_DELIVERY_ATTEMPTS",
                "a positive integer",
            )?
            .unwrap_or(defaults.max_delivery_attempts),
            retry_base_delay,
            retry_max_delay,
            publish_queue_capacity: defaults.publish_queue_capacity,
            delivery_mode: parse(&lookup, "TASKLANE_DELIVERY_MODE", "'direct' or 'outbox'")?
                .unwrap_or(defaults.delivery_mode),
            outbox_poll_interval: millis(
                "TASKLANE_OUTBOX_POLL_INTERVAL_MS",
                defaults.outbox_poll_interval,
            )?,
        })
    }

    /// Delay before retrying after the `failures`-th failed attempt:
    /// `retry_base_delay` doubled per earlier failure, capped at
    /// `retry_max_delay`.
    #[must_use]
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr + Default + PartialEq + ToString,
{
    match parse::<T>(lookup, name, expected)? {
        Some(value) if value == T::default() => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            expected,
        }),
        other => Ok(other),
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid {
            name,
            value,
            expected,
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_unset_variables_fall_back_to_defaults() {
        let config = MessagingConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config, MessagingConfig::default());
        assert_eq!(config.ack_mode, AckMode::AfterHandler);
        assert_eq!(config.delivery_mode, DeliveryMode::Direct);
    }

    #[test]
    fn test_variables_override_defaults() {
        // Arrange
        let lookup = lookup_from(&[
            ("TASKLANE_PUBLISH_TIMEOUT_MS", "150"),
            ("TASKLANE_HANDLER_TIMEOUT_MS", "900"),
            ("TASKLANE_CONSUMER_CONCURRENCY", "4"),
            ("TASKLANE_ACK_MODE", "Immediate"),
            ("TASKLANE_MAX_DELIVERY_ATTEMPTS", "2"),
            ("TASKLANE_DELIVERY_MODE", "outbox"),
            ("TASKLANE_RETRY_BASE_DELAY_MS", "50"),
            ("TASKLANE_RETRY_MAX_DELAY_MS", "800"),
        ]);

        // Act
        let config = MessagingConfig::from_lookup(lookup).unwrap();

        // Assert
        assert_eq!(config.publish_timeout, Duration::from_millis(150));
        assert_eq!(config.handler_timeout, Duration::from_millis(900));
        assert_eq!(config.consumer_concurrency, 4);
        assert_eq!(config.ack_mode, AckMode::Immediate);
        assert_eq!(config.max_delivery_attempts, 2);
        assert_eq!(config.delivery_mode, DeliveryMode::Outbox);
        assert_eq!(config.retry_base_delay, Duration::from_millis(50));
        assert_eq!(config.retry_max_delay, Duration::from_millis(800));
    }

    #[test]
    fn test_unparsable_value_is_reported_with_its_name() {
        let result = MessagingConfig::from_lookup(lookup_from(&[(
            "TASKLANE_PUBLISH_TIMEOUT_MS",
            "soon",
        )]));

        match result.unwrap_err() {
            ConfigError::Invalid { name, value, .. } => {
                assert_eq!(name, "TASKLANE_PUBLISH_TIMEOUT_MS");
                assert_eq!(value, "soon");
            }
        }
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let result =
            MessagingConfig::from_lookup(lookup_from(&[("TASKLANE_CONSUMER_CONCURRENCY", "0")]));

        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        for name in ["TASKLANE_PUBLISH_TIMEOUT_MS", "TASKLANE_HANDLER_TIMEOUT_MS"] {
            let result = MessagingConfig::from_lookup(lookup_from(&[(name, "0")]));

            assert_eq!(
                result,
                Err(ConfigError::Invalid {
                    name,
                    value: "0".to_owned(),
                    expected: "a positive number of milliseconds",
                })
            );
        }
    }

    #[test]
    fn test_retry_max_delay_below_base_is_rejected() {
        let result = MessagingConfig::from_lookup(lookup_from(&[
            ("TASKLANE_RETRY_BASE_DELAY_MS", "1000"),
            ("TASKLANE_RETRY_MAX_DELAY_MS", "10"),
        ]));

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "TASKLANE_RETRY_MAX_DELAY_MS",
                ..
            })
        ));
    }

    #[test]
    fn test_retry_delay_doubles_up_to_the_cap() {
        // Arrange
        let config = MessagingConfig {
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_millis(500),
            ..MessagingConfig::default()
        };

        // Act
        let delays: Vec<_> = (1..=5).map(|failures| config.retry_delay(failures)).collect();

        // Assert
        assert_eq!(
            delays,
            [100, 200, 400, 500, 500].map(Duration::from_millis).to_vec()
        );
        assert_eq!(config.retry_delay(200), Duration::from_millis(500));
    }

    #[test]
    fn test_ack_mode_parses_both_spellings() {
        assert_eq!("after-handler".parse::<AckMode>(), Ok(AckMode::AfterHandler));
        assert_eq!("after_handler".parse::<AckMode>(), Ok(AckMode::AfterHandler));
        assert!("sometimes".parse::<AckMode>().is_err());
        assert_eq!(AckMode::Immediate.to_string(), "immediate");
    }
}
