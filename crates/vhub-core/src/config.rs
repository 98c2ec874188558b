//! Hub and connection pump configuration.

use std::time::Duration;

/// Default outbox capacity per connection.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Default time allowed for a single frame write.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Default time allowed between two inbound frames before the peer is
/// considered gone.
pub const DEFAULT_PONG_WAIT_SECS: u64 = 60;

/// Default interval between keepalive pings. Must stay below the pong wait.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 54;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    outbox_capacity: usize,
}

impl HubConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }

    /// Set the outbox capacity (at least 1).
    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity.max(1);
        self
    }

    /// Capacity of each connection's outbox. Never zero.
    pub fn outbox_capacity(&self) -> usize {
        self.outbox_capacity
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing configuration for a connection's read and write pumps.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Maximum time for one write to the network.
    pub write_timeout: Duration,
    /// Maximum silence on the inbound side before the connection is dropped.
    pub pong_wait: Duration,
    /// Interval between keepalive pings. `None` disables pings.
    pub ping_interval: Option<Duration>,
}

impl PumpConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            pong_wait: Duration::from_secs(DEFAULT_PONG_WAIT_SECS),
            ping_interval: Some(Duration::from_secs(DEFAULT_PING_INTERVAL_SECS)),
        }
    }

    /// Set the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the inbound silence limit.
    pub fn with_pong_wait(mut self, wait: Duration) -> Self {
        self.pong_wait = wait;
        self
    }

    /// Set the keepalive ping interval. A zero interval disables pings.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval).filter(|i| !i.is_zero());
        self
    }

    /// Disable keepalive pings.
    pub fn without_ping(mut self) -> Self {
        self.ping_interval = None;
        self
    }

    /// Check that pings are sent often enough to satisfy the pong wait.
    pub fn is_consistent(&self) -> bool {
        match self.ping_interval {
            Some(interval) => !interval.is_zero() && interval < self.pong_wait,
            None => true,
        }
    }

    /// A copy that the pumps can run with: a zero ping interval disables
    /// pings, and an interval at or past the pong wait is pulled down to
    /// nine tenths of it.
    pub fn normalized(&self) -> PumpConfig {
        let ping_interval = self.ping_interval.and_then(|interval| {
            let interval = if interval < self.pong_wait {
                interval
            } else {
                self.pong_wait * 9 / 10
            };
            Some(interval).filter(|i| !i.is_zero())
        });
        PumpConfig {
            ping_interval,
            ..self.clone()
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let hub = HubConfig::default();
        assert_eq!(hub.outbox_capacity(), 256);

        let pump = PumpConfig::default();
        assert_eq!(pump.write_timeout, Duration::from_secs(10));
        assert_eq!(pump.pong_wait, Duration::from_secs(60));
        assert_eq!(pump.ping_interval, Some(Duration::from_secs(54)));
        assert!(pump.is_consistent());
    }

    #[test]
    fn test_config_builder() {
        let hub = HubConfig::new().with_outbox_capacity(0);
        assert_eq!(hub.outbox_capacity(), 1);

        let pump = PumpConfig::new()
            .with_write_timeout(Duration::from_secs(1))
            .with_pong_wait(Duration::from_secs(5))
            .with_ping_interval(Duration::from_secs(10));
        assert!(!pump.is_consistent());

        let pump = pump.without_ping();
        assert!(pump.ping_interval.is_none());
        assert!(pump.is_consistent());
    }

    #[test]
    fn test_zero_ping_interval_disables_pings() {
        let pump = PumpConfig::new().with_ping_interval(Duration::ZERO);
        assert!(pump.ping_interval.is_none());
        assert!(pump.is_consistent());
    }

    #[test]
    fn test_normalized() {
        let pump = PumpConfig {
            write_timeout: Duration::from_secs(1),
            pong_wait: Duration::from_secs(10),
            ping_interval: Some(Duration::ZERO),
        };
        assert!(!pump.is_consistent());
        assert!(pump.normalized().ping_interval.is_none());

        let pump = PumpConfig::new()
            .with_pong_wait(Duration::from_secs(10))
            .with_ping_interval(Duration::from_secs(30));
        let normalized = pump.normalized();
        assert_eq!(normalized.ping_interval, Some(Duration::from_secs(9)));
        assert!(normalized.is_consistent());

        let pump = PumpConfig::new()
            .with_pong_wait(Duration::ZERO)
            .with_ping_interval(Duration::from_secs(1));
        assert!(pump.normalized().ping_interval.is_none());

        let pump = PumpConfig::default();
        assert_eq!(pump.normalized().ping_interval, pump.ping_interval);
    }
}
