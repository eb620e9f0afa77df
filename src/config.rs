//! Broker configuration, assembled from CLI flags with environment
//! variable fallback: one struct with a sensible `Default`, overridable
//! per field for tests and for real deployments alike.

use std::time::Duration;

use clap::Parser;

/// Runtime configuration for a single broker instance.
#[derive(Debug, Clone, Parser)]
#[command(name = "fluxmq", about = "Distributed message-oriented middleware broker")]
pub struct BrokerConfig {
    /// Unique name for this instance. Defaults to a generated id if unset.
    #[arg(long, env = "FLUXMQ_INSTANCE_NAME")]
    pub instance_name: Option<String>,

    /// Host/IP this instance binds its RPC server to.
    #[arg(long, env = "FLUXMQ_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the RPC server to. 0 means OS-assigned.
    #[arg(long, env = "FLUXMQ_PORT", default_value_t = 0)]
    pub port: u16,

    /// Public host:port other machines should use to reach this instance,
    /// if different from `host:port` (e.g. behind NAT).
    #[arg(long, env = "FLUXMQ_PUBLIC_ADDRESS")]
    pub public_address: Option<String>,

    /// Master URL to join at startup. If unset, this instance participates
    /// in election to discover (or become) the master.
    #[arg(long, env = "FLUXMQ_MASTER_URL")]
    pub master_url: Option<String>,

    /// Path to the durable state file.
    #[arg(long, env = "FLUXMQ_STATE_FILE", default_value = "fluxmq_state.json")]
    pub state_file_path: String,

    /// Default partition count for auto-created topics.
    #[arg(long, env = "FLUXMQ_DEFAULT_PARTITIONS", default_value_t = 3)]
    pub default_partition_count: u32,

    /// Port for the Prometheus metrics exporter. Unset disables it.
    #[arg(long, env = "FLUXMQ_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    #[command(flatten)]
    pub timings: TimingConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            instance_name: None,
            host: "0.0.0.0".to_string(),
            port: 0,
            public_address: None,
            master_url: None,
            state_file_path: "fluxmq_state.json".to_string(),
            default_partition_count: 3,
            metrics_port: None,
            timings: TimingConfig::default(),
        }
    }
}

/// All TTLs, intervals, and deadlines the election, heartbeat, and
/// dispatch tasks use, grouped so tests can shrink them without touching
/// the rest of `BrokerConfig`.
///
/// Every field is `#[arg(skip)]` -- clap has no flags for these, and
/// resolves a skipped field via its own `Default`, not this struct's.
/// Callers driven by `clap::Parser::parse()` must overwrite `.timings`
/// with `TimingConfig::default()` after parsing; `BrokerConfig::default()`
/// already does the right thing.
#[derive(Debug, Clone, Parser)]
pub struct TimingConfig {
    #[arg(skip)]
    pub heartbeat_interval: Duration,
    #[arg(skip)]
    pub heartbeat_ttl: Duration,
    #[arg(skip)]
    pub watchdog_grace: Duration,
    #[arg(skip)]
    pub watchdog_interval: Duration,
    #[arg(skip)]
    pub liveness_probe_timeout: Duration,
    #[arg(skip)]
    pub failure_threshold: u32,
    #[arg(skip)]
    pub election_priority_ttl: Duration,
    #[arg(skip)]
    pub election_pre_delay: (Duration, Duration),
    #[arg(skip)]
    pub election_post_jitter: (Duration, Duration),
    #[arg(skip)]
    pub election_lock_ttl: Duration,
    #[arg(skip)]
    pub health_check_interval: Duration,
    #[arg(skip)]
    pub health_check_timeout: Duration,
    #[arg(skip)]
    pub dispatch_timeout: Duration,
    #[arg(skip)]
    pub register_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_ttl: Duration::from_secs(10),
            watchdog_grace: Duration::from_secs(15),
            watchdog_interval: Duration::from_secs(5),
            liveness_probe_timeout: Duration::from_secs(1),
            failure_threshold: 2,
            election_priority_ttl: Duration::from_secs(30),
            election_pre_delay: (Duration::from_millis(1000), Duration::from_millis(3000)),
            election_post_jitter: (Duration::from_millis(500), Duration::from_millis(2000)),
            election_lock_ttl: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            health_check_timeout: Duration::from_secs(2),
            dispatch_timeout: Duration::from_secs(3),
            register_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timings_have_expected_values() {
        let t = TimingConfig::default();
        assert_eq!(t.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(t.heartbeat_ttl, Duration::from_secs(10));
        assert_eq!(t.watchdog_grace, Duration::from_secs(15));
        assert_eq!(t.failure_threshold, 2);
        assert_eq!(t.election_lock_ttl, Duration::from_secs(30));
        assert_eq!(t.dispatch_timeout, Duration::from_secs(3));
    }

    #[test]
    fn default_config_has_default_partition_count_three() {
        let c = BrokerConfig::default();
        assert_eq!(c.default_partition_count, 3);
        assert_eq!(c.port, 0);
    }

    #[test]
    fn clap_skip_zeroes_timings_without_the_override() {
        let c = BrokerConfig::try_parse_from(["fluxmq"]).unwrap();
        assert_eq!(c.timings.heartbeat_ttl, Duration::ZERO);
        assert_eq!(c.timings.dispatch_timeout, Duration::ZERO);
        assert_eq!(c.timings.failure_threshold, 0);
    }

    #[test]
    fn overriding_timings_after_parse_restores_real_defaults() {
        let mut c = BrokerConfig::try_parse_from(["fluxmq"]).unwrap();
        c.timings = TimingConfig::default();
        assert_eq!(c.timings.heartbeat_ttl, Duration::from_secs(10));
        assert_eq!(c.timings.dispatch_timeout, Duration::from_secs(3));
        assert_eq!(c.timings.failure_threshold, 2);
    }
}
