//! Configuration type definitions

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;

use kilowatch_core::{Credentials, Error, Result, Target, TargetKind};
use serde::{Deserialize, Serialize};

/// Top-level exporter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Time between sweep starts
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// TCP/TLS connection establishment timeout
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Socket read timeout
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Whole-call deadline. Defaults to `max(connect, read) + 1s` when unset.
    #[serde(default, with = "humantime_serde")]
    pub total_timeout: Option<Duration>,

    /// Cap on concurrent in-flight device requests, shared across all targets
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Verify device TLS certificates. PDUs ship self-signed certs, so this
    /// defaults to off.
    #[serde(default)]
    pub tls_verify: bool,

    /// Additional attempts after the first failed request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential retry backoff
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Exposition server listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Circuit breaker thresholds
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Credential groups
    #[serde(default)]
    pub auth: AuthConfig,

    /// Devices to poll
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker for a target
    #[serde(default = "default_fail_threshold")]
    pub fail_threshold: u32,

    /// Sweeps to skip once the breaker is open
    #[serde(default = "default_cooldown_cycles")]
    pub cooldown_cycles: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            fail_threshold: default_fail_threshold(),
            cooldown_cycles: default_cooldown_cycles(),
        }
    }
}

/// Credential configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Named credential groups referenced by targets
    #[serde(default)]
    pub groups: HashMap<String, AuthGroupConfig>,
}

/// One named credential pair
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthGroupConfig {
    /// Username
    pub user: String,
    /// Password, usually `${VAR}`-expanded from the environment
    #[serde(rename = "pass")]
    pub password: String,
}

/// One device entry.
///
/// Exactly one of `pdu` / `bmc` names the device; any key outside the
/// reserved set becomes a metric label (rack, row, ...).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// PDU name; implies `outlets`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdu: Option<String>,

    /// BMC name; implies `sensors`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc: Option<String>,

    /// Network address, IP or hostname
    pub ip: String,

    /// Name of the credential group to use
    pub auth_group: String,

    /// Outlet numbers to poll (PDU targets)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outlets: Vec<u32>,

    /// Sensor names to poll (BMC targets)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensors: Vec<String>,

    /// Remaining keys, captured as descriptive labels
    #[serde(flatten)]
    pub labels: BTreeMap<String, serde_json::Value>,
}

impl TargetConfig {
    /// Device name, whichever of `pdu` / `bmc` is set
    pub fn name(&self) -> &str {
        self.pdu
            .as_deref()
            .or(self.bmc.as_deref())
            .unwrap_or_default()
    }
}

impl Config {
    /// Whole-call deadline, derived from the socket timeouts when unset
    pub fn effective_total_timeout(&self) -> Duration {
        self.total_timeout
            .unwrap_or_else(|| self.connect_timeout.max(self.read_timeout) + Duration::from_secs(1))
    }

    /// Resolve config entries into runtime targets with credentials attached.
    ///
    /// Assumes [`crate::validate_config`] has passed; still errors rather
    /// than panics on dangling references.
    pub fn resolve_targets(&self) -> Result<Vec<Target>> {
        self.targets
            .iter()
            .map(|t| {
                let group = self.auth.groups.get(&t.auth_group).ok_or_else(|| {
                    Error::Config(format!(
                        "target '{}': unknown auth_group '{}'",
                        t.name(),
                        t.auth_group
                    ))
                })?;

                let kind = if t.pdu.is_some() {
                    TargetKind::Pdu {
                        outlets: t.outlets.clone(),
                    }
                } else {
                    TargetKind::Bmc {
                        sensors: t.sensors.clone(),
                    }
                };

                Ok(Target {
                    name: t.name().to_string(),
                    addr: t.ip.clone(),
                    credentials: Credentials {
                        user: group.user.clone(),
                        password: group.password.clone(),
                    },
                    kind,
                    labels: stringify_labels(t)?,
                })
            })
            .collect()
    }
}

/// Coerce scalar label values to strings, as the exposition format requires
fn stringify_labels(t: &TargetConfig) -> Result<BTreeMap<String, String>> {
    t.labels
        .iter()
        .map(|(k, v)| {
            let s = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(Error::Config(format!(
                        "target '{}': label '{}' must be a scalar",
                        t.name(),
                        k
                    )))
                }
            };
            Ok((k.clone(), s))
        })
        .collect()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(4)
}

fn default_max_in_flight() -> usize {
    400
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base() -> Duration {
    Duration::from_millis(200)
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9100))
}

fn default_fail_threshold() -> u32 {
    5
}

fn default_cooldown_cycles() -> u32 {
    3
}
