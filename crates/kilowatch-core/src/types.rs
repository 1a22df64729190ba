//! Domain types shared across the exporter crates

use std::collections::BTreeMap;
use std::fmt;

use crate::Error;

/// Credential pair for Basic auth, shared by one or more targets
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username
    pub user: String,
    /// Password
    pub password: String,
}

// Never let passwords reach logs through Debug formatting.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What a target exposes for polling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    /// Rack PDU with numbered outlets
    Pdu {
        /// Outlet numbers to poll
        outlets: Vec<u32>,
    },
    /// BMC with named chassis sensors
    Bmc {
        /// Sensor names to poll (e.g. `LiquidLeak`)
        sensors: Vec<String>,
    },
}

/// One individually addressable reading on a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubResource {
    /// A numbered PDU outlet
    Outlet(u32),
    /// A named chassis sensor
    Sensor(String),
}

impl fmt::Display for SubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubResource::Outlet(n) => write!(f, "outlet {n}"),
            SubResource::Sensor(name) => write!(f, "sensor {name}"),
        }
    }
}

/// A polled device. Immutable for the process lifetime; loaded once at startup.
#[derive(Debug, Clone)]
pub struct Target {
    /// Stable identifier (device name from the inventory)
    pub name: String,
    /// Network address, IP or hostname
    pub addr: String,
    /// Credentials resolved from the target's auth group
    pub credentials: Credentials,
    /// Sub-resources this target exposes
    pub kind: TargetKind,
    /// Descriptive labels (rack, row, ...)
    pub labels: BTreeMap<String, String>,
}

impl Target {
    /// Label value for `key`, empty string when the target does not carry it.
    ///
    /// Exposition label sets must stay uniform in cardinality, so absence is
    /// an empty string rather than an omitted label.
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }

    /// All sub-resources to poll on this target
    pub fn sub_resources(&self) -> Vec<SubResource> {
        match &self.kind {
            TargetKind::Pdu { outlets } => {
                outlets.iter().copied().map(SubResource::Outlet).collect()
            }
            TargetKind::Bmc { sensors } => {
                sensors.iter().cloned().map(SubResource::Sensor).collect()
            }
        }
    }

    /// `"pdu"` or `"bmc"`, for log fields
    pub fn kind_tag(&self) -> &'static str {
        match self.kind {
            TargetKind::Pdu { .. } => "pdu",
            TargetKind::Bmc { .. } => "bmc",
        }
    }
}

/// Values extracted from one outlet payload; any field may be absent
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OutletReading {
    /// Active power in watts
    pub watts: Option<f64>,
    /// Line voltage in volts
    pub volts: Option<f64>,
}

impl OutletReading {
    /// True when no field could be extracted
    pub fn is_empty(&self) -> bool {
        self.watts.is_none() && self.volts.is_none()
    }
}

/// Values extracted from one chassis sensor payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SensorReading {
    /// Redfish health string (`OK`, `Warning`, `Critical`)
    pub health: Option<String>,
    /// OEM location / sensor-value string, used in logs only
    pub location: Option<String>,
}

impl SensorReading {
    /// Whether the sensor reports healthy; `None` when health was absent
    pub fn is_healthy(&self) -> Option<bool> {
        self.health.as_deref().map(|h| h == "OK")
    }
}

/// Extracted values from one poll, tagged with the sub-resource they belong to
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// An outlet reading
    Outlet {
        /// Outlet number the reading belongs to
        outlet: u32,
        /// Extracted values
        reading: OutletReading,
    },
    /// A sensor reading
    Sensor {
        /// Sensor name the reading belongs to
        sensor: String,
        /// Extracted values
        reading: SensorReading,
    },
}

/// Outcome of one poll attempt against one (target, sub-resource) pair
#[derive(Debug)]
pub enum PollOutcome {
    /// Device answered with a payload. Extracted fields may still be absent.
    Sample(Sample),
    /// Resource confirmed not present (HTTP 404); never retried
    Absent,
    /// Transient failure after all retries were exhausted
    Failed(Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(kind: TargetKind) -> Target {
        Target {
            name: "tus1-pdu-a1".to_string(),
            addr: "10.31.238.79".to_string(),
            credentials: Credentials {
                user: "admin".to_string(),
                password: "secret".to_string(),
            },
            kind,
            labels: BTreeMap::from([("rack".to_string(), "ru3".to_string())]),
        }
    }

    #[test]
    fn test_label_defaults_to_empty() {
        let t = target(TargetKind::Pdu { outlets: vec![1] });
        assert_eq!(t.label("rack"), "ru3");
        assert_eq!(t.label("row"), "");
    }

    #[test]
    fn test_sub_resources_for_pdu() {
        let t = target(TargetKind::Pdu {
            outlets: vec![1, 2, 14],
        });
        assert_eq!(
            t.sub_resources(),
            vec![
                SubResource::Outlet(1),
                SubResource::Outlet(2),
                SubResource::Outlet(14)
            ]
        );
        assert_eq!(t.kind_tag(), "pdu");
    }

    #[test]
    fn test_sub_resources_for_bmc() {
        let t = target(TargetKind::Bmc {
            sensors: vec!["LiquidLeak".to_string()],
        });
        assert_eq!(
            t.sub_resources(),
            vec![SubResource::Sensor("LiquidLeak".to_string())]
        );
        assert_eq!(t.kind_tag(), "bmc");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let c = Credentials {
            user: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{c:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_sensor_health() {
        let ok = SensorReading {
            health: Some("OK".to_string()),
            location: None,
        };
        assert_eq!(ok.is_healthy(), Some(true));

        let crit = SensorReading {
            health: Some("Critical".to_string()),
            location: None,
        };
        assert_eq!(crit.is_healthy(), Some(false));

        assert_eq!(SensorReading::default().is_healthy(), None);
    }

    #[test]
    fn test_outlet_reading_is_empty() {
        assert!(OutletReading::default().is_empty());
        assert!(!OutletReading {
            watts: Some(120.5),
            volts: None
        }
        .is_empty());
    }

    #[test]
    fn test_sub_resource_display() {
        assert_eq!(SubResource::Outlet(14).to_string(), "outlet 14");
        assert_eq!(
            SubResource::Sensor("LiquidLeak".to_string()).to_string(),
            "sensor LiquidLeak"
        );
    }
}
