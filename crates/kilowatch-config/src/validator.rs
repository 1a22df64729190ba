//! Semantic configuration validation

use kilowatch_core::{Error, Result};

use crate::Config;

/// Validate a loaded configuration.
///
/// Serde already enforces shape and types; this checks the semantics that
/// only hold across fields: interval and concurrency bounds, device naming,
/// and credential references.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.poll_interval.is_zero() {
        return Err(Error::Config("poll_interval must be greater than 0".into()));
    }

    if config.max_in_flight == 0 {
        return Err(Error::Config("max_in_flight must be at least 1".into()));
    }

    if config.circuit_breaker.fail_threshold == 0 {
        return Err(Error::Config(
            "circuit_breaker.fail_threshold must be at least 1".into(),
        ));
    }

    for (i, t) in config.targets.iter().enumerate() {
        let name = t.name();

        match (&t.pdu, &t.bmc) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(format!(
                    "target #{i}: 'pdu' and 'bmc' are mutually exclusive"
                )))
            }
            (None, None) => {
                return Err(Error::Config(format!(
                    "target #{i}: one of 'pdu' or 'bmc' is required"
                )))
            }
            _ => {}
        }

        if name.is_empty() {
            return Err(Error::Config(format!("target #{i}: empty device name")));
        }

        if t.ip.is_empty() {
            return Err(Error::Config(format!("target '{name}': 'ip' is required")));
        }

        if t.pdu.is_some() && t.outlets.is_empty() {
            return Err(Error::Config(format!(
                "target '{name}': PDU targets need at least one outlet"
            )));
        }

        if t.bmc.is_some() && t.sensors.is_empty() {
            return Err(Error::Config(format!(
                "target '{name}': BMC targets need at least one sensor"
            )));
        }

        if t.pdu.is_some() && !t.sensors.is_empty() {
            return Err(Error::Config(format!(
                "target '{name}': 'sensors' is only valid on BMC targets"
            )));
        }

        if t.bmc.is_some() && !t.outlets.is_empty() {
            return Err(Error::Config(format!(
                "target '{name}': 'outlets' is only valid on PDU targets"
            )));
        }

        if !config.auth.groups.contains_key(&t.auth_group) {
            return Err(Error::Config(format!(
                "target '{name}': unknown auth_group '{}'",
                t.auth_group
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    const VALID: &str = r#"
auth:
  groups:
    lab: { user: admin, pass: secret }
targets:
  - pdu: p1
    ip: 10.0.0.1
    auth_group: lab
    outlets: [1]
  - bmc: n1
    ip: 10.0.0.2
    auth_group: lab
    sensors: [LiquidLeak]
"#;

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&parse(VALID)).is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = parse(VALID);
        config.poll_interval = std::time::Duration::ZERO;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn test_zero_max_in_flight_rejected() {
        let mut config = parse(VALID);
        config.max_in_flight = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_in_flight"));
    }

    #[test]
    fn test_zero_fail_threshold_rejected() {
        let mut config = parse(VALID);
        config.circuit_breaker.fail_threshold = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("fail_threshold"));
    }

    #[test]
    fn test_target_needs_device_name() {
        let err = validate_config(&parse(
            r#"
auth:
  groups:
    lab: { user: a, pass: b }
targets:
  - ip: 10.0.0.1
    auth_group: lab
    outlets: [1]
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("one of 'pdu' or 'bmc'"));
    }

    #[test]
    fn test_pdu_and_bmc_mutually_exclusive() {
        let err = validate_config(&parse(
            r#"
auth:
  groups:
    lab: { user: a, pass: b }
targets:
  - pdu: p1
    bmc: n1
    ip: 10.0.0.1
    auth_group: lab
    outlets: [1]
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_pdu_without_outlets_rejected() {
        let err = validate_config(&parse(
            r#"
auth:
  groups:
    lab: { user: a, pass: b }
targets:
  - pdu: p1
    ip: 10.0.0.1
    auth_group: lab
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("at least one outlet"));
    }

    #[test]
    fn test_bmc_without_sensors_rejected() {
        let err = validate_config(&parse(
            r#"
auth:
  groups:
    lab: { user: a, pass: b }
targets:
  - bmc: n1
    ip: 10.0.0.1
    auth_group: lab
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("at least one sensor"));
    }

    #[test]
    fn test_unknown_auth_group_rejected() {
        let err = validate_config(&parse(
            r#"
targets:
  - pdu: p1
    ip: 10.0.0.1
    auth_group: nope
    outlets: [1]
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("unknown auth_group"));
    }

    #[test]
    fn test_mixed_sub_resources_rejected() {
        let err = validate_config(&parse(
            r#"
auth:
  groups:
    lab: { user: a, pass: b }
targets:
  - pdu: p1
    ip: 10.0.0.1
    auth_group: lab
    outlets: [1]
    sensors: [LiquidLeak]
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("only valid on BMC"));
    }
}
