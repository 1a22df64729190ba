//! Schema-tolerant field extraction from Redfish payloads
//!
//! Vendor firmware revisions disagree on schema completeness, so every
//! lookup tolerates absent fields, wrong types, and missing parents.
//! Extraction never fails; a field that cannot be read is simply `None`.

use kilowatch_core::{OutletReading, SensorReading};
use serde_json::Value;

/// Extract power and voltage from an outlet payload
pub fn extract_outlet(payload: &Value) -> OutletReading {
    OutletReading {
        watts: extract_watts(payload),
        volts: extract_volts(payload),
    }
}

/// Preferred schema first, then variants seen across firmware revisions.
fn extract_watts(payload: &Value) -> Option<f64> {
    number_at(payload, &["PowerWatts", "Reading"])
        .or_else(|| number_at(payload, &["PowerReading"]))
        .or_else(|| number_at(payload, &["PowerReading", "Reading"]))
        .or_else(|| number_at(payload, &["Power", "Reading"]))
}

fn extract_volts(payload: &Value) -> Option<f64> {
    number_at(payload, &["Voltage", "Reading"])
}

/// Extract health and OEM location from a chassis sensor payload
pub fn extract_sensor(payload: &Value) -> SensorReading {
    SensorReading {
        health: string_at(payload, &["Status", "Health"]),
        location: string_at(payload, &["Oem", "Supermicro", "SensorValue"]),
    }
}

/// A number at `path`: JSON numbers, or strings that parse as one.
/// Some PDUs report readings as quoted decimals.
fn number_at(payload: &Value, path: &[&str]) -> Option<f64> {
    match value_at(payload, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_at(payload: &Value, path: &[&str]) -> Option<String> {
    match value_at(payload, path)? {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn value_at<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |node, key| node.get(key))
}
