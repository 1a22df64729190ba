//! IPMI inventory import
//!
//! Datacenter inventories commonly live as a JSON array of
//! `{name, ip, username, password}` host records. This module converts such
//! a file into `targets:` stanzas for the exporter config. Inventory
//! credentials are deliberately not copied into the output; generated targets
//! reference a named auth group instead so passwords stay in the environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use kilowatch_core::{Error, Result};
use serde::Deserialize;

use crate::TargetConfig;

/// One host record from an IPMI inventory file
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryHost {
    /// Host name (e.g. `tus1-p001`)
    pub name: String,
    /// BMC address
    pub ip: String,
    /// Per-host username, ignored on conversion
    #[serde(default)]
    pub username: Option<String>,
    /// Per-host password, ignored on conversion
    #[serde(default)]
    pub password: Option<String>,
}

/// Load an inventory JSON file
pub fn load_inventory<P: AsRef<Path>>(path: P) -> Result<Vec<InventoryHost>> {
    let content = fs::read_to_string(path.as_ref())
        .map_err(|e| Error::Config(format!("Failed to read inventory file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse inventory JSON: {e}")))
}

/// Convert inventory hosts into BMC target entries.
///
/// `prefix` keeps only hosts whose name starts with it; every generated
/// target references `auth_group` and polls `sensors`.
pub fn hosts_to_targets(
    hosts: &[InventoryHost],
    auth_group: &str,
    prefix: Option<&str>,
    sensors: &[String],
) -> Vec<TargetConfig> {
    hosts
        .iter()
        .filter(|h| prefix.map_or(true, |p| h.name.starts_with(p)))
        .map(|h| TargetConfig {
            pdu: None,
            bmc: Some(h.name.clone()),
            ip: h.ip.clone(),
            auth_group: auth_group.to_string(),
            outlets: Vec::new(),
            sensors: sensors.to_vec(),
            labels: BTreeMap::new(),
        })
        .collect()
}

/// Render target entries as a YAML `targets:` document
pub fn render_targets_yaml(targets: &[TargetConfig]) -> Result<String> {
    #[derive(serde::Serialize)]
    struct Doc<'a> {
        targets: &'a [TargetConfig],
    }

    serde_yaml::to_string(&Doc { targets })
        .map_err(|e| Error::Config(format!("Failed to render YAML: {e}")))
}
