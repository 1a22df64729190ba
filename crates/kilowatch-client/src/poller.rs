//! Mapping from (target, sub-resource) to device requests

use std::fmt;

use async_trait::async_trait;
use kilowatch_core::{PollOutcome, Sample, SubResource, Target};
use tracing::debug;

use crate::client::{DeviceClient, FetchOutcome};
use crate::extract;

/// One poll against one sub-resource of one target.
///
/// Implementations must not let a failure escape: every outcome, including
/// transport errors, is folded into [`PollOutcome`].
#[async_trait]
pub trait DevicePoller: Send + Sync + fmt::Debug {
    /// Poll `sub` on `target` and classify the result
    async fn poll(&self, target: &Target, sub: &SubResource) -> PollOutcome;
}

/// Redfish URL for a PDU outlet
pub fn outlet_url(addr: &str, outlet: u32) -> String {
    format!("https://{addr}/redfish/v1/PowerEquipment/RackPDUs/1/Outlets/OUTLET{outlet}")
}

/// Redfish URL for a chassis sensor
pub fn sensor_url(addr: &str, sensor: &str) -> String {
    format!("https://{addr}/redfish/v1/Chassis/1/Sensors/{sensor}")
}

/// [`DevicePoller`] backed by the HTTP [`DeviceClient`]
#[derive(Debug, Clone)]
pub struct RedfishPoller {
    client: DeviceClient,
}

impl RedfishPoller {
    /// Wrap a device client
    pub fn new(client: DeviceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DevicePoller for RedfishPoller {
    async fn poll(&self, target: &Target, sub: &SubResource) -> PollOutcome {
        let url = match sub {
            SubResource::Outlet(outlet) => outlet_url(&target.addr, *outlet),
            SubResource::Sensor(sensor) => sensor_url(&target.addr, sensor),
        };

        match self.client.fetch_json(&url, &target.credentials).await {
            Ok(FetchOutcome::Payload(payload)) => {
                let sample = match sub {
                    SubResource::Outlet(outlet) => Sample::Outlet {
                        outlet: *outlet,
                        reading: extract::extract_outlet(&payload),
                    },
                    SubResource::Sensor(sensor) => Sample::Sensor {
                        sensor: sensor.clone(),
                        reading: extract::extract_sensor(&payload),
                    },
                };
                PollOutcome::Sample(sample)
            }
            Ok(FetchOutcome::Absent) => {
                debug!(target = %target.name, sub = %sub, "resource absent on device");
                PollOutcome::Absent
            }
            Err(err) => PollOutcome::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlet_url_shape() {
        assert_eq!(
            outlet_url("10.31.238.79", 14),
            "https://10.31.238.79/redfish/v1/PowerEquipment/RackPDUs/1/Outlets/OUTLET14"
        );
    }

    #[test]
    fn test_sensor_url_shape() {
        assert_eq!(
            sensor_url("10.31.200.4", "LiquidLeak"),
            "https://10.31.200.4/redfish/v1/Chassis/1/Sensors/LiquidLeak"
        );
    }
}
