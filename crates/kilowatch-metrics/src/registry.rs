//! Last-value metric state and exposition encoding
//!
//! One owned registry per process, constructed at startup and shared by
//! reference; nothing registers into a global default registry. Values are
//! last-write-wins gauges keyed by fixed label sets, so the exposition
//! handler can read a consistent snapshot at any time, including mid-sweep.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kilowatch_core::{Error, OutletReading, Result, SensorReading, Target};
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntGauge, Opts, Registry, TextEncoder,
};

/// Latency buckets sized for LAN management controllers: most answers land
/// well under a second, retried calls can take several.
const SCRAPE_BUCKETS: &[f64] = &[0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0];

/// All exporter metrics, plus the process-wide readiness flag
pub struct ExporterMetrics {
    registry: Registry,
    outlet_watts: GaugeVec,
    outlet_volts: GaugeVec,
    sensor_health: GaugeVec,
    scrape_ok: GaugeVec,
    last_success: GaugeVec,
    scrape_duration: Histogram,
    in_flight: IntGauge,
    ready_gauge: IntGauge,
    ready: AtomicBool,
}

impl fmt::Debug for ExporterMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterMetrics")
            .field("ready", &self.is_ready())
            .field("in_flight", &self.in_flight.get())
            .finish()
    }
}

impl ExporterMetrics {
    /// Create and register all metric families
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let outlet_watts = GaugeVec::new(
            Opts::new("pdu_outlet_power_watts", "PDU outlet power (Watts)"),
            &["pdu", "ip", "outlet", "rack", "row"],
        )
        .map_err(registry_error)?;

        let outlet_volts = GaugeVec::new(
            Opts::new("pdu_outlet_voltage_volts", "PDU outlet voltage (Volts)"),
            &["pdu", "ip", "outlet", "rack", "row"],
        )
        .map_err(registry_error)?;

        let sensor_health = GaugeVec::new(
            Opts::new(
                "bmc_sensor_health_ok",
                "BMC chassis sensor health (1=OK, 0=degraded)",
            ),
            &["bmc", "ip", "sensor", "rack", "row"],
        )
        .map_err(registry_error)?;

        let scrape_ok = GaugeVec::new(
            Opts::new(
                "pdu_scrape_ok",
                "Last scrape success for this device (1=ok, 0=fail)",
            ),
            &["pdu", "ip"],
        )
        .map_err(registry_error)?;

        let last_success = GaugeVec::new(
            Opts::new(
                "pdu_last_success_epoch_seconds",
                "Unix epoch of last successful scrape for this device",
            ),
            &["pdu", "ip"],
        )
        .map_err(registry_error)?;

        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                "pdu_scrape_duration_seconds",
                "Latency for a single sub-resource poll, including retries",
            )
            .buckets(SCRAPE_BUCKETS.to_vec()),
        )
        .map_err(registry_error)?;

        let in_flight = IntGauge::new("pdu_requests_in_flight", "Requests currently in flight")
            .map_err(registry_error)?;

        let ready_gauge = IntGauge::new(
            "pdu_exporter_ready",
            "Exporter readiness (1=ready, 0=initializing)",
        )
        .map_err(registry_error)?;

        for collector in [
            Box::new(outlet_watts.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(outlet_volts.clone()),
            Box::new(sensor_health.clone()),
            Box::new(scrape_ok.clone()),
            Box::new(last_success.clone()),
            Box::new(scrape_duration.clone()),
            Box::new(in_flight.clone()),
            Box::new(ready_gauge.clone()),
        ] {
            registry.register(collector).map_err(registry_error)?;
        }

        Ok(Self {
            registry,
            outlet_watts,
            outlet_volts,
            sensor_health,
            scrape_ok,
            last_success,
            scrape_duration,
            in_flight,
            ready_gauge,
            ready: AtomicBool::new(false),
        })
    }

    /// Record an outlet reading. Absent fields write nothing, so stale values
    /// survive a partial payload rather than dropping to zero.
    pub fn record_outlet(&self, target: &Target, outlet: u32, reading: &OutletReading) {
        let outlet_label = outlet.to_string();
        let labels = [
            target.name.as_str(),
            target.addr.as_str(),
            outlet_label.as_str(),
            target.label("rack"),
            target.label("row"),
        ];

        if let Some(watts) = reading.watts {
            self.outlet_watts.with_label_values(&labels).set(watts);
        }
        if let Some(volts) = reading.volts {
            self.outlet_volts.with_label_values(&labels).set(volts);
        }
    }

    /// Record a chassis sensor reading
    pub fn record_sensor(&self, target: &Target, sensor: &str, reading: &SensorReading) {
        if let Some(healthy) = reading.is_healthy() {
            self.sensor_health
                .with_label_values(&[
                    target.name.as_str(),
                    target.addr.as_str(),
                    sensor,
                    target.label("rack"),
                    target.label("row"),
                ])
                .set(if healthy { 1.0 } else { 0.0 });
        }
    }

    /// Mark the device's last scrape successful and stamp the success time
    pub fn record_scrape_success(&self, target: &Target, at: SystemTime) {
        let labels = [target.name.as_str(), target.addr.as_str()];
        self.scrape_ok.with_label_values(&labels).set(1.0);
        self.last_success
            .with_label_values(&labels)
            .set(unix_epoch_seconds(at));
    }

    /// Mark the device's last scrape failed
    pub fn record_scrape_failure(&self, target: &Target) {
        self.scrape_ok
            .with_label_values(&[target.name.as_str(), target.addr.as_str()])
            .set(0.0);
    }

    /// Observe one poll's duration, retries included
    pub fn observe_scrape_duration(&self, duration: Duration) {
        self.scrape_duration.observe(duration.as_secs_f64());
    }

    /// Handle to the in-flight gauge, for wiring into the device client
    pub fn in_flight_gauge(&self) -> IntGauge {
        self.in_flight.clone()
    }

    /// RAII in-flight marker
    pub fn in_flight_guard(&self) -> InFlightGuard {
        InFlightGuard::new(self.in_flight.clone())
    }

    /// Current in-flight count
    pub fn in_flight(&self) -> i64 {
        self.in_flight.get()
    }

    /// Flip the process to ready. First call wins; later calls are no-ops,
    /// and nothing ever flips it back.
    pub fn mark_ready(&self) {
        if self
            .ready
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.ready_gauge.set(1);
            tracing::info!("first sweep complete, exporter ready");
        }
    }

    /// Whether the first sweep has completed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Encode the current snapshot in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(registry_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(format!("non-utf8 exposition: {e}")))
    }
}

/// Increments the in-flight gauge for exactly as long as it lives
pub struct InFlightGuard {
    gauge: IntGauge,
}

impl InFlightGuard {
    /// Increment `gauge`, decrementing on drop
    pub fn new(gauge: IntGauge) -> Self {
        gauge.inc();
        Self { gauge }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

impl fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightGuard").finish()
    }
}

fn registry_error(e: prometheus::Error) -> Error {
    Error::Metrics(e.to_string())
}

fn unix_epoch_seconds(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use kilowatch_core::{Credentials, TargetKind};

    fn pdu_target() -> Target {
        Target {
            name: "tus1-pdu-a1".to_string(),
            addr: "10.31.238.79".to_string(),
            credentials: Credentials {
                user: "admin".to_string(),
                password: "x".to_string(),
            },
            kind: TargetKind::Pdu { outlets: vec![14] },
            labels: BTreeMap::from([("rack".to_string(), "ru3".to_string())]),
        }
    }

    #[test]
    fn test_scalar_gauges_present_after_new() {
        let metrics = ExporterMetrics::new().unwrap();
        let text = metrics.render().unwrap();

        assert!(text.contains("pdu_requests_in_flight 0"));
        assert!(text.contains("pdu_exporter_ready 0"));
        assert!(text.contains("pdu_scrape_duration_seconds"));
    }

    #[test]
    fn test_record_outlet_writes_present_fields_only() {
        let metrics = ExporterMetrics::new().unwrap();
        let target = pdu_target();

        metrics.record_outlet(
            &target,
            14,
            &OutletReading {
                watts: Some(120.5),
                volts: None,
            },
        );

        let text = metrics.render().unwrap();
        assert!(text.contains("pdu_outlet_power_watts"));
        assert!(text.contains("120.5"));
        assert!(text.contains(r#"outlet="14""#));
        assert!(text.contains(r#"rack="ru3""#));
        // Absent row still appears, as an empty label value.
        assert!(text.contains(r#"row="""#));
        // No voltage was extracted, so no voltage series exists.
        assert!(!text.contains(r#"pdu_outlet_voltage_volts{"#));
    }

    #[test]
    fn test_scrape_bookkeeping_flips_gauge() {
        let metrics = ExporterMetrics::new().unwrap();
        let target = pdu_target();

        metrics.record_scrape_success(&target, SystemTime::now());
        let text = metrics.render().unwrap();
        assert!(series_value(&text, "pdu_scrape_ok", &[r#"pdu="tus1-pdu-a1""#]) == Some(1.0));
        assert!(text.contains("pdu_last_success_epoch_seconds"));

        metrics.record_scrape_failure(&target);
        let text = metrics.render().unwrap();
        assert!(series_value(&text, "pdu_scrape_ok", &[r#"pdu="tus1-pdu-a1""#]) == Some(0.0));
    }

    #[test]
    fn test_sensor_health_values() {
        let metrics = ExporterMetrics::new().unwrap();
        let mut target = pdu_target();
        target.name = "tus1-p001".to_string();
        target.kind = TargetKind::Bmc {
            sensors: vec!["LiquidLeak".to_string()],
        };

        // Absent health writes nothing.
        metrics.record_sensor(&target, "LiquidLeak", &SensorReading::default());
        assert!(!metrics
            .render()
            .unwrap()
            .contains("bmc_sensor_health_ok{"));

        metrics.record_sensor(
            &target,
            "LiquidLeak",
            &SensorReading {
                health: Some("OK".to_string()),
                location: None,
            },
        );
        let text = metrics.render().unwrap();
        assert!(
            series_value(&text, "bmc_sensor_health_ok", &[r#"sensor="LiquidLeak""#])
                == Some(1.0)
        );
    }

    #[test]
    fn test_snapshot_idempotent_between_writes() {
        let metrics = ExporterMetrics::new().unwrap();
        metrics.record_outlet(
            &pdu_target(),
            1,
            &OutletReading {
                watts: Some(42.0),
                volts: Some(230.1),
            },
        );

        let first = metrics.render().unwrap();
        let second = metrics.render().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ready_is_set_once() {
        let metrics = ExporterMetrics::new().unwrap();
        assert!(!metrics.is_ready());

        metrics.mark_ready();
        assert!(metrics.is_ready());
        assert!(metrics.render().unwrap().contains("pdu_exporter_ready 1"));

        // Second call is a no-op, not a toggle.
        metrics.mark_ready();
        assert!(metrics.is_ready());
    }

    #[test]
    fn test_in_flight_guard_is_raii() {
        let metrics = ExporterMetrics::new().unwrap();
        assert_eq!(metrics.in_flight(), 0);

        {
            let _a = metrics.in_flight_guard();
            let _b = metrics.in_flight_guard();
            assert_eq!(metrics.in_flight(), 2);
        }

        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn test_scrape_duration_buckets() {
        let metrics = ExporterMetrics::new().unwrap();
        metrics.observe_scrape_duration(Duration::from_millis(150));

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"pdu_scrape_duration_seconds_bucket{le="0.2"} 1"#));
        assert!(text.contains(r#"pdu_scrape_duration_seconds_bucket{le="0.1"} 0"#));
        assert!(text.contains("pdu_scrape_duration_seconds_count 1"));
    }

    /// Pull one series value out of rendered exposition text.
    fn series_value(text: &str, name: &str, labels_contains: &[&str]) -> Option<f64> {
        text.lines()
            .filter(|l| l.starts_with(name))
            .find(|l| labels_contains.iter().all(|frag| l.contains(frag)))
            .and_then(|l| l.rsplit(' ').next())
            .and_then(|v| v.parse().ok())
    }
}
