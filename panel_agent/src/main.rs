//! Panel agent binary: drives the periodic simulation tick in one of two
//! modes over the same data model.
//! - local: derive the next reading each tick and display it directly.
//! - remote: derive, POST it to the gateway, fetch the stored document back
//!   and display that. A failed round trip keeps the previous display; the
//!   next regular tick is the retry.
//! - On shutdown (ctrl-c) the current formatted metrics and both history
//!   buffers are written to a datalog JSON file.
//! Configuration comes from panel.yaml, falling back to defaults.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telemetry_core::{
    EfficiencyPoint, History, PowerPoint, Reading, ReadingEnvelope, ReadingPatch, StoredReading,
    initial_reading, tick_reading,
};

#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Local,
    Remote,
}

#[derive(Deserialize, Clone, Debug)]
struct AgentConfig {
    #[serde(default = "default_mode")]
    mode: Mode,
    #[serde(default = "default_gateway_url")]
    gateway_url: String,
    #[serde(default)]
    tick_secs: Option<f64>,
    #[serde(default = "default_export_path")]
    export_path: String,
}

fn default_mode() -> Mode {
    Mode::Local
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:62889".to_string()
}

fn default_export_path() -> String {
    "solar_datalog.json".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            gateway_url: default_gateway_url(),
            tick_secs: None,
            export_path: default_export_path(),
        }
    }
}

impl AgentConfig {
    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).context("read panel config")?;
        let cfg: AgentConfig = serde_yaml::from_str(&content).context("parse panel config yaml")?;
        Ok(cfg)
    }

    /// Local simulation runs at 1 s, remote polling at 5 s, unless overridden.
    fn tick(&self) -> Duration {
        let secs = self.tick_secs.unwrap_or(match self.mode {
            Mode::Local => 1.0,
            Mode::Remote => 5.0,
        });
        Duration::from_secs_f64(secs)
    }
}

fn load_config() -> AgentConfig {
    AgentConfig::load_from_file("panel.yaml").unwrap_or_else(|err| {
        tracing::warn!(?err, "failed to load panel.yaml, falling back to defaults");
        AgentConfig::default()
    })
}

/// What the agent currently shows: the last good reading (or an explicit
/// no-data state) and the two display series.
struct Dashboard {
    reading: Option<Reading>,
    performance_history: History<PowerPoint>,
    correlation_history: History<EfficiencyPoint>,
}

impl Dashboard {
    fn new() -> Self {
        Self {
            reading: None,
            performance_history: History::default(),
            correlation_history: History::default(),
        }
    }

    fn apply(&mut self, reading: Reading, power: PowerPoint, efficiency: EfficiencyPoint) {
        self.performance_history.push(power);
        self.correlation_history.push(efficiency);
        self.reading = Some(reading);
    }

    fn show_no_data(&mut self) {
        self.reading = None;
        tracing::info!("no data yet; waiting for the first reading");
    }

    fn log(&self) {
        if let Some(r) = &self.reading {
            tracing::info!(
                power_kw = r.power,
                efficiency_pct = r.efficiency,
                voltage_v = r.voltage,
                current_a = r.current,
                energy_kwh = r.energy_total,
                light_lux = r.light_intensity,
                panel_temp_c = r.panel_temp,
                dust_pct = r.dust_level,
                "reading"
            );
        }
    }
}

/// Cancels the tick loop. Stopping twice is a no-op.
#[derive(Clone)]
struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = load_config();
    tracing::info!(
        mode = ?cfg.mode,
        tick_secs = cfg.tick().as_secs_f64(),
        "panel agent starting"
    );

    let (stop, stop_rx) = StopHandle::new();
    let loop_cfg = cfg.clone();
    let handle = tokio::spawn(async move {
        match loop_cfg.mode {
            Mode::Local => run_local(loop_cfg, stop_rx).await,
            Mode::Remote => run_remote(loop_cfg, stop_rx).await,
        }
    });

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    tracing::info!("shutting down");
    stop.stop();
    let dashboard = handle.await.context("join tick loop")?;

    if write_datalog(&dashboard, &cfg.export_path)? {
        tracing::info!(path = %cfg.export_path, "datalog written");
    } else {
        tracing::warn!("no reading to export; skipping datalog");
    }
    Ok(())
}

async fn run_local(cfg: AgentConfig, mut stop: watch::Receiver<bool>) -> Dashboard {
    let tick = cfg.tick();
    let mut rng = StdRng::from_entropy();
    let mut dashboard = Dashboard::new();
    let mut current = initial_reading();

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (next, power, efficiency) =
                    tick_reading(&mut rng, &current, tick.as_secs_f64(), Utc::now());
                current = next.clone();
                dashboard.apply(next, power, efficiency);
                dashboard.log();
            }
            _ = stop.changed() => break,
        }
    }
    dashboard
}

async fn run_remote(cfg: AgentConfig, mut stop: watch::Receiver<bool>) -> Dashboard {
    let tick = cfg.tick();
    let client = reqwest::Client::new();
    let mut rng = StdRng::from_entropy();
    let mut dashboard = Dashboard::new();
    // Seed for the first derivation; afterwards the fetched document drives
    // the next tick so the gateway copy stays authoritative.
    let mut last_known = initial_reading();

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (next, _, _) =
                    tick_reading(&mut rng, &last_known, tick.as_secs_f64(), Utc::now());
                if let Err(err) = push_reading(&client, &cfg.gateway_url, &next).await {
                    tracing::warn!(?err, "failed to push reading; will retry next tick");
                }
                match fetch_reading(&client, &cfg.gateway_url).await {
                    Ok(Some(stored)) => {
                        last_known = stored.reading.clone();
                        let power = PowerPoint {
                            time: stored.updated_at,
                            power: stored.reading.power,
                            light_intensity: stored.reading.light_intensity,
                        };
                        let efficiency = EfficiencyPoint {
                            time: stored.updated_at,
                            efficiency: stored.reading.efficiency,
                            panel_temp: stored.reading.panel_temp,
                        };
                        dashboard.apply(stored.reading, power, efficiency);
                        dashboard.log();
                    }
                    Ok(None) => dashboard.show_no_data(),
                    Err(err) => {
                        tracing::warn!(?err, "failed to fetch reading; keeping last displayed state");
                    }
                }
            }
            _ = stop.changed() => break,
        }
    }
    dashboard
}

async fn push_reading(client: &reqwest::Client, base: &str, reading: &Reading) -> Result<()> {
    let patch = ReadingPatch::from_reading(reading);
    client
        .post(format!("{base}/data"))
        .json(&patch)
        .send()
        .await
        .context("post reading")?
        .error_for_status()
        .context("gateway rejected reading")?;
    Ok(())
}

async fn fetch_reading(client: &reqwest::Client, base: &str) -> Result<Option<StoredReading>> {
    let res = client
        .get(format!("{base}/data"))
        .send()
        .await
        .context("fetch reading")?;
    if res.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let envelope: ReadingEnvelope = res
        .error_for_status()
        .context("gateway error")?
        .json()
        .await
        .context("decode reading envelope")?;
    Ok(Some(envelope.data))
}

/// Downloadable snapshot: formatted current metrics plus both histories.
/// Illustrative format, not a versioned wire contract.
#[derive(Serialize)]
struct Datalog {
    timestamp: DateTime<Utc>,
    current_metrics: CurrentMetrics,
    physical_and_environmental_data: EnvironmentalData,
    performance_history: Vec<PowerPoint>,
    correlation_history: Vec<EfficiencyPoint>,
}

#[derive(Serialize)]
struct CurrentMetrics {
    voltage: String,
    current: String,
    power: String,
    energy: String,
    efficiency: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentalData {
    angle: String,
    panel_direction: String,
    light_intensity: String,
    panel_temp: String,
    dust_level: String,
}

fn build_datalog(dashboard: &Dashboard, now: DateTime<Utc>) -> Option<Datalog> {
    let reading = dashboard.reading.as_ref()?;
    Some(Datalog {
        timestamp: now,
        current_metrics: CurrentMetrics {
            voltage: format!("{:.1} V", reading.voltage),
            current: format!("{:.1} A", reading.current),
            power: format!("{:.2} kW", reading.power),
            energy: format!("{:.2} kWh", reading.energy_total),
            efficiency: format!("{:.1} %", reading.efficiency),
        },
        physical_and_environmental_data: EnvironmentalData {
            angle: format!("{} degrees", reading.inclination_angle),
            panel_direction: reading.panel_direction.clone(),
            light_intensity: format!("{:.0} Lux", reading.light_intensity),
            panel_temp: format!("{:.1} °C", reading.panel_temp),
            dust_level: format!("{:.1} %", reading.dust_level),
        },
        performance_history: dashboard.performance_history.snapshot(),
        correlation_history: dashboard.correlation_history.snapshot(),
    })
}

fn write_datalog(dashboard: &Dashboard, path: &str) -> Result<bool> {
    match build_datalog(dashboard, Utc::now()) {
        Some(datalog) => {
            let json = serde_json::to_string_pretty(&datalog).context("serialize datalog")?;
            std::fs::write(path, json).context("write datalog file")?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.mode, Mode::Local);
        assert_eq!(cfg.tick(), Duration::from_secs(1));

        let cfg: AgentConfig = serde_yaml::from_str("mode: remote\n").unwrap();
        assert_eq!(cfg.mode, Mode::Remote);
        assert_eq!(cfg.tick(), Duration::from_secs(5));

        let cfg: AgentConfig = serde_yaml::from_str("mode: local\ntick_secs: 0.25\n").unwrap();
        assert_eq!(cfg.tick(), Duration::from_secs_f64(0.25));
    }

    #[test]
    fn stop_handle_is_idempotent() {
        let (stop, mut rx) = StopHandle::new();
        stop.stop();
        stop.stop();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn local_loop_ticks_and_stops_cleanly() {
        let cfg = AgentConfig {
            tick_secs: Some(0.01),
            ..Default::default()
        };
        let (stop, rx) = StopHandle::new();
        let handle = tokio::spawn(run_local(cfg, rx));
        tokio::time::sleep(Duration::from_millis(80)).await;
        stop.stop();
        stop.stop();
        let dashboard = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should stop promptly")
            .unwrap();
        assert!(dashboard.reading.is_some());
        assert!(!dashboard.performance_history.is_empty());
        assert_eq!(
            dashboard.performance_history.len(),
            dashboard.correlation_history.len()
        );
    }

    #[test]
    fn datalog_formats_current_metrics() {
        let mut dashboard = Dashboard::new();
        let now = Utc::now();
        let reading = initial_reading();
        let power = PowerPoint {
            time: now,
            power: reading.power,
            light_intensity: reading.light_intensity,
        };
        let efficiency = EfficiencyPoint {
            time: now,
            efficiency: reading.efficiency,
            panel_temp: reading.panel_temp,
        };
        dashboard.apply(reading, power, efficiency);

        let datalog = build_datalog(&dashboard, now).unwrap();
        assert_eq!(datalog.current_metrics.voltage, "480.0 V");
        assert_eq!(datalog.current_metrics.power, "12.00 kW");
        assert_eq!(datalog.current_metrics.energy, "1500.00 kWh");
        assert_eq!(datalog.performance_history.len(), 1);

        let value = serde_json::to_value(&datalog).unwrap();
        assert_eq!(
            value["physical_and_environmental_data"]["panelDirection"],
            "South"
        );
        assert_eq!(
            value["physical_and_environmental_data"]["angle"],
            "30 degrees"
        );
        assert_eq!(value["performance_history"][0]["lightIntensity"], 50000.0);
    }

    #[test]
    fn datalog_skipped_without_a_reading() {
        assert!(build_datalog(&Dashboard::new(), Utc::now()).is_none());
    }
}
