//! Shared reading types and derivation logic for the solar monitor.
//! Keep this crate free of HTTP/SQL deps so both gateway and agent can reuse it.
//!
//! The derivation engine is a pure function of (previous reading, randomness,
//! elapsed time); the caller owns the current reading and the history buffers
//! across ticks.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rated full-sun output of the array, in kW. Efficiency denominator.
pub const MAX_THEORETICAL_POWER_KW: f64 = 50.0;

/// Display history capacity, per series.
pub const MAX_HISTORY_LEN: usize = 30;

/// Symmetric jitter ranges applied per tick.
pub const ELECTRICAL_JITTER: f64 = 0.5;
pub const LIGHT_JITTER: f64 = 500.0;
pub const TEMP_JITTER: f64 = 0.5;
pub const DUST_JITTER: f64 = 0.1;

/// One full snapshot of electrical + environmental sensor values.
/// Field names on the wire are camelCase to match the REST contract.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Reading {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub energy_total: f64,
    pub efficiency: f64,
    pub light_intensity: f64,
    pub panel_temp: f64,
    pub dust_level: f64,
    pub inclination_angle: f64,
    pub panel_direction: String,
    pub sensor_health: String,
}

impl Default for Reading {
    // Schema defaults applied when a partial update creates the document.
    fn default() -> Self {
        Self {
            voltage: 0.0,
            current: 0.0,
            power: 0.0,
            energy_total: 0.0,
            efficiency: 0.0,
            light_intensity: 0.0,
            panel_temp: 0.0,
            dust_level: 0.0,
            inclination_angle: 0.0,
            panel_direction: "South".to_string(),
            sensor_health: "OK".to_string(),
        }
    }
}

/// Seed reading for a fresh simulation session.
pub fn initial_reading() -> Reading {
    Reading {
        voltage: 480.0,
        current: 25.0,
        power: 12.0,
        energy_total: 1500.0,
        efficiency: 75.0,
        light_intensity: 50_000.0,
        panel_temp: 45.0,
        dust_level: 5.0,
        inclination_angle: 30.0,
        panel_direction: "South".to_string(),
        sensor_health: "OK".to_string(),
    }
}

/// Partial update for the stored reading; the POST /data body.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light_intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dust_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclination_angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_health: Option<String>,
}

impl ReadingPatch {
    pub fn is_empty(&self) -> bool {
        self.voltage.is_none()
            && self.current.is_none()
            && self.power.is_none()
            && self.energy_total.is_none()
            && self.efficiency.is_none()
            && self.light_intensity.is_none()
            && self.panel_temp.is_none()
            && self.dust_level.is_none()
            && self.inclination_angle.is_none()
            && self.panel_direction.is_none()
            && self.sensor_health.is_none()
    }

    /// Overwrite only the provided fields on `reading`.
    pub fn apply(&self, reading: &mut Reading) {
        if let Some(v) = self.voltage {
            reading.voltage = v;
        }
        if let Some(v) = self.current {
            reading.current = v;
        }
        if let Some(v) = self.power {
            reading.power = v;
        }
        if let Some(v) = self.energy_total {
            reading.energy_total = v;
        }
        if let Some(v) = self.efficiency {
            reading.efficiency = v;
        }
        if let Some(v) = self.light_intensity {
            reading.light_intensity = v;
        }
        if let Some(v) = self.panel_temp {
            reading.panel_temp = v;
        }
        if let Some(v) = self.dust_level {
            reading.dust_level = v;
        }
        if let Some(v) = self.inclination_angle {
            reading.inclination_angle = v;
        }
        if let Some(ref v) = self.panel_direction {
            reading.panel_direction = v.clone();
        }
        if let Some(ref v) = self.sensor_health {
            reading.sensor_health = v.clone();
        }
    }

    /// A patch carrying every field, for pushing a full simulated reading.
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            voltage: Some(reading.voltage),
            current: Some(reading.current),
            power: Some(reading.power),
            energy_total: Some(reading.energy_total),
            efficiency: Some(reading.efficiency),
            light_intensity: Some(reading.light_intensity),
            panel_temp: Some(reading.panel_temp),
            dust_level: Some(reading.dust_level),
            inclination_angle: Some(reading.inclination_angle),
            panel_direction: Some(reading.panel_direction.clone()),
            sensor_health: Some(reading.sensor_health.clone()),
        }
    }
}

/// The reading as the gateway stores and returns it.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StoredReading {
    #[serde(flatten)]
    pub reading: Reading,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Success envelope returned by the gateway data endpoints.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ReadingEnvelope {
    pub message: String,
    pub data: StoredReading,
}

/// Point on the power / light-intensity series.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PowerPoint {
    pub time: DateTime<Utc>,
    pub power: f64,
    pub light_intensity: f64,
}

/// Point on the efficiency / panel-temperature series.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyPoint {
    pub time: DateTime<Utc>,
    pub efficiency: f64,
    pub panel_temp: f64,
}

/// Fixed-capacity, oldest-evicted-first display buffer.
#[derive(Clone, Debug)]
pub struct History<T> {
    points: VecDeque<T>,
    capacity: usize,
}

impl<T> History<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append-and-evict: once over capacity, the oldest point is dropped.
    pub fn push(&mut self, point: T) {
        self.points.push_back(point);
        if self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.points.iter()
    }

    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.points.iter().cloned().collect()
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(MAX_HISTORY_LEN)
    }
}

/// Jittered copies of the environmental inputs for the next tick.
#[derive(Clone, Debug)]
pub struct Environment {
    pub light_intensity: f64,
    pub panel_temp: f64,
    pub dust_level: f64,
}

/// Electrical outputs recomputed from the (jittered) inputs.
#[derive(Clone, Debug)]
pub struct Derived {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub efficiency: f64,
}

/// Apply a symmetric uniform jitter and round to display precision.
///
/// The precision rule is asymmetric on purpose: one decimal at magnitude >= 10,
/// two below. Derived fields consume the already-rounded value, so this is not
/// cosmetic.
pub fn perturb<R: Rng + ?Sized>(rng: &mut R, value: f64, range: f64) -> f64 {
    let jittered = value + rng.gen_range(-0.5..0.5) * range;
    let decimals = if jittered.abs() >= 10.0 { 1 } else { 2 };
    round_to(jittered, decimals)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Power/efficiency from already-jittered inputs. Kept separate from the RNG
/// path so the physics can be checked deterministically.
pub fn compute_power_and_efficiency(
    voltage: f64,
    current: f64,
    panel_temp: f64,
    dust_level: f64,
    light_intensity: f64,
) -> (f64, f64) {
    let base_power = voltage * current / 1000.0;
    // No thermal derating at or below 25 C; linear above it.
    let temp_penalty = (panel_temp - 25.0).max(0.0) * 0.005;
    // Soiling derates up to 15% at 100% dust.
    let dust_penalty = dust_level / 100.0 * 0.15;
    let penalty_factor = 1.0 - temp_penalty - dust_penalty;
    let power = round_to(base_power * penalty_factor, 2).max(0.0);

    let theoretical_power = MAX_THEORETICAL_POWER_KW * (light_intensity / 100_000.0);
    // Zero light means zero theoretical power; report zero efficiency rather
    // than propagating a NaN/Inf ratio.
    let efficiency = if theoretical_power > 0.0 {
        power / theoretical_power * 100.0
    } else {
        0.0
    };
    let efficiency = if efficiency.is_finite() {
        efficiency.clamp(0.0, 100.0)
    } else {
        0.0
    };
    (power, efficiency)
}

/// Jitter voltage/current, then recompute power and efficiency against the
/// reading's environmental inputs.
pub fn derive_power_and_efficiency<R: Rng + ?Sized>(rng: &mut R, reading: &Reading) -> Derived {
    let voltage = perturb(rng, reading.voltage, ELECTRICAL_JITTER);
    let current = perturb(rng, reading.current, ELECTRICAL_JITTER);
    let (power, efficiency) = compute_power_and_efficiency(
        voltage,
        current,
        reading.panel_temp,
        reading.dust_level,
        reading.light_intensity,
    );
    Derived {
        voltage,
        current,
        power,
        efficiency,
    }
}

/// Slow environmental drift applied once per tick.
pub fn advance_environment<R: Rng + ?Sized>(rng: &mut R, reading: &Reading) -> Environment {
    Environment {
        light_intensity: perturb(rng, reading.light_intensity, LIGHT_JITTER),
        panel_temp: perturb(rng, reading.panel_temp, TEMP_JITTER),
        dust_level: perturb(rng, reading.dust_level, DUST_JITTER),
    }
}

/// kWh accumulated by holding `power_kw` for `tick_secs`.
pub fn accumulate_energy(prev_energy: f64, power_kw: f64, tick_secs: f64) -> f64 {
    prev_energy + power_kw * tick_secs / 3600.0
}

/// Advance one tick: drift the environment, bank energy produced at the
/// previous power level over the elapsed interval, then rederive the
/// electricals from the new environment. Returns the next reading plus the
/// two display points for this tick.
pub fn tick_reading<R: Rng + ?Sized>(
    rng: &mut R,
    prev: &Reading,
    tick_secs: f64,
    now: DateTime<Utc>,
) -> (Reading, PowerPoint, EfficiencyPoint) {
    let env = advance_environment(rng, prev);
    let energy_total = accumulate_energy(prev.energy_total, prev.power, tick_secs);

    let probe = Reading {
        light_intensity: env.light_intensity,
        panel_temp: env.panel_temp,
        dust_level: env.dust_level,
        ..prev.clone()
    };
    let derived = derive_power_and_efficiency(rng, &probe);

    let next = Reading {
        voltage: derived.voltage,
        current: derived.current,
        power: derived.power,
        efficiency: derived.efficiency,
        energy_total,
        light_intensity: env.light_intensity,
        panel_temp: env.panel_temp,
        dust_level: env.dust_level,
        ..prev.clone()
    };
    let power_point = PowerPoint {
        time: now,
        power: next.power,
        light_intensity: next.light_intensity,
    };
    let efficiency_point = EfficiencyPoint {
        time: now,
        efficiency: next.efficiency,
        panel_temp: next.panel_temp,
    };
    (next, power_point, efficiency_point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn perturb_with_zero_range_only_rounds() {
        let mut r = rng();
        assert_eq!(perturb(&mut r, 480.0, 0.0), 480.0);
        assert_eq!(perturb(&mut r, 9.876, 0.0), 9.88);
        assert_eq!(perturb(&mut r, 10.04, 0.0), 10.0);
        assert_eq!(perturb(&mut r, -12.34, 0.0), -12.3);
        assert_eq!(perturb(&mut r, -9.876, 0.0), -9.88);
    }

    #[test]
    fn perturb_stays_within_range() {
        let mut r = rng();
        for _ in 0..1000 {
            let v = perturb(&mut r, 100.0, 0.5);
            // Half-range each side, plus rounding slack at one decimal.
            assert!((v - 100.0).abs() <= 0.25 + 0.05 + 1e-9);
        }
    }

    #[test]
    fn no_temp_penalty_at_or_below_25() {
        let (power_cool, _) = compute_power_and_efficiency(480.0, 25.0, 25.0, 0.0, 50_000.0);
        let (power_cold, _) = compute_power_and_efficiency(480.0, 25.0, -10.0, 0.0, 50_000.0);
        assert_eq!(power_cool, 12.0);
        assert_eq!(power_cold, 12.0);
    }

    #[test]
    fn dust_penalty_endpoints() {
        let (clean, _) = compute_power_and_efficiency(480.0, 25.0, 25.0, 0.0, 50_000.0);
        let (soiled, _) = compute_power_and_efficiency(480.0, 25.0, 25.0, 100.0, 50_000.0);
        assert_eq!(clean, 12.0);
        // Full soiling derates by exactly 15%.
        assert!((soiled - 12.0 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn reference_scenario_without_jitter() {
        // basePower 12.0, tempPenalty 0.1, dustPenalty 0.0075 => power 10.71;
        // theoretical 25 kW at 50k lux => efficiency 42.84%.
        let (power, efficiency) = compute_power_and_efficiency(480.0, 25.0, 45.0, 5.0, 50_000.0);
        assert!((power - 10.71).abs() < 1e-9, "power was {power}");
        assert!((efficiency - 42.84).abs() < 1e-9, "efficiency was {efficiency}");
    }

    #[test]
    fn zero_light_yields_zero_efficiency() {
        let (_, efficiency) = compute_power_and_efficiency(480.0, 25.0, 45.0, 5.0, 0.0);
        assert_eq!(efficiency, 0.0);
    }

    #[test]
    fn extreme_penalties_floor_power_and_efficiency_at_zero() {
        // tempPenalty 1.0 + dustPenalty 0.15 pushes the factor negative.
        let (power, efficiency) = compute_power_and_efficiency(480.0, 25.0, 225.0, 100.0, 50_000.0);
        assert_eq!(power, 0.0);
        assert_eq!(efficiency, 0.0);
    }

    #[test]
    fn outputs_always_in_bounds_under_random_drift() {
        let mut r = rng();
        let mut reading = initial_reading();
        let now = Utc::now();
        for _ in 0..2000 {
            let (next, _, _) = tick_reading(&mut r, &reading, 1.0, now);
            assert!(next.power >= 0.0);
            assert!(next.power.is_finite());
            assert!(next.efficiency.is_finite());
            assert!((0.0..=100.0).contains(&next.efficiency));
            reading = next;
        }
    }

    #[test]
    fn energy_accumulates_by_power_times_hours() {
        assert!((accumulate_energy(100.0, 10.0, 3600.0) - 110.0).abs() < 1e-12);
        assert!((accumulate_energy(1500.0, 12.0, 1.0) - (1500.0 + 12.0 / 3600.0)).abs() < 1e-12);
    }

    #[test]
    fn energy_never_decreases_across_ticks() {
        let mut r = rng();
        let mut reading = initial_reading();
        let now = Utc::now();
        let mut last = reading.energy_total;
        for _ in 0..500 {
            let (next, _, _) = tick_reading(&mut r, &reading, 1.0, now);
            assert!(next.energy_total >= last);
            last = next.energy_total;
            reading = next;
        }
    }

    #[test]
    fn history_evicts_oldest_at_capacity() {
        let mut history: History<u32> = History::new(MAX_HISTORY_LEN);
        for i in 0..31 {
            history.push(i);
        }
        assert_eq!(history.len(), MAX_HISTORY_LEN);
        let points: Vec<u32> = history.snapshot();
        assert!(!points.contains(&0));
        assert_eq!(points.first(), Some(&1));
        assert_eq!(points.last(), Some(&30));
    }

    #[test]
    fn empty_patch_detected() {
        assert!(ReadingPatch::default().is_empty());
        let patch = ReadingPatch {
            panel_temp: Some(45.2),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn patch_merges_over_defaults() {
        let patch = ReadingPatch {
            panel_temp: Some(45.2),
            power: Some(350.5),
            ..Default::default()
        };
        let mut reading = Reading::default();
        patch.apply(&mut reading);
        assert_eq!(reading.panel_temp, 45.2);
        assert_eq!(reading.power, 350.5);
        assert_eq!(reading.voltage, 0.0);
        assert_eq!(reading.panel_direction, "South");
        assert_eq!(reading.sensor_health, "OK");
    }

    #[test]
    fn reading_round_trips_camel_case() {
        let json = serde_json::to_value(initial_reading()).unwrap();
        assert!(json.get("energyTotal").is_some());
        assert!(json.get("lightIntensity").is_some());
        assert!(json.get("inclinationAngle").is_some());
        let back: Reading = serde_json::from_value(json).unwrap();
        assert_eq!(back, initial_reading());
    }

    #[test]
    fn partial_reading_json_fills_schema_defaults() {
        let reading: Reading = serde_json::from_str(r#"{"panelTemp": 45.2}"#).unwrap();
        assert_eq!(reading.panel_temp, 45.2);
        assert_eq!(reading.panel_direction, "South");
        assert_eq!(reading.sensor_health, "OK");
        assert_eq!(reading.voltage, 0.0);
    }
}
