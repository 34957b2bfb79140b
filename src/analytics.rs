//! Post-hoc analytics over telemetry history: statistics, anomaly
//! detection, savings estimates, and health reporting.

use std::fmt;

use serde::Serialize;

use crate::devices::Device;
use crate::sim::types::{SimTime, TelemetrySnapshot};

/// Minimum history length before anomaly detection runs.
pub const MIN_ANOMALY_SAMPLES: usize = 10;
/// Charge drop between consecutive readings flagged as sudden (points).
const SUDDEN_DROP_PERCENT: f32 = 10.0;
/// Cell temperature above which a reading is critical (°C).
const HIGH_TEMPERATURE_C: f32 = 40.0;
/// Charge below which a reading is flagged as low (percent).
const LOW_CHARGE_PERCENT: f32 = 10.0;
/// Fraction of exported energy credited against imports.
const EXPORT_CREDIT: f32 = 0.5;

/// Mean, extremes, and sample standard deviation of battery charge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeStats {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
    pub std: f32,
}

/// Energy and power figures for one flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStats {
    /// Energy over the window (kWh).
    pub total_kwh: f32,
    /// Mean power (kW).
    pub mean_kw: f32,
    /// Peak power (kW).
    pub peak_kw: f32,
}

/// Grid exchange over the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridStats {
    /// Energy imported (kWh).
    pub imported_kwh: f32,
    /// Energy exported (kWh, positive).
    pub exported_kwh: f32,
    /// Share of solar generation consumed on site (percent).
    pub self_consumption_rate: f32,
}

/// Aggregate statistics derived from a window of snapshots.
///
/// Energy is integrated over the actual spacing between timestamps: each
/// reading's power is held over the interval ending at that reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryStatistics {
    /// Number of snapshots in the window.
    pub samples: usize,
    /// Battery charge statistics.
    pub battery_charge: ChargeStats,
    /// Solar generation.
    pub solar_generation: FlowStats,
    /// Household consumption.
    pub home_consumption: FlowStats,
    /// Grid exchange.
    pub grid_interaction: GridStats,
    /// Battery energy throughput (kWh, sum of |power| * dt).
    pub battery_throughput_kwh: f32,
    /// Battery equivalent full cycles (throughput / 2*capacity).
    pub equivalent_full_cycles: f32,
}

fn interval_hours(
    snapshots: &[TelemetrySnapshot],
) -> impl Iterator<Item = (&TelemetrySnapshot, f32)> {
    snapshots.windows(2).map(|pair| {
        let dt_s = pair[1].timestamp.seconds().saturating_sub(pair[0].timestamp.seconds());
        (&pair[1], dt_s as f32 / 3600.0)
    })
}

impl TelemetryStatistics {
    /// Computes statistics for `snapshots` (ascending by timestamp).
    ///
    /// # Returns
    ///
    /// `None` for an empty window.
    pub fn from_snapshots(
        snapshots: &[TelemetrySnapshot],
        battery_capacity_kwh: f32,
    ) -> Option<Self> {
        if snapshots.is_empty() {
            return None;
        }
        let n = snapshots.len() as f32;

        let charges: Vec<f32> = snapshots.iter().map(|s| s.battery_charge_percent).collect();
        let mean = charges.iter().sum::<f32>() / n;
        let std = if snapshots.len() > 1 {
            (charges.iter().map(|c| (c - mean).powi(2)).sum::<f32>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let battery_charge = ChargeStats {
            mean,
            min: charges.iter().copied().fold(f32::INFINITY, f32::min),
            max: charges.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            std,
        };

        let mut solar_kwh = 0.0_f32;
        let mut home_kwh = 0.0_f32;
        let mut imported = 0.0_f32;
        let mut exported = 0.0_f32;
        let mut throughput = 0.0_f32;
        for (s, dt) in interval_hours(snapshots) {
            solar_kwh += s.solar_power_kw * dt;
            home_kwh += s.home_power_kw * dt;
            imported += s.grid_power_kw.max(0.0) * dt;
            exported += (-s.grid_power_kw).max(0.0) * dt;
            throughput += s.battery_power_kw.abs() * dt;
        }

        let flow = |total_kwh: f32, f: fn(&TelemetrySnapshot) -> f32| FlowStats {
            total_kwh,
            mean_kw: snapshots.iter().map(f).sum::<f32>() / n,
            peak_kw: snapshots.iter().map(f).fold(0.0, f32::max),
        };

        Some(Self {
            samples: snapshots.len(),
            battery_charge,
            solar_generation: flow(solar_kwh, |s| s.solar_power_kw),
            home_consumption: flow(home_kwh, |s| s.home_power_kw),
            grid_interaction: GridStats {
                imported_kwh: imported,
                exported_kwh: exported,
                self_consumption_rate: self_consumption_rate(solar_kwh, exported),
            },
            battery_throughput_kwh: throughput,
            equivalent_full_cycles: if battery_capacity_kwh > 0.0 {
                throughput / (2.0 * battery_capacity_kwh)
            } else {
                0.0
            },
        })
    }
}

fn self_consumption_rate(solar_kwh: f32, exported_kwh: f32) -> f32 {
    if solar_kwh > 0.0 {
        ((1.0 - exported_kwh / solar_kwh) * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

impl fmt::Display for TelemetryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Telemetry Statistics ({} samples) ---", self.samples)?;
        writeln!(
            f,
            "Battery charge:        mean {:.1}%  min {:.1}%  max {:.1}%  std {:.2}",
            self.battery_charge.mean,
            self.battery_charge.min,
            self.battery_charge.max,
            self.battery_charge.std
        )?;
        writeln!(
            f,
            "Solar generation:      {:.2} kWh (peak {:.2} kW)",
            self.solar_generation.total_kwh, self.solar_generation.peak_kw
        )?;
        writeln!(
            f,
            "Home consumption:      {:.2} kWh (peak {:.2} kW)",
            self.home_consumption.total_kwh, self.home_consumption.peak_kw
        )?;
        writeln!(
            f,
            "Grid import / export:  {:.2} / {:.2} kWh",
            self.grid_interaction.imported_kwh, self.grid_interaction.exported_kwh
        )?;
        writeln!(
            f,
            "Self-consumption:      {:.1}%",
            self.grid_interaction.self_consumption_rate
        )?;
        write!(
            f,
            "Battery throughput:    {:.2} kWh ({:.2} equiv. cycles)",
            self.battery_throughput_kwh, self.equivalent_full_cycles
        )
    }
}

/// Category of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SuddenBatteryDrop,
    HighTemperature,
    LowBattery,
}

/// Severity of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// One anomaly found in a telemetry window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    /// Timestamp of the most extreme offending reading.
    pub timestamp: SimTime,
    pub severity: Severity,
    pub message: String,
}

/// Flags sudden charge drops, overheating, and low charge.
///
/// At most one anomaly per kind is reported, located at the most extreme
/// reading. Windows shorter than [`MIN_ANOMALY_SAMPLES`] yield nothing.
pub fn detect_anomalies(snapshots: &[TelemetrySnapshot]) -> Vec<Anomaly> {
    if snapshots.len() < MIN_ANOMALY_SAMPLES {
        return Vec::new();
    }
    let mut anomalies = Vec::new();

    let steepest_drop = snapshots
        .windows(2)
        .map(|pair| (&pair[1], pair[1].battery_charge_percent - pair[0].battery_charge_percent))
        .min_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((snap, diff)) = steepest_drop
        && diff < -SUDDEN_DROP_PERCENT
    {
        anomalies.push(Anomaly {
            kind: AnomalyKind::SuddenBatteryDrop,
            timestamp: snap.timestamp,
            severity: Severity::Warning,
            message: format!("Battery charge dropped by {:.1}%", diff.abs()),
        });
    }

    if let Some(hottest) = snapshots
        .iter()
        .max_by(|a, b| a.battery_temperature_c.total_cmp(&b.battery_temperature_c))
        && hottest.battery_temperature_c > HIGH_TEMPERATURE_C
    {
        anomalies.push(Anomaly {
            kind: AnomalyKind::HighTemperature,
            timestamp: hottest.timestamp,
            severity: Severity::Critical,
            message: format!(
                "Battery temperature reached {:.1}°C",
                hottest.battery_temperature_c
            ),
        });
    }

    if let Some(lowest) = snapshots
        .iter()
        .min_by(|a, b| a.battery_charge_percent.total_cmp(&b.battery_charge_percent))
        && lowest.battery_charge_percent < LOW_CHARGE_PERCENT
    {
        anomalies.push(Anomaly {
            kind: AnomalyKind::LowBattery,
            timestamp: lowest.timestamp,
            severity: Severity::Warning,
            message: format!(
                "Battery charge dropped to {:.1}%",
                lowest.battery_charge_percent
            ),
        });
    }

    anomalies
}

/// Cost comparison with and without the installation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergySavings {
    pub solar_generated_kwh: f32,
    pub grid_imported_kwh: f32,
    pub grid_exported_kwh: f32,
    pub home_consumption_kwh: f32,
    /// Cost avoided at `rate_per_kwh`, in the rate's currency.
    pub estimated_savings: f32,
    pub self_consumption_rate: f32,
}

/// Estimates savings over `snapshots` at a flat grid tariff.
///
/// Without the installation every kWh of household load is bought from the
/// grid; with it, imports are netted against half the exported energy.
pub fn energy_savings(snapshots: &[TelemetrySnapshot], rate_per_kwh: f32) -> EnergySavings {
    let mut solar = 0.0_f32;
    let mut home = 0.0_f32;
    let mut imported = 0.0_f32;
    let mut exported = 0.0_f32;
    for (s, dt) in interval_hours(snapshots) {
        solar += s.solar_power_kw * dt;
        home += s.home_power_kw * dt;
        imported += s.grid_power_kw.max(0.0) * dt;
        exported += (-s.grid_power_kw).max(0.0) * dt;
    }
    let cost_without = home * rate_per_kwh;
    let cost_with = (imported - exported * EXPORT_CREDIT).max(0.0) * rate_per_kwh;
    EnergySavings {
        solar_generated_kwh: solar,
        grid_imported_kwh: imported,
        grid_exported_kwh: exported,
        home_consumption_kwh: home,
        estimated_savings: cost_without - cost_with,
        self_consumption_rate: self_consumption_rate(solar, exported),
    }
}

/// Heuristic overall health score (0 to 100) from charge level and cycles.
pub fn health_score(battery_charge_percent: f32, cycle_count: u32) -> f32 {
    let mut score = 85.0_f32;
    if (20.0..=90.0).contains(&battery_charge_percent) {
        score += 5.0;
    } else if !(20.0..=95.0).contains(&battery_charge_percent) {
        score -= 10.0;
    }
    if cycle_count < 1000 {
        score += 5.0;
    } else if cycle_count > 2000 {
        score -= 5.0;
    }
    score.clamp(0.0, 100.0)
}

/// Headline figures quoted alongside a health analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMetrics {
    pub battery_charge_percent: f32,
    pub battery_cycles: u32,
    pub solar_generation_kw: f32,
    pub home_consumption_kw: f32,
    pub state_of_health_percent: f32,
    pub battery_temperature_c: f32,
}

impl From<&TelemetrySnapshot> for KeyMetrics {
    fn from(s: &TelemetrySnapshot) -> Self {
        Self {
            battery_charge_percent: s.battery_charge_percent,
            battery_cycles: s.cycle_count,
            solar_generation_kw: s.solar_power_kw,
            home_consumption_kw: s.home_power_kw,
            state_of_health_percent: s.state_of_health_percent,
            battery_temperature_c: s.battery_temperature_c,
        }
    }
}

/// Everything an external text generator is given about a device.
#[derive(Debug, Clone, Serialize)]
pub struct HealthInput {
    pub device: Device,
    pub latest: TelemetrySnapshot,
    pub statistics: Option<TelemetryStatistics>,
    pub anomalies: Vec<Anomaly>,
}

impl HealthInput {
    /// Aggregates a device, its recent history, and derived metrics.
    ///
    /// Falls back to `latest` alone when `recent` is empty.
    pub fn new(device: Device, latest: TelemetrySnapshot, recent: &[TelemetrySnapshot]) -> Self {
        let statistics = TelemetryStatistics::from_snapshots(recent, device.battery_capacity_kwh);
        let anomalies = detect_anomalies(recent);
        Self {
            device,
            latest,
            statistics,
            anomalies,
        }
    }

    /// Plain-text summary handed to the generator as its prompt.
    pub fn summary(&self) -> String {
        let d = &self.device;
        let s = &self.latest;
        let mut out = format!(
            "Device Information:\n\
             - Device ID: {}\n\
             - Model: {}\n\
             - Firmware: {}\n\
             - Status: {}\n\
             - Location: {}\n\
             - Battery Capacity: {} kWh\n\
             - Solar Capacity: {} kW\n\n\
             Current State:\n\
             - Battery Charge: {:.1}%\n\
             - Solar Generation: {:.2} kW\n\
             - Home Consumption: {:.2} kW\n\
             - Battery Cycles: {}\n\
             - Temperature: {:.1}°C\n\n\
             Configuration:\n\
             - Operation Mode: {}\n\
             - Backup Reserve: {}%\n\
             - Grid Charging: {}\n",
            d.id,
            d.model,
            d.configuration.firmware_version,
            d.status,
            d.location.as_deref().unwrap_or("Unknown"),
            d.battery_capacity_kwh,
            d.solar_capacity_kw,
            s.battery_charge_percent,
            s.solar_power_kw,
            s.home_power_kw,
            s.cycle_count,
            s.battery_temperature_c,
            d.configuration.operation_mode,
            d.configuration.backup_reserve_percent,
            d.configuration.grid_charging_enabled,
        );
        if let Some(stats) = &self.statistics {
            out.push('\n');
            out.push_str(&stats.to_string());
            out.push('\n');
        }
        for a in &self.anomalies {
            out.push_str(&format!("- Alert: {}\n", a.message));
        }
        out
    }
}

/// Failure reported by a [`TextGenerator`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("text generation failed: {0}")]
pub struct GeneratorError(pub String);

/// External collaborator that turns a health summary into prose.
///
/// Its output is treated as opaque text.
pub trait TextGenerator: Send + Sync {
    /// Produces an analysis for `input`.
    fn generate(&self, input: &HealthInput) -> Result<String, GeneratorError>;
}

/// Health analysis returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub device_id: String,
    pub overall_health_score: f32,
    pub analysis: String,
    pub recommendations: Vec<String>,
    pub key_metrics: Option<KeyMetrics>,
    pub timestamp: SimTime,
}

const DEFAULT_RECOMMENDATIONS: [&str; 3] = [
    "Monitor battery temperature during peak usage periods",
    "Consider adjusting backup reserve based on usage patterns",
    "Review time-of-use settings to optimize cost savings",
];

/// Pulls bulleted or numbered lines longer than ten characters out of
/// generated text.
pub fn extract_recommendations(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with('-')
                || line.starts_with('•')
                || line
                    .split_once('.')
                    .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .map(|line| {
            line.trim_start_matches(|c: char| {
                c == '-' || c == '•' || c == '.' || c.is_ascii_digit() || c.is_whitespace()
            })
            .trim()
            .to_string()
        })
        .filter(|rec| rec.chars().count() > 10)
        .collect()
}

/// Runs a health analysis, degrading gracefully when no generator is
/// available or generation fails.
pub fn analyze_health(input: &HealthInput, generator: Option<&dyn TextGenerator>) -> HealthReport {
    let device_id = input.device.id.clone();
    let timestamp = input.latest.timestamp;
    let Some(generator) = generator else {
        return HealthReport {
            device_id,
            overall_health_score: 85.0,
            analysis: "AI health analysis is currently unavailable. \
                       Please check system status manually."
                .to_string(),
            recommendations: vec![
                "Monitor battery charge levels".to_string(),
                "Check for firmware updates".to_string(),
                "Review system alerts".to_string(),
            ],
            key_metrics: None,
            timestamp,
        };
    };

    match generator.generate(input) {
        Ok(analysis) => {
            let mut recommendations = extract_recommendations(&analysis);
            if recommendations.is_empty() {
                recommendations = DEFAULT_RECOMMENDATIONS.iter().map(|r| r.to_string()).collect();
            }
            HealthReport {
                device_id,
                overall_health_score: health_score(
                    input.latest.battery_charge_percent,
                    input.latest.cycle_count,
                ),
                analysis,
                recommendations,
                key_metrics: Some(KeyMetrics::from(&input.latest)),
                timestamp,
            }
        }
        Err(e) => {
            tracing::warn!(device_id = %device_id, error = %e, "health analysis unavailable");
            HealthReport {
                device_id,
                overall_health_score: 85.0,
                analysis: format!(
                    "Health analysis temporarily unavailable. Error: {e}. System appears to be \
                     operating normally based on current telemetry."
                ),
                recommendations: vec![
                    "Monitor system performance regularly".to_string(),
                    "Contact support if issues persist".to_string(),
                ],
                key_metrics: None,
                timestamp,
            }
        }
    }
}

/// At-a-glance health summary of a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub device_id: String,
    pub status: crate::devices::DeviceStatus,
    pub battery_charge_percent: f32,
    pub battery_cycles: u32,
    pub state_of_health_percent: f32,
    pub firmware_version: String,
    /// Timestamp of the most recent snapshot.
    pub last_seen: SimTime,
    pub is_online: bool,
    pub alerts: Vec<Anomaly>,
}

impl HealthSummary {
    /// Summarises `device` from its latest snapshot and recent history.
    pub fn new(device: &Device, latest: &TelemetrySnapshot, recent: &[TelemetrySnapshot]) -> Self {
        Self {
            device_id: device.id.clone(),
            status: device.status,
            battery_charge_percent: latest.battery_charge_percent,
            battery_cycles: latest.cycle_count,
            state_of_health_percent: latest.state_of_health_percent,
            firmware_version: device.configuration.firmware_version.clone(),
            last_seen: latest.timestamp,
            is_online: device.status.is_online(),
            alerts: detect_anomalies(recent),
        }
    }
}
