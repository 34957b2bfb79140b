//! CSV export for telemetry history.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::TelemetrySnapshot;

/// Column header for telemetry CSV export.
const HEADER: &str = "device_id,tick,timestamp_s,battery_charge_percent,battery_kw,\
                      solar_kw,grid_kw,home_kw,battery_temperature_c,state_of_health_percent,\
                      cycle_count,backup_reserve_percent,operation_mode,isolated,under_supply";

/// Exports snapshots to a CSV file at the given path.
///
/// Writes a header row followed by one row per snapshot, in the order
/// given. Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(snapshots: &[TelemetrySnapshot], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(snapshots, buf)
}

/// Writes snapshots as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(snapshots: &[TelemetrySnapshot], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for s in snapshots {
        wtr.write_record(&[
            s.device_id.clone(),
            s.tick.to_string(),
            s.timestamp.seconds().to_string(),
            format!("{:.4}", s.battery_charge_percent),
            format!("{:.4}", s.battery_power_kw),
            format!("{:.4}", s.solar_power_kw),
            format!("{:.4}", s.grid_power_kw),
            format!("{:.4}", s.home_power_kw),
            format!("{:.2}", s.battery_temperature_c),
            format!("{:.4}", s.state_of_health_percent),
            s.cycle_count.to_string(),
            format!("{:.1}", s.backup_reserve_percent),
            s.operation_mode.to_string(),
            s.isolated.to_string(),
            s.under_supply.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::OperationMode;
    use crate::sim::types::SimTime;

    fn make_snapshot(t: u64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            device_id: "PW-001".into(),
            tick: t,
            timestamp: SimTime(t * 60),
            battery_charge_percent: 50.0,
            battery_power_kw: 1.5,
            solar_power_kw: 3.0,
            grid_power_kw: -0.5,
            home_power_kw: 1.0,
            battery_temperature_c: 24.0,
            state_of_health_percent: 100.0,
            cycle_count: 0,
            throughput_kwh: 0.0,
            backup_reserve_percent: 20.0,
            operation_mode: OperationMode::SelfPowered,
            isolated: false,
            under_supply: false,
        }
    }

    #[test]
    fn header_matches_columns() {
        let mut buf = Vec::new();
        write_csv(&[make_snapshot(0)], &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let first_line = output.as_deref().unwrap_or("").lines().next().unwrap_or("");
        assert_eq!(
            first_line,
            "device_id,tick,timestamp_s,battery_charge_percent,battery_kw,\
             solar_kw,grid_kw,home_kw,battery_temperature_c,state_of_health_percent,\
             cycle_count,backup_reserve_percent,operation_mode,isolated,under_supply"
        );
    }

    #[test]
    fn row_count_matches_snapshot_count() {
        let snaps: Vec<_> = (0..24).map(make_snapshot).collect();
        let mut buf = Vec::new();
        write_csv(&snaps, &mut buf).ok();
        let output = String::from_utf8(buf).ok();
        let lines: Vec<&str> = output.as_deref().unwrap_or("").lines().collect();
        // 1 header + 24 data rows
        assert_eq!(lines.len(), 25);
    }

    #[test]
    fn rows_parse_back() {
        let snaps: Vec<_> = (0..3).map(make_snapshot).collect();
        let mut buf = Vec::new();
        write_csv(&snaps, &mut buf).ok();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let headers = rdr.headers().cloned().ok();
        assert_eq!(headers.as_ref().map(csv::StringRecord::len), Some(15));

        let mut row_count = 0;
        for record in rdr.records() {
            let rec = record.unwrap();
            for i in 3..10 {
                assert!(rec[i].parse::<f32>().is_ok(), "column {i} should parse as f32");
            }
            assert_eq!(&rec[12], "self-powered");
            assert!(rec[13].parse::<bool>().is_ok());
            row_count += 1;
        }
        assert_eq!(row_count, 3);
    }
}
