use crate::devices::Device;

/// Default charging efficiency of a residential battery.
pub const ETA_CHARGE: f32 = 0.95;
/// Default discharging efficiency of a residential battery.
pub const ETA_DISCHARGE: f32 = 0.95;

/// Electrical ratings of a battery, used to bound dispatch and integrate
/// state of charge.
///
/// State of charge is expressed in percent (0 to 100) throughout.
///
/// # Power Flow Convention
/// - Positive power: charging (energy flows into the pack)
/// - Negative power: discharging (energy flows out of the pack)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryPack {
    /// Usable capacity in kilowatt-hours.
    pub capacity_kwh: f32,
    /// Maximum charge power in kilowatts (positive value).
    pub max_charge_kw: f32,
    /// Maximum discharge power in kilowatts (positive value).
    pub max_discharge_kw: f32,
    /// Charging efficiency (0..1.0).
    pub eta_c: f32,
    /// Discharging efficiency (0..1.0).
    pub eta_d: f32,
}

impl BatteryPack {
    /// Builds the pack for a device; capacities below zero are treated as zero.
    pub fn from_device(device: &Device) -> Self {
        Self {
            capacity_kwh: device.battery_capacity_kwh.max(0.0),
            max_charge_kw: device.max_charge_kw.max(0.0),
            max_discharge_kw: device.max_discharge_kw.max(0.0),
            eta_c: ETA_CHARGE,
            eta_d: ETA_DISCHARGE,
        }
    }

    /// Largest charging power (kW) the pack accepts for `dt_hours` without
    /// exceeding 100%.
    pub fn charge_limit_kw(&self, soc_percent: f32, dt_hours: f32) -> f32 {
        if self.capacity_kwh <= 0.0 || dt_hours <= 0.0 {
            return 0.0;
        }
        let room_kwh = (100.0 - soc_percent).max(0.0) / 100.0 * self.capacity_kwh;
        let max_kw_soc = room_kwh / (self.eta_c * dt_hours);
        self.max_charge_kw.min(max_kw_soc)
    }

    /// Largest discharging power (kW, positive magnitude) the pack delivers
    /// for `dt_hours` without dropping below `floor_percent`.
    pub fn discharge_limit_kw(&self, soc_percent: f32, floor_percent: f32, dt_hours: f32) -> f32 {
        if self.capacity_kwh <= 0.0 || dt_hours <= 0.0 {
            return 0.0;
        }
        let available_kwh = (soc_percent - floor_percent).max(0.0) / 100.0 * self.capacity_kwh;
        let max_kw_soc = available_kwh * self.eta_d / dt_hours;
        self.max_discharge_kw.min(max_kw_soc)
    }

    /// Integrates terminal power over `dt_hours` and returns the new state
    /// of charge, clamped to `[0, 100]`.
    pub fn integrate(&self, soc_percent: f32, power_kw: f32, dt_hours: f32) -> f32 {
        if self.capacity_kwh <= 0.0 {
            return soc_percent.clamp(0.0, 100.0);
        }
        let stored_kwh = if power_kw >= 0.0 {
            power_kw * dt_hours * self.eta_c
        } else {
            power_kw * dt_hours / self.eta_d
        };
        (soc_percent + stored_kwh / self.capacity_kwh * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(eta: f32) -> BatteryPack {
        BatteryPack {
            capacity_kwh: 10.0,
            max_charge_kw: 5.0,
            max_discharge_kw: 5.0,
            eta_c: eta,
            eta_d: eta,
        }
    }

    #[test]
    fn charge_power_limit() {
        assert_eq!(pack(1.0).charge_limit_kw(50.0, 0.25), 5.0);
    }

    #[test]
    fn charge_soc_limit() {
        // 1 kWh of room over 0.25 h at perfect efficiency is 4 kW.
        let p = pack(1.0);
        let kw = p.charge_limit_kw(90.0, 0.25);
        assert!((kw - 4.0).abs() < 1e-4);
        assert!((p.integrate(90.0, kw, 0.25) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn discharge_respects_floor() {
        // 10% above a 20% floor is 1 kWh, deliverable at 4 kW over 0.25 h.
        let p = pack(1.0);
        let kw = p.discharge_limit_kw(30.0, 20.0, 0.25);
        assert!((kw - 4.0).abs() < 1e-4);
        assert!((p.integrate(30.0, -kw, 0.25) - 20.0).abs() < 1e-3);
        assert_eq!(p.discharge_limit_kw(15.0, 20.0, 0.25), 0.0);
    }

    #[test]
    fn efficiency_charge() {
        // 1 kW for 6 h at 90% stores 5.4 kWh of a 10 kWh pack.
        let soc = pack(0.9).integrate(0.0, 1.0, 6.0);
        assert!((soc - 54.0).abs() < 1e-3);
    }

    #[test]
    fn integrate_clamps() {
        let p = pack(0.9);
        assert_eq!(p.integrate(50.0, -5.0, 24.0), 0.0);
        assert_eq!(p.integrate(99.0, 5.0, 24.0), 100.0);
    }

    #[test]
    fn no_capacity_no_power() {
        let p = BatteryPack {
            capacity_kwh: 0.0,
            ..pack(0.95)
        };
        assert_eq!(p.charge_limit_kw(0.0, 1.0), 0.0);
        assert_eq!(p.discharge_limit_kw(100.0, 0.0, 1.0), 0.0);
        assert_eq!(p.integrate(0.0, 3.0, 1.0), 0.0);
    }
}
