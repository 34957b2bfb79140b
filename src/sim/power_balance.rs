//! Household power balance computation.

/// Computes grid exchange as the balancing term of a household.
///
/// Sign conventions:
/// - `home_kw` is consumption (positive)
/// - `solar_kw` is generation (positive)
/// - `battery_kw` is positive when charging, negative when discharging
///
/// # Returns
///
/// Grid power in kW (positive = import, negative = export)
pub fn grid_exchange_kw(home_kw: f32, solar_kw: f32, battery_kw: f32) -> f32 {
    home_kw + battery_kw - solar_kw
}

/// Residual of `sources - sinks` for one reading; zero when balanced.
///
/// Sources are solar and grid import, sinks are household load and battery
/// charging. A discharging battery appears as a negative sink.
pub fn balance_residual_kw(solar_kw: f32, grid_kw: f32, home_kw: f32, battery_kw: f32) -> f32 {
    solar_kw + grid_kw - home_kw - battery_kw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_only_imports() {
        assert_eq!(grid_exchange_kw(3.0, 0.0, 0.0), 3.0);
    }

    #[test]
    fn solar_surplus_exports() {
        assert_eq!(grid_exchange_kw(1.0, 3.0, 0.0), -2.0);
    }

    #[test]
    fn battery_discharge_reduces_import() {
        assert_eq!(grid_exchange_kw(2.0, 0.0, -1.5), 0.5);
    }

    #[test]
    fn battery_charge_adds_import() {
        let grid = grid_exchange_kw(0.8, 2.5, 3.0);
        assert!((grid - 1.3).abs() < 1e-6);
        assert!(balance_residual_kw(2.5, grid, 0.8, 3.0).abs() < 1e-6);
    }
}
