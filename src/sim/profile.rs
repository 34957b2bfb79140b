//! Generation and consumption profiles keyed by simulated time of day.
//!
//! Every stochastic term draws from a generator seeded by the master seed,
//! the device id, and the tick (or day) index, so the same inputs always
//! reproduce the same trajectory regardless of wall-clock time.

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Hour at which solar generation starts.
pub const SUNRISE_HOUR: f32 = 6.0;
/// Hour at which solar generation ends.
pub const SUNSET_HOUR: f32 = 18.0;
/// Solar jitter bound as a fraction of array capacity.
pub const SOLAR_JITTER_FRAC: f32 = 0.05;
/// Standard deviation of household load noise as a fraction of base load.
const HOME_NOISE_FRAC: f32 = 0.05;

/// Seed offset for the EV session stream to avoid correlation with tick noise.
const EV_SEED_OFFSET: u64 = 57;

/// 64-bit FNV-1a hash of a device id; stable across runs and platforms.
pub fn stable_hash(id: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn mix(seed: u64, id: &str, index: u64) -> u64 {
    seed ^ stable_hash(id).rotate_left(17) ^ index.wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// Generator for one device's noise terms at one tick.
pub fn tick_rng(seed: u64, device_id: &str, tick: u64) -> StdRng {
    StdRng::seed_from_u64(mix(seed, device_id, tick))
}

/// Generates Gaussian noise with mean 0 via the Box-Muller transform.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f32) -> f32 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f32 = rng.random::<f32>().clamp(1e-6, 1.0);
    let u2: f32 = rng.random::<f32>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos();
    z0 * std_dev
}

/// Half-sine daylight fraction: 0 outside daylight, 1 at solar noon.
pub fn daylight_frac(hour: f32) -> f32 {
    if !(SUNRISE_HOUR..=SUNSET_HOUR).contains(&hour) {
        return 0.0;
    }
    let pos = (hour - SUNRISE_HOUR) / (SUNSET_HOUR - SUNRISE_HOUR);
    (std::f32::consts::PI * pos).sin().max(0.0)
}

/// Available solar generation (kW) for an array of `capacity_kw`.
///
/// Jitter is bounded to ±5% of capacity and only applied during daylight;
/// output is clamped to `[0, capacity_kw]`.
pub fn solar_kw(capacity_kw: f32, hour: f32, rng: &mut StdRng) -> f32 {
    let frac = daylight_frac(hour);
    if capacity_kw <= 0.0 || frac <= 0.0 {
        return 0.0;
    }
    let bound = SOLAR_JITTER_FRAC * capacity_kw;
    let jitter = rng.random_range(-bound..=bound);
    (capacity_kw * frac + jitter).clamp(0.0, capacity_kw)
}

/// Dimensionless household load shape: night trough, morning and evening peaks.
fn load_shape(hour: f32) -> f32 {
    let bump = |center: f32, width: f32| (-((hour - center) / width).powi(2)).exp();
    0.6 + 0.5 * bump(7.5, 1.5) + 0.9 * bump(19.0, 2.0) + 0.9 * bump(19.0 - 24.0, 2.0)
}

/// Household consumption (kW) around `base_kw` at `hour`, never negative.
pub fn home_kw(base_kw: f32, hour: f32, rng: &mut StdRng) -> f32 {
    if base_kw <= 0.0 {
        return 0.0;
    }
    let noise = gaussian_noise(rng, HOME_NOISE_FRAC * base_kw);
    (base_kw * load_shape(hour) + noise).max(0.0)
}

/// One evening EV charging session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvSession {
    /// Plug-in hour, relative to the start of the session's day.
    pub arrival_hour: f32,
    /// Hour at which charging stops (energy delivered or car unplugged).
    pub end_hour: f32,
}

/// Samples the charging session for simulated day `day`.
///
/// Arrival falls between 17:00 and 20:00; the car needs 4-14 kWh and
/// stays 3-10 hours, charging at the rated power until either runs out.
pub fn ev_session(seed: u64, device_id: &str, day: u64, max_charge_kw: f32) -> EvSession {
    let mut rng = StdRng::seed_from_u64(mix(seed.wrapping_add(EV_SEED_OFFSET), device_id, day));
    let arrival_hour = rng.random_range(17.0..20.0_f32);
    let demand_kwh = rng.random_range(4.0..14.0_f32);
    let dwell_hours = rng.random_range(3.0..10.0_f32);
    let charge_hours = if max_charge_kw > 0.0 {
        (demand_kwh / max_charge_kw).min(dwell_hours)
    } else {
        0.0
    };
    EvSession {
        arrival_hour,
        end_hour: arrival_hour + charge_hours,
    }
}

/// EV charging load (kW) at absolute simulated hour `abs_hour` (hours since
/// day 0 midnight). Sessions that run past midnight are honoured.
pub fn ev_kw(seed: u64, device_id: &str, abs_hour: f64, max_charge_kw: f32) -> f32 {
    if max_charge_kw <= 0.0 || abs_hour < 0.0 {
        return 0.0;
    }
    let day = (abs_hour / 24.0).floor() as u64;
    let hour = (abs_hour - day as f64 * 24.0) as f32;

    let today = ev_session(seed, device_id, day, max_charge_kw);
    if hour >= today.arrival_hour && hour < today.end_hour {
        return max_charge_kw;
    }
    if day > 0 {
        let yesterday = ev_session(seed, device_id, day - 1, max_charge_kw);
        let shifted = hour + 24.0;
        if shifted >= yesterday.arrival_hour && shifted < yesterday.end_hour {
            return max_charge_kw;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_is_fixed() {
        assert_eq!(stable_hash(""), 0xcbf2_9ce4_8422_2325);
        assert_ne!(stable_hash("PW-001"), stable_hash("PW-002"));
    }

    #[test]
    fn daylight_frac_shape() {
        assert_eq!(daylight_frac(0.0), 0.0);
        assert_eq!(daylight_frac(5.9), 0.0);
        assert_eq!(daylight_frac(18.5), 0.0);
        assert!(daylight_frac(12.0) > 0.999);
        assert!((daylight_frac(9.0) - daylight_frac(15.0)).abs() < 1e-5);
    }

    #[test]
    fn no_solar_at_night() {
        let mut rng = tick_rng(42, "PW-001", 0);
        assert_eq!(solar_kw(8.5, 2.0, &mut rng), 0.0);
        assert_eq!(solar_kw(8.5, 22.0, &mut rng), 0.0);
    }

    #[test]
    fn solar_jitter_is_bounded() {
        for tick in 0..200 {
            let mut rng = tick_rng(7, "SI-001", tick);
            let kw = solar_kw(10.0, 12.0, &mut rng);
            assert!(kw >= 9.5 - 1e-4 && kw <= 10.0, "kw={kw}");
        }
    }

    #[test]
    fn zero_capacity_produces_nothing() {
        let mut rng = tick_rng(1, "WC-001", 3);
        assert_eq!(solar_kw(0.0, 12.0, &mut rng), 0.0);
    }

    #[test]
    fn same_seed_same_noise() {
        let a = home_kw(2.0, 19.0, &mut tick_rng(42, "PW-001", 10));
        let b = home_kw(2.0, 19.0, &mut tick_rng(42, "PW-001", 10));
        assert_eq!(a, b);
    }

    #[test]
    fn different_ticks_differ() {
        let mut all_same = true;
        for tick in 0..10 {
            let a = home_kw(2.0, 12.0, &mut tick_rng(42, "PW-001", tick));
            let b = home_kw(2.0, 12.0, &mut tick_rng(42, "PW-001", tick + 1));
            if (a - b).abs() > 1e-6 {
                all_same = false;
            }
        }
        assert!(!all_same);
    }

    #[test]
    fn evening_load_exceeds_night_load() {
        let evening = load_shape(19.0);
        let night = load_shape(3.0);
        assert!(evening > night);
        assert!(night > 0.0);
    }

    #[test]
    fn home_load_never_negative() {
        for tick in 0..500 {
            let mut rng = tick_rng(3, "PW-002", tick);
            assert!(home_kw(0.1, (tick % 24) as f32, &mut rng) >= 0.0);
        }
    }

    #[test]
    fn ev_session_is_deterministic_and_evening() {
        let a = ev_session(42, "WC-001", 3, 7.2);
        let b = ev_session(42, "WC-001", 3, 7.2);
        assert_eq!(a, b);
        assert!(a.arrival_hour >= 17.0 && a.arrival_hour < 20.0);
        assert!(a.end_hour > a.arrival_hour);
    }

    #[test]
    fn ev_draws_rated_power_during_session() {
        let session = ev_session(42, "WC-001", 0, 7.2);
        let mid = f64::from((session.arrival_hour + session.end_hour) / 2.0);
        assert_eq!(ev_kw(42, "WC-001", mid, 7.2), 7.2);
        assert_eq!(ev_kw(42, "WC-001", 10.0, 7.2), 0.0);
        assert_eq!(ev_kw(42, "WC-001", mid, 0.0), 0.0);
    }
}
