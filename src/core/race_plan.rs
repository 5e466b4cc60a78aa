//! Race Plan Heuristics
//!
//! Lap, stint, pit and tyre figures derived from race duration and vehicle class.
//!
//! Pace (laps per hour):
//!     GTP = 38, LMP2 = 36, everything else = 33
//!
//! Stints assume a fixed 50 minute window:
//!     stints = floor(duration_hours * 60 / 50) + 1
//!     pit events = stints - 1
//!
//! Durations above 48 hours are planned as 48 hours.
//!
//! These are illustrative planning figures, not a simulation.

use rand::Rng;

use crate::data::taxonomy::{CanonicalClass, RaceClass};
use crate::models::TyreStrategy;

/// Stint window in minutes
pub const STINT_MINUTES: f64 = 50.0;
/// Longest race the heuristics plan for, in hours
pub const MAX_DURATION_HOURS: f64 = 48.0;
/// Gap added per position behind the leader, in seconds
pub const GAP_PER_POSITION: f64 = 10.5;

pub const PIT_DURATION_MIN: f64 = 30.0;
pub const PIT_DURATION_MAX: f64 = 45.0;
pub const CONFIDENCE_MIN: f64 = 0.85;
pub const CONFIDENCE_MAX: f64 = 0.95;

pub const TYRE_COMPOUND: &str = "Soft";
pub const TYRE_STINT_LAPS: u32 = 30;
pub const TYRE_PRESSURE: f64 = 29.0;
pub const TYRE_SUPPLIER: &str = "Michelin";

/// Earliest lap a fastest lap is placed on
pub const FASTEST_LAP_EARLIEST: u32 = 5;

/// Laps per hour for a class
pub fn class_pace(class: &RaceClass) -> f64 {
    match class.canonical() {
        Some(CanonicalClass::Gtp) => 38.0,
        Some(CanonicalClass::Lmp2) => 36.0,
        _ => 33.0,
    }
}

/// Total laps for a race
///
/// # Arguments
/// * `duration_hours` - Race length; clamped to [`MAX_DURATION_HOURS`]
/// * `pace` - Laps per hour for the car's class
///
/// # Returns
/// `floor(duration_hours * pace)`, or 0 for a non-positive or non-finite duration
///
/// # Examples
/// ```
/// use imec::core::race_plan::lap_count;
/// assert_eq!(lap_count(2.0, 33.0), 66);
/// assert_eq!(lap_count(-1.0, 33.0), 0);
/// ```
pub fn lap_count(duration_hours: f64, pace: f64) -> u32 {
    (planned_hours(duration_hours) * pace).floor() as u32
}

/// Number of stints in the race
///
/// # Arguments
/// * `duration_hours` - Race length; clamped to [`MAX_DURATION_HOURS`]
///
/// # Returns
/// One stint per started 50 minute window, or 0 for a non-positive duration
///
/// # Examples
/// ```
/// use imec::core::race_plan::stint_count;
/// assert_eq!(stint_count(2.0), 3);
/// assert_eq!(stint_count(0.1), 1);
/// assert_eq!(stint_count(0.0), 0);
/// ```
pub fn stint_count(duration_hours: f64) -> u32 {
    let hours = planned_hours(duration_hours);
    if hours == 0.0 {
        return 0;
    }
    ((hours * 60.0 / STINT_MINUTES).floor() as u32).saturating_add(1)
}

pub fn pit_events(stints: u32) -> u32 {
    stints.saturating_sub(1)
}

/// Pit entry times at multiples of the stint window, in seconds
pub fn pit_timestamps(pit_events: u32) -> Vec<String> {
    let step = (STINT_MINUTES * 60.0) as u64;
    (1..=u64::from(pit_events))
        .map(|i| format!("{}s", i.saturating_mul(step)))
        .collect()
}

/// Stationary time for each pit event
///
/// # Arguments
/// * `pit_events` - Number of stops to sample
/// * `rng` - Source of the draws; one draw per stop
///
/// # Returns
/// One duration per stop in seconds, uniform in [30, 45] and rounded to 0.1 s
pub fn sample_pit_durations<R: Rng + ?Sized>(pit_events: u32, rng: &mut R) -> Vec<f64> {
    (0..pit_events)
        .map(|_| round_to(rng.random_range(PIT_DURATION_MIN..=PIT_DURATION_MAX), 10.0))
        .collect()
}

/// One set of the default compound per stint
pub fn tyre_strategy(stints: u32) -> TyreStrategy {
    let n = stints as usize;
    TyreStrategy {
        compound_sequence: vec![TYRE_COMPOUND.to_string(); n],
        expected_stint_lengths: vec![TYRE_STINT_LAPS; n],
        pressures: vec![TYRE_PRESSURE; n],
    }
}

/// Gap to the leader for a 1-based position, formatted to one decimal
///
/// # Examples
/// ```
/// use imec::core::race_plan::gap_to_leader;
/// assert_eq!(gap_to_leader(1), "0.0");
/// assert_eq!(gap_to_leader(3), "21.0");
/// ```
pub fn gap_to_leader(position: u32) -> String {
    format!("{:.1}", position.saturating_sub(1) as f64 * GAP_PER_POSITION)
}

/// Heuristic confidence, uniform in [0.85, 0.95] to 0.01
pub fn sample_confidence<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    round_to(rng.random_range(CONFIDENCE_MIN..=CONFIDENCE_MAX), 100.0)
}

/// Confidence derived from a held-out R²
pub fn model_confidence(r2: f64) -> f64 {
    let r2 = if r2.is_finite() { r2.clamp(0.0, 1.0) } else { 0.0 };
    round_to(CONFIDENCE_MIN + (CONFIDENCE_MAX - CONFIDENCE_MIN) * r2, 100.0)
}

/// Lap on which the fastest lap is set
pub fn sample_fastest_lap_number<R: Rng + ?Sized>(laps: u32, rng: &mut R) -> u32 {
    if laps < FASTEST_LAP_EARLIEST {
        laps
    } else {
        rng.random_range(FASTEST_LAP_EARLIEST..=laps)
    }
}

/// Fallback fastest lap time when the session reported none
pub fn default_fastest_lap(class: &RaceClass) -> &'static str {
    match class.canonical() {
        Some(CanonicalClass::Gtp) => "01:34.222",
        _ => "01:45.000",
    }
}

/// Elapsed race time label, e.g. "2.0h"
pub fn total_time_label(duration_hours: f64) -> String {
    format!("{:.1}h", planned_hours(duration_hours))
}

/// Duration the heuristics work with: 0 when invalid, capped at the maximum
fn planned_hours(duration_hours: f64) -> f64 {
    if duration_hours.is_finite() && duration_hours > 0.0 {
        duration_hours.min(MAX_DURATION_HOURS)
    } else {
        0.0
    }
}

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    fn class(c: CanonicalClass) -> RaceClass {
        RaceClass::Canonical(c)
    }

    #[test]
    fn test_class_pace() {
        assert_eq!(class_pace(&class(CanonicalClass::Gtp)), 38.0);
        assert_eq!(class_pace(&class(CanonicalClass::Lmp2)), 36.0);
        assert_eq!(class_pace(&class(CanonicalClass::GtdPro)), 33.0);
        assert_eq!(class_pace(&class(CanonicalClass::Gtd)), 33.0);
        assert_eq!(class_pace(&RaceClass::Unmapped("LMP3".to_string())), 33.0);
    }

    #[test]
    fn test_lap_count_monotone() {
        let mut previous = 0;
        for step in 0..=96 {
            let laps = lap_count(step as f64 * 0.25, 36.0);
            assert!(laps >= previous);
            previous = laps;
        }
        assert_eq!(lap_count(24.0, 38.0), 912);
    }

    #[test]
    fn test_lap_count_invalid_duration() {
        assert_eq!(lap_count(0.0, 38.0), 0);
        assert_eq!(lap_count(f64::NAN, 38.0), 0);
        assert_eq!(lap_count(f64::INFINITY, 38.0), 0);
    }

    #[test]
    fn test_stints_and_pit_events() {
        assert_eq!(stint_count(0.01), 1);
        assert_eq!(pit_events(stint_count(0.01)), 0);
        assert_eq!(stint_count(2.0), 3);
        assert_eq!(pit_events(3), 2);
        assert_eq!(stint_count(24.0), 29);
        assert_eq!(stint_count(-3.0), 0);
        assert_eq!(pit_events(0), 0);
    }

    #[test]
    fn test_pit_timestamps() {
        assert_eq!(pit_timestamps(2), vec!["3000s", "6000s"]);
        assert!(pit_timestamps(0).is_empty());
    }

    #[test]
    fn test_huge_duration_is_capped() {
        for duration in [49.0, 1.0e8, 1.0e10, f64::MAX] {
            assert_eq!(lap_count(duration, 38.0), lap_count(MAX_DURATION_HOURS, 38.0));
            assert_eq!(stint_count(duration), stint_count(MAX_DURATION_HOURS));
            assert_eq!(total_time_label(duration), "48.0h");
        }
        assert_eq!(stint_count(MAX_DURATION_HOURS), 58);
        assert_eq!(lap_count(MAX_DURATION_HOURS, 38.0), 1824);
    }

    #[test]
    fn test_pit_timestamps_past_u32_range() {
        let stamps = pit_timestamps(2_000_000);
        assert_eq!(stamps.len(), 2_000_000);
        assert_eq!(stamps.last().map(String::as_str), Some("6000000000s"));
    }

    #[test]
    fn test_pit_durations_in_range() {
        let mut rng = Pcg64Mcg::seed_from_u64(42);
        let durations = sample_pit_durations(200, &mut rng);
        assert_eq!(durations.len(), 200);
        for d in durations {
            assert!((PIT_DURATION_MIN..=PIT_DURATION_MAX).contains(&d));
            assert!(((d * 10.0).round() - d * 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tyre_strategy() {
        let plan = tyre_strategy(3);
        assert_eq!(plan.compound_sequence, vec!["Soft"; 3]);
        assert_eq!(plan.expected_stint_lengths, vec![30; 3]);
        assert_eq!(plan.pressures, vec![29.0; 3]);
        assert!(tyre_strategy(0).compound_sequence.is_empty());
    }

    #[test]
    fn test_confidence_band() {
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        for _ in 0..200 {
            let c = sample_confidence(&mut rng);
            assert!((CONFIDENCE_MIN..=CONFIDENCE_MAX).contains(&c));
        }
        assert_eq!(model_confidence(1.0), 0.95);
        assert_eq!(model_confidence(-2.0), 0.85);
        assert_eq!(model_confidence(f64::NAN), 0.85);
        assert_eq!(model_confidence(0.5), 0.9);
    }

    #[test]
    fn test_fastest_lap_number() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        assert_eq!(sample_fastest_lap_number(3, &mut rng), 3);
        assert_eq!(sample_fastest_lap_number(0, &mut rng), 0);
        for _ in 0..50 {
            let lap = sample_fastest_lap_number(66, &mut rng);
            assert!((5..=66).contains(&lap));
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(gap_to_leader(0), "0.0");
        assert_eq!(gap_to_leader(2), "10.5");
        assert_eq!(total_time_label(2.0), "2.0h");
        assert_eq!(total_time_label(-1.0), "0.0h");
        assert_eq!(default_fastest_lap(&class(CanonicalClass::Gtp)), "01:34.222");
        assert_eq!(default_fastest_lap(&class(CanonicalClass::Gtd)), "01:45.000");
    }
}
