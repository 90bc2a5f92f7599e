//! Next-check scheduling.
//!
//! The monitor sleeps until the earliest of: the next window boundary, the
//! next midnight (budget reset), or the minimum check interval. The result is
//! clamped so the loop can neither spin nor oversleep its ceiling.

use std::time::Duration;

use chrono::NaiveDateTime;

use super::window::TimeWindow;
use crate::clock::{duration_between, next_midnight};
use crate::config::MonitorConfig;

/// Floor on any timer delay.
pub const MIN_TIMER_DELAY: Duration = Duration::from_millis(100);

/// Delay until the monitor must evaluate capacity again.
///
/// An inverted configuration (`max_check_interval < min_check_interval`)
/// resolves in favor of the ceiling; a ceiling below [`MIN_TIMER_DELAY`]
/// resolves in favor of the floor.
pub fn next_check_delay(now: NaiveDateTime, window: &TimeWindow, config: &MonitorConfig) -> Duration {
    let to_transition = duration_between(now, window.next_transition);
    let to_midnight = duration_between(now, next_midnight(now));

    let optimal = to_transition.min(to_midnight).min(config.min_check_interval);
    optimal.min(config.max_check_interval).max(MIN_TIMER_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::resolve_window;
    use chrono::{NaiveDate, TimeDelta};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn config() -> MonitorConfig {
        MonitorConfig::time_based(9..=17, [22, 23, 0, 1, 2, 3, 4, 5, 6])
    }

    #[test]
    fn test_min_check_interval_mid_window() {
        let config = config();
        let now = at(10, 15, 0);
        let window = resolve_window(now, &config);
        assert_eq!(next_check_delay(now, &window, &config), Duration::from_secs(60));
    }

    #[test]
    fn test_transition_sooner_than_interval() {
        let config = config();
        let now = at(10, 59, 30);
        let window = resolve_window(now, &config);
        assert_eq!(next_check_delay(now, &window, &config), Duration::from_secs(30));
    }

    #[test]
    fn test_end_of_day_window_seen_within_interval() {
        let config = config();
        let now = at(17, 30, 0);
        let window = resolve_window(now, &config);
        assert_eq!(window.next_transition, at(22, 0, 0));
        assert_eq!(next_check_delay(now, &window, &config), Duration::from_secs(60));

        // The check armed at 17:59:30 lands after 18:00 and sees off-hours
        let now = at(17, 59, 30);
        let window = resolve_window(now, &config);
        let delay = next_check_delay(now, &window, &config);
        let next = now + TimeDelta::from_std(delay).unwrap();
        assert!(next >= at(18, 0, 0));
        assert!(!resolve_window(next, &config).is_active);
    }

    #[test]
    fn test_midnight_sooner_than_interval() {
        let config = MonitorConfig::default();
        let now = at(23, 59, 50);
        let window = resolve_window(now, &config);
        assert_eq!(next_check_delay(now, &window, &config), Duration::from_secs(10));
    }

    #[test]
    fn test_floor_prevents_tight_loop() {
        let config = MonitorConfig::default().with_check_intervals(Duration::ZERO, Duration::from_secs(300));
        let now = at(10, 0, 0);
        let window = resolve_window(now, &config);
        assert_eq!(next_check_delay(now, &window, &config), MIN_TIMER_DELAY);
    }

    #[test]
    fn test_floor_when_transition_is_imminent() {
        let config = config();
        let now = NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_milli_opt(10, 59, 59, 980)
            .unwrap();
        let window = resolve_window(now, &config);
        assert_eq!(next_check_delay(now, &window, &config), MIN_TIMER_DELAY);
    }

    #[test]
    fn test_inverted_intervals_favor_ceiling() {
        let config = config().with_check_intervals(Duration::from_secs(120), Duration::from_secs(30));
        let now = at(10, 15, 0);
        let window = resolve_window(now, &config);
        assert_eq!(next_check_delay(now, &window, &config), Duration::from_secs(30));
    }

    #[test]
    fn test_ceiling_below_floor_favors_floor() {
        let config = config().with_check_intervals(Duration::from_secs(60), Duration::from_millis(10));
        let now = at(10, 15, 0);
        let window = resolve_window(now, &config);
        assert_eq!(next_check_delay(now, &window, &config), MIN_TIMER_DELAY);
    }

    #[test]
    fn test_delay_always_within_bounds() {
        let configs = [
            config(),
            MonitorConfig::default(),
            config().with_check_intervals(Duration::from_secs(600), Duration::from_secs(300)),
            config().with_check_intervals(Duration::from_millis(1), Duration::from_secs(5)),
        ];
        for config in &configs {
            for hour in 0..24 {
                for (minute, second) in [(0, 0), (29, 59), (59, 59)] {
                    let now = at(hour, minute, second);
                    let window = resolve_window(now, config);
                    let delay = next_check_delay(now, &window, config);
                    assert!(delay >= MIN_TIMER_DELAY);
                    assert!(delay <= config.max_check_interval);
                }
            }
        }
    }
}
