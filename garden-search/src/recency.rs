//! Recency scoring: monotone exponential decay from a reference time.

/// Seconds in one day.
const DAY_SECONDS: f64 = 86_400.0;

/// `exp(-age / τ)` with τ given in days. Ages at or below zero score 1.
pub fn score(age_seconds: i64, tau_days: f64) -> f64 {
    if age_seconds <= 0 {
        return 1.0;
    }
    let tau = tau_days * DAY_SECONDS;
    (-(age_seconds as f64) / tau).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_of_tau_scores_one_over_e() {
        let s = score(30 * 86_400, 30.0);
        assert!((s - (1.0f64 / std::f64::consts::E)).abs() < 1e-12);
        assert!((s - 0.3679).abs() < 1e-4);
    }

    #[test]
    fn decay_is_monotone() {
        let day = score(86_400, 30.0);
        let week = score(7 * 86_400, 30.0);
        assert!(day > week);
        assert!(week > 0.0);
    }

    #[test]
    fn future_timestamps_clamp_to_one() {
        assert_eq!(score(-60, 30.0), 1.0);
        assert_eq!(score(0, 30.0), 1.0);
    }
}
