use crate::domain::Call;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Realized or forecast move, classified against the flat band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Long,
    Short,
    NoTrade,
}

impl TradeDirection {
    fn sign(self) -> Option<f64> {
        match self {
            TradeDirection::Long => Some(1.0),
            TradeDirection::Short => Some(-1.0),
            TradeDirection::NoTrade => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayScore {
    pub abs_error_pct: f64,
    pub daily_pnl: f64,
    pub quality_score: f64,
    pub direction_correct: bool,
}

/// Scoring and simulated-trading constants. All percentages are in percent units
/// (`1.5` means 1.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub flat_band_pct: f64,
    pub position_size: f64,
    pub cost_bps: f64,
    pub direction_weight: f64,
    pub magnitude_weight: f64,
    pub error_cap_pct: f64,
    pub conviction_threshold_pct: f64,
    pub high_conviction_bonus: f64,
    pub low_conviction_bonus: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            flat_band_pct: 0.15,
            position_size: 1000.0,
            cost_bps: 20.0,
            direction_weight: 40.0,
            magnitude_weight: 40.0,
            error_cap_pct: 10.0,
            conviction_threshold_pct: 2.0,
            high_conviction_bonus: 20.0,
            low_conviction_bonus: 10.0,
        }
    }
}

impl ScoringPolicy {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::default();

        override_from_env("SCORING_FLAT_BAND_PCT", &mut out.flat_band_pct);
        override_from_env("SCORING_POSITION_SIZE", &mut out.position_size);
        override_from_env("SCORING_COST_BPS", &mut out.cost_bps);
        override_from_env("SCORING_DIRECTION_WEIGHT", &mut out.direction_weight);
        override_from_env("SCORING_MAGNITUDE_WEIGHT", &mut out.magnitude_weight);
        override_from_env("SCORING_ERROR_CAP_PCT", &mut out.error_cap_pct);
        override_from_env(
            "SCORING_CONVICTION_THRESHOLD_PCT",
            &mut out.conviction_threshold_pct,
        );
        override_from_env(
            "SCORING_HIGH_CONVICTION_BONUS",
            &mut out.high_conviction_bonus,
        );
        override_from_env("SCORING_LOW_CONVICTION_BONUS", &mut out.low_conviction_bonus);

        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.flat_band_pct >= 0.0,
            "flat band must be >= 0 (got {})",
            self.flat_band_pct
        );
        ensure!(
            self.position_size >= 0.0 && self.cost_bps >= 0.0,
            "position size and cost must be >= 0"
        );
        ensure!(
            self.direction_weight >= 0.0
                && self.magnitude_weight >= 0.0
                && self.high_conviction_bonus >= 0.0
                && self.low_conviction_bonus >= 0.0,
            "quality weights must be >= 0"
        );
        ensure!(
            self.error_cap_pct > 0.0,
            "error cap must be > 0 (got {})",
            self.error_cap_pct
        );
        Ok(())
    }

    pub fn classify(&self, pct: f64) -> Move {
        if pct > self.flat_band_pct {
            Move::Up
        } else if pct < -self.flat_band_pct {
            Move::Down
        } else {
            Move::Flat
        }
    }

    /// A call, when present, fully decides the expected move; otherwise the forecast is
    /// classified with the same flat band as the actual.
    pub fn is_direction_correct(
        &self,
        predicted_pct: f64,
        actual_pct: f64,
        call: Option<Call>,
    ) -> bool {
        let expected = match call {
            Some(Call::Positive) => Move::Up,
            Some(Call::Negative) => Move::Down,
            Some(Call::Neutral) => Move::Flat,
            None => self.classify(predicted_pct),
        };
        expected == self.classify(actual_pct)
    }

    pub fn trade_direction(&self, predicted_pct: f64, call: Option<Call>) -> TradeDirection {
        match call {
            Some(Call::Positive) => TradeDirection::Long,
            Some(Call::Negative) => TradeDirection::Short,
            Some(Call::Neutral) => TradeDirection::NoTrade,
            None if predicted_pct.abs() > self.flat_band_pct => {
                if predicted_pct > 0.0 {
                    TradeDirection::Long
                } else {
                    TradeDirection::Short
                }
            }
            None => TradeDirection::NoTrade,
        }
    }

    pub fn score_day(&self, predicted_pct: f64, actual_pct: f64, call: Option<Call>) -> DayScore {
        let abs_error_pct = (predicted_pct - actual_pct).abs();
        let direction_correct = self.is_direction_correct(predicted_pct, actual_pct, call);

        // Cost is charged once per trade, win or lose.
        let daily_pnl = match self.trade_direction(predicted_pct, call).sign() {
            Some(sign) => {
                self.position_size * sign * (actual_pct / 100.0)
                    - self.position_size * (self.cost_bps / 10_000.0)
            }
            None => 0.0,
        };

        let direction_score = if direction_correct {
            self.direction_weight
        } else {
            0.0
        };
        let magnitude_score =
            (self.magnitude_weight * (1.0 - abs_error_pct / self.error_cap_pct)).max(0.0);
        let confidence_bonus = if predicted_pct.abs() > self.conviction_threshold_pct {
            self.high_conviction_bonus
        } else {
            self.low_conviction_bonus
        };
        let quality_score = (direction_score + magnitude_score + confidence_bonus).clamp(0.0, 100.0);

        DayScore {
            abs_error_pct,
            daily_pnl,
            quality_score,
            direction_correct,
        }
    }
}

fn override_from_env(key: &str, field: &mut f64) {
    if let Ok(s) = std::env::var(key) {
        match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => *field = n,
            _ => tracing::warn!(key, value = %s, "ignoring unparsable scoring override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn direction_with_call() {
        let p = ScoringPolicy::default();
        assert!(p.is_direction_correct(3.0, 2.0, Some(Call::Positive)));
        assert!(p.is_direction_correct(0.0, 0.0, Some(Call::Neutral)));
        assert!(!p.is_direction_correct(5.0, -5.0, Some(Call::Positive)));
        assert!(p.is_direction_correct(1.0, -0.5, Some(Call::Negative)));
    }

    #[test]
    fn neutral_call_only_matches_flat_actual() {
        let p = ScoringPolicy::default();
        // Forecast magnitude is irrelevant once a call is given.
        assert!(p.is_direction_correct(4.0, 0.1, Some(Call::Neutral)));
        assert!(!p.is_direction_correct(0.0, 0.2, Some(Call::Neutral)));
        assert!(!p.is_direction_correct(0.0, -0.2, Some(Call::Neutral)));
    }

    #[test]
    fn direction_without_call_uses_flat_band() {
        let p = ScoringPolicy::default();
        assert!(p.is_direction_correct(0.5, 1.2, None));
        assert!(p.is_direction_correct(-0.5, -0.16, None));
        assert!(p.is_direction_correct(0.1, -0.15, None));
        assert!(!p.is_direction_correct(0.1, 0.3, None));
        assert!(!p.is_direction_correct(0.3, 0.1, None));
    }

    #[test]
    fn pnl_long_short_and_flat() {
        let p = ScoringPolicy::default();

        // 1000 * 2% - 1000 * 20bps
        let long = p.score_day(3.0, 2.0, Some(Call::Positive));
        assert!(approx(long.daily_pnl, 18.0));

        let short = p.score_day(-1.0, -1.0, Some(Call::Negative));
        assert!(approx(short.daily_pnl, 8.0));

        let losing_short = p.score_day(-1.0, 1.0, None);
        assert!(approx(losing_short.daily_pnl, -12.0));

        let neutral = p.score_day(3.0, 2.0, Some(Call::Neutral));
        assert_eq!(neutral.daily_pnl, 0.0);

        let tiny = p.score_day(0.1, 5.0, None);
        assert_eq!(tiny.daily_pnl, 0.0);
    }

    #[test]
    fn quality_blends_direction_magnitude_and_conviction() {
        let p = ScoringPolicy::default();

        let s = p.score_day(3.0, 2.0, Some(Call::Positive));
        assert!(approx(s.abs_error_pct, 1.0));
        assert!(s.direction_correct);
        // 40 + 40 * 0.9 + 20
        assert!(approx(s.quality_score, 96.0));

        let s = p.score_day(1.0, -11.0, None);
        // wrong direction, error beyond the cap, low conviction
        assert!(approx(s.quality_score, 10.0));

        let s = p.score_day(0.0, 0.0, None);
        assert!(approx(s.quality_score, 90.0));
    }

    #[test]
    fn quality_stays_within_bounds() {
        let p = ScoringPolicy::default();
        let values = [-25.0, -10.0, -2.5, -0.15, 0.0, 0.1, 0.15, 1.0, 2.0, 2.01, 9.9, 30.0];
        let calls = [None, Some(Call::Positive), Some(Call::Neutral), Some(Call::Negative)];
        for &pred in &values {
            for &actual in &values {
                for &call in &calls {
                    let q = p.score_day(pred, actual, call).quality_score;
                    assert!((0.0..=100.0).contains(&q), "q={q} pred={pred} actual={actual}");
                }
            }
        }
    }

    #[test]
    fn quality_is_capped_with_generous_weights() {
        let p = ScoringPolicy {
            direction_weight: 60.0,
            magnitude_weight: 60.0,
            ..ScoringPolicy::default()
        };
        let s = p.score_day(3.0, 3.0, None);
        assert_eq!(s.quality_score, 100.0);
    }

    #[test]
    fn validate_rejects_nonsense() {
        let p = ScoringPolicy {
            error_cap_pct: 0.0,
            ..ScoringPolicy::default()
        };
        assert!(p.validate().is_err());
        assert!(ScoringPolicy::default().validate().is_ok());
    }
}
