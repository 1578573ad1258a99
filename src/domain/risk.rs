//! Risk bands for standardized valuation scores.
//!
//! A fixed, ordered threshold ladder. Boundaries are inclusive lower
//! bounds evaluated from the top down, so the bands partition the real
//! line without overlap.

use serde::{Deserialize, Serialize};

/// Coarse risk level reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    ExtremeLow,
    Low,
    Medium,
    High,
    ExtremeHigh,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::ExtremeLow => "extreme_low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::ExtremeHigh => "extreme_high",
        };
        f.write_str(label)
    }
}

/// Fine-grained band; each band maps to one level and one narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    ExtremeHigh,
    High,
    Medium,
    UpperLow,
    FairValue,
    Accumulation,
    ExtremeLow,
}

/// Ladder from the top down: (inclusive lower bound, band).
const LADDER: [(f64, RiskBand); 6] = [
    (7.0, RiskBand::ExtremeHigh),
    (3.0, RiskBand::High),
    (1.5, RiskBand::Medium),
    (0.5, RiskBand::UpperLow),
    (-0.5, RiskBand::FairValue),
    (-1.5, RiskBand::Accumulation),
];

impl RiskBand {
    /// Band for a score. Non-finite scores are treated as neutral (0).
    pub fn for_score(score: f64) -> Self {
        let score = if score.is_finite() { score } else { 0.0 };
        LADDER
            .iter()
            .find(|(bound, _)| score >= *bound)
            .map_or(Self::ExtremeLow, |(_, band)| *band)
    }

    pub fn level(self) -> RiskLevel {
        match self {
            Self::ExtremeHigh => RiskLevel::ExtremeHigh,
            Self::High => RiskLevel::High,
            Self::Medium => RiskLevel::Medium,
            Self::UpperLow | Self::FairValue | Self::Accumulation => RiskLevel::Low,
            Self::ExtremeLow => RiskLevel::ExtremeLow,
        }
    }

    pub fn narrative(self) -> &'static str {
        match self {
            Self::ExtremeHigh => {
                "Extreme overvaluation: market value far above realized value, historically a cycle top zone"
            }
            Self::High => "Overvalued: elevated risk, historically late-cycle conditions",
            Self::Medium => "Moderately overvalued: momentum is strong but risk is building",
            Self::UpperLow => "Slightly above fair value: neutral to mildly elevated risk",
            Self::FairValue => "Near fair value: market value tracks realized value",
            Self::Accumulation => "Below fair value: historically an accumulation zone",
            Self::ExtremeLow => {
                "Extreme undervaluation: market value far below realized value, historically a cycle bottom zone"
            }
        }
    }
}

/// Risk classification of a score. Recomputed every time a score is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub band: RiskBand,
    pub narrative: String,
}

impl RiskAssessment {
    /// Classify a score against the fixed ladder.
    pub fn classify(score: f64) -> Self {
        let band = RiskBand::for_score(score);
        Self {
            score,
            level: band.level(),
            band,
            narrative: band.narrative().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(RiskBand::for_score(7.0), RiskBand::ExtremeHigh);
        assert_eq!(RiskBand::for_score(3.0), RiskBand::High);
        assert_eq!(RiskBand::for_score(1.5), RiskBand::Medium);
        assert_eq!(RiskBand::for_score(0.5), RiskBand::UpperLow);
        assert_eq!(RiskBand::for_score(-0.5), RiskBand::FairValue);
        assert_eq!(RiskBand::for_score(-1.5), RiskBand::Accumulation);
    }

    #[test]
    fn test_just_below_boundaries() {
        assert_eq!(RiskBand::for_score(6.999), RiskBand::High);
        assert_eq!(RiskBand::for_score(2.999), RiskBand::Medium);
        assert_eq!(RiskBand::for_score(1.499), RiskBand::UpperLow);
        assert_eq!(RiskBand::for_score(0.499), RiskBand::FairValue);
        assert_eq!(RiskBand::for_score(-0.501), RiskBand::Accumulation);
        assert_eq!(RiskBand::for_score(-1.501), RiskBand::ExtremeLow);
    }

    #[test]
    fn test_levels() {
        assert_eq!(RiskAssessment::classify(12.0).level, RiskLevel::ExtremeHigh);
        assert_eq!(RiskAssessment::classify(-3.0).level, RiskLevel::ExtremeLow);
        assert_eq!(RiskAssessment::classify(0.0).level, RiskLevel::Low);
        assert_eq!(RiskAssessment::classify(2.0).level, RiskLevel::Medium);
    }

    #[test]
    fn test_non_finite_score_is_neutral() {
        assert_eq!(RiskBand::for_score(f64::NAN), RiskBand::FairValue);
    }

    #[test]
    fn test_every_band_has_distinct_narrative() {
        let bands = [
            RiskBand::ExtremeHigh,
            RiskBand::High,
            RiskBand::Medium,
            RiskBand::UpperLow,
            RiskBand::FairValue,
            RiskBand::Accumulation,
            RiskBand::ExtremeLow,
        ];
        let narratives: std::collections::HashSet<_> =
            bands.iter().map(|b| b.narrative()).collect();
        assert_eq!(narratives.len(), bands.len());
    }
}
