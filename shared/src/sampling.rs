//! Surveillance sample size calculation
//!
//! Estimates how many plants must be inspected to detect a pest at an assumed
//! prevalence with a given confidence, using the finite-population-corrected
//! sample size:
//!
//! ```text
//! m = z² p (1 - p) / d²
//! n = m / (1 + (m - 1) / N)
//! ```
//!
//! `n` is rounded up and capped to `[1, N]`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Confidence level used when the grower has not chosen one
pub const DEFAULT_CONFIDENCE: u8 = 95;

/// Fixed margin of error (5%)
pub const DEFAULT_MARGIN_OF_ERROR: f64 = 0.05;

/// Supported confidence levels (percent) and their two-sided z-scores
pub const Z_SCORES: &[(u8, f64)] = &[
    (80, 1.282),
    (85, 1.440),
    (90, 1.645),
    (95, 1.960),
    (99, 2.576),
];

/// Errors raised while computing a sample size
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplingError {
    #[error("Unsupported confidence level: {0}%")]
    UnsupportedConfidence(u8),

    #[error("Prevalence must be between 0 and 1, got {0}")]
    InvalidPrevalence(f64),

    #[error("Cannot calculate effort: Farm size or stocking rate not set or invalid.")]
    PopulationUnavailable,
}

/// A supported confidence level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ConfidenceLevel(u8);

impl ConfidenceLevel {
    pub fn new(percent: u8) -> Result<Self, SamplingError> {
        if Z_SCORES.iter().any(|(level, _)| *level == percent) {
            Ok(Self(percent))
        } else {
            Err(SamplingError::UnsupportedConfidence(percent))
        }
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    pub fn z_score(&self) -> f64 {
        Z_SCORES
            .iter()
            .find(|(level, _)| *level == self.0)
            .map(|(_, z)| *z)
            // Construction guarantees the level is in the table
            .unwrap_or(1.960)
    }

    /// All supported levels, lowest first
    pub fn all() -> impl Iterator<Item = ConfidenceLevel> {
        Z_SCORES.iter().map(|(level, _)| ConfidenceLevel(*level))
    }
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        Self(DEFAULT_CONFIDENCE)
    }
}

impl TryFrom<u8> for ConfidenceLevel {
    type Error = SamplingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConfidenceLevel> for u8 {
    fn from(level: ConfidenceLevel) -> Self {
        level.0
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Outcome of a sample size calculation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleSizeResult {
    /// Total plants on the farm (N)
    #[serde(rename = "N")]
    pub population_size: i64,
    pub confidence_level_percent: u8,
    pub prevalence_p: f64,
    pub margin_of_error: f64,
    pub required_plants_to_survey: i64,
    /// Share of the farm to inspect, rounded to 2 dp
    pub percentage_of_total: f64,
    /// Inspect one plant in every `survey_frequency`
    pub survey_frequency: Option<i64>,
}

impl SampleSizeResult {
    /// Prevalence expressed as a percentage
    pub fn prevalence_percent(&self) -> f64 {
        round2(self.prevalence_p * 100.0)
    }

    /// Margin of error expressed as a percentage
    pub fn margin_of_error_percent(&self) -> f64 {
        round2(self.margin_of_error * 100.0)
    }
}

/// Finite-population-corrected sample size, capped to `[1, population]`.
///
/// Returns 0 only for an empty population.
pub fn required_sample_size(population: i64, z: f64, prevalence: f64, margin: f64) -> i64 {
    if population <= 0 {
        return 0;
    }
    if margin <= 0.0 {
        return population;
    }

    let m = z * z * prevalence * (1.0 - prevalence) / (margin * margin);
    if m <= 0.0 {
        return 1;
    }

    let denominator = 1.0 + (m - 1.0) / population as f64;
    if denominator <= 0.0 {
        return population;
    }

    let n = (m / denominator).ceil();
    (n as i64).clamp(1, population)
}

/// Run the full calculation for a farm population
pub fn calculate_sample_size(
    population: Option<i64>,
    confidence: ConfidenceLevel,
    prevalence: f64,
) -> Result<SampleSizeResult, SamplingError> {
    let population = match population {
        Some(n) if n > 0 => n,
        _ => return Err(SamplingError::PopulationUnavailable),
    };

    if !(0.0..=1.0).contains(&prevalence) || prevalence.is_nan() {
        return Err(SamplingError::InvalidPrevalence(prevalence));
    }

    let required = required_sample_size(
        population,
        confidence.z_score(),
        prevalence,
        DEFAULT_MARGIN_OF_ERROR,
    );

    let percentage_of_total = round2(required as f64 / population as f64 * 100.0);
    let survey_frequency = if required > 0 {
        Some((population as f64 / required as f64).round() as i64)
    } else {
        None
    };

    Ok(SampleSizeResult {
        population_size: population,
        confidence_level_percent: confidence.percent(),
        prevalence_p: prevalence,
        margin_of_error: DEFAULT_MARGIN_OF_ERROR,
        required_plants_to_survey: required,
        percentage_of_total,
        survey_frequency,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn z95() -> f64 {
        ConfidenceLevel::new(95).unwrap().z_score()
    }

    #[test]
    fn test_reference_values() {
        assert_eq!(required_sample_size(1000, z95(), 0.10, 0.05), 122);
        assert_eq!(required_sample_size(10_000, z95(), 0.05, 0.05), 73);
        assert_eq!(required_sample_size(2000, z95(), 0.02, 0.05), 30);
        assert_eq!(required_sample_size(500, 1.645, 0.07, 0.05), 62);
        assert_eq!(required_sample_size(100, 2.576, 0.10, 0.05), 71);
    }

    #[test]
    fn test_small_population_is_capped() {
        assert_eq!(required_sample_size(5, z95(), 0.10, 0.05), 5);
        assert_eq!(required_sample_size(1, z95(), 0.10, 0.05), 1);
    }

    #[test]
    fn test_edge_prevalence_returns_one() {
        assert_eq!(required_sample_size(1000, z95(), 0.0, 0.05), 1);
        assert_eq!(required_sample_size(1000, z95(), 1.0, 0.05), 1);
    }

    #[test]
    fn test_empty_population() {
        assert_eq!(required_sample_size(0, z95(), 0.1, 0.05), 0);
    }

    #[test]
    fn test_calculate_outputs() {
        let result = calculate_sample_size(Some(1000), ConfidenceLevel::default(), 0.10).unwrap();
        assert_eq!(result.population_size, 1000);
        assert_eq!(result.confidence_level_percent, 95);
        assert_eq!(result.required_plants_to_survey, 122);
        assert_eq!(result.percentage_of_total, 12.2);
        assert_eq!(result.survey_frequency, Some(8));
        assert_eq!(result.prevalence_percent(), 10.0);
        assert_eq!(result.margin_of_error_percent(), 5.0);
    }

    #[test]
    fn test_calculate_without_population() {
        assert_eq!(
            calculate_sample_size(None, ConfidenceLevel::default(), 0.1),
            Err(SamplingError::PopulationUnavailable)
        );
        assert_eq!(
            calculate_sample_size(Some(0), ConfidenceLevel::default(), 0.1),
            Err(SamplingError::PopulationUnavailable)
        );
    }

    #[test]
    fn test_calculate_rejects_bad_prevalence() {
        assert!(matches!(
            calculate_sample_size(Some(100), ConfidenceLevel::default(), 1.5),
            Err(SamplingError::InvalidPrevalence(_))
        ));
        assert!(matches!(
            calculate_sample_size(Some(100), ConfidenceLevel::default(), -0.1),
            Err(SamplingError::InvalidPrevalence(_))
        ));
    }

    #[test]
    fn test_confidence_levels() {
        assert!(ConfidenceLevel::new(95).is_ok());
        assert!(ConfidenceLevel::new(99).is_ok());
        assert_eq!(
            ConfidenceLevel::new(97),
            Err(SamplingError::UnsupportedConfidence(97))
        );
        assert_eq!(ConfidenceLevel::all().count(), Z_SCORES.len());
        assert_eq!(ConfidenceLevel::default().to_string(), "95%");
    }

    #[test]
    fn test_confidence_serde() {
        let level: ConfidenceLevel = serde_json::from_str("90").unwrap();
        assert_eq!(level.percent(), 90);
        assert!(serde_json::from_str::<ConfidenceLevel>("42").is_err());
        assert_eq!(serde_json::to_string(&level).unwrap(), "90");
    }
}
