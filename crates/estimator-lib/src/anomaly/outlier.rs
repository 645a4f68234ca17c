//! Rule-based outlier classification
//!
//! Flags requests whose features fall outside simple sanity bounds or the
//! categorical reference sets shipped with the model.

use crate::models::{CarFeatures, ModelMetadata};

/// Oldest model year considered in-distribution
const DEFAULT_MIN_YEAR: i32 = 2000;

/// Highest mileage considered in-distribution
const DEFAULT_MAX_MILEAGE: f64 = 500_000.0;

/// Classifies a validated request as outlier or not
///
/// Implementations must be pure: same inputs, same answer, no side effects.
pub trait OutlierDetector: Send + Sync {
    fn is_outlier(&self, features: &CarFeatures, metadata: &ModelMetadata) -> bool;

    /// Labels for the rules a flagged request matched, for logging only
    fn reasons(&self, _features: &CarFeatures, _metadata: &ModelMetadata) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Why a request was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierReason {
    TooOld,
    ExcessiveMileage,
    UnknownBrand,
}

impl OutlierReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutlierReason::TooOld => "too_old",
            OutlierReason::ExcessiveMileage => "excessive_mileage",
            OutlierReason::UnknownBrand => "unknown_brand",
        }
    }
}

/// Fixed-threshold detector: any single rule match flags the request
#[derive(Debug, Clone)]
pub struct RuleBasedDetector {
    /// Requests older than this year are flagged
    pub min_year: i32,
    /// Requests above this mileage are flagged
    pub max_mileage: f64,
}

impl RuleBasedDetector {
    pub fn new(min_year: i32, max_mileage: f64) -> Self {
        Self {
            min_year,
            max_mileage,
        }
    }

    /// Every rule the request violates, in evaluation order
    pub fn matched_rules(&self, features: &CarFeatures, metadata: &ModelMetadata) -> Vec<OutlierReason> {
        let mut reasons = Vec::new();
        if features.year < self.min_year {
            reasons.push(OutlierReason::TooOld);
        }
        if features.mileage > self.max_mileage {
            reasons.push(OutlierReason::ExcessiveMileage);
        }
        if !metadata.is_known_brand(&features.brand) {
            reasons.push(OutlierReason::UnknownBrand);
        }
        reasons
    }
}

impl Default for RuleBasedDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_YEAR, DEFAULT_MAX_MILEAGE)
    }
}

impl OutlierDetector for RuleBasedDetector {
    fn is_outlier(&self, features: &CarFeatures, metadata: &ModelMetadata) -> bool {
        features.year < self.min_year
            || features.mileage > self.max_mileage
            || !metadata.is_known_brand(&features.brand)
    }

    fn reasons(&self, features: &CarFeatures, metadata: &ModelMetadata) -> Vec<&'static str> {
        self.matched_rules(features, metadata)
            .iter()
            .map(OutlierReason::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ModelMetadata {
        ModelMetadata {
            known_brands: ["Toyota", "BMW"].iter().map(|s| s.to_string()).collect(),
            known_fuel_types: Default::default(),
            r2_score: 0.9,
        }
    }

    fn features(brand: &str, mileage: f64, year: i32) -> CarFeatures {
        CarFeatures {
            brand: brand.to_string(),
            mileage,
            year,
            fuel_type: "Gasoline".to_string(),
        }
    }

    #[test]
    fn test_in_distribution_request() {
        let detector = RuleBasedDetector::default();
        assert!(!detector.is_outlier(&features("Toyota", 50_000.0, 2020), &metadata()));
    }

    #[test]
    fn test_each_rule_flags_alone() {
        let detector = RuleBasedDetector::default();
        let meta = metadata();

        assert!(detector.is_outlier(&features("Toyota", 50_000.0, 1999), &meta));
        assert!(detector.is_outlier(&features("Toyota", 500_001.0, 2020), &meta));
        assert!(detector.is_outlier(&features("Lada", 50_000.0, 2020), &meta));
    }

    #[test]
    fn test_boundaries_not_flagged() {
        let detector = RuleBasedDetector::default();
        let meta = metadata();

        assert!(!detector.is_outlier(&features("BMW", 500_000.0, 2000), &meta));
    }

    #[test]
    fn test_all_rules_combined() {
        let detector = RuleBasedDetector::default();
        let meta = metadata();
        let request = features("Toyota", 1_000_000.0, 1950);

        assert!(detector.is_outlier(&request, &meta));
        assert_eq!(
            detector.matched_rules(&request, &meta),
            vec![OutlierReason::TooOld, OutlierReason::ExcessiveMileage]
        );
        assert_eq!(
            OutlierDetector::reasons(&detector, &request, &meta),
            vec!["too_old", "excessive_mileage"]
        );
    }

    #[test]
    fn test_title_cased_acronym_brand_is_unknown() {
        let detector = RuleBasedDetector::default();
        let request = features("Bmw", 10.0, 2020);

        assert!(detector.is_outlier(&request, &metadata()));
        assert_eq!(
            detector.matched_rules(&request, &metadata()),
            vec![OutlierReason::UnknownBrand]
        );
    }

    #[test]
    fn test_custom_thresholds() {
        let detector = RuleBasedDetector::new(2010, 100_000.0);
        assert!(detector.is_outlier(&features("Toyota", 10.0, 2005), &metadata()));
        assert!(detector.is_outlier(&features("Toyota", 150_000.0, 2015), &metadata()));
    }
}
