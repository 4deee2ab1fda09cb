//! Farm models

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Plant type assigned to new farms when none is given
pub const DEFAULT_PLANT_TYPE: &str = "Mango";

/// Days between routine surveillance visits
pub const SURVEY_INTERVAL_DAYS: i64 = 7;

/// How plants are laid out across the farm
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistributionPattern {
    /// Rows on a regular grid
    #[default]
    Regular,
    Irregular,
    /// Plants grouped in blocks with gaps between them
    Clustered,
}

impl DistributionPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionPattern::Regular => "regular",
            DistributionPattern::Irregular => "irregular",
            DistributionPattern::Clustered => "clustered",
        }
    }
}

impl std::str::FromStr for DistributionPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(DistributionPattern::Regular),
            "irregular" => Ok(DistributionPattern::Irregular),
            "clustered" => Ok(DistributionPattern::Clustered),
            other => Err(format!("Unknown distribution pattern: {}", other)),
        }
    }
}

impl std::fmt::Display for DistributionPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total plants on a farm: floor(size in hectares × plants per hectare).
///
/// `None` when either input is missing or the product is not positive.
pub fn total_plants(size_hectares: Option<Decimal>, stocking_rate: Option<i32>) -> Option<i64> {
    let size = size_hectares?;
    let rate = stocking_rate?;
    if size <= Decimal::ZERO || rate <= 0 {
        return None;
    }
    let total = (size * Decimal::from(rate)).trunc().to_i64()?;
    (total > 0).then_some(total)
}

/// Address fields captured when a farm is created or edited
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FarmAddress {
    #[serde(default)]
    pub has_exact_address: bool,
    pub geoscape_address_id: Option<String>,
    pub formatted_address: Option<String>,
    pub location_description: Option<String>,
}

impl FarmAddress {
    /// Enforce the exact-address rule.
    ///
    /// An exact address needs both the address ID and the formatted address and
    /// drops the free-text description; otherwise the exact fields are dropped.
    pub fn normalize(self) -> Result<Self, &'static str> {
        if self.has_exact_address {
            let id = non_blank(self.geoscape_address_id);
            let formatted = non_blank(self.formatted_address);
            if id.is_none() || formatted.is_none() {
                return Err(
                    "An exact address was indicated, but address details were not selected. \
                     Please use the address search.",
                );
            }
            Ok(Self {
                has_exact_address: true,
                geoscape_address_id: id,
                formatted_address: formatted,
                location_description: None,
            })
        } else {
            Ok(Self {
                has_exact_address: false,
                geoscape_address_id: None,
                formatted_address: None,
                location_description: non_blank(self.location_description),
            })
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Date the next surveillance visit is due
pub fn next_due_date(last_surveillance: Option<DateTime<Utc>>, today: NaiveDate) -> NaiveDate {
    match last_surveillance {
        Some(last) => last.date_naive() + Duration::days(SURVEY_INTERVAL_DAYS),
        None => today,
    }
}

/// A farm is due when it has never been surveyed or the last visit is older
/// than the survey interval
pub fn is_surveillance_due(last_surveillance: Option<DateTime<Utc>>, today: NaiveDate) -> bool {
    match last_surveillance {
        Some(last) => last.date_naive() < today - Duration::days(SURVEY_INTERVAL_DAYS),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_total_plants() {
        assert_eq!(total_plants(Some(Decimal::new(250, 2)), Some(400)), Some(1000));
        assert_eq!(total_plants(Some(Decimal::new(1055, 2)), Some(100)), Some(1055));
        // Fractional plants are dropped
        assert_eq!(total_plants(Some(Decimal::new(333, 2)), Some(10)), Some(33));
    }

    #[test]
    fn test_total_plants_missing_inputs() {
        assert_eq!(total_plants(None, Some(100)), None);
        assert_eq!(total_plants(Some(Decimal::ONE), None), None);
        assert_eq!(total_plants(Some(Decimal::ZERO), Some(100)), None);
        assert_eq!(total_plants(Some(Decimal::new(1, 2)), Some(10)), None);
    }

    #[test]
    fn test_exact_address_requires_details() {
        let address = FarmAddress {
            has_exact_address: true,
            geoscape_address_id: Some("GANT_123".into()),
            formatted_address: None,
            location_description: Some("Near the river".into()),
        };
        assert!(address.normalize().is_err());
    }

    #[test]
    fn test_exact_address_clears_description() {
        let address = FarmAddress {
            has_exact_address: true,
            geoscape_address_id: Some("GANT_123".into()),
            formatted_address: Some("1 Stuart Hwy, Katherine NT".into()),
            location_description: Some("Near the river".into()),
        }
        .normalize()
        .unwrap();
        assert_eq!(address.location_description, None);
        assert_eq!(address.geoscape_address_id.as_deref(), Some("GANT_123"));
    }

    #[test]
    fn test_general_location_clears_exact_fields() {
        let address = FarmAddress {
            has_exact_address: false,
            geoscape_address_id: Some("GANT_123".into()),
            formatted_address: Some("1 Stuart Hwy".into()),
            location_description: Some("  Smith Property via XYZ Road ".into()),
        }
        .normalize()
        .unwrap();
        assert_eq!(address.geoscape_address_id, None);
        assert_eq!(address.formatted_address, None);
        assert_eq!(address.location_description.as_deref(), Some("Smith Property via XYZ Road"));
    }

    #[test]
    fn test_next_due_date() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        assert_eq!(next_due_date(None, today), today);
        let last = Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap();
        assert_eq!(
            next_due_date(Some(last), today),
            NaiveDate::from_ymd_opt(2024, 3, 17).unwrap()
        );
    }

    #[test]
    fn test_surveillance_due() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        assert!(is_surveillance_due(None, today));
        let recent = Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap();
        assert!(!is_surveillance_due(Some(recent), today));
        let old = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert!(is_surveillance_due(Some(old), today));
    }

    #[test]
    fn test_distribution_pattern_round_trip() {
        for pattern in [
            DistributionPattern::Regular,
            DistributionPattern::Irregular,
            DistributionPattern::Clustered,
        ] {
            assert_eq!(pattern.as_str().parse::<DistributionPattern>().unwrap(), pattern);
        }
        assert!("scattered".parse::<DistributionPattern>().is_err());
    }
}
