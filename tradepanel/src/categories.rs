//! The closed set of canonical disaster categories and the per-category
//! column names derived from it. Grouping lists are always built from this
//! registry, never by searching column names for substrings.

use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

/// Canonical disaster categories of the panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum DisasterCategory {
    Earthquake,
    Flood,
    Storm,
    #[serde(rename = "Extreme temperature")]
    ExtremeTemperature,
}

impl DisasterCategory {
    pub fn all() -> Vec<Self> {
        vec![
            Self::Earthquake,
            Self::Flood,
            Self::Storm,
            Self::ExtremeTemperature,
        ]
    }

    /// Human-readable label, as it appears in EM-DAT.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Earthquake => "Earthquake",
            Self::Flood => "Flood",
            Self::Storm => "Storm",
            Self::ExtremeTemperature => "Extreme temperature",
        }
    }

    /// Snake-case stem used to derive column names.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Earthquake => "earthquake",
            Self::Flood => "flood",
            Self::Storm => "storm",
            Self::ExtremeTemperature => "extreme_temperature",
        }
    }

    /// Variable suffix used by the GeoMet intensity source.
    pub fn geomet_suffix(&self) -> &'static str {
        match self {
            Self::Earthquake => "eq",
            Self::Flood => "fld",
            Self::Storm => "str",
            Self::ExtremeTemperature => "temp",
        }
    }

    /// Raw EM-DAT type labels that map onto this category. Labels not
    /// claimed by any category are excluded from the canonical set.
    pub fn raw_labels(&self) -> &'static [&'static str] {
        match self {
            Self::Earthquake => &["Earthquake"],
            Self::Flood => &["Flood"],
            Self::Storm => &["Storm"],
            Self::ExtremeTemperature => {
                &["Extreme temperature", "Drought", "Heat wave", "Cold wave"]
            }
        }
    }

    /// Map a raw EM-DAT label to its canonical category, if any.
    pub fn from_raw_label(label: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|cat| cat.raw_labels().contains(&label))
    }

    pub fn deaths_col(&self) -> String {
        format!("{}_deaths", self.slug())
    }

    pub fn affected_col(&self) -> String {
        format!("{}_affected", self.slug())
    }

    pub fn events_col(&self) -> String {
        format!("{}_events", self.slug())
    }

    pub fn intensity_col(&self) -> String {
        format!("{}_intensity", self.slug())
    }

    /// The physical-impact proxy columns of the intensity source for this
    /// category.
    pub fn intensity_proxies(&self) -> Vec<String> {
        let sfx = self.geomet_suffix();
        vec![
            format!("killed_pop_{sfx}"),
            format!("affected_pop_{sfx}"),
            format!("damage_gdp_{sfx}"),
        ]
    }

    pub fn sig_median_col(&self) -> String {
        format!("{}_sig_median", self.slug())
    }

    pub fn sig_p90_col(&self) -> String {
        format!("{}_sig_p90", self.slug())
    }

    pub fn sig_abs1000_col(&self) -> String {
        format!("{}_sig_abs1000", self.slug())
    }

    pub fn sig_anydeaths_col(&self) -> String {
        format!("{}_sig_anydeaths", self.slug())
    }

    pub fn geomet_sig_p90_col(&self) -> String {
        format!("{}_geomet_sig_p90", self.slug())
    }

    pub fn extreme_emdat_col(&self) -> String {
        format!("extreme_{}_emdat", self.slug())
    }

    pub fn extreme_geomet_col(&self) -> String {
        format!("extreme_{}_geomet", self.slug())
    }

    pub fn ln_count_col(&self) -> String {
        format!("ln_{}_count", self.slug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_label_mapping() {
        assert_eq!(
            DisasterCategory::from_raw_label("Drought"),
            Some(DisasterCategory::ExtremeTemperature)
        );
        assert_eq!(
            DisasterCategory::from_raw_label("Flood"),
            Some(DisasterCategory::Flood)
        );
        // Unmapped labels fall outside the canonical set
        assert_eq!(DisasterCategory::from_raw_label("Epidemic"), None);
    }

    #[test]
    fn test_column_names_derive_from_slug() {
        let cat = DisasterCategory::ExtremeTemperature;
        assert_eq!(cat.deaths_col(), "extreme_temperature_deaths");
        assert_eq!(cat.events_col(), "extreme_temperature_events");
        assert_eq!(cat.geomet_sig_p90_col(), "extreme_temperature_geomet_sig_p90");
        assert_eq!(cat.extreme_emdat_col(), "extreme_extreme_temperature_emdat");
    }

    #[test]
    fn test_intensity_proxies_follow_geomet_suffix() {
        assert_eq!(
            DisasterCategory::Storm.intensity_proxies(),
            vec!["killed_pop_str", "affected_pop_str", "damage_gdp_str"]
        );
    }
}
