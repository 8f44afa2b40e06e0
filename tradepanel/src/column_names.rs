//! This module stores the canonical column names used across every pipeline
//! stage, so that no stage has to match columns by substring. Note that the
//! panel/dataset names must stay in sync with the downstream statistical
//! consumer!

pub const ISO: &str = "ISO";
pub const YEAR: &str = "Year";
pub const COUNTRY: &str = "Country";

// Export (trade) columns, post-harmonisation
pub const CMD_CODE: &str = "cmdCode";
pub const FOB_VALUE: &str = "fobvalue";
pub const IS_AGRI: &str = "is_agri";
pub const CLASSIFICATION_CODE: &str = "classificationCode";
pub const CLASSIFICATION_SCHEME: &str = "classificationSearchCode";

// Export columns as they arrive from the trade-data source
pub const REF_YEAR: &str = "refYear";
pub const REPORTER_ISO: &str = "reporterISO";
pub const REPORTER_DESC: &str = "reporterDesc";

// EM-DAT event columns
pub const DISASTER_TYPE: &str = "Disaster Type";
pub const TOTAL_DEATHS: &str = "Total Deaths";
pub const TOTAL_AFFECTED: &str = "Total Affected";
pub const START_YEAR: &str = "Start Year";

// GeoMet intensity columns as they arrive
pub const GEOMET_ISO: &str = "iso";
pub const GEOMET_YEAR: &str = "year";

// Demographic covariates
pub const POPULATION: &str = "Population";
pub const INCOME_GROUP: &str = "Income group";
pub const IS_POOR_COUNTRY: &str = "is_poor_country";
pub const IS_SMALL_COUNTRY: &str = "is_small_country";

// World Bank / UN source columns
pub const INCOME_CODE: &str = "Code";
pub const POP_TYPE: &str = "Type";
pub const POP_ISO3: &str = "ISO3 Alpha-code";
pub const POP_REGION: &str = "Region, subregion, country or area *";
pub const POP_COUNT: &str = "Total Population, as of 1 January (thousands)";

// Derived panel / dataset columns
pub const DISASTER_INDEX: &str = "disaster_index";
pub const SUM_EVENTS: &str = "sum_events";
pub const SUM_DEATHS: &str = "sum_deaths";
pub const LN_TOTAL_OCCURRENCE: &str = "ln_total_occurrence";
pub const LN_TOTAL_DEATHS: &str = "ln_total_deaths";
pub const INCOME_GROUP_INTERNAL: &str = "income_group_internal";
pub const SIZE_GROUP: &str = "size_group";
pub const LN_POPULATION: &str = "ln_population";
pub const D_LN_POPULATION: &str = "d_ln_population";
