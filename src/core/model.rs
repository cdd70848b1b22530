//! Domain model for the registry: entity records, workflow enums, and the
//! typed payloads behind the structured-document columns.
//!
//! Enum values round-trip through the database as the same snake_case strings
//! the certification tooling expects, so `as_str`/`FromStr` are the single
//! source of truth for both SQL text and CLI parsing.

use crate::core::error::RegistryError;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

macro_rules! registry_enum {
    ($name:ident, $entity:expr, $field:expr, { $($variant:ident => $text:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
        #[serde(rename_all = "snake_case")]
        #[value(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RegistryError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(RegistryError::validation(
                        $entity,
                        $field,
                        format!("unknown value '{}'", other),
                    )),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: RegistryError| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

registry_enum!(Role, "profile", "role", {
    Admin => "admin",
    ProjectManager => "project_manager",
    FieldResearcher => "field_researcher",
    Verifier => "verifier",
    Viewer => "viewer",
});

registry_enum!(ProjectStatus, "project", "status", {
    Planning => "planning",
    Active => "active",
    Completed => "completed",
    Suspended => "suspended",
});

registry_enum!(SiteType, "site", "site_type", {
    Mangrove => "mangrove",
    Seagrass => "seagrass",
    SaltMarsh => "salt_marsh",
    KelpForest => "kelp_forest",
});

registry_enum!(MonitoringType, "monitoring_record", "monitoring_type", {
    Biomass => "biomass",
    CarbonStock => "carbon_stock",
    Biodiversity => "biodiversity",
    WaterQuality => "water_quality",
    SoilAnalysis => "soil_analysis",
});

registry_enum!(ReportStatus, "report", "status", {
    Draft => "draft",
    Submitted => "submitted",
    UnderReview => "under_review",
    Verified => "verified",
    Rejected => "rejected",
});

registry_enum!(VerificationStatus, "verification_record", "verification_status", {
    Pending => "pending",
    InProgress => "in_progress",
    Verified => "verified",
    Rejected => "rejected",
});

/// Entity discriminator used by error variants, policy checks, and the event
/// log. `as_str` values double as the event-log `entity` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Profile,
    Project,
    Site,
    MonitoringRecord,
    Report,
    VerificationRecord,
    Document,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::Project => "project",
            EntityKind::Site => "site",
            EntityKind::MonitoringRecord => "monitoring_record",
            EntityKind::Report => "report",
            EntityKind::VerificationRecord => "verification_record",
            EntityKind::Document => "document",
        }
    }
}

// ---- Entity records ----

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub organization: String,
    pub email: String,
    pub phone: String,
    pub role: Option<Role>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub location: String,
    pub geometry: Option<Geometry>,
    pub area_hectares: Option<f64>,
    pub certification_standard: String,
    pub methodology: String,
    pub description: String,
    pub status: ProjectStatus,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_by: Option<String>,
    pub project_manager_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Site {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub site_type: SiteType,
    pub geometry: Geometry,
    pub area_hectares: Option<f64>,
    pub depth_range: String,
    pub salinity_range: String,
    pub accessibility_notes: String,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MonitoringRecord {
    pub id: String,
    pub site_id: String,
    pub monitoring_type: MonitoringType,
    pub measurement_date: String,
    pub data_values: JsonValue,
    pub methodology: String,
    pub equipment_used: String,
    pub weather_conditions: String,
    pub collected_by: Option<String>,
    pub verified: bool,
    pub verification_notes: String,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Report {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub report_type: String,
    pub reporting_period_start: Option<String>,
    pub reporting_period_end: Option<String>,
    pub content: Option<JsonValue>,
    pub file_url: Option<String>,
    pub carbon_credits_estimated: Option<f64>,
    pub carbon_credits_verified: Option<f64>,
    pub status: ReportStatus,
    pub created_by: Option<String>,
    pub submitted_at: Option<String>,
    pub verified_by: Option<String>,
    pub verification_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerificationRecord {
    pub id: String,
    pub report_id: String,
    pub verifier_id: String,
    pub verification_status: VerificationStatus,
    pub carbon_credits_approved: Option<f64>,
    pub findings: Option<JsonValue>,
    pub recommendations: String,
    pub verification_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: Option<i64>,
    pub project_id: Option<String>,
    pub site_id: Option<String>,
    pub report_id: Option<String>,
    pub uploaded_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

// ---- Geometry ----

/// GeoJSON-flavored geometry for projects and sites. Coordinates are
/// `[longitude, latitude]` pairs, range-checked on parse.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
    Polygon { coordinates: Vec<[f64; 2]> },
}

impl Geometry {
    pub fn parse(entity: &'static str, raw: &str) -> Result<Self, RegistryError> {
        let geometry: Geometry = serde_json::from_str(raw)
            .map_err(|e| RegistryError::validation(entity, "geometry", e.to_string()))?;
        geometry.validate(entity)?;
        Ok(geometry)
    }

    pub fn validate(&self, entity: &'static str) -> Result<(), RegistryError> {
        let check = |pair: &[f64; 2]| -> Result<(), RegistryError> {
            let [lng, lat] = pair;
            if !(-180.0..=180.0).contains(lng) || !(-90.0..=90.0).contains(lat) {
                return Err(RegistryError::validation(
                    entity,
                    "geometry",
                    format!("coordinate [{}, {}] out of range", lng, lat),
                ));
            }
            Ok(())
        };
        match self {
            Geometry::Point { coordinates } => check(coordinates),
            Geometry::Polygon { coordinates } => {
                if coordinates.len() < 3 {
                    return Err(RegistryError::validation(
                        entity,
                        "geometry",
                        "polygon needs at least 3 vertices",
                    ));
                }
                for pair in coordinates {
                    check(pair)?;
                }
                Ok(())
            }
        }
    }
}

impl rusqlite::types::ToSql for Geometry {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        let text = serde_json::to_string(self)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(rusqlite::types::ToSqlOutput::from(text))
    }
}

impl rusqlite::types::FromSql for Geometry {
    fn column_result(
        value: rusqlite::types::ValueRef<'_>,
    ) -> rusqlite::types::FromSqlResult<Self> {
        serde_json::from_str(value.as_str()?)
            .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}

// ---- Monitoring data payloads ----

/// Per-type schemas for `MonitoringRecord.data_values`.
///
/// Each `monitoring_type` has a concrete shape validated at the write
/// boundary, and unknown keys are rejected so typos surface as
/// `ValidationError` rather than silently dropped fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BiomassValues {
    pub above_ground_kg_m2: f64,
    pub below_ground_kg_m2: Option<f64>,
    pub plot_count: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CarbonStockValues {
    pub soil_organic_carbon_pct: f64,
    pub core_depth_cm: f64,
    pub bulk_density_g_cm3: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BiodiversityValues {
    pub species_richness: u32,
    pub shannon_index: Option<f64>,
    pub dominant_species: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WaterQualityValues {
    pub temperature_c: f64,
    pub salinity_psu: f64,
    pub ph: Option<f64>,
    pub dissolved_oxygen_mg_l: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SoilAnalysisValues {
    pub organic_matter_pct: f64,
    pub nitrogen_pct: Option<f64>,
    pub phosphorus_mg_kg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataValues {
    Biomass(BiomassValues),
    CarbonStock(CarbonStockValues),
    Biodiversity(BiodiversityValues),
    WaterQuality(WaterQualityValues),
    SoilAnalysis(SoilAnalysisValues),
}

impl DataValues {
    /// Validate a raw payload against the schema selected by
    /// `monitoring_type`.
    pub fn parse(monitoring_type: MonitoringType, raw: &JsonValue) -> Result<Self, RegistryError> {
        let invalid = |e: serde_json::Error| {
            RegistryError::validation(
                "monitoring_record",
                "data_values",
                format!("does not match {} schema: {}", monitoring_type, e),
            )
        };
        match monitoring_type {
            MonitoringType::Biomass => serde_json::from_value(raw.clone())
                .map(DataValues::Biomass)
                .map_err(invalid),
            MonitoringType::CarbonStock => serde_json::from_value(raw.clone())
                .map(DataValues::CarbonStock)
                .map_err(invalid),
            MonitoringType::Biodiversity => serde_json::from_value(raw.clone())
                .map(DataValues::Biodiversity)
                .map_err(invalid),
            MonitoringType::WaterQuality => serde_json::from_value(raw.clone())
                .map(DataValues::WaterQuality)
                .map_err(invalid),
            MonitoringType::SoilAnalysis => serde_json::from_value(raw.clone())
                .map(DataValues::SoilAnalysis)
                .map_err(invalid),
        }
    }
}

// ---- Field validation helpers ----

pub fn validate_iso_date(
    entity: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), RegistryError> {
    if ISO_DATE_RE.is_match(value) {
        Ok(())
    } else {
        Err(RegistryError::validation(
            entity,
            field,
            format!("'{}' is not a YYYY-MM-DD date", value),
        ))
    }
}

/// ISO dates compare lexicographically, so ordering checks are plain string
/// comparisons once both sides pass `validate_iso_date`.
pub fn validate_date_order(
    entity: &'static str,
    field: &'static str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(), RegistryError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(RegistryError::validation(
                entity,
                field,
                format!("end date {} precedes start date {}", end, start),
            ));
        }
    }
    Ok(())
}

pub fn validate_non_negative(
    entity: &'static str,
    field: &'static str,
    value: Option<f64>,
) -> Result<(), RegistryError> {
    if let Some(v) = value {
        if !v.is_finite() || v < 0.0 {
            return Err(RegistryError::validation(
                entity,
                field,
                format!("{} must be a finite value >= 0", v),
            ));
        }
    }
    Ok(())
}

pub fn validate_required(
    entity: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), RegistryError> {
    if value.trim().is_empty() {
        return Err(RegistryError::validation(entity, field, "must not be empty"));
    }
    Ok(())
}
