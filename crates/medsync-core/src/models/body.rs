//! Typed payloads for each record kind

use serde::{Deserialize, Serialize};

use super::record::RecordKind;
use crate::error::Result;

/// A prescribed or over-the-counter medication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    /// Id of the prescribing doctor record, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescribed_by: Option<String>,
    /// Start date (Unix ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// End date (Unix ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    pub notes: String,
    pub active: bool,
}

/// A dietary supplement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Supplement {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub notes: String,
}

/// A logged meal or snack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DietEntry {
    /// Meal label such as "breakfast"
    pub meal: String,
    pub description: String,
    /// When the food was eaten (Unix ms)
    pub consumed_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<u32>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Doctor {
    pub name: String,
    pub specialty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub notes: String,
}

/// How serious a detected interaction is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Moderate,
    High,
}

/// A report of a possible interaction between medications and supplements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConflictReport {
    /// Names of the medications/supplements involved
    pub items: Vec<String>,
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    /// When the report was produced (Unix ms)
    pub generated_at: i64,
}

/// Payload of a record; the variant determines the record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RecordBody {
    Medication(Medication),
    Supplement(Supplement),
    DietEntry(DietEntry),
    Doctor(Doctor),
    ConflictReport(ConflictReport),
}

impl RecordBody {
    /// Kind of record carrying this payload
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Medication(_) => RecordKind::Medication,
            Self::Supplement(_) => RecordKind::Supplement,
            Self::DietEntry(_) => RecordKind::DietEntry,
            Self::Doctor(_) => RecordKind::Doctor,
            Self::ConflictReport(_) => RecordKind::ConflictReport,
        }
    }

    /// Parse a payload of a known kind.
    pub fn from_json(kind: RecordKind, value: serde_json::Value) -> Result<Self> {
        let body = match kind {
            RecordKind::Medication => Self::Medication(serde_json::from_value(value)?),
            RecordKind::Supplement => Self::Supplement(serde_json::from_value(value)?),
            RecordKind::DietEntry => Self::DietEntry(serde_json::from_value(value)?),
            RecordKind::Doctor => Self::Doctor(serde_json::from_value(value)?),
            RecordKind::ConflictReport => Self::ConflictReport(serde_json::from_value(value)?),
        };
        Ok(body)
    }

    /// Serialize the payload fields.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Short human-readable label for listings
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::Medication(medication) => {
                format!("{} {}", medication.name, medication.dosage)
            }
            Self::Supplement(supplement) => {
                format!("{} {}", supplement.name, supplement.dosage)
            }
            Self::DietEntry(entry) => format!("{}: {}", entry.meal, entry.description),
            Self::Doctor(doctor) => format!("{} ({})", doctor.name, doctor.specialty),
            Self::ConflictReport(report) => {
                format!("{:?}: {}", report.severity, report.items.join(" + "))
            }
        }
        .trim()
        .to_string()
    }
}
