//! Synchronizable record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::body::RecordBody;
use crate::error::{Error, Result};
use crate::util::{next_timestamp, unix_millis_now};

/// A unique identifier for a record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The account a record belongs to.
///
/// Owner ids are used as a path segment of remote document paths, so they
/// must be non-empty and free of `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Validate and wrap an owner id
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("owner id cannot be empty".into()));
        }
        if trimmed.contains('/') {
            return Err(Error::InvalidInput(format!(
                "owner id must not contain '/': {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the raw owner id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OwnerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

/// The five independently synchronized record streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Medication,
    Supplement,
    DietEntry,
    Doctor,
    ConflictReport,
}

impl RecordKind {
    /// Every kind, in the order sync passes visit them.
    pub const ALL: [Self; 5] = [
        Self::Medication,
        Self::Supplement,
        Self::DietEntry,
        Self::Doctor,
        Self::ConflictReport,
    ];

    /// Remote collection name for this kind.
    #[must_use]
    pub const fn collection_name(self) -> &'static str {
        match self {
            Self::Medication => "medications",
            Self::Supplement => "supplements",
            Self::DietEntry => "dietEntries",
            Self::Doctor => "doctors",
            Self::ConflictReport => "conflictReports",
        }
    }

    /// Stable identifier used in the local database and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Medication => "medication",
            Self::Supplement => "supplement",
            Self::DietEntry => "diet_entry",
            Self::Doctor => "doctor",
            Self::ConflictReport => "conflict_report",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| {
                kind.as_str() == normalized
                    || kind.collection_name().to_ascii_lowercase() == normalized.replace('_', "")
            })
            .ok_or_else(|| Error::InvalidInput(format!("unknown record kind: {s}")))
    }
}

/// A locally stored, synchronizable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Unique identifier within kind and owner
    pub id: RecordId,
    /// Owning account
    pub owner_id: OwnerId,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last modification timestamp (Unix ms)
    pub updated_at: i64,
    /// Local changes not yet confirmed remotely
    pub dirty: bool,
    /// Logically deleted, kept until the remote delete is confirmed
    pub tombstoned: bool,
    /// Typed payload
    pub body: RecordBody,
}

impl Record {
    /// Create a new local record. New records start dirty.
    #[must_use]
    pub fn new(owner_id: OwnerId, body: RecordBody) -> Self {
        let now = unix_millis_now();
        Self {
            id: RecordId::new(),
            owner_id,
            created_at: now,
            updated_at: now,
            dirty: true,
            tombstoned: false,
            body,
        }
    }

    /// The stream this record belongs to
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        self.body.kind()
    }

    /// Replace the payload, marking the record dirty.
    pub fn update(&mut self, body: RecordBody) -> Result<()> {
        if body.kind() != self.kind() {
            return Err(Error::InvalidInput(format!(
                "cannot change record {} from {} to {}",
                self.id,
                self.kind(),
                body.kind()
            )));
        }
        if self.tombstoned {
            return Err(Error::InvalidInput(format!(
                "record {} has been deleted",
                self.id
            )));
        }
        self.body = body;
        self.touch();
        Ok(())
    }

    /// Soft-delete the record so the deletion can be propagated.
    pub fn tombstone(&mut self) {
        self.tombstoned = true;
        self.touch();
    }

    /// Copy of this record as it should be stored after a download.
    #[must_use]
    pub fn into_clean(mut self) -> Self {
        self.dirty = false;
        self.tombstoned = false;
        self
    }

    fn touch(&mut self) {
        self.updated_at = next_timestamp(self.updated_at);
        self.dirty = true;
    }

    /// Render the remote document for this record.
    pub fn to_document(&self) -> Result<serde_json::Value> {
        let fields = match self.body.to_json()? {
            serde_json::Value::Object(fields) => fields,
            other => {
                return Err(Error::InvalidInput(format!(
                    "record body must serialize to an object, got {other}"
                )))
            }
        };
        let document = RemoteDocument {
            id: self.id,
            owner_id: self.owner_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            fields,
        };
        Ok(serde_json::to_value(document)?)
    }

    /// Parse a remote document of the given kind. Downloaded records are clean.
    pub fn from_document(kind: RecordKind, document: serde_json::Value) -> Result<Self> {
        let document: RemoteDocument = serde_json::from_value(document)?;
        let body = RecordBody::from_json(kind, serde_json::Value::Object(document.fields))?;
        Ok(Self {
            id: document.id,
            owner_id: document.owner_id,
            created_at: document.created_at,
            updated_at: document.updated_at,
            dirty: false,
            tombstoned: false,
            body,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteDocument {
    id: RecordId,
    owner_id: OwnerId,
    #[serde(default)]
    created_at: i64,
    updated_at: i64,
    #[serde(flatten)]
    fields: serde_json::Map<String, serde_json::Value>,
}
