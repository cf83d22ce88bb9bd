//! Persistent entity types: imports, maps (catalog records), layers, users.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Layer reference value meaning "no target layer".
pub const NO_LAYER_SENTINEL: i64 = -99;

// ============================================================================
// Import
// ============================================================================

/// Lifecycle of an import.
///
/// `Ready -> Running -> {Finished | Failed}`; `Running` may be skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    #[default]
    Ready,
    Running,
    Finished,
    Failed,
}

impl ImportStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Finished | ImportStatus::Failed)
    }

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        use ImportStatus::*;
        matches!(
            (self, next),
            (Ready, Running) | (Ready, Finished) | (Ready, Failed) | (Running, Finished) | (Running, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Ready => "ready",
            ImportStatus::Running => "running",
            ImportStatus::Finished => "finished",
            ImportStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(ImportStatus::Ready),
            "running" => Ok(ImportStatus::Running),
            "finished" => Ok(ImportStatus::Finished),
            "failed" => Ok(ImportStatus::Failed),
            other => Err(format!("unknown import status '{}'", other)),
        }
    }
}

/// A request to import every file of a Commons category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportRequest {
    pub id: i64,
    /// Category title, "Category:<name>".
    pub category: String,
    /// Requesting user (owner of the import and of the maps it creates).
    pub user_id: i64,
    /// Target layer; `None` or [`NO_LAYER_SENTINEL`] mean "none".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<i64>,
    pub status: ImportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportRequest {
    /// The referenced layer id, with the sentinel folded into `None`.
    pub fn target_layer(&self) -> Option<i64> {
        self.layer_id.filter(|id| *id != NO_LAYER_SENTINEL)
    }
}

/// Request to create a new import.
#[derive(Debug, Clone)]
pub struct NewImport {
    pub category: String,
    pub user_id: i64,
    pub layer_id: Option<i64>,
}

impl NewImport {
    pub fn new(category: impl Into<String>, user_id: i64) -> Self {
        Self {
            category: category.into(),
            user_id,
            layer_id: None,
        }
    }

    pub fn with_layer(mut self, layer_id: i64) -> Self {
        self.layer_id = Some(layer_id);
        self
    }
}

// ============================================================================
// Catalog record (map)
// ============================================================================

/// What kind of scan a map is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MapType {
    IsMap,
    Index,
    NotMap,
}

impl MapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapType::IsMap => "is_map",
            MapType::Index => "index",
            MapType::NotMap => "not_map",
        }
    }
}

impl FromStr for MapType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "is_map" => Ok(MapType::IsMap),
            "index" => Ok(MapType::Index),
            "not_map" => Ok(MapType::NotMap),
            other => Err(format!("unknown map type '{}'", other)),
        }
    }
}

/// Processing status of a map. Imports only ever create `Unloaded` maps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MapStatus {
    Unloaded,
    Loading,
    Available,
    Warping,
    Warped,
    Published,
}

impl MapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapStatus::Unloaded => "unloaded",
            MapStatus::Loading => "loading",
            MapStatus::Available => "available",
            MapStatus::Warping => "warping",
            MapStatus::Warped => "warped",
            MapStatus::Published => "published",
        }
    }
}

impl FromStr for MapStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unloaded" => Ok(MapStatus::Unloaded),
            "loading" => Ok(MapStatus::Loading),
            "available" => Ok(MapStatus::Available),
            "warping" => Ok(MapStatus::Warping),
            "warped" => Ok(MapStatus::Warped),
            "published" => Ok(MapStatus::Published),
            other => Err(format!("unknown map status '{}'", other)),
        }
    }
}

/// A locally catalogued Commons file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogRecord {
    pub id: i64,
    /// Commons page id; unique across the catalog.
    pub page_id: u64,
    pub title: String,
    /// File name taken from the upload URL.
    pub unique_id: String,
    pub description: String,
    pub source_uri: String,
    pub upload_url: String,
    pub image_url: String,
    pub public: bool,
    pub map_type: MapType,
    pub status: MapStatus,
    /// Import that last created or touched this record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_id: Option<i64>,
    pub owner_id: i64,
    /// Users allowed to edit (always includes the owner).
    #[serde(default)]
    pub collaborators: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for a record that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCatalogRecord {
    pub page_id: u64,
    pub title: String,
    pub unique_id: String,
    pub description: String,
    pub source_uri: String,
    pub upload_url: String,
    pub image_url: String,
    pub public: bool,
    pub map_type: MapType,
    pub status: MapStatus,
    pub import_id: i64,
    pub owner_id: i64,
}

// ============================================================================
// Layer
// ============================================================================

/// A named collection of maps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub id: i64,
    /// Unique; for imported layers, the category title.
    pub name: String,
    pub user_id: i64,
    pub source_uri: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLayer {
    pub name: String,
    pub user_id: i64,
    pub source_uri: String,
}

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub created_at: DateTime<Utc>,
}
