//! Core record types.
//!
//! [`Memory`] is one stored record, [`Edge`] one typed link between two
//! records. [`Tier`], [`Relation`] and [`EdgeOrigin`] are their closed
//! vocabularies (with [`Relation::Custom`] as the open escape hatch).

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Memory tier. New records start `Episodic`; reflection promotes to `Semantic`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Raw experiences, subject to pruning.
    #[default]
    Episodic,
    /// Frequently used, distilled knowledge. Never pruned.
    Semantic,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(Self::Episodic),
            "semantic" => Ok(Self::Semantic),
            _ => Err(MemoryError::invalid(format!(
                "unknown tier: {s} (expected episodic or semantic)"
            ))),
        }
    }
}

static CUSTOM_RELATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").expect("relation pattern is valid"));

/// Edge label.
///
/// Custom labels must be lowercase snake_case, at most 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Relation {
    RelatesTo,
    Contradicts,
    Supersedes,
    CausedBy,
    PartOf,
    Custom(String),
}

impl Relation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::RelatesTo => "relates_to",
            Self::Contradicts => "contradicts",
            Self::Supersedes => "supersedes",
            Self::CausedBy => "caused_by",
            Self::PartOf => "part_of",
            Self::Custom(label) => label,
        }
    }

    /// Parse a label, validating custom ones.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        Ok(match s {
            "relates_to" => Self::RelatesTo,
            "contradicts" => Self::Contradicts,
            "supersedes" => Self::Supersedes,
            "caused_by" => Self::CausedBy,
            "part_of" => Self::PartOf,
            other if CUSTOM_RELATION.is_match(other) => Self::Custom(other.to_string()),
            other => {
                return Err(MemoryError::invalid(format!(
                    "invalid relation {other:?}: use lowercase snake_case, at most 64 characters"
                )))
            }
        })
    }

    /// `relates_to` edges carry no direction; the rest read source → target.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::RelatesTo)
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Relation {
    type Error = MemoryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Relation> for String {
    fn from(r: Relation) -> Self {
        r.as_str().to_string()
    }
}

/// Who created an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOrigin {
    /// Written by the graph linker on ingest.
    Auto,
    /// Written by a caller through `relate`.
    Explicit,
}

impl EdgeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Explicit => "explicit",
        }
    }
}

impl std::str::FromStr for EdgeOrigin {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "explicit" => Ok(Self::Explicit),
            _ => Err(MemoryError::invalid(format!("unknown edge origin: {s}"))),
        }
    }
}

/// A memory record, matching the `memories` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub text: String,
    /// Unit-length vector, or `None` for records stored while embeddings were
    /// unavailable. Never serialized.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub tier: Tier,
    /// In `[0.0, 1.0]`.
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    /// Equals `created_at` until the first recall returns this record.
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u32,
    /// Extracted entities, surface forms in first-occurrence order.
    pub entities: Vec<String>,
    /// Soft-delete marker. Terminal.
    pub decayed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decayed_at: Option<DateTime<Utc>>,
}

impl Memory {
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Input to [`super::store::insert`].
#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    /// Caller-chosen id; a UUID v7 is generated when absent.
    pub id: Option<String>,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub tier: Tier,
    pub importance: f64,
    pub entities: Vec<String>,
    /// Defaults to now.
    pub created_at: Option<DateTime<Utc>>,
}

/// Partial update applied by [`super::store::update_fields`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decayed: Option<bool>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        self.tier.is_none()
            && self.importance.is_none()
            && self.access_count.is_none()
            && self.last_accessed_at.is_none()
            && self.decayed.is_none()
    }
}

/// A typed, weighted link between two memories, matching the `edges` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation: Relation,
    /// In `[0.0, 1.0]`.
    pub weight: f64,
    pub origin: EdgeOrigin,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// The endpoint that is not `id`, if `id` is an endpoint at all.
    pub fn other_end(&self, id: &str) -> Option<&str> {
        if self.source_id == id {
            Some(&self.target_id)
        } else if self.target_id == id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

/// Input to [`super::store::insert_edge`].
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation: Relation,
    pub weight: f64,
    pub origin: EdgeOrigin,
}

/// Which incident edges to fetch for a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}
