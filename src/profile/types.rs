//! Shared types for the user profile subsystem.

use serde::{Deserialize, Serialize};

/// The fixed vocabulary of fact types learned about a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Destination,
    Budget,
    Timeline,
    Nationality,
    FamilySize,
    Occupation,
    Language,
}

impl FactKind {
    /// Stable string form used on the wire and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::Budget => "budget",
            Self::Timeline => "timeline",
            Self::Nationality => "nationality",
            Self::FamilySize => "family_size",
            Self::Occupation => "occupation",
            Self::Language => "language",
        }
    }

    /// Parse the stable string form. Unknown kinds return `None` — the
    /// extractor occasionally invents types, and those are dropped.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "destination" => Some(Self::Destination),
            "budget" => Some(Self::Budget),
            "timeline" => Some(Self::Timeline),
            "nationality" => Some(Self::Nationality),
            "family_size" => Some(Self::FamilySize),
            "occupation" => Some(Self::Occupation),
            "language" => Some(Self::Language),
            _ => None,
        }
    }
}

impl std::fmt::Display for FactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a stored fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactStatus {
    Active,
    Superseded,
}

/// A committed fact about a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Row id.
    pub id: i64,
    pub kind: FactKind,
    pub value: String,
    pub confidence: f64,
    /// Where the fact came from (e.g. "voice", "chat_tool").
    pub source: String,
    pub status: FactStatus,
    /// Unix seconds.
    pub created_at: i64,
    pub updated_at: i64,
}

/// A fact proposal from the extractor, before routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub kind: FactKind,
    pub value: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Extractor-assigned flag for values that must not auto-commit.
    #[serde(default)]
    pub requires_confirmation: bool,
}

fn default_confidence() -> f64 {
    0.5
}

/// Resolution state of a pending confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A proposed fact mutation awaiting human approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub id: i64,
    pub user_id: String,
    pub kind: FactKind,
    /// Value currently committed, if any.
    pub old_value: Option<String>,
    pub new_value: String,
    pub source: String,
    pub confidence: f64,
    /// The originating turn text, kept for audit.
    pub turn_text: String,
    pub status: ConfirmationStatus,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

/// A user record with denormalized profile fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub display_name: Option<String>,
    /// Collapsed from the user's destination facts.
    pub destination_countries: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One side of a voice turn, appended to the transcript log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: i64,
    pub user_id: String,
    pub role: String,
    pub text: String,
    pub created_at: i64,
}

/// What happened to each candidate in one routing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingReport {
    /// Kinds committed directly.
    pub committed: Vec<FactKind>,
    /// Kinds queued for confirmation.
    pub queued: Vec<FactKind>,
    /// Kinds skipped as unchanged duplicates.
    pub skipped: Vec<FactKind>,
}
