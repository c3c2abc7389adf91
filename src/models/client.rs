//! Client record model shared by the roster service and the sync client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Background/text color pairs used for client avatars.
const AVATAR_PALETTE: [(&str, &str); 8] = [
    ("bg-blue-100", "text-blue-700"),
    ("bg-green-100", "text-green-700"),
    ("bg-amber-100", "text-amber-700"),
    ("bg-rose-100", "text-rose-700"),
    ("bg-violet-100", "text-violet-700"),
    ("bg-teal-100", "text-teal-700"),
    ("bg-orange-100", "text-orange-700"),
    ("bg-slate-100", "text-slate-700"),
];

/// Lifecycle status of a client on a coach's roster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    #[default]
    Active,
    Inactive,
    Pending,
    OnHold,
    AcceptedInvitation,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Active => "active",
            ClientStatus::Inactive => "inactive",
            ClientStatus::Pending => "pending",
            ClientStatus::OnHold => "on_hold",
            ClientStatus::AcceptedInvitation => "accepted_invitation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ClientStatus::Active),
            "inactive" => Some(ClientStatus::Inactive),
            "pending" => Some(ClientStatus::Pending),
            "on_hold" => Some(ClientStatus::OnHold),
            "accepted_invitation" => Some(ClientStatus::AcceptedInvitation),
            _ => None,
        }
    }
}

/// Completed versus planned sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SessionProgress {
    pub completed: u32,
    pub total: u32,
}

/// The most recent workout a client logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastWorkout {
    pub name: String,
    pub date: String,
    pub completion: u8,
}

/// A named progress metric, e.g. `weight: 82kg (-1.5kg)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientMetric {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,
}

/// A trainee managed by a coach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub id: String,
    /// Owning coach. Never leaves the server.
    #[serde(skip)]
    pub coach_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: ClientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default)]
    pub initials: String,
    #[serde(default)]
    pub bg_color: String,
    #[serde(default)]
    pub text_color: String,
    #[serde(default)]
    pub sessions: SessionProgress,
    #[serde(default)]
    pub completion: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_workout: Option<LastWorkout>,
    #[serde(default)]
    pub metrics: Vec<ClientMetric>,
    /// Linked mobile-app account, absent until the client signs up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
    /// Commit sequence assigned by the server when the client was inserted
    #[serde(default)]
    pub seq: i64,
}

impl ClientRecord {
    /// Build a record with derived display fields filled in and everything else empty.
    pub fn new(id: impl Into<String>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let name = name.into();
        let (bg_color, text_color) = avatar_colors(&name);
        Self {
            id: id.into(),
            coach_id: String::new(),
            initials: initials(&name),
            bg_color: bg_color.to_string(),
            text_color: text_color.to_string(),
            name,
            email: None,
            phone: None,
            status: ClientStatus::default(),
            goal: None,
            program: None,
            sessions: SessionProgress::default(),
            completion: 0,
            last_workout: None,
            metrics: Vec::new(),
            user_id: None,
            invite_code: None,
            notes: None,
            created_at,
            updated_at: created_at,
            version: 1,
            seq: 0,
        }
    }

    /// Recompute the fields derived from `name`.
    pub fn refresh_display(&mut self) {
        let (bg_color, text_color) = avatar_colors(&self.name);
        self.initials = initials(&self.name);
        self.bg_color = bg_color.to_string();
        self.text_color = text_color.to_string();
    }
}

/// First letter of the first two words, upper-cased.
pub fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect();

    if letters.is_empty() {
        "?".to_string()
    } else {
        letters
    }
}

/// Pick an avatar color pair deterministically from the name.
pub fn avatar_colors(name: &str) -> (&'static str, &'static str) {
    let hash = name
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    AVATAR_PALETTE[hash % AVATAR_PALETTE.len()]
}

/// Request body for adding a client manually or from an accepted invitation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<ClientStatus>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub invite_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request body for updating an existing client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<ClientStatus>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub sessions: Option<SessionProgress>,
    #[serde(default)]
    pub completion: Option<u8>,
    #[serde(default)]
    pub last_workout: Option<LastWorkout>,
    #[serde(default)]
    pub metrics: Option<Vec<ClientMetric>>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}
