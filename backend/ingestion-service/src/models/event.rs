use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use uuid::Uuid;

/// User action carried by a synthetic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Login,
    Click,
    Purchase,
    Logout,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Login, Action::Click, Action::Purchase, Action::Logout];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Click => "click",
            Action::Purchase => "purchase",
            Action::Logout => "logout",
        }
    }

    pub fn random() -> Self {
        *Self::ALL
            .choose(&mut rand::thread_rng())
            .unwrap_or(&Action::Click)
    }
}

/// Synthetic user action, written to the events table as one JSONEachRow line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntheticEvent {
    #[serde(serialize_with = "crate::models::datetime::serialize")]
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub action: Action,
    pub payload: String,
}

impl SyntheticEvent {
    pub fn generate() -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: format!("user-{}", Uuid::new_v4()),
            action: Action::random(),
            payload: "example-payload".to_string(),
        }
    }
}
