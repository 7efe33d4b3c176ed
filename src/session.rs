//! Conversation sessions and the process-wide session store.
//!
//! Sessions live for the lifetime of the process: there is no eviction,
//! expiry, or persistence. Each session sits behind its own async mutex, and
//! the conversation controller holds that lock for a whole request, so two
//! concurrent messages for the same session are applied one after the other
//! instead of interleaving their read-modify-write steps.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// What the lead-capture dialogue is waiting for.
///
/// Serialized as `null`, `"get_name"` or `"get_email"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AwaitingAction {
    #[default]
    None,
    GetName,
    GetEmail,
}

impl AwaitingAction {
    /// Wire name, or `None` for the idle state.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            AwaitingAction::None => None,
            AwaitingAction::GetName => Some("get_name"),
            AwaitingAction::GetEmail => Some("get_email"),
        }
    }
}

impl Serialize for AwaitingAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_str() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for AwaitingAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)?.as_deref() {
            None => Ok(AwaitingAction::None),
            Some("get_name") => Ok(AwaitingAction::GetName),
            Some("get_email") => Ok(AwaitingAction::GetEmail),
            Some(other) => Err(serde::de::Error::unknown_variant(
                other,
                &["get_name", "get_email"],
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Lead fields captured so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub message_history: Vec<Message>,
    pub awaiting_action: AwaitingAction,
    pub user_data: UserData,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            message_history: Vec::new(),
            awaiting_action: AwaitingAction::None,
            user_data: UserData::default(),
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.message_history.push(Message::new(role, content));
    }
}

/// Shared handle to one session; lock it for the duration of a request.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Process-wide map from session id to session.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `session_id`, creating a fresh session when it is absent or
    /// unknown. A missing id gets a new UUID v4. Returns the effective id.
    pub fn get_or_create(&self, session_id: Option<&str>) -> (String, SessionHandle) {
        let id = match session_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        if let Some(handle) = self.read_map().get(&id) {
            return (id, Arc::clone(handle));
        }

        let mut map = self.write_map();
        let handle = map
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(id.clone()))));
        (id, Arc::clone(handle))
    }

    /// A point-in-time copy of the session, if it exists.
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let handle = self.read_map().get(session_id).cloned()?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The map only ever holds plain inserts, so a poisoned lock still guards
    // a consistent map and is safe to keep using.
    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}
