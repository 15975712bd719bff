//! Session context: who is signed in and which topic is selected.
//!
//! The context is derived from the identity provider's redirect and kept in
//! client-local storage under fixed keys, so a restart resumes it.

mod storage;

pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage key of the owner (folder) identifier.
pub const OWNER_KEY: &str = "userFolder";
/// Storage key of the display name.
pub const DISPLAY_NAME_KEY: &str = "userName";
/// Storage key of the last selected topic.
pub const TOPIC_KEY: &str = "topic";

const EMAIL_PARAM: &str = "user_email";
const FOLDER_PARAM: &str = "folder_id";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid sign-in callback: {0}")]
    InvalidCallback(String),

    #[error("Sign-in callback is missing '{0}'")]
    MissingParameter(&'static str),

    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session storage is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The signed-in owner and current selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Opaque folder identifier that scopes every store call.
    pub owner: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_topic: Option<String>,
}

impl SessionContext {
    /// Build a context from the sign-in redirect.
    ///
    /// Accepts an absolute URL or just the path and query. The display name
    /// is the part of `user_email` before the `@`.
    pub fn from_callback(callback: &str) -> Result<Self, SessionError> {
        let base = Url::parse("http://localhost/")
            .map_err(|e| SessionError::InvalidCallback(e.to_string()))?;
        let url = base
            .join(callback)
            .map_err(|e| SessionError::InvalidCallback(e.to_string()))?;

        let mut email = None;
        let mut folder = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                EMAIL_PARAM => email = Some(value.into_owned()),
                FOLDER_PARAM => folder = Some(value.into_owned()),
                _ => {}
            }
        }

        let email = email
            .filter(|e| !e.is_empty())
            .ok_or(SessionError::MissingParameter(EMAIL_PARAM))?;
        let owner = folder
            .filter(|f| !f.is_empty())
            .ok_or(SessionError::MissingParameter(FOLDER_PARAM))?;
        let display_name = email.split('@').next().unwrap_or_default().to_string();

        Ok(Self {
            owner,
            display_name,
            selected_topic: None,
        })
    }

    /// Read a persisted context. `None` if nobody is signed in.
    pub fn restore(storage: &dyn SessionStorage) -> Result<Option<Self>, SessionError> {
        let Some(owner) = storage.get(OWNER_KEY)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            owner,
            display_name: storage.get(DISPLAY_NAME_KEY)?.unwrap_or_default(),
            selected_topic: storage.get(TOPIC_KEY)?,
        }))
    }

    /// Write every key of the context.
    pub fn persist(&self, storage: &dyn SessionStorage) -> Result<(), SessionError> {
        storage.set(OWNER_KEY, &self.owner)?;
        storage.set(DISPLAY_NAME_KEY, &self.display_name)?;
        self.persist_selection(storage)
    }

    /// Write only the selected topic.
    pub fn persist_selection(&self, storage: &dyn SessionStorage) -> Result<(), SessionError> {
        match &self.selected_topic {
            Some(topic) => storage.set(TOPIC_KEY, topic),
            None => storage.remove(TOPIC_KEY),
        }
    }
}
