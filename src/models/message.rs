//! Working-memory conversation history.
//!
//! A rolling window of role-tagged messages shared across a process.
//! Oldest messages are dropped silently once the cap is exceeded; the
//! window can be snapshotted to and restored from a flat JSON file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One message in the working-memory window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Which agent produced an assistant message
    pub agent_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Serialized snapshot layout. Consumers tolerate missing optional
/// fields; there is no schema versioning.
#[derive(Debug, Serialize, Deserialize)]
struct HistorySnapshot {
    max_messages: usize,
    saved_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
}

/// Rolling window of recent conversation
#[derive(Debug)]
pub struct ConversationHistory {
    max_messages: usize,
    storage_file: PathBuf,
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    /// Create an empty history
    pub fn new(max_messages: usize, storage_file: PathBuf) -> Self {
        Self {
            max_messages,
            storage_file,
            messages: Vec::new(),
        }
    }

    pub fn add_user(&mut self, content: &str) {
        self.push(ChatMessage {
            role: Role::User,
            content: content.to_string(),
            timestamp: Utc::now(),
            agent_type: None,
            metadata: None,
        });
    }

    pub fn add_assistant(&mut self, content: &str, agent_type: &str) {
        self.push(ChatMessage {
            role: Role::Assistant,
            content: content.to_string(),
            timestamp: Utc::now(),
            agent_type: Some(agent_type.to_string()),
            metadata: None,
        });
    }

    pub fn add_system(&mut self, content: &str) {
        self.push(ChatMessage {
            role: Role::System,
            content: content.to_string(),
            timestamp: Utc::now(),
            agent_type: None,
            metadata: None,
        });
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
            debug!(excess, "trimmed old messages from working memory");
        }
    }

    /// Number of messages currently held
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The last `n` messages as a formatted transcript, e.g.
    /// "[14:02] User: find hypertension codes"
    pub fn recent_context(&self, n: usize) -> String {
        let start = self.messages.len().saturating_sub(n);
        let recent = &self.messages[start..];

        if recent.is_empty() {
            return "No previous conversation context.".to_string();
        }

        let mut lines = vec!["Recent conversation context:".to_string()];
        for message in recent {
            let time = message.timestamp.format("%H:%M");
            match message.role {
                Role::User => lines.push(format!("[{time}] User: {}", message.content)),
                Role::Assistant => {
                    let agent = message
                        .agent_type
                        .as_deref()
                        .map(|a| format!(" ({a})"))
                        .unwrap_or_default();
                    lines.push(format!("[{time}] Assistant{agent}: {}", message.content));
                }
                Role::System => continue,
            }
        }
        lines.join("\n")
    }

    /// Messages shaped for a chat-completion call
    pub fn to_llm_messages(&self, include_system: bool) -> Vec<(Role, String)> {
        self.messages
            .iter()
            .filter(|m| include_system || m.role != Role::System)
            .map(|m| {
                let content = match (&m.role, &m.agent_type) {
                    (Role::Assistant, Some(agent)) => format!("[{agent} agent]: {}", m.content),
                    _ => m.content.clone(),
                };
                (m.role, content)
            })
            .collect()
    }

    /// Drop all messages
    pub fn clear(&mut self) {
        let count = self.messages.len();
        self.messages.clear();
        info!(count, "cleared working memory");
    }

    /// Counts per role plus agent usage and window bounds
    pub fn stats(&self) -> HistoryStats {
        let mut agent_usage: HashMap<String, usize> = HashMap::new();
        for message in &self.messages {
            if message.role == Role::Assistant {
                if let Some(agent) = &message.agent_type {
                    *agent_usage.entry(agent.clone()).or_insert(0) += 1;
                }
            }
        }
        HistoryStats {
            total_messages: self.messages.len(),
            user_messages: self.messages.iter().filter(|m| m.role == Role::User).count(),
            assistant_messages: self.messages.iter().filter(|m| m.role == Role::Assistant).count(),
            system_messages: self.messages.iter().filter(|m| m.role == Role::System).count(),
            agent_usage,
            oldest_message: self.messages.first().map(|m| m.timestamp),
            newest_message: self.messages.last().map(|m| m.timestamp),
        }
    }

    /// Snapshot the window to its storage file
    pub fn save_to_disk(&self) -> Result<()> {
        if let Some(parent) = self.storage_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = HistorySnapshot {
            max_messages: self.max_messages,
            saved_at: Utc::now(),
            messages: self.messages.clone(),
        };
        std::fs::write(&self.storage_file, serde_json::to_vec_pretty(&snapshot)?)?;
        info!(count = self.messages.len(), file = %self.storage_file.display(), "saved working memory");
        Ok(())
    }

    /// Restore the window from its storage file. A missing or malformed
    /// file leaves the history empty.
    pub fn load_from_disk(&mut self) -> bool {
        if !Path::new(&self.storage_file).exists() {
            return false;
        }
        let raw = match std::fs::read(&self.storage_file) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to read working memory file");
                return false;
            }
        };
        match serde_json::from_slice::<HistorySnapshot>(&raw) {
            Ok(snapshot) => {
                self.max_messages = snapshot.max_messages;
                self.messages = snapshot.messages;
                info!(count = self.messages.len(), "restored working memory");
                true
            }
            Err(e) => {
                warn!(error = %e, "malformed working memory file, starting empty");
                false
            }
        }
    }

    /// Delete the persisted snapshot, if any
    pub fn delete_saved(&self) -> Result<()> {
        if Path::new(&self.storage_file).exists() {
            std::fs::remove_file(&self.storage_file)?;
        }
        Ok(())
    }
}

/// Working-memory statistics
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    pub agent_usage: HashMap<String, usize>,
    pub oldest_message: Option<DateTime<Utc>>,
    pub newest_message: Option<DateTime<Utc>>,
}
