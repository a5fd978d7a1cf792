//! Characters, their chat history and memories.

use super::{adopt_ids, link_all, Child};
use crate::{Entity, RemoteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A player or non-player character.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Character {
    pub name: String,
    pub concept: String,
    pub backstory: String,
    pub theme_color: Option<String>,
    pub portrait_urls: Vec<String>,
    /// Stat block, e.g. `strength -> 14`
    pub stats: BTreeMap<String, i64>,
    pub chat_messages: Vec<ChatMessage>,
    pub memories: Vec<Memory>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    #[default]
    User,
    Assistant,
    System,
}

/// One message in the conversation with a character.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ChatMessage {
    pub id: Option<RemoteId>,
    pub character_id: Option<RemoteId>,
    pub role: ChatRole,
    pub content: String,
    /// RFC3339
    pub sent_at: Option<String>,
}

/// Something the character remembers between conversations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Memory {
    pub id: Option<RemoteId>,
    pub character_id: Option<RemoteId>,
    pub summary: String,
    pub importance: u8,
}

impl Character {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn push_message(&mut self, role: ChatRole, content: impl Into<String>) {
        self.chat_messages.push(ChatMessage {
            id: None,
            character_id: None,
            role,
            content: content.into(),
            sent_at: Some(chrono::Utc::now().to_rfc3339()),
        });
    }

    pub fn remember(&mut self, summary: impl Into<String>, importance: u8) {
        self.memories.push(Memory {
            id: None,
            character_id: None,
            summary: summary.into(),
            importance,
        });
    }

    pub fn memory_mut(&mut self, id: RemoteId) -> Option<&mut Memory> {
        self.memories.iter_mut().find(|m| m.id == Some(id))
    }

    pub fn message_mut(&mut self, id: RemoteId) -> Option<&mut ChatMessage> {
        self.chat_messages.iter_mut().find(|m| m.id == Some(id))
    }
}

impl Child for ChatMessage {
    fn id(&self) -> Option<RemoteId> {
        self.id
    }

    fn parent_id(&self) -> Option<RemoteId> {
        self.character_id
    }

    fn set_ids(&mut self, id: Option<RemoteId>, parent_id: Option<RemoteId>) {
        self.id = id;
        self.character_id = parent_id;
    }
}

impl Child for Memory {
    fn id(&self) -> Option<RemoteId> {
        self.id
    }

    fn parent_id(&self) -> Option<RemoteId> {
        self.character_id
    }

    fn set_ids(&mut self, id: Option<RemoteId>, parent_id: Option<RemoteId>) {
        self.id = id;
        self.character_id = parent_id;
    }
}

impl Entity for Character {
    const COLLECTION: &'static str = "characters";

    fn link_children(&mut self, parent_id: RemoteId, next_id: &mut dyn FnMut() -> RemoteId) {
        link_all(&mut self.chat_messages, parent_id, next_id);
        link_all(&mut self.memories, parent_id, next_id);
    }

    fn adopt_child_ids(&mut self, sent: &Self, stored: &Self) {
        adopt_ids(&mut self.chat_messages, &sent.chat_messages, &stored.chat_messages);
        adopt_ids(&mut self.memories, &sent.memories, &stored.memories);
    }
}
