use std::collections::HashMap;

use crate::echo::ClientToken;
use crate::identity::ConversationId;
use crate::ordering::ConversationOrder;

/// Delivery progress of a message the local user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    /// Shown optimistically, backend not answered yet.
    Pending,
    /// Backend accepted the send; waiting for the echo.
    Accepted,
    /// Echo received.
    Confirmed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Own {
        token: Option<ClientToken>,
        delivery: DeliveryState,
    },
    Peer {
        sender: String,
        token: Option<ClientToken>,
    },
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub conversation_id: ConversationId,
    pub text: String,
    pub timestamp_label: String,
    pub kind: MessageKind,
}

impl Message {
    pub fn own(
        conversation_id: ConversationId,
        text: impl Into<String>,
        timestamp_label: impl Into<String>,
        token: Option<ClientToken>,
        delivery: DeliveryState,
    ) -> Self {
        Self {
            conversation_id,
            text: text.into(),
            timestamp_label: timestamp_label.into(),
            kind: MessageKind::Own { token, delivery },
        }
    }

    pub fn peer(
        conversation_id: ConversationId,
        sender: impl Into<String>,
        text: impl Into<String>,
        timestamp_label: impl Into<String>,
        token: Option<ClientToken>,
    ) -> Self {
        Self {
            conversation_id,
            text: text.into(),
            timestamp_label: timestamp_label.into(),
            kind: MessageKind::Peer {
                sender: sender.into(),
                token,
            },
        }
    }

    pub fn system(
        conversation_id: ConversationId,
        text: impl Into<String>,
        timestamp_label: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            text: text.into(),
            timestamp_label: timestamp_label.into(),
            kind: MessageKind::System,
        }
    }

    pub fn token(&self) -> Option<&ClientToken> {
        match &self.kind {
            MessageKind::Own { token, .. } | MessageKind::Peer { token, .. } => token.as_ref(),
            MessageKind::System => None,
        }
    }

    #[cfg(test)]
    pub fn is_self(&self) -> bool {
        matches!(self.kind, MessageKind::Own { .. })
    }

    #[cfg(test)]
    pub fn is_system(&self) -> bool {
        matches!(self.kind, MessageKind::System)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub last_preview_text: String,
    pub last_timestamp_label: String,
    pub unread_count: u32,
}

impl Conversation {
    fn new(id: ConversationId, title: String) -> Self {
        Self {
            id,
            title,
            last_preview_text: String::new(),
            last_timestamp_label: String::new(),
            unread_count: 0,
        }
    }

    /// Title is still the id itself, i.e. nobody supplied a real one yet.
    pub fn has_placeholder_title(&self) -> bool {
        self.title == self.id.as_str()
    }

    /// Case-insensitive substring match against title and preview.
    pub fn matches_filter(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&query)
            || self.last_preview_text.to_lowercase().contains(&query)
    }
}

#[derive(Debug)]
struct Entry {
    conversation: Conversation,
    messages: Vec<Message>,
}

/// Owns every conversation, its history, and the activity order.
#[derive(Debug)]
pub struct ConversationStore {
    entries: HashMap<ConversationId, Entry>,
    order: ConversationOrder,
    retention_cap: usize,
}

impl ConversationStore {
    /// Create a store keeping at most `retention_cap` messages per
    /// conversation (`retention_cap >= 1`).
    pub fn new(retention_cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: ConversationOrder::new(),
            retention_cap: retention_cap.max(1),
        }
    }

    #[cfg(test)]
    pub fn retention_cap(&self) -> usize {
        self.retention_cap
    }

    /// Return the conversation for `id`, creating it at the front of the
    /// order if needed. A placeholder title is upgraded when a real one is
    /// supplied; titles never go back to a placeholder.
    pub fn ensure_conversation(
        &mut self,
        id: &ConversationId,
        suggested_title: Option<&str>,
    ) -> &Conversation {
        let suggested = suggested_title
            .map(str::trim)
            .filter(|title| !title.is_empty());

        if !self.entries.contains_key(id) {
            let title = suggested
                .map(str::to_string)
                .unwrap_or_else(|| id.as_str().to_string());
            crate::debug_log!("ensure_conversation: creating {} ('{}')", id, title);
            self.entries.insert(
                id.clone(),
                Entry {
                    conversation: Conversation::new(id.clone(), title),
                    messages: Vec::new(),
                },
            );
            self.order.push_front(id.clone());
        } else if let (Some(entry), Some(title)) = (self.entries.get_mut(id), suggested) {
            if entry.conversation.has_placeholder_title() && title != id.as_str() {
                crate::debug_log!("ensure_conversation: upgrading title of {} to '{}'", id, title);
                entry.conversation.title = title.to_string();
            }
        }

        &self.entries[id].conversation
    }

    /// Append `message` to conversation `id`.
    ///
    /// Returns false for unknown conversations and when a message with the
    /// same client token is already in the history.
    pub fn append_message(&mut self, id: &ConversationId, message: Message) -> bool {
        let cap = self.retention_cap;
        let entry = match self.entries.get_mut(id) {
            Some(entry) => entry,
            None => {
                crate::warn_log!("append_message: unknown conversation {}", id);
                return false;
            }
        };

        if let Some(token) = message.token() {
            if entry.messages.iter().any(|m| m.token() == Some(token)) {
                crate::debug_log!("append_message: token {} already in {}, skipping", token, id);
                return false;
            }
        }

        entry.conversation.last_preview_text = message.text.clone();
        entry.conversation.last_timestamp_label = message.timestamp_label.clone();
        entry.messages.push(message);

        if entry.messages.len() > cap {
            let excess = entry.messages.len() - cap;
            entry.messages.drain(0..excess);
        }
        true
    }

    /// Update the delivery state of the own message carrying `token`.
    pub fn set_delivery(
        &mut self,
        id: &ConversationId,
        token: &ClientToken,
        state: DeliveryState,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        for message in entry.messages.iter_mut().rev() {
            if let MessageKind::Own {
                token: Some(existing),
                delivery,
            } = &mut message.kind
            {
                if existing == token {
                    // a confirmed message stays confirmed
                    if *delivery != DeliveryState::Confirmed {
                        *delivery = state;
                    }
                    return true;
                }
            }
        }
        false
    }

    pub fn messages(&self, id: &ConversationId) -> &[Message] {
        self.entries
            .get(id)
            .map(|entry| entry.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.entries.get(id).map(|entry| &entry.conversation)
    }

    pub fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.entries.get_mut(id).map(|entry| &mut entry.conversation)
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.entries.contains_key(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn order(&self) -> &ConversationOrder {
        &self.order
    }

    pub(crate) fn order_mut(&mut self) -> &mut ConversationOrder {
        &mut self.order
    }

    /// Conversations in activity order, keeping those matching `filter`.
    pub fn conversations(&self, filter: Option<&str>) -> Vec<&Conversation> {
        self.order
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|conversation| filter.map_or(true, |q| conversation.matches_filter(q)))
            .collect()
    }
}
