use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use crate::identity::ConversationId;

/// Longest token accepted on the wire; longer ids are truncated.
pub const MAX_TOKEN_LEN: usize = 128;

/// How many resolved tokens are remembered for duplicate-echo routing.
const RESOLVED_HISTORY: usize = 256;

/// Client-generated id attached to a send and echoed back by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientToken(String);

impl ClientToken {
    pub fn new(raw: impl Into<String>) -> Self {
        let mut raw = raw.into();
        if raw.len() > MAX_TOKEN_LEN {
            let cut = raw
                .char_indices()
                .map(|(i, _)| i)
                .take_while(|i| *i <= MAX_TOKEN_LEN)
                .last()
                .unwrap_or(0);
            raw.truncate(cut);
        }
        Self(raw)
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh send tokens.
pub trait TokenGenerator {
    fn next_token(&mut self) -> ClientToken;
}

/// Random 128-bit tokens.
#[derive(Debug, Default)]
pub struct UuidTokens;

impl TokenGenerator for UuidTokens {
    fn next_token(&mut self) -> ClientToken {
        ClientToken::new(uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Deterministic tokens: "<prefix>-1", "<prefix>-2", ...
#[cfg(test)]
#[derive(Debug)]
pub struct SequentialTokens {
    prefix: String,
    next: u64,
}

#[cfg(test)]
impl SequentialTokens {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

#[cfg(test)]
impl TokenGenerator for SequentialTokens {
    fn next_token(&mut self) -> ClientToken {
        let token = ClientToken::new(format!("{}-{}", self.prefix, self.next));
        self.next += 1;
        token
    }
}

#[derive(Debug, Clone)]
struct PendingEcho {
    conversation_id: ConversationId,
    sent_at: Instant,
}

/// Where an echo carrying a given token should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoRoute {
    /// Token was pending; it has now been consumed.
    Pending(ConversationId),
    /// Token was already resolved earlier; the echo is a duplicate.
    AlreadyResolved(ConversationId),
    /// Never seen (or forgotten, e.g. after a restart).
    Unknown,
}

/// Pending-echo registry: token -> conversation the send came from.
#[derive(Debug, Default)]
pub struct EchoReconciler {
    pending: HashMap<ClientToken, PendingEcho>,
    resolved: VecDeque<(ClientToken, ConversationId)>,
}

impl EchoReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: ClientToken, conversation_id: ConversationId, now: Instant) {
        crate::debug_log!("echo: register {} -> {}", token, conversation_id);
        self.pending.insert(
            token,
            PendingEcho {
                conversation_id,
                sent_at: now,
            },
        );
    }

    #[cfg(test)]
    pub fn is_pending(&self, token: &ClientToken) -> bool {
        self.pending.contains_key(token)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Conversation a pending token was sent from, without consuming it.
    pub fn pending_target(&self, token: &ClientToken) -> Option<&ConversationId> {
        self.pending.get(token).map(|p| &p.conversation_id)
    }

    /// Route an arriving echo, consuming the token if it was pending.
    pub fn resolve(&mut self, token: &ClientToken) -> EchoRoute {
        if let Some(pending) = self.pending.remove(token) {
            self.remember(token.clone(), pending.conversation_id.clone());
            return EchoRoute::Pending(pending.conversation_id);
        }
        match self.resolved.iter().find(|(t, _)| t == token) {
            Some((_, conversation_id)) => EchoRoute::AlreadyResolved(conversation_id.clone()),
            None => EchoRoute::Unknown,
        }
    }

    /// Drop a pending token after the backend rejected the send.
    pub fn fail(&mut self, token: &ClientToken) -> Option<ConversationId> {
        let pending = self.pending.remove(token)?;
        self.remember(token.clone(), pending.conversation_id.clone());
        Some(pending.conversation_id)
    }

    /// Remove tokens that waited longer than `timeout` and return them.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<(ClientToken, ConversationId)> {
        let stale: Vec<ClientToken> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.sent_at) >= timeout)
            .map(|(token, _)| token.clone())
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for token in stale {
            if let Some(conversation_id) = self.fail(&token) {
                expired.push((token, conversation_id));
            }
        }
        expired
    }

    fn remember(&mut self, token: ClientToken, conversation_id: ConversationId) {
        if self.resolved.len() >= RESOLVED_HISTORY {
            self.resolved.pop_front();
        }
        self.resolved.push_back((token, conversation_id));
    }
}
