use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;

use crate::echo::ClientToken;
use crate::engine::ChatEngine;
use crate::error::{BackendError, EngineError};
use crate::formatting::now_label;
use crate::identity::{normalize, ConversationId};
use crate::ordering;
use crate::store::{DeliveryState, Message};

fn leading_handle_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*@(\S+)\s+(.*\S)").expect("leading handle pattern is valid"))
}

/// Text the user submitted, with an optional explicit recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub text: String,
    pub peer: Option<String>,
}

impl SendRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            peer: None,
        }
    }

    pub fn to_peer(handle: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            peer: Some(handle.into()),
        }
    }
}

/// A send that has been shown optimistically and must now go to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSend {
    pub token: ClientToken,
    pub text: String,
    pub conversation_id: ConversationId,
}

/// Split "@handle rest of text" into its parts.
pub fn split_leading_handle(text: &str) -> Option<(String, String)> {
    let caps = leading_handle_regex().captures(text)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

impl ChatEngine {
    /// Work out which conversation a request goes to, and the body to send.
    ///
    /// A real active conversation wins; peer hints only apply while the
    /// system conversation is shown.
    fn resolve_target(&self, request: &SendRequest, text: &str) -> Option<(ConversationId, String, String)> {
        if !self.active.is_system() {
            let title = self
                .store
                .get(&self.active)
                .map(|c| c.title.clone())
                .unwrap_or_default();
            return Some((self.active.clone(), title, text.to_string()));
        }
        if let Some(handle) = &request.peer {
            let id = ConversationId::peer(handle)?;
            return Some((id, normalize(handle), text.to_string()));
        }
        let (handle, body) = split_leading_handle(text)?;
        let id = ConversationId::peer(&handle)?;
        Some((id, normalize(&handle), body))
    }

    /// Optimistically insert a send and register its token.
    ///
    /// Blank text yields `Ok(None)`. When no conversation can be resolved the
    /// send is cancelled with `UnresolvableTarget`: nothing is registered and
    /// the caller must not contact the backend.
    pub fn begin_send(
        &mut self,
        request: SendRequest,
        now: Instant,
    ) -> Result<Option<PreparedSend>, EngineError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let (conversation_id, title, body) = match self.resolve_target(&request, text) {
            Some(target) => target,
            None => {
                let err = EngineError::UnresolvableTarget;
                crate::warn_log!("begin_send: {}", err);
                self.set_status(err.to_string());
                return Err(err);
            }
        };

        self.store.ensure_conversation(&conversation_id, Some(title.as_str()));
        if self.active != conversation_id {
            self.select(&conversation_id);
        }

        let token = self.tokens.next_token();
        self.echo.register(token.clone(), conversation_id.clone(), now);
        self.store.append_message(
            &conversation_id,
            Message::own(
                conversation_id.clone(),
                body.clone(),
                now_label(),
                Some(token.clone()),
                DeliveryState::Pending,
            ),
        );
        ordering::record_outbound(&mut self.store, &conversation_id);
        self.clear_status();
        self.render.scroll_to_bottom();
        self.schedule_render();

        crate::debug_log!("begin_send: {} -> {} ({} chars)", token, conversation_id, body.len());
        Ok(Some(PreparedSend {
            token,
            text: body,
            conversation_id,
        }))
    }

    /// Record the backend's answer to a send.
    ///
    /// Success leaves the token pending until its echo arrives. Failure
    /// consumes the token and marks the optimistic message failed; it is
    /// not retried.
    pub fn complete_send(
        &mut self,
        token: &ClientToken,
        result: Result<(), BackendError>,
    ) -> Result<(), EngineError> {
        match result {
            Ok(()) => {
                if let Some(conversation_id) = self.echo.pending_target(token).cloned() {
                    self.store
                        .set_delivery(&conversation_id, token, DeliveryState::Accepted);
                    self.schedule_render();
                }
                Ok(())
            }
            Err(err) => {
                let engine_err = EngineError::from(err);
                crate::warn_log!("complete_send: {} for {}", engine_err, token);
                match self.echo.fail(token) {
                    Some(conversation_id) => {
                        self.store.set_delivery(
                            &conversation_id,
                            token,
                            DeliveryState::Failed(engine_err.to_string()),
                        );
                        self.set_status(engine_err.to_string());
                    }
                    None => {
                        // echo already confirmed it (or it expired and was reported then)
                        crate::debug_log!("complete_send: {} was no longer pending", token);
                    }
                }
                Err(engine_err)
            }
        }
    }

    /// Begin a send, await the backend, and record the outcome.
    #[cfg(test)]
    pub async fn submit(
        &mut self,
        backend: &dyn crate::backend::Backend,
        request: SendRequest,
        now: Instant,
    ) -> Result<Option<ClientToken>, EngineError> {
        let Some(prepared) = self.begin_send(request, now)? else {
            return Ok(None);
        };
        let result = backend
            .send_message(prepared.text.clone(), prepared.token.clone())
            .await;
        self.complete_send(&prepared.token, result)?;
        Ok(Some(prepared.token))
    }
}
