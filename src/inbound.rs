use crate::backend::BackendEvent;
use crate::echo::{ClientToken, EchoRoute};
use crate::engine::ChatEngine;
use crate::formatting::now_label;
use crate::identity::{normalize, same_identity, ConversationId};
use crate::ordering;
use crate::store::{DeliveryState, Message};

const UNKNOWN_SENDER: &str = "?";

impl ChatEngine {
    /// Dispatch one backend notification.
    pub fn apply(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::SystemText(text) => self.on_system_text(&text),
            BackendEvent::PeerText {
                timestamp_label,
                sender,
                text,
                token,
            } => self.on_peer_text(&timestamp_label, &sender, &text, token),
            BackendEvent::SendCompleted { token, result } => {
                // failures are already surfaced through status and delivery state
                let _ = self.complete_send(&token, result);
            }
            BackendEvent::Disconnected(reason) => {
                crate::warn_log!("apply: disconnected ({})", reason);
                self.on_system_text(&format!("Connection closed: {}", reason));
                self.set_status("Not connected");
            }
        }
    }

    /// Server notice for the system conversation. Never deduplicated.
    pub fn on_system_text(&mut self, text: &str) {
        let system = ConversationId::system();
        self.store
            .ensure_conversation(&system, Some(crate::engine::SYSTEM_TITLE));
        self.store
            .append_message(&system, Message::system(system.clone(), text, now_label()));
        ordering::record_inbound(&mut self.store, &system, &self.active);
        self.schedule_render();
    }

    /// Chat message from the server: either someone else's message or the
    /// echo of one we sent.
    pub fn on_peer_text(
        &mut self,
        timestamp_label: &str,
        sender: &str,
        text: &str,
        token: Option<ClientToken>,
    ) {
        let timestamp_label = if timestamp_label.trim().is_empty() {
            now_label()
        } else {
            timestamp_label.to_string()
        };

        if same_identity(sender, &self.local_identity) {
            self.on_self_echo(&timestamp_label, text, token);
        } else {
            self.on_remote_text(&timestamp_label, sender, text, token);
        }
        self.schedule_render();
    }

    fn on_self_echo(&mut self, timestamp_label: &str, text: &str, token: Option<ClientToken>) {
        let route = token
            .as_ref()
            .map(|t| self.echo.resolve(t))
            .unwrap_or(EchoRoute::Unknown);

        let was_pending = matches!(route, EchoRoute::Pending(_));
        let target = match route {
            EchoRoute::Pending(id) => id,
            EchoRoute::AlreadyResolved(id) => {
                crate::debug_log!("on_self_echo: duplicate echo for {:?}", token);
                // the original is already in place; only its delivery mark may lag
                if let Some(token) = &token {
                    self.store.set_delivery(&id, token, DeliveryState::Confirmed);
                }
                return;
            }
            EchoRoute::Unknown => {
                crate::debug_log!(
                    "on_self_echo: untracked echo {:?}, routing to {}",
                    token,
                    self.active
                );
                self.active.clone()
            }
        };

        self.store.ensure_conversation(&target, None);
        let inserted = self.store.append_message(
            &target,
            Message::own(
                target.clone(),
                text,
                timestamp_label,
                token.clone(),
                DeliveryState::Confirmed,
            ),
        );
        if !inserted {
            if let Some(token) = &token {
                self.store
                    .set_delivery(&target, token, DeliveryState::Confirmed);
            }
        }
        if inserted || was_pending {
            ordering::record_outbound(&mut self.store, &target);
        }
    }

    fn on_remote_text(
        &mut self,
        timestamp_label: &str,
        sender: &str,
        text: &str,
        token: Option<ClientToken>,
    ) {
        let (target, sender_label) = match ConversationId::peer(sender) {
            Some(id) => {
                let handle = normalize(sender);
                self.store.ensure_conversation(&id, Some(handle.as_str()));
                (id, handle)
            }
            None => {
                crate::warn_log!("on_peer_text: message without sender, filing under system");
                let system = ConversationId::system();
                self.store
                    .ensure_conversation(&system, Some(crate::engine::SYSTEM_TITLE));
                (system, UNKNOWN_SENDER.to_string())
            }
        };

        let inserted = self.store.append_message(
            &target,
            Message::peer(target.clone(), sender_label, text, timestamp_label, token),
        );
        if inserted {
            ordering::record_inbound(&mut self.store, &target, &self.active);
        }
    }
}
