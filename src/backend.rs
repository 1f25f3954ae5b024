use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};

use crate::echo::ClientToken;
use crate::error::BackendError;
use crate::formatting::format_timestamp;

/// Notifications delivered to the engine, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    SystemText(String),
    PeerText {
        timestamp_label: String,
        sender: String,
        text: String,
        token: Option<ClientToken>,
    },
    /// Outcome of a `send_message` call, posted back by the send task.
    SendCompleted {
        token: ClientToken,
        result: Result<(), BackendError>,
    },
    Disconnected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub bio: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Option<u64>,
    pub username: String,
    pub display_name: String,
}

/// The chat server as seen by the client.
pub trait Backend: Send + Sync {
    fn authenticate(
        &self,
        mode: AuthMode,
        credentials: Credentials,
    ) -> BoxFuture<'_, Result<AuthenticatedUser, BackendError>>;

    fn send_message(
        &self,
        text: String,
        token: ClientToken,
    ) -> BoxFuture<'static, Result<(), BackendError>>;
}

/// Lower-case account name without the leading '@'.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').trim().to_lowercase()
}

/// In-process backend: every accepted message is echoed back to the sender
/// after `latency`, carrying its token. Text starting with `!fail` is
/// rejected so the failure path can be exercised by hand.
#[derive(Clone)]
pub struct LoopbackBackend {
    events: mpsc::UnboundedSender<BackendEvent>,
    latency: Duration,
    user: Arc<Mutex<Option<AuthenticatedUser>>>,
}

impl LoopbackBackend {
    pub fn new(events: mpsc::UnboundedSender<BackendEvent>, latency: Duration) -> Self {
        Self {
            events,
            latency,
            user: Arc::new(Mutex::new(None)),
        }
    }
}

impl Backend for LoopbackBackend {
    fn authenticate(
        &self,
        mode: AuthMode,
        credentials: Credentials,
    ) -> BoxFuture<'_, Result<AuthenticatedUser, BackendError>> {
        Box::pin(async move {
            let username = normalize_username(&credentials.username);
            if username.is_empty() || credentials.password.is_empty() {
                return Err(BackendError::Auth("Missing username/password".to_string()));
            }

            let user = AuthenticatedUser {
                user_id: None,
                display_name: format!("@{}", username),
                username,
            };
            crate::info_log!("loopback: {:?} as {}", mode, user.display_name);
            *self.user.lock().await = Some(user.clone());

            if mode == AuthMode::Register {
                let bio = credentials.bio.trim();
                let notice = if bio.is_empty() {
                    format!("Registered {}.", user.display_name)
                } else {
                    format!("Registered {}: {}", user.display_name, bio)
                };
                let _ = self.events.send(BackendEvent::SystemText(notice));
            }
            let _ = self
                .events
                .send(BackendEvent::SystemText("Auth OK. Connected.".to_string()));
            Ok(user)
        })
    }

    fn send_message(
        &self,
        text: String,
        token: ClientToken,
    ) -> BoxFuture<'static, Result<(), BackendError>> {
        let events = self.events.clone();
        let latency = self.latency;
        let user = self.user.clone();

        Box::pin(async move {
            let sender = match user.lock().await.as_ref() {
                Some(user) => user.display_name.clone(),
                None => return Err(BackendError::NotConnected),
            };

            let text = text.trim().to_string();
            if text.is_empty() {
                return Ok(());
            }
            if text.starts_with("!fail") {
                return Err(BackendError::Rejected("loopback refused the message".to_string()));
            }
            if events.is_closed() {
                return Err(BackendError::Transport("event channel closed".to_string()));
            }

            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                let echo = BackendEvent::PeerText {
                    timestamp_label: format_timestamp(chrono::Local::now().timestamp()),
                    sender,
                    text,
                    token: Some(token),
                };
                if events.send(echo).is_err() {
                    crate::debug_log!("loopback: event receiver gone, dropping echo");
                }
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
            bio: "  likes trains ".to_string(),
        }
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username("  @Alice "), "alice");
        assert_eq!(normalize_username("@"), "");
    }

    #[tokio::test]
    async fn test_loopback_requires_credentials() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let backend = LoopbackBackend::new(tx, Duration::from_millis(1));
        let err = backend
            .authenticate(AuthMode::Login, credentials("@", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Auth("Missing username/password".into()));
        assert_eq!(
            backend.send_message("hi".into(), ClientToken::new("t")).await,
            Err(BackendError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_loopback_echoes_with_token() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let backend = LoopbackBackend::new(tx, Duration::from_millis(1));
        let user = backend
            .authenticate(AuthMode::Register, credentials("@Dana", "pw"))
            .await
            .unwrap();
        assert_eq!(user.display_name, "@dana");
        assert_eq!(
            rx.recv().await,
            Some(BackendEvent::SystemText("Registered @dana: likes trains".into()))
        );
        assert_eq!(
            rx.recv().await,
            Some(BackendEvent::SystemText("Auth OK. Connected.".into()))
        );

        backend
            .send_message(" hello ".into(), ClientToken::new("t1"))
            .await
            .unwrap();
        match rx.recv().await {
            Some(BackendEvent::PeerText { sender, text, token, .. }) => {
                assert_eq!(sender, "@dana");
                assert_eq!(text, "hello");
                assert_eq!(token, Some(ClientToken::new("t1")));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_loopback_rejects_fail_prefix() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let backend = LoopbackBackend::new(tx, Duration::from_millis(1));
        backend
            .authenticate(AuthMode::Login, credentials("erin", "pw"))
            .await
            .unwrap();
        let result = backend.send_message("!fail now".into(), ClientToken::new("t")).await;
        assert!(matches!(result, Err(BackendError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_loopback_login_skips_registration_notice() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let backend = LoopbackBackend::new(tx, Duration::from_millis(1));
        backend
            .authenticate(AuthMode::Login, credentials("erin", "pw"))
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(BackendEvent::SystemText("Auth OK. Connected.".into()))
        );
    }

    #[tokio::test]
    async fn test_loopback_send_after_receiver_dropped_is_transport_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = LoopbackBackend::new(tx, Duration::from_millis(1));
        backend
            .authenticate(AuthMode::Login, credentials("erin", "pw"))
            .await
            .unwrap();
        drop(rx);
        let result = backend.send_message("hi".into(), ClientToken::new("t")).await;
        assert!(matches!(result, Err(BackendError::Transport(_))));
    }
}
