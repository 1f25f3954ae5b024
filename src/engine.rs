use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::echo::{EchoReconciler, TokenGenerator};
use crate::identity::{normalize, ConversationId};
use crate::ordering;
use crate::render::{FrameScheduler, RenderFrame, RenderInput, RenderPipeline, Viewport};
use crate::store::{ConversationStore, DeliveryState};

pub const SYSTEM_TITLE: &str = "System";

/// Engine tuning taken from the config file.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub retention_cap: usize,
    pub near_bottom_rows: usize,
    pub pending_echo_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for EngineSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            retention_cap: settings.retention_cap,
            near_bottom_rows: settings.near_bottom_rows,
            pending_echo_timeout: Duration::from_secs(settings.pending_echo_timeout_secs),
        }
    }
}

/// Client-side chat state: conversations, pending echoes, selection and
/// the render pipeline. All mutation goes through `&mut self`; the host
/// applies events one at a time.
pub struct ChatEngine {
    pub(crate) local_identity: String,
    pub(crate) store: ConversationStore,
    pub(crate) echo: EchoReconciler,
    pub(crate) tokens: Box<dyn TokenGenerator>,
    pub(crate) render: RenderPipeline,
    pub(crate) active: ConversationId,
    filter: Option<String>,
    status: Option<String>,
    pending_echo_timeout: Duration,
}

impl ChatEngine {
    pub fn new(
        local_identity: &str,
        settings: EngineSettings,
        scheduler: Box<dyn FrameScheduler>,
        tokens: Box<dyn TokenGenerator>,
    ) -> Self {
        let mut store = ConversationStore::new(settings.retention_cap);
        let system = ConversationId::system();
        store.ensure_conversation(&system, Some(SYSTEM_TITLE));

        let mut engine = Self {
            local_identity: normalize(local_identity),
            store,
            echo: EchoReconciler::new(),
            tokens,
            render: RenderPipeline::new(scheduler, settings.near_bottom_rows),
            active: system,
            filter: None,
            status: None,
            pending_echo_timeout: settings.pending_echo_timeout,
        };
        engine.schedule_render();
        engine
    }

    pub fn local_identity(&self) -> &str {
        &self.local_identity
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn echo(&self) -> &EchoReconciler {
        &self.echo
    }

    pub fn active(&self) -> &ConversationId {
        &self.active
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn render(&self) -> &RenderPipeline {
        &self.render
    }

    pub fn viewport(&self) -> &Viewport {
        self.render.viewport()
    }

    /// Make `id` the displayed conversation and clear its unread counter.
    /// Unknown ids are ignored.
    pub fn select(&mut self, id: &ConversationId) -> bool {
        if !self.store.contains(id) {
            crate::warn_log!("select: unknown conversation {}", id);
            return false;
        }
        ordering::mark_read(&mut self.store, id);
        if &self.active != id {
            crate::debug_log!("select: {} -> {}", self.active, id);
            self.active = id.clone();
            self.render.scroll_to_bottom();
        }
        self.schedule_render();
        true
    }

    /// Open (creating if needed) and select the conversation with a peer.
    pub fn open_peer(&mut self, handle: &str) -> Option<ConversationId> {
        let id = ConversationId::peer(handle)?;
        let title = normalize(handle);
        self.store.ensure_conversation(&id, Some(title.as_str()));
        self.select(&id);
        Some(id)
    }

    /// Restrict the sidebar to conversations matching `query`.
    pub fn set_filter(&mut self, query: Option<&str>) {
        self.filter = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        self.schedule_render();
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
        self.schedule_render();
    }

    pub fn clear_status(&mut self) {
        if self.status.take().is_some() {
            self.schedule_render();
        }
    }

    pub fn schedule_render(&mut self) {
        self.render.schedule_render();
    }

    pub fn set_show_timestamps(&mut self, show: bool) {
        self.render.set_show_timestamps(show);
    }

    pub fn resize_viewport(&mut self, width: usize, rows: usize) {
        self.render.resize(width, rows);
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.render.scroll_up(rows);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.render.scroll_down(rows);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.render.scroll_to_bottom();
    }

    /// Flush if a render is pending and its frame is due.
    pub fn poll_frame(&mut self, now: Instant) -> Option<RenderFrame> {
        if !self.render.poll(now) {
            return None;
        }
        Some(self.flush(now))
    }

    /// Flush unconditionally.
    pub fn flush(&mut self, now: Instant) -> RenderFrame {
        let input = RenderInput {
            store: &self.store,
            active: &self.active,
            filter: self.filter.as_deref(),
            status: self.status.as_deref(),
            local_identity: &self.local_identity,
        };
        self.render.flush(now, input)
    }

    /// Give up on sends whose echo never arrived. Returns how many expired.
    pub fn expire_pending(&mut self, now: Instant) -> usize {
        let expired = self.echo.expire(now, self.pending_echo_timeout);
        if expired.is_empty() {
            return 0;
        }
        for (token, conversation_id) in &expired {
            crate::warn_log!("expire_pending: no echo for {} in {}", token, conversation_id);
            self.store.set_delivery(
                conversation_id,
                token,
                DeliveryState::Failed(crate::error::EngineError::Expired.to_string()),
            );
        }
        self.set_status(format!("{} message(s) were not confirmed by the server", expired.len()));
        expired.len()
    }
}
