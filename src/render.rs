//! Frame-batched rendering.
//!
//! Mutations only mark a flush as pending; the host asks [`RenderPipeline::poll`]
//! once per loop iteration and flushes when its [`FrameScheduler`] says the
//! next frame is due. A flush reads live engine state, so any number of
//! mutations between two frames costs a single repaint.

use std::time::{Duration, Instant};

use crate::formatting::{now_label, preview, sanitize, wrap_text};
use crate::identity::ConversationId;
use crate::store::{ConversationStore, DeliveryState, Message, MessageKind};

const PREVIEW_CHARS: usize = 40;

/// Host hook that paces flushes to display frames.
pub trait FrameScheduler {
    /// A flush became pending; arrange for a frame.
    fn request_frame(&mut self);
    /// Whether the requested frame may be presented at `now`.
    fn frame_due(&self, now: Instant) -> bool;
    /// A frame was presented at `now`.
    fn frame_presented(&mut self, now: Instant);
}

/// Fixed-interval frame pacing (e.g. 16 ms for ~60 fps).
#[derive(Debug, Clone)]
pub struct FrameClock {
    interval: Duration,
    requested: bool,
    last_presented: Option<Instant>,
}

impl FrameClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            requested: false,
            last_presented: None,
        }
    }
}

impl FrameScheduler for FrameClock {
    fn request_frame(&mut self) {
        self.requested = true;
    }

    fn frame_due(&self, now: Instant) -> bool {
        self.requested
            && self
                .last_presented
                .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    fn frame_presented(&mut self, now: Instant) {
        self.requested = false;
        self.last_presented = Some(now);
    }
}

/// Scroll state of the message pane, in terminal rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub width: usize,
    pub rows: usize,
    /// Index of the first visible row.
    pub offset: usize,
    pub content_rows: usize,
    anchor_bottom: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 80,
            rows: 24,
            offset: 0,
            content_rows: 0,
            anchor_bottom: true,
        }
    }
}

impl Viewport {
    pub fn max_offset(&self) -> usize {
        self.content_rows.saturating_sub(self.rows)
    }

    pub fn is_near_bottom(&self, threshold: usize) -> bool {
        self.max_offset().saturating_sub(self.offset) <= threshold
    }
}

/// Styling class of one rendered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStyle {
    Own,
    OwnFailed,
    Peer,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub style: RowStyle,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub id: ConversationId,
    pub title: String,
    pub preview: String,
    pub timestamp_label: String,
    pub unread: u32,
    pub is_active: bool,
}

/// Everything the presentation layer needs for one paint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFrame {
    pub sidebar: Vec<SidebarEntry>,
    pub title: String,
    pub rows: Vec<MessageRow>,
    pub message_count: usize,
    pub scroll_offset: usize,
    pub status: Option<String>,
    pub filter: Option<String>,
    pub unread_total: u32,
}

/// Live state read by a flush.
pub struct RenderInput<'a> {
    pub store: &'a ConversationStore,
    pub active: &'a ConversationId,
    pub filter: Option<&'a str>,
    pub status: Option<&'a str>,
    pub local_identity: &'a str,
}

pub struct RenderPipeline {
    scheduler: Box<dyn FrameScheduler>,
    pending: bool,
    flush_count: u64,
    viewport: Viewport,
    near_bottom_rows: usize,
    show_timestamps: bool,
}

impl RenderPipeline {
    pub fn new(scheduler: Box<dyn FrameScheduler>, near_bottom_rows: usize) -> Self {
        Self {
            scheduler,
            pending: false,
            flush_count: 0,
            viewport: Viewport::default(),
            near_bottom_rows,
            show_timestamps: true,
        }
    }

    /// Mark a flush as pending. Repeated calls before the flush are free.
    pub fn schedule_render(&mut self) {
        if !self.pending {
            self.pending = true;
            self.scheduler.request_frame();
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Number of flushes performed so far.
    #[cfg(test)]
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// True when a flush is pending and its frame is due.
    pub fn poll(&self, now: Instant) -> bool {
        self.pending && self.scheduler.frame_due(now)
    }

    pub fn set_show_timestamps(&mut self, show: bool) {
        if self.show_timestamps != show {
            self.show_timestamps = show;
            self.schedule_render();
        }
    }

    pub fn show_timestamps(&self) -> bool {
        self.show_timestamps
    }

    pub fn resize(&mut self, width: usize, rows: usize) {
        let width = width.max(1);
        let rows = rows.max(1);
        if self.viewport.width != width || self.viewport.rows != rows {
            self.viewport.width = width;
            self.viewport.rows = rows;
            self.schedule_render();
        }
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.viewport.anchor_bottom = false;
        self.viewport.offset = self.viewport.offset.saturating_sub(rows);
        self.schedule_render();
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.viewport.offset = (self.viewport.offset + rows).min(self.viewport.max_offset());
        self.schedule_render();
    }

    /// Anchor the next flush to the newest message.
    pub fn scroll_to_bottom(&mut self) {
        self.viewport.anchor_bottom = true;
        self.schedule_render();
    }

    /// Build a frame from live state and clear the pending flag.
    pub fn flush(&mut self, now: Instant, input: RenderInput<'_>) -> RenderFrame {
        self.pending = false;
        self.flush_count += 1;
        self.scheduler.frame_presented(now);

        let keep_bottom =
            self.viewport.anchor_bottom || self.viewport.is_near_bottom(self.near_bottom_rows);

        let messages = input.store.messages(input.active);
        let mut rows = Vec::new();
        for message in messages {
            self.layout_message(message, input.local_identity, &mut rows);
        }

        self.viewport.content_rows = rows.len();
        if keep_bottom {
            self.viewport.offset = self.viewport.max_offset();
        } else {
            self.viewport.offset = self.viewport.offset.min(self.viewport.max_offset());
        }
        self.viewport.anchor_bottom = false;

        let sidebar: Vec<SidebarEntry> = input
            .store
            .conversations(input.filter)
            .into_iter()
            .map(|conversation| SidebarEntry {
                id: conversation.id.clone(),
                title: sanitize(&conversation.title),
                preview: preview(&sanitize(&conversation.last_preview_text), PREVIEW_CHARS),
                timestamp_label: sanitize(&conversation.last_timestamp_label),
                unread: conversation.unread_count,
                is_active: &conversation.id == input.active,
            })
            .collect();

        let unread_total = input
            .store
            .conversations(None)
            .iter()
            .map(|c| c.unread_count)
            .sum();

        let title = input
            .store
            .get(input.active)
            .map(|c| sanitize(&c.title))
            .unwrap_or_default();

        crate::debug_log!(
            "render: flush #{} ({} messages, {} rows, offset {})",
            self.flush_count,
            messages.len(),
            rows.len(),
            self.viewport.offset
        );

        RenderFrame {
            sidebar,
            title,
            rows,
            message_count: messages.len(),
            scroll_offset: self.viewport.offset,
            status: input.status.map(str::to_string),
            filter: input.filter.map(str::to_string),
            unread_total,
        }
    }

    fn layout_message(&self, message: &Message, local_identity: &str, rows: &mut Vec<MessageRow>) {
        let timestamp = if message.timestamp_label.trim().is_empty() {
            now_label()
        } else {
            sanitize(&message.timestamp_label)
        };
        let time_prefix = if self.show_timestamps {
            format!("{} ", timestamp)
        } else {
            String::new()
        };
        let body = sanitize(&message.text);

        let (style, prefix, suffix, failure) = match &message.kind {
            MessageKind::Own { delivery, .. } => {
                let (style, suffix, failure) = match delivery {
                    DeliveryState::Pending => (RowStyle::Own, " …", None),
                    DeliveryState::Accepted => (RowStyle::Own, " ✓", None),
                    DeliveryState::Confirmed => (RowStyle::Own, " ✓✓", None),
                    DeliveryState::Failed(reason) => (RowStyle::OwnFailed, " ✗", Some(reason)),
                };
                (style, format!("{}{}: ", time_prefix, local_identity), suffix, failure)
            }
            MessageKind::Peer { sender, .. } => {
                let sender = if sender.trim().is_empty() { "?".to_string() } else { sanitize(sender) };
                (RowStyle::Peer, format!("{}{}: ", time_prefix, sender), "", None)
            }
            MessageKind::System => (RowStyle::System, format!("{}* ", time_prefix), "", None),
        };

        let indent = unicode_width::UnicodeWidthStr::width(prefix.as_str());
        let text = format!("{}{}", body, suffix);
        for (i, line) in wrap_text(&text, indent, self.viewport.width).into_iter().enumerate() {
            let text = if i == 0 { format!("{}{}", prefix, line) } else { line };
            rows.push(MessageRow { style, text });
        }

        if let Some(reason) = failure {
            rows.push(MessageRow {
                style: RowStyle::OwnFailed,
                text: format!("{}not delivered: {}", " ".repeat(indent), sanitize(reason)),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> RenderPipeline {
        RenderPipeline::new(Box::new(FrameClock::new(Duration::from_millis(16))), 2)
    }

    fn store_with_messages(count: usize) -> (ConversationStore, ConversationId) {
        let mut store = ConversationStore::new(1000);
        let id = ConversationId::peer("bob").unwrap();
        store.ensure_conversation(&id, Some("@bob"));
        for i in 0..count {
            store.append_message(&id, Message::peer(id.clone(), "@bob", format!("msg {}", i), "10:00", None));
        }
        (store, id)
    }

    fn input<'a>(store: &'a ConversationStore, active: &'a ConversationId) -> RenderInput<'a> {
        RenderInput {
            store,
            active,
            filter: None,
            status: None,
            local_identity: "@me",
        }
    }

    #[test]
    fn test_frame_clock_paces_frames() {
        let start = Instant::now();
        let mut clock = FrameClock::new(Duration::from_millis(16));
        assert!(!clock.frame_due(start));
        clock.request_frame();
        assert!(clock.frame_due(start));
        clock.frame_presented(start);
        clock.request_frame();
        assert!(!clock.frame_due(start + Duration::from_millis(5)));
        assert!(clock.frame_due(start + Duration::from_millis(16)));
    }

    #[test]
    fn test_schedule_coalesces() {
        let mut pipeline = pipeline();
        let (store, id) = store_with_messages(3);
        let now = Instant::now();
        for _ in 0..10 {
            pipeline.schedule_render();
        }
        assert!(pipeline.poll(now));
        pipeline.flush(now, input(&store, &id));
        assert!(!pipeline.is_pending());
        assert!(!pipeline.poll(now + Duration::from_secs(1)));
        assert_eq!(pipeline.flush_count(), 1);
    }

    #[test]
    fn test_flush_reads_live_state() {
        let mut pipeline = pipeline();
        let (store, id) = store_with_messages(3);
        let frame = pipeline.flush(Instant::now(), input(&store, &id));
        assert_eq!(frame.message_count, 3);
        assert_eq!(frame.rows.len(), 3);
        assert_eq!(frame.rows[0].text, "10:00 @bob: msg 0");
        assert_eq!(frame.rows[0].style, RowStyle::Peer);
        assert_eq!(frame.title, "@bob");
        assert_eq!(frame.sidebar.len(), 1);
        assert!(frame.sidebar[0].is_active);
    }

    #[test]
    fn test_bottom_anchor_follows_new_messages() {
        let mut pipeline = pipeline();
        pipeline.resize(80, 10);
        let (mut store, id) = store_with_messages(30);
        let now = Instant::now();
        let frame = pipeline.flush(now, input(&store, &id));
        assert_eq!(frame.scroll_offset, 20);

        for i in 0..5 {
            store.append_message(&id, Message::peer(id.clone(), "@bob", format!("late {}", i), "10:01", None));
        }
        let frame = pipeline.flush(now, input(&store, &id));
        assert_eq!(frame.scroll_offset, 25);
    }

    #[test]
    fn test_scrolled_up_reader_is_not_yanked() {
        let mut pipeline = pipeline();
        pipeline.resize(80, 10);
        let (mut store, id) = store_with_messages(30);
        let now = Instant::now();
        pipeline.flush(now, input(&store, &id));

        pipeline.scroll_up(15);
        let frame = pipeline.flush(now, input(&store, &id));
        assert_eq!(frame.scroll_offset, 5);

        for i in 0..5 {
            store.append_message(&id, Message::peer(id.clone(), "@bob", format!("late {}", i), "10:01", None));
        }
        let frame = pipeline.flush(now, input(&store, &id));
        assert_eq!(frame.scroll_offset, 5);

        pipeline.scroll_to_bottom();
        let frame = pipeline.flush(now, input(&store, &id));
        assert_eq!(frame.scroll_offset, 25);
    }

    #[test]
    fn test_rows_are_sanitized_and_tagged() {
        let mut pipeline = pipeline();
        pipeline.set_show_timestamps(false);
        let mut store = ConversationStore::new(10);
        let id = ConversationId::system();
        store.ensure_conversation(&id, Some("System"));
        store.append_message(&id, Message::system(id.clone(), "\x1b[2Jwiped?", ""));
        store.append_message(
            &id,
            Message::own(id.clone(), "hi", "", None, DeliveryState::Failed("offline".into())),
        );

        let frame = pipeline.flush(Instant::now(), input(&store, &id));
        assert_eq!(frame.rows[0], MessageRow { style: RowStyle::System, text: "* wiped?".into() });
        assert_eq!(frame.rows[1].style, RowStyle::OwnFailed);
        assert_eq!(frame.rows[1].text, "@me: hi ✗");
        assert_eq!(frame.rows[2].text, "     not delivered: offline");
    }

    #[test]
    fn test_missing_timestamp_is_substituted() {
        let mut pipeline = pipeline();
        let mut store = ConversationStore::new(10);
        let id = ConversationId::peer("bob").unwrap();
        store.ensure_conversation(&id, None);
        store.append_message(&id, Message::peer(id.clone(), "", "", "", None));
        let frame = pipeline.flush(Instant::now(), input(&store, &id));
        assert_eq!(frame.rows.len(), 1);
        assert!(frame.rows[0].text.ends_with(" ?: "));
    }

    #[test]
    fn test_sidebar_timestamp_is_sanitized() {
        let mut pipeline = pipeline();
        let mut store = ConversationStore::new(10);
        let id = ConversationId::peer("bob").unwrap();
        store.ensure_conversation(&id, None);
        store.append_message(
            &id,
            Message::peer(id.clone(), "@bob", "hi", "\x1b[31m10:00\x07", None),
        );
        let frame = pipeline.flush(Instant::now(), input(&store, &id));
        assert_eq!(frame.sidebar[0].timestamp_label, "10:00");
        assert_eq!(frame.rows[0].text, "10:00 @bob: hi");
    }
}
