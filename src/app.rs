use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{layout::Rect, Frame};
use tokio::sync::mpsc;

use crate::backend::{Backend, BackendEvent};
use crate::commands::CommandHandler;
use crate::config::Config;
use crate::engine::ChatEngine;
use crate::identity::ConversationId;
use crate::outbound::SendRequest;
use crate::render::RenderFrame;
use crate::utils::try_autocomplete;
use crate::widgets;

/// Terminal front-end state around the engine: input line, sidebar cursor,
/// focus and display toggles.
pub struct App {
    pub config: Config,
    pub engine: ChatEngine,
    backend: Arc<dyn Backend>,
    events_tx: mpsc::UnboundedSender<BackendEvent>,
    pub input_buffer: String,
    pub input_cursor: usize, // byte position in input_buffer
    pub sidebar_cursor: usize,
    pub focus_on_chat_list: bool,
    pub show_chat_list: bool,
    pub show_borders: bool,
    pub last_frame: Option<RenderFrame>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        config: Config,
        mut engine: ChatEngine,
        backend: Arc<dyn Backend>,
        events_tx: mpsc::UnboundedSender<BackendEvent>,
    ) -> Self {
        engine.set_show_timestamps(config.settings.show_timestamps);
        Self {
            show_chat_list: config.settings.show_chat_list,
            show_borders: config.settings.show_borders,
            config,
            engine,
            backend,
            events_tx,
            input_buffer: String::new(),
            input_cursor: 0,
            sidebar_cursor: 0,
            focus_on_chat_list: false,
            last_frame: None,
            should_quit: false,
        }
    }

    /// Paint the most recent frame.
    pub fn draw(&self, f: &mut Frame) {
        if let Some(frame) = &self.last_frame {
            widgets::draw(f, self, frame);
        }
    }

    /// Feed the message pane size for `area` (the whole terminal) to the engine.
    pub fn sync_viewport(&mut self, area: Rect) {
        let areas = widgets::layout(area, self.show_chat_list, self.show_borders);
        let inner = widgets::message_inner(areas.messages, self.show_borders);
        self.engine
            .resize_viewport(inner.width as usize, inner.height as usize);
    }

    /// Optimistically show a send and hand it to the backend on a task.
    /// The outcome comes back through the event channel.
    pub fn send(&mut self, request: SendRequest, now: Instant) {
        let prepared = match self.engine.begin_send(request, now) {
            Ok(Some(prepared)) => prepared,
            Ok(None) => return,
            Err(e) => {
                crate::debug_log!("send: not sent ({})", e);
                return;
            }
        };
        self.sync_sidebar_cursor();

        let token = prepared.token;
        let send = self.backend.send_message(prepared.text, token.clone());
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = send.await;
            if events.send(BackendEvent::SendCompleted { token, result }).is_err() {
                crate::debug_log!("send: event receiver gone");
            }
        });
    }

    /// Conversation ids in sidebar order, honouring the current filter.
    pub fn sidebar_ids(&self) -> Vec<ConversationId> {
        self.engine
            .store()
            .conversations(self.engine.filter())
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    /// Point the sidebar cursor at the active conversation.
    pub fn sync_sidebar_cursor(&mut self) {
        if let Some(idx) = self
            .sidebar_ids()
            .iter()
            .position(|id| id == self.engine.active())
        {
            self.sidebar_cursor = idx;
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> Result<()> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') if ctrl => self.should_quit = true,
            KeyCode::Char('s') if ctrl => self.toggle_chat_list(),
            KeyCode::Char('t') if ctrl => self.toggle_timestamps(),
            KeyCode::Char('y') if ctrl => self.toggle_borders(),
            KeyCode::Tab => self.handle_tab(),
            KeyCode::Up => self.handle_up(),
            KeyCode::Down => self.handle_down(),
            KeyCode::PageUp => {
                let page = self.page_rows();
                self.engine.scroll_up(page);
            }
            KeyCode::PageDown => {
                let page = self.page_rows();
                self.engine.scroll_down(page);
            }
            KeyCode::End if ctrl => self.engine.scroll_to_bottom(),
            KeyCode::Enter => self.handle_enter(now)?,
            KeyCode::Esc => {
                if self.engine.status().is_some() {
                    self.engine.clear_status();
                } else {
                    self.clear_input();
                }
            }
            _ if self.focus_on_chat_list => {}
            KeyCode::Char(c) => self.handle_char(c),
            KeyCode::Backspace => self.handle_backspace(),
            KeyCode::Delete => self.handle_delete(),
            KeyCode::Left => self.handle_input_left(),
            KeyCode::Right => self.handle_input_right(),
            KeyCode::Home => self.input_cursor = 0,
            KeyCode::End => self.input_cursor = self.input_buffer.len(),
            _ => return Ok(()),
        }
        // the input line and cursor are part of every paint
        self.engine.schedule_render();
        Ok(())
    }

    fn page_rows(&self) -> usize {
        self.engine.viewport().rows.saturating_sub(1).max(1)
    }

    /// Tab: complete a command, otherwise switch focus.
    fn handle_tab(&mut self) {
        if !self.focus_on_chat_list && !self.input_buffer.is_empty() {
            let (completed, hint) = try_autocomplete(&self.input_buffer);
            if let Some(completed) = completed {
                self.input_buffer = completed;
                self.input_cursor = self.input_buffer.len();
                return;
            }
            if let Some(hint) = hint {
                self.engine.set_status(hint);
                return;
            }
        }
        self.focus_on_chat_list = !self.focus_on_chat_list;
        if self.focus_on_chat_list {
            self.sync_sidebar_cursor();
        }
    }

    fn handle_up(&mut self) {
        if self.focus_on_chat_list {
            self.sidebar_cursor = self.sidebar_cursor.saturating_sub(1);
        } else {
            self.engine.scroll_up(1);
        }
    }

    fn handle_down(&mut self) {
        if self.focus_on_chat_list {
            let max_idx = self.sidebar_ids().len().saturating_sub(1);
            self.sidebar_cursor = (self.sidebar_cursor + 1).min(max_idx);
        } else {
            self.engine.scroll_down(1);
        }
    }

    fn handle_enter(&mut self, now: Instant) -> Result<()> {
        if self.focus_on_chat_list {
            let ids = self.sidebar_ids();
            if let Some(id) = ids.get(self.sidebar_cursor.min(ids.len().saturating_sub(1))) {
                self.engine.select(id);
                self.focus_on_chat_list = false;
            }
            return Ok(());
        }

        let text = self.input_buffer.trim().to_string();
        if text.is_empty() {
            return Ok(());
        }
        self.clear_input();

        if CommandHandler::handle(self, &text, now)? {
            return Ok(());
        }
        self.send(SendRequest::new(text), now);
        Ok(())
    }

    fn clear_input(&mut self) {
        self.input_buffer.clear();
        self.input_cursor = 0;
    }

    fn handle_char(&mut self, c: char) {
        self.input_buffer.insert(self.input_cursor, c);
        self.input_cursor += c.len_utf8();
    }

    fn handle_backspace(&mut self) {
        if self.input_cursor > 0 {
            let prev = self.input_buffer[..self.input_cursor]
                .char_indices()
                .next_back()
                .map(|(i, _)| i)
                .unwrap_or(0);
            self.input_buffer.remove(prev);
            self.input_cursor = prev;
        }
    }

    fn handle_delete(&mut self) {
        if self.input_cursor < self.input_buffer.len() {
            self.input_buffer.remove(self.input_cursor);
        }
    }

    fn handle_input_left(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor = self.input_buffer[..self.input_cursor]
                .char_indices()
                .next_back()
                .map(|(i, _)| i)
                .unwrap_or(0);
        }
    }

    fn handle_input_right(&mut self) {
        if self.input_cursor < self.input_buffer.len() {
            self.input_cursor = self.input_buffer[self.input_cursor..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| self.input_cursor + i)
                .unwrap_or(self.input_buffer.len());
        }
    }

    pub fn toggle_timestamps(&mut self) {
        let show = !self.engine.render().show_timestamps();
        self.engine.set_show_timestamps(show);
        self.engine
            .set_status(format!("Timestamps: {}", if show { "ON" } else { "OFF" }));
    }

    pub fn toggle_chat_list(&mut self) {
        self.show_chat_list = !self.show_chat_list;
        if !self.show_chat_list {
            self.focus_on_chat_list = false;
        }
        self.engine.set_status(format!(
            "Chat list: {}",
            if self.show_chat_list { "ON" } else { "OFF" }
        ));
    }

    pub fn toggle_borders(&mut self) {
        self.show_borders = !self.show_borders;
        self.engine
            .set_status(format!("Borders: {}", if self.show_borders { "ON" } else { "OFF" }));
    }

    /// Persist the display toggles back to the config file.
    pub fn save_state(&self) -> Result<()> {
        let mut config = self.config.clone();
        config.settings.show_timestamps = self.engine.render().show_timestamps();
        config.settings.show_borders = self.show_borders;
        config.settings.show_chat_list = self.show_chat_list;
        config.save()?;
        Ok(())
    }
}
