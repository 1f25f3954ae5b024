use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::formatting::truncate_to_width;
use crate::render::{RenderFrame, RowStyle, SidebarEntry};

/// Screen regions for one paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Areas {
    pub sidebar: Option<Rect>,
    pub messages: Rect,
    pub input: Rect,
    pub status: Rect,
}

pub fn layout(area: Rect, show_chat_list: bool, show_borders: bool) -> Areas {
    let input_height = if show_borders { 3 } else { 1 };
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(input_height),
            Constraint::Length(1),
        ])
        .split(area);

    let (sidebar, right) = if show_chat_list {
        let total_width = outer[0].width;
        let chat_width = (total_width.saturating_mul(25) / 100).max(12).min(total_width);
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(chat_width), Constraint::Min(0)])
            .split(outer[0]);
        (Some(chunks[0]), chunks[1])
    } else {
        (None, outer[0])
    };

    Areas {
        sidebar,
        messages: right,
        input: outer[1],
        status: outer[2],
    }
}

/// Text area of the message pane once its border is drawn.
pub fn message_inner(messages: Rect, show_borders: bool) -> Rect {
    if show_borders {
        Block::default().borders(Borders::ALL).inner(messages)
    } else {
        messages
    }
}

fn row_style(style: RowStyle) -> Style {
    match style {
        RowStyle::Own => Style::default().fg(Color::Cyan),
        RowStyle::OwnFailed => Style::default().fg(Color::Red),
        RowStyle::Peer => Style::default(),
        RowStyle::System => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    }
}

pub fn draw(f: &mut Frame, app: &App, frame: &RenderFrame) {
    let areas = layout(f.area(), app.show_chat_list, app.show_borders);

    if let Some(area) = areas.sidebar {
        draw_chat_list(f, app, frame, area);
    }
    draw_messages(f, app, frame, areas.messages);
    draw_input(f, app, areas.input);
    draw_status(f, frame, areas.status);
}

fn sidebar_item(entry: &SidebarEntry, max_width: usize) -> ListItem<'static> {
    let base_style = if entry.is_active {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let mut spans = Vec::new();
    let mut used = 0;
    if entry.unread > 0 {
        let marker = format!("▶ ({}) ", entry.unread);
        used += marker.width();
        spans.push(Span::styled(marker, Style::default().fg(Color::Red)));
    }
    let title = truncate_to_width(&entry.title, max_width.saturating_sub(used));
    spans.push(Span::styled(title, base_style));

    let mut lines = vec![Line::from(spans)];
    if !entry.preview.is_empty() {
        let preview = format!("  {} {}", entry.timestamp_label, entry.preview);
        lines.push(Line::styled(
            truncate_to_width(&preview, max_width),
            Style::default().fg(Color::DarkGray),
        ));
    }
    ListItem::new(lines)
}

fn draw_chat_list(f: &mut Frame, app: &App, frame: &RenderFrame, area: Rect) {
    let max_width = area.width.saturating_sub(2).max(1) as usize;
    let items: Vec<ListItem> = frame
        .sidebar
        .iter()
        .map(|entry| sidebar_item(entry, max_width))
        .collect();

    let border_style = if app.focus_on_chat_list {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };

    let title = match (&frame.filter, frame.unread_total) {
        (Some(filter), _) => format!("Chats [{}]", filter),
        (None, 0) => "Chats".to_string(),
        (None, unread) => format!("Chats ({})", unread),
    };

    let list_block = if app.show_borders {
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(border_style)
    } else {
        Block::default()
    };
    let list = List::new(items)
        .block(list_block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    if app.focus_on_chat_list && !frame.sidebar.is_empty() {
        state.select(Some(app.sidebar_cursor.min(frame.sidebar.len() - 1)));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_messages(f: &mut Frame, app: &App, frame: &RenderFrame, area: Rect) {
    let lines: Vec<Line> = frame
        .rows
        .iter()
        .map(|row| Line::styled(row.text.clone(), row_style(row.style)))
        .collect();

    let border_style = if app.focus_on_chat_list {
        Style::default()
    } else {
        Style::default().fg(Color::Green)
    };
    let block = if app.show_borders {
        Block::default()
            .borders(Borders::ALL)
            .title(format!("{} ({})", frame.title, frame.message_count))
            .border_style(border_style)
    } else {
        Block::default()
    };

    let offset = u16::try_from(frame.scroll_offset).unwrap_or(u16::MAX);
    let messages = Paragraph::new(lines).block(block).scroll((offset, 0));
    f.render_widget(messages, area);
}

/// Input box caption: who we are typing as, plus sends still awaiting their echo.
fn input_title(app: &App) -> String {
    let identity = app.engine.local_identity();
    match app.engine.echo().pending_len() {
        0 => format!("Message as {}", identity),
        pending => format!("Message as {} ({} sending)", identity, pending),
    }
}

fn draw_input(f: &mut Frame, app: &App, area: Rect) {
    let input_block = if app.show_borders {
        Block::default().borders(Borders::ALL).title(input_title(app))
    } else {
        Block::default()
    };
    let inner = input_block.inner(area);
    let input = Paragraph::new(app.input_buffer.as_str())
        .block(input_block)
        .wrap(Wrap { trim: false });
    f.render_widget(input, area);

    if !app.focus_on_chat_list {
        let cursor_col = app.input_buffer[..app.input_cursor].width() as u16;
        let x = inner.x + cursor_col.min(inner.width.saturating_sub(1));
        f.set_cursor_position((x, inner.y));
    }
}

fn draw_status(f: &mut Frame, frame: &RenderFrame, area: Rect) {
    let (text, style) = match &frame.status {
        Some(msg) => (
            msg.clone(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        None => (
            "Tab: focus  Enter: open/send  /help  Ctrl+Q: quit".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    };
    f.render_widget(Paragraph::new(text).style(style), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_with_sidebar_and_borders() {
        let areas = layout(Rect::new(0, 0, 100, 30), true, true);
        let sidebar = areas.sidebar.unwrap();
        assert_eq!(sidebar.width, 25);
        assert_eq!(areas.messages.x, 25);
        assert_eq!(areas.messages.width, 75);
        assert_eq!(areas.input.height, 3);
        assert_eq!(areas.status.height, 1);
        assert_eq!(areas.messages.height, 26);

        let inner = message_inner(areas.messages, true);
        assert_eq!((inner.width, inner.height), (73, 24));
    }

    #[test]
    fn test_layout_without_chrome() {
        let areas = layout(Rect::new(0, 0, 80, 20), false, false);
        assert!(areas.sidebar.is_none());
        assert_eq!(areas.messages, Rect::new(0, 0, 80, 18));
        assert_eq!(message_inner(areas.messages, false), areas.messages);
    }

    #[test]
    fn test_sidebar_item_marks_unread() {
        let entry = SidebarEntry {
            id: crate::identity::ConversationId::peer("bob").unwrap(),
            title: "@bob".into(),
            preview: "see you".into(),
            timestamp_label: "10:00".into(),
            unread: 3,
            is_active: false,
        };
        let item = sidebar_item(&entry, 30);
        assert_eq!(item.height(), 2);
    }

    #[tokio::test]
    async fn test_input_title_counts_unconfirmed_sends() {
        let (mut app, _rx) = crate::app::tests::test_app().await;
        assert_eq!(input_title(&app), "Message as @me");

        app.engine.open_peer("bob");
        app.engine
            .begin_send(crate::outbound::SendRequest::new("hi"), std::time::Instant::now())
            .unwrap();
        assert_eq!(input_title(&app), "Message as @me (1 sending)");
    }
}
