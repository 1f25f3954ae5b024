use std::sync::OnceLock;

use chrono::{DateTime, Local, TimeZone};
use regex::Regex;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

fn escape_sequence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // CSI (ESC [ ... final), OSC (ESC ] ... BEL/ST) and two-byte ESC sequences
    RE.get_or_init(|| {
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?|\x1b[@-_]?")
            .expect("escape sequence pattern is valid")
    })
}

/// Make untrusted message text safe to draw: terminal escape sequences are
/// removed, tabs become spaces and other control characters are dropped.
/// Newlines are kept.
pub fn sanitize(text: &str) -> String {
    let stripped = escape_sequence_regex().replace_all(text, "");
    stripped
        .chars()
        .filter_map(|c| match c {
            '\n' => Some('\n'),
            '\t' => Some(' '),
            '\r' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// Current wall-clock label used when an event carries no timestamp.
pub fn now_label() -> String {
    Local::now().format("%H:%M").to_string()
}

/// Format a unix timestamp for display
pub fn format_timestamp(timestamp: i64) -> String {
    let datetime: DateTime<Local> = Local
        .timestamp_opt(timestamp, 0)
        .single()
        .unwrap_or_else(Local::now);

    let now = Local::now();
    if datetime.date_naive() == now.date_naive() {
        datetime.format("%H:%M").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// First line of `text`, cut to `max_chars` with "..." appended when longer.
pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() > max_chars {
        let truncate_at = first_line
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(first_line.len());
        format!("{}...", &first_line[..truncate_at])
    } else {
        first_line.to_string()
    }
}

/// Clip `text` to `max_width` terminal columns, ending in "…" when clipped.
pub fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > max_width - 1 {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

/// Wrap text into lines of at most `width` columns.
///
/// The first line is assumed to follow a prefix `indent` columns wide, so
/// every line holds `width - indent` columns of text; continuation lines are
/// padded with `indent` spaces. Long words are split.
pub fn wrap_text(text: &str, indent: usize, width: usize) -> Vec<String> {
    if width <= indent {
        return text.split('\n').map(str::to_string).collect();
    }
    let content_width = width - indent;
    let pad: String = " ".repeat(indent);
    let mut raw_lines: Vec<String> = Vec::new();

    for paragraph in text.split('\n') {
        if paragraph.is_empty() {
            raw_lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        let mut current_width = 0;

        for word in paragraph.split(' ') {
            let word_width = word.width();

            if word_width > content_width {
                if !current_line.is_empty() {
                    raw_lines.push(std::mem::take(&mut current_line));
                }
                // split by display width on char boundaries
                let mut chunk = String::new();
                let mut chunk_width = 0;
                for c in word.chars() {
                    let w = c.width().unwrap_or(0);
                    if chunk_width + w > content_width && !chunk.is_empty() {
                        raw_lines.push(std::mem::take(&mut chunk));
                        chunk_width = 0;
                    }
                    chunk.push(c);
                    chunk_width += w;
                }
                current_line = chunk;
                current_width = chunk_width;
                continue;
            }

            let extra = if current_line.is_empty() { word_width } else { word_width + 1 };
            if current_width + extra <= content_width {
                if !current_line.is_empty() {
                    current_line.push(' ');
                }
                current_line.push_str(word);
                current_width += extra;
            } else {
                raw_lines.push(std::mem::replace(&mut current_line, word.to_string()));
                current_width = word_width;
            }
        }

        raw_lines.push(current_line);
    }

    raw_lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| if i == 0 { line } else { format!("{}{}", pad, line) })
        .collect()
}
