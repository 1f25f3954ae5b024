use std::time::Instant;

use anyhow::Result;

use crate::app::App;
use crate::identity::ConversationId;
use crate::outbound::SendRequest;

const HELP_TEXT: &str = "Commands: /open @user | /msg @user text | /search [text] | /system | /help. \
Keys: Tab switch focus, Enter open/send, PgUp/PgDn scroll, Ctrl+S sidebar, Ctrl+T timestamps, Ctrl+Q quit";

pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    /// Everything after the command name, whitespace preserved.
    pub rest: String,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        if !text.starts_with('/') {
            return None;
        }

        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        let name = parts[0][1..].to_string();
        let args = parts[1..].iter().map(|s| s.to_string()).collect();
        let rest = text[parts[0].len()..].trim().to_string();

        Some(Command { name, args, rest })
    }
}

pub struct CommandHandler;

impl CommandHandler {
    /// Run `text` as a command. Returns false when it is not one we know,
    /// in which case the caller sends it as a message.
    pub fn handle(app: &mut App, text: &str, now: Instant) -> Result<bool> {
        let cmd = match Command::parse(text) {
            Some(c) => c,
            None => return Ok(false),
        };

        match cmd.name.as_str() {
            "open" | "o" => {
                Self::handle_open(app, &cmd);
                Ok(true)
            }
            "msg" | "m" => {
                Self::handle_msg(app, &cmd, now);
                Ok(true)
            }
            "search" | "s" => {
                Self::handle_search(app, &cmd);
                Ok(true)
            }
            "system" => {
                app.engine.select(&ConversationId::system());
                app.sync_sidebar_cursor();
                Ok(true)
            }
            "help" | "h" => {
                app.engine.set_status(HELP_TEXT);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn handle_open(app: &mut App, cmd: &Command) {
        let Some(handle) = cmd.args.first() else {
            app.engine.set_status("Usage: /open @user");
            return;
        };
        match app.engine.open_peer(handle) {
            Some(id) => {
                crate::debug_log!("/open: {}", id);
                app.engine.clear_status();
                app.sync_sidebar_cursor();
            }
            None => app.engine.set_status("Usage: /open @user"),
        }
    }

    fn handle_msg(app: &mut App, cmd: &Command, now: Instant) {
        let Some(handle) = cmd.args.first() else {
            app.engine.set_status("Usage: /msg @user text");
            return;
        };
        let text = cmd.rest[handle.len()..].trim();
        if text.is_empty() {
            app.engine.set_status("Usage: /msg @user text");
            return;
        }
        // the addressed conversation becomes active so the send lands there
        if app.engine.open_peer(handle).is_none() {
            app.engine.set_status("Usage: /msg @user text");
            return;
        }
        app.send(SendRequest::to_peer(handle.as_str(), text), now);
    }

    fn handle_search(app: &mut App, cmd: &Command) {
        if cmd.rest.is_empty() {
            app.engine.set_filter(None);
            app.engine.set_status("Search cleared");
        } else {
            app.engine.set_filter(Some(cmd.rest.as_str()));
            let hits = app.engine.store().conversations(app.engine.filter()).len();
            app.engine.set_status(format!("{} conversation(s) match \"{}\"", hits, cmd.rest));
        }
        app.sidebar_cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_app;

    #[test]
    fn test_parse() {
        let cmd = Command::parse("/msg @bob  hello   there").unwrap();
        assert_eq!(cmd.name, "msg");
        assert_eq!(cmd.args, vec!["@bob", "hello", "there"]);
        assert_eq!(cmd.rest, "@bob  hello   there");
        assert!(Command::parse("hello /msg").is_none());
        assert!(Command::parse("/").unwrap().name.is_empty());
    }

    #[tokio::test]
    async fn test_open_and_system() {
        let (mut app, _rx) = test_app().await;
        let now = Instant::now();
        assert!(CommandHandler::handle(&mut app, "/open @Bob", now).unwrap());
        let bob = ConversationId::peer("bob").unwrap();
        assert_eq!(app.engine.active(), &bob);
        assert_eq!(app.engine.store().get(&bob).unwrap().title, "@Bob");

        assert!(CommandHandler::handle(&mut app, "/system", now).unwrap());
        assert!(app.engine.active().is_system());

        assert!(CommandHandler::handle(&mut app, "/open", now).unwrap());
        assert_eq!(app.engine.status(), Some("Usage: /open @user"));
    }

    #[tokio::test]
    async fn test_msg_keeps_message_spacing() {
        let (mut app, _rx) = test_app().await;
        assert!(CommandHandler::handle(&mut app, "/msg @carol  two  spaces", Instant::now()).unwrap());
        let carol = ConversationId::peer("carol").unwrap();
        let messages = app.engine.store().messages(&carol);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "two  spaces");
        assert_eq!(app.engine.echo().pending_len(), 1);
    }

    #[tokio::test]
    async fn test_msg_switches_away_from_active() {
        let (mut app, _rx) = test_app().await;
        app.engine.open_peer("bob");
        CommandHandler::handle(&mut app, "/msg @erin ping", Instant::now()).unwrap();
        let erin = ConversationId::peer("erin").unwrap();
        assert_eq!(app.engine.active(), &erin);
        assert_eq!(app.engine.store().messages(&erin).len(), 1);
        assert!(app.engine.store().messages(&ConversationId::peer("bob").unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_search_sets_and_clears_filter() {
        let (mut app, _rx) = test_app().await;
        let now = Instant::now();
        app.engine.open_peer("alice");
        app.engine.open_peer("bob");

        CommandHandler::handle(&mut app, "/search ali", now).unwrap();
        assert_eq!(app.engine.filter(), Some("ali"));
        assert_eq!(app.engine.status(), Some("1 conversation(s) match \"ali\""));

        CommandHandler::handle(&mut app, "/search", now).unwrap();
        assert_eq!(app.engine.filter(), None);
    }

    #[tokio::test]
    async fn test_unknown_command_is_not_handled() {
        let (mut app, _rx) = test_app().await;
        assert!(!CommandHandler::handle(&mut app, "/shrug", Instant::now()).unwrap());
        assert!(!CommandHandler::handle(&mut app, "plain text", Instant::now()).unwrap());
    }
}
