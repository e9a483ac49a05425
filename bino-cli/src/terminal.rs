//! Terminal rendition of the chat widget
//!
//! Prints transcript entries as they appear and a typing line while a reply is
//! pending. Only the delta since the last render is written, so repeated
//! renders of the same snapshot print nothing.

use std::io::Write;
use std::sync::Mutex;

use bino_core::{Author, ChatMessage, ChatView, Transition, WidgetSnapshot};

pub const PROMPT: &str = "> ";

#[derive(Debug, Default)]
struct Printed {
    messages: usize,
    was_open: bool,
    was_loading: bool,
    bubbles_shown: bool,
}

#[derive(Debug, Default)]
pub struct TerminalView {
    printed: Mutex<Printed>,
}

impl TerminalView {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn format_message(message: &ChatMessage) -> String {
    match message.author {
        Author::User => format!("vous › {}", message.text),
        Author::Bot => format!("Bino › {}", message.text),
    }
}

impl ChatView for TerminalView {
    fn render(&self, snapshot: &WidgetSnapshot) {
        let mut printed = match self.printed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out = std::io::stdout().lock();

        if snapshot.welcome_visible && !printed.bubbles_shown {
            for bubble in &snapshot.welcome_bubbles {
                let _ = writeln!(out, "  💬 {bubble}");
            }
            printed.bubbles_shown = true;
        }

        if snapshot.is_open != printed.was_open {
            let _ = writeln!(
                out,
                "{}",
                if snapshot.is_open { "── chat ouvert ──" } else { "── chat fermé ──" }
            );
            printed.was_open = snapshot.is_open;
        }

        // User lines are already on screen as typed input.
        for message in snapshot.transcript.iter().skip(printed.messages) {
            if message.author == Author::Bot {
                let _ = writeln!(out, "{}", format_message(message));
            }
        }
        printed.messages = snapshot.transcript.len();

        if snapshot.is_loading && !printed.was_loading {
            let _ = writeln!(out, "Bino est en train d'écrire…");
        }
        printed.was_loading = snapshot.is_loading;

        let _ = out.flush();
    }

    fn hide_welcome(&self, transition: Transition) {
        tracing::debug!(?transition, "Welcome bubbles hidden");
    }

    fn focus_input(&self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{PROMPT}");
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message_labels_author() {
        assert_eq!(format_message(&ChatMessage::user("salut")), "vous › salut");
        assert_eq!(format_message(&ChatMessage::bot("bonjour")), "Bino › bonjour");
    }

    #[test]
    fn test_render_tracks_printed_messages() {
        let view = TerminalView::new();
        let snapshot = WidgetSnapshot {
            is_open: true,
            transcript: vec![ChatMessage::bot("hello"), ChatMessage::user("hi")],
            ..WidgetSnapshot::default()
        };

        view.render(&snapshot);
        view.render(&snapshot);

        let printed = view.printed.lock().unwrap();
        assert_eq!(printed.messages, 2);
        assert!(printed.was_open);
    }
}
