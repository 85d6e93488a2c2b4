// Sloganforge Engine — Render adapter
//
// Pure mapping from a chat message to HTML markup. Called on every state
// change, including on the growing pending text, so it must tolerate
// unbalanced markdown mid-stream; pulldown-cmark never fails on malformed
// input, it just renders what it can.

use pulldown_cmark::{html, Options, Parser};

use crate::atoms::types::Message;
use crate::engine::prompt;

/// Render a markdown string (possibly partial) to an HTML string.
pub fn render_markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, options());
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Render one message from the log.
///
/// The first user message carries the internal prompt-template wrapper;
/// it is stripped here so the user sees their literal product keywords.
pub fn render_message(message: &Message, is_first_user_message: bool) -> String {
    let content = if is_first_user_message {
        prompt::strip_template(&message.content)
    } else {
        message.content.as_str()
    };
    render_markdown(content)
}

fn options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_basic_markdown() {
        let html = render_markdown("**bold** slogan");
        assert!(html.contains("<strong>bold</strong>"));
    }

    #[test]
    fn first_user_message_loses_template_wrapper() {
        let message = Message::user(prompt::wrap_first_prompt("炸鸡"));
        let html = render_message(&message, true);
        assert!(html.contains("炸鸡"));
        assert!(!html.contains("广告投放优化师"));
    }

    #[test]
    fn later_messages_render_verbatim() {
        let message = Message::assistant("1. 香脆每一口");
        let html = render_message(&message, false);
        assert!(html.contains("香脆每一口"));
    }

    #[test]
    fn partial_markdown_does_not_break() {
        // Mid-stream text with an unterminated fence and unbalanced emphasis.
        for partial in ["```rust\nfn main(", "**almost bo", "| a | b", "[link](http"] {
            let html = render_markdown(partial);
            assert!(!html.is_empty());
        }
    }
}
