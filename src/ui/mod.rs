//! Terminal presentation of chat messages.

mod panel;

use console::{Color, Style, Term};

use crate::llm::{ChatMessage, Role};

pub use panel::{render_panel, render_rule, Body, PanelColors};

/// Tool output longer than this is cut in the terminal (the model still sees all of it).
const MAX_TOOL_DISPLAY_CHARS: usize = 1500;
const MAX_ARGS_DISPLAY_CHARS: usize = 300;

/// Panel title and colours for a message author.
pub fn panel_style(role: Role) -> (&'static str, PanelColors) {
    match role {
        Role::User => (
            "User",
            PanelColors {
                title: Color::Yellow,
                border: Color::Green,
            },
        ),
        Role::Assistant => (
            "Assistant",
            PanelColors {
                title: Color::Magenta,
                border: Color::Cyan,
            },
        ),
        Role::Tool => (
            "Tool Call",
            PanelColors {
                title: Color::Blue,
                border: Color::Blue,
            },
        ),
        Role::System => (
            "System",
            PanelColors {
                title: Color::White,
                border: Color::White,
            },
        ),
    }
}

/// One message as a panel `width` columns wide.
pub fn render_message(msg: &ChatMessage, width: usize) -> String {
    let (title, colors) = panel_style(msg.role);
    match msg.role {
        Role::Assistant => {
            let mut body = msg.text().trim().to_string();
            for call in msg.tool_calls.iter().flatten() {
                if !body.is_empty() {
                    body.push_str("\n\n");
                }
                body.push_str(&format!(
                    "→ `{}` {}",
                    call.function.name,
                    truncate_chars(call.function.arguments.trim(), MAX_ARGS_DISPLAY_CHARS)
                ));
            }
            render_panel(title, &body, Body::Markdown, colors, width)
        }
        Role::Tool => {
            let title = match &msg.name {
                Some(name) => format!("{} · {}", title, name),
                None => title.to_string(),
            };
            let body = truncate_chars(msg.text().trim(), MAX_TOOL_DISPLAY_CHARS);
            render_panel(&title, &body, Body::Plain, colors, width)
        }
        Role::User | Role::System => render_panel(title, msg.text(), Body::Plain, colors, width),
    }
}

pub fn print_message(msg: &ChatMessage) {
    println!("{}", render_message(msg, terminal_width()));
}

pub fn print_rule(label: &str) {
    println!("\n{}", render_rule(label, terminal_width()));
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", Style::new().red().bold().apply_to("Error:"), message);
}

pub fn print_goodbye() {
    println!("{}", Style::new().yellow().bold().apply_to("Goodbye!"));
}

fn terminal_width() -> usize {
    let (_, cols) = Term::stdout().size();
    cols as usize
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!(
            "{}\n… ({} more characters)",
            &text[..idx],
            text[idx..].chars().count()
        ),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FunctionCall, ToolCall};

    fn plain(s: &str) -> String {
        console::strip_ansi_codes(s).into_owned()
    }

    fn calc_call() -> ToolCall {
        ToolCall {
            id: "c1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: "calculate".into(),
                arguments: r#"{"expression":"2+2"}"#.into(),
            },
        }
    }

    #[test]
    fn roles_map_to_titles() {
        assert_eq!(panel_style(Role::User).0, "User");
        assert_eq!(panel_style(Role::Assistant).1.border, Color::Cyan);
        assert_eq!(panel_style(Role::Tool).0, "Tool Call");
        assert_eq!(panel_style(Role::System).1.title, Color::White);
    }

    #[test]
    fn tool_panels_name_the_tool_and_truncate() {
        let msg = ChatMessage::tool_result(&calc_call(), "x".repeat(MAX_TOOL_DISPLAY_CHARS + 10));
        let out = plain(&render_message(&msg, 80));
        assert!(out.starts_with("╭─ Tool Call · calculate "));
        assert!(out.contains("… (10 more characters)"));
    }

    #[test]
    fn assistant_panels_list_tool_requests() {
        let msg = ChatMessage::assistant(None, Some(vec![calc_call()]));
        let out = plain(&render_message(&msg, 80));
        assert!(out.starts_with("╭─ Assistant "));
        assert!(out.contains("calculate"));
        assert!(out.contains("2+2"));
    }
}
