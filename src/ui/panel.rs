//! Bordered, titled panels and horizontal rules as plain strings.

use console::{measure_text_width, Color, Style};
use termimad::MadSkin;

const MIN_WIDTH: usize = 24;
const MAX_WIDTH: usize = 120;

/// Title and border colours of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelColors {
    pub title: Color,
    pub border: Color,
}

/// How the panel body is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Body {
    Markdown,
    Plain,
}

pub fn render_panel(title: &str, body: &str, kind: Body, colors: PanelColors, width: usize) -> String {
    let width = width.clamp(MIN_WIDTH, MAX_WIDTH);
    let inner = width - 4;
    let border = Style::new().fg(colors.border);
    let title_style = Style::new().fg(colors.title).bold();

    let title_width = measure_text_width(title);
    let fill = width.saturating_sub(5 + title_width);
    let mut out = format!(
        "{}{}{}\n",
        border.apply_to("╭─ "),
        title_style.apply_to(title),
        border.apply_to(format!(" {}╮", "─".repeat(fill)))
    );

    let lines = match kind {
        Body::Markdown => markdown_lines(body, inner),
        Body::Plain => wrap_plain(body, inner),
    };
    for line in lines {
        let pad = inner.saturating_sub(measure_text_width(&line));
        out.push_str(&format!(
            "{} {}{} {}\n",
            border.apply_to("│"),
            line,
            " ".repeat(pad),
            border.apply_to("│")
        ));
    }

    out.push_str(&border.apply_to(format!("╰{}╯", "─".repeat(width - 2))).to_string());
    out
}

/// Full-width rule with a centred label.
pub fn render_rule(label: &str, width: usize) -> String {
    let width = width.clamp(MIN_WIDTH, MAX_WIDTH);
    let style = Style::new().fg(Color::Blue).bold();
    let label_width = measure_text_width(label) + 2;
    let left = width.saturating_sub(label_width) / 2;
    let right = width.saturating_sub(label_width + left);
    format!(
        "{} {} {}",
        style.apply_to("─".repeat(left)),
        style.apply_to(label),
        style.apply_to("─".repeat(right))
    )
}

fn markdown_lines(body: &str, width: usize) -> Vec<String> {
    if body.trim().is_empty() {
        return vec![String::new()];
    }
    let skin = MadSkin::default();
    let rendered = skin.text(body, Some(width)).to_string();
    let mut lines: Vec<String> = rendered.lines().map(|l| l.trim_end().to_string()).collect();
    while lines.last().is_some_and(|l| console::strip_ansi_codes(l).trim().is_empty()) {
        lines.pop();
    }
    lines
        .into_iter()
        .flat_map(|line| {
            if measure_text_width(&line) > width {
                wrap_plain(&console::strip_ansi_codes(&line), width)
            } else {
                vec![line]
            }
        })
        .collect()
}

/// Hard-wrap on character boundaries, preferring the last space.
pub(crate) fn wrap_plain(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for line in text.trim_end().lines() {
        let line = line.replace('\t', "    ");
        let mut rest: &str = line.trim_end();
        if rest.is_empty() {
            out.push(String::new());
            continue;
        }
        while measure_text_width(rest) > width {
            let limit = rest
                .char_indices()
                .nth(width)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            let cut = if rest[limit..].starts_with(' ') {
                limit
            } else {
                match rest[..limit].rfind(' ') {
                    Some(space) if space > 0 => space,
                    _ => limit,
                }
            };
            out.push(rest[..cut].to_string());
            rest = rest[cut..].trim_start();
        }
        out.push(rest.to_string());
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: PanelColors = PanelColors {
        title: Color::Yellow,
        border: Color::Green,
    };

    fn plain(s: &str) -> String {
        console::strip_ansi_codes(s).into_owned()
    }

    #[test]
    fn panel_lines_share_one_width() {
        let out = plain(&render_panel("User", "hello\nworld", Body::Plain, GREEN, 30));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("╭─ User "));
        assert_eq!(lines[1], format!("│ hello{} │", " ".repeat(21)));
        assert!(lines[3].starts_with('╰'));
        for line in &lines {
            assert_eq!(measure_text_width(line), 30, "{line:?}");
        }
    }

    #[test]
    fn markdown_body_fits_the_panel() {
        let body = "# Overview\n\nRust is a **systems** language with a long sentence that must wrap inside the panel.";
        let out = plain(&render_panel("Assistant", body, Body::Markdown, GREEN, 40));
        assert!(out.contains("Overview"));
        assert!(out.contains("systems"));
        for line in out.lines() {
            assert_eq!(measure_text_width(line), 40, "{line:?}");
        }
    }

    #[test]
    fn wraps_long_lines_at_spaces() {
        assert_eq!(wrap_plain("aaa bbb ccc", 7), ["aaa bbb", "ccc"]);
        assert_eq!(wrap_plain("abcdefghij", 4), ["abcd", "efgh", "ij"]);
        assert_eq!(wrap_plain("", 4), [""]);
    }

    #[test]
    fn rule_is_centred() {
        let rule = plain(&render_rule("Current State", 40));
        assert_eq!(measure_text_width(&rule), 40);
        assert!(rule.contains(" Current State "));
        assert!(rule.starts_with('─') && rule.ends_with('─'));
    }
}
