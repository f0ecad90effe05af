//! Colored status lines.

use std::io::IsTerminal;

use owo_colors::{OwoColorize, Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warn,
    Err,
}

impl Status {
    fn label(&self) -> &'static str {
        match self {
            Self::Ok => "[OK]",
            Self::Warn => "[WARN]",
            Self::Err => "[ERR]",
        }
    }

    fn style(&self) -> Style {
        match self {
            Self::Ok => Style::new().green(),
            Self::Warn => Style::new().yellow().bold(),
            Self::Err => Style::new().red().bold(),
        }
    }
}

/// Color is disabled by NO_COLOR, TERM=dumb or a non-terminal stream.
fn color_enabled(is_tty: bool) -> bool {
    let no_color = std::env::var_os("NO_COLOR").is_some();
    let dumb = std::env::var("TERM").map(|t| t == "dumb").unwrap_or(false);
    is_tty && !no_color && !dumb
}

fn paint(text: &str, style: Style, color: bool) -> String {
    if color {
        text.style(style).to_string()
    } else {
        text.to_string()
    }
}

/// Render "`[OK] message`" for stdout.
pub fn status_line(status: Status, message: &str) -> String {
    let color = color_enabled(std::io::stdout().is_terminal());
    format!("{} {}", paint(status.label(), status.style(), color), message)
}

/// Print a warning to stderr. Warnings never change the exit code.
pub fn print_warning(message: &str) {
    let color = color_enabled(std::io::stderr().is_terminal());
    eprintln!("{} {}", paint("Warning:", Status::Warn.style(), color), message);
}
