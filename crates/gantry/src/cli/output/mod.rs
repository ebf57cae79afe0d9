//! Output formatting utilities

use console::{style, Style};

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Style for shortcuts
pub fn shortcut_style() -> Style {
    Style::new().bold().underlined()
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Line ending for the current terminal mode; raw mode does not translate `\n`
pub fn line_ending(raw: bool) -> &'static str {
    if raw {
        "\r\n"
    } else {
        "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_ending() {
        assert_eq!(line_ending(true), "\r\n");
        assert_eq!(line_ending(false), "\n");
    }
}
