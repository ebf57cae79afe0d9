//! Line-buffered output multiplexing

use std::sync::Arc;

use console::{Color, Style};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::reporter::{Stream, TaskEvent, TaskReporter};

/// Prefix colors, handed out round-robin as tasks first spawn
pub const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Magenta,
    Color::Yellow,
    Color::Green,
    Color::Blue,
    Color::Red,
];

/// Identity of a task as shown in front of its output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTag {
    pub index: usize,
    pub shortcut: String,
    pub label: String,
    /// Palette slot
    pub color: usize,
}

impl TaskTag {
    /// Uncolored `"{shortcut} {label}"`
    pub fn plain(&self) -> String {
        format!("{} {}", self.shortcut, self.label)
    }

    /// Style for this task's prefix
    pub fn style(&self) -> Style {
        Style::new().fg(PALETTE[self.color % PALETTE.len()]).bold()
    }

    /// Colored `"{shortcut} {label}"`
    pub fn prefix(&self) -> String {
        self.style().apply_to(self.plain()).to_string()
    }
}

/// Accumulates bytes and hands back complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Whether a line is a runner echoing the command it is about to run
/// (`$ vite`, `> web@1.0.0 dev`).
pub fn is_echoed_command(line: &str) -> bool {
    let visible = console::strip_ansi_codes(line);
    let mut chars = visible.trim_start().chars();
    match chars.next() {
        Some('$') | Some('>') => matches!(chars.next(), None | Some(' ')),
        _ => false,
    }
}

/// Read a child stream to EOF, reporting each completed line
pub async fn pump<R>(mut reader: R, stream: Stream, tag: Arc<TaskTag>, reporter: Arc<dyn TaskReporter>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; 8192];

    let emit = |line: String| {
        if is_echoed_command(&line) {
            return;
        }
        reporter.report(&TaskEvent::Output {
            tag: tag.clone(),
            line,
            stream,
        });
    };

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer.push(&chunk[..n]).into_iter().for_each(&emit),
            Err(e) => {
                debug!(index = tag.index, error = %e, "output stream closed");
                break;
            }
        }
    }

    if let Some(rest) = buffer.finish() {
        emit(rest);
    }
}
