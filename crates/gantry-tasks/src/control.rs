//! Keyboard control surface
//!
//! A pure state machine over raw terminal bytes. In normal mode keystrokes
//! belong to the stdin target; the reserved control keys switch into a
//! selection mode where typed letters pick a task by shortcut.
//!
//! The surface never sleeps. When a selection is ambiguous it asks for a
//! timer with [`ControlEffect::ArmTimer`] and the caller reports back through
//! [`ControlSurface::timer_elapsed`]. A token that is no longer current is
//! ignored, so a timer can never act after the mode has changed.

use crate::reporter::SelectMode;

pub const KEY_INTERRUPT: u8 = 0x03;
pub const KEY_RESTART: u8 = 0x12;
pub const KEY_KILL: u8 = 0x0b;
pub const KEY_CLEAR: u8 = 0x0c;
pub const KEY_ESCAPE: u8 = 0x1b;

/// What the caller should do in response to input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEffect {
    /// Write these bytes to the stdin target
    Forward(Vec<u8>),
    /// End the session
    Exit,
    /// Clear the screen
    Clear,
    /// Selection started; show the task list
    ShowTasks(SelectMode),
    /// Restart or kill the task at `index`
    Dispatch { mode: SelectMode, index: usize },
    /// Typed letters matched no shortcut
    NoMatch { input: String },
    /// Selection abandoned
    Cancelled,
    /// Start (or restart) the disambiguation timer
    ArmTimer { token: u64 },
    /// Drop the pending timer
    CancelTimer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Normal,
    Select {
        mode: SelectMode,
        buffer: String,
        timer: Option<u64>,
    },
}

/// Modal interpreter for terminal input
#[derive(Debug)]
pub struct ControlSurface {
    shortcuts: Vec<String>,
    mode: Mode,
    next_token: u64,
}

impl ControlSurface {
    /// `shortcuts[i]` addresses the task at registry index `i`
    pub fn new(shortcuts: Vec<String>) -> Self {
        Self {
            shortcuts,
            mode: Mode::Normal,
            next_token: 0,
        }
    }

    pub fn is_selecting(&self) -> bool {
        matches!(self.mode, Mode::Select { .. })
    }

    /// Interpret one chunk of raw input
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ControlEffect> {
        let mut effects = Vec::new();
        let mut pending = Vec::new();

        for &byte in bytes {
            if !self.is_selecting() {
                match byte {
                    KEY_INTERRUPT | KEY_RESTART | KEY_KILL | KEY_CLEAR => {
                        flush(&mut pending, &mut effects);
                    }
                    _ => {
                        pending.push(byte);
                        continue;
                    }
                }
            }

            match byte {
                KEY_INTERRUPT => {
                    self.leave(&mut effects);
                    effects.push(ControlEffect::Exit);
                    return effects;
                }
                KEY_RESTART => self.enter(SelectMode::Restart, &mut effects),
                KEY_KILL => self.enter(SelectMode::Kill, &mut effects),
                KEY_CLEAR if !self.is_selecting() => effects.push(ControlEffect::Clear),
                b if b.is_ascii_alphabetic() => self.letter(b.to_ascii_lowercase() as char, &mut effects),
                KEY_ESCAPE => {
                    self.leave(&mut effects);
                    effects.push(ControlEffect::Cancelled);
                    return effects;
                }
                _ => {
                    // the rest of the chunk is most likely the tail of an
                    // escape sequence and must not leak to the task
                    self.leave(&mut effects);
                    effects.push(ControlEffect::Cancelled);
                    return effects;
                }
            }
        }

        flush(&mut pending, &mut effects);
        effects
    }

    /// The disambiguation timer with `token` fired
    pub fn timer_elapsed(&mut self, token: u64) -> Vec<ControlEffect> {
        let buffer = match &self.mode {
            Mode::Select {
                timer: Some(current),
                buffer,
                ..
            } if *current == token => buffer.clone(),
            _ => return Vec::new(),
        };

        let mode = self.select_mode();
        self.mode = Mode::Normal;
        match self.exact(&buffer) {
            Some(index) => vec![ControlEffect::Dispatch { mode, index }],
            None => vec![ControlEffect::NoMatch { input: buffer }],
        }
    }

    fn enter(&mut self, mode: SelectMode, effects: &mut Vec<ControlEffect>) {
        self.leave(effects);
        self.mode = Mode::Select {
            mode,
            buffer: String::new(),
            timer: None,
        };
        effects.push(ControlEffect::ShowTasks(mode));
    }

    /// Back to normal mode, cancelling any armed timer
    fn leave(&mut self, effects: &mut Vec<ControlEffect>) {
        if let Mode::Select { timer: Some(_), .. } = self.mode {
            effects.push(ControlEffect::CancelTimer);
        }
        self.mode = Mode::Normal;
    }

    fn letter(&mut self, c: char, effects: &mut Vec<ControlEffect>) {
        let Mode::Select { mode, buffer, .. } = &mut self.mode else {
            return;
        };
        buffer.push(c);
        let (mode, buffer) = (*mode, buffer.clone());

        if let Some(index) = self.exact(&buffer) {
            self.leave(effects);
            effects.push(ControlEffect::Dispatch { mode, index });
        } else if self.shortcuts.iter().any(|s| s.starts_with(&buffer)) {
            let token = self.next_token;
            self.next_token += 1;
            if let Mode::Select { timer, .. } = &mut self.mode {
                *timer = Some(token);
            }
            effects.push(ControlEffect::ArmTimer { token });
        } else {
            self.leave(effects);
            effects.push(ControlEffect::NoMatch { input: buffer });
        }
    }

    /// First task whose shortcut is exactly `buffer`
    fn exact(&self, buffer: &str) -> Option<usize> {
        self.shortcuts.iter().position(|s| s == buffer)
    }

    fn select_mode(&self) -> SelectMode {
        match self.mode {
            Mode::Select { mode, .. } => mode,
            Mode::Normal => SelectMode::Restart,
        }
    }
}

fn flush(pending: &mut Vec<u8>, effects: &mut Vec<ControlEffect>) {
    if !pending.is_empty() {
        effects.push(ControlEffect::Forward(std::mem::take(pending)));
    }
}
