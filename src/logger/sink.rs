//! Log sinks: console text, on-screen widget and IPC forwarding.

use super::{Level, LogEntry, COLOR_RESET};
use crate::config::{LOG_WIDGET_BUFFER_LEN, LOG_WIDGET_MAX_LINES};
use crate::ipc::inbound::PEER_LOG_TAG;
use crate::ipc::{IpcCommand, IpcFrame, IpcLink};
use core::fmt::Write;
use core::ops::BitOr;
use heapless::String;

/// Bitmask selecting which sinks receive entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogTargets(u8);

impl LogTargets {
    pub const NONE: Self = Self(0x00);
    pub const CONSOLE: Self = Self(0x01);
    pub const IPC: Self = Self(0x02);
    pub const WIDGET: Self = Self(0x04);
    pub const ALL: Self = Self(0x07);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// `true` if every bit of `other` is set (and `other` is not empty).
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl BitOr for LogTargets {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A destination for drained log entries. Owned by the drainer.
pub trait LogSink {
    /// The target bit this sink answers to.
    fn target(&self) -> LogTargets;

    fn write_entry(&mut self, entry: &LogEntry);
}

// ═══════════════════════════════════════════════════════════════════════════
// Console
// ═══════════════════════════════════════════════════════════════════════════

/// Primary text sink: `<color><prefix><message><reset>\r\n`.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write one formatted line. Also serves as the boot fallback before the
    /// pipeline is initialized.
    pub fn write_line(&mut self, level: Level, message: &str) {
        let _ = write!(
            self.out,
            "{}{}{}{}\r\n",
            level.color(),
            level.prefix(),
            message,
            COLOR_RESET
        );
    }
}

impl<W: Write> LogSink for ConsoleSink<W> {
    fn target(&self) -> LogTargets {
        LogTargets::CONSOLE
    }

    fn write_entry(&mut self, entry: &LogEntry) {
        self.write_line(entry.level(), entry.message());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// On-screen widget
// ═══════════════════════════════════════════════════════════════════════════

/// A multi-line text area that can be redrawn with new content.
pub trait LogWidget {
    fn set_text(&mut self, text: &str);
}

/// Rolling log view. Lines carry the level prefix but no colour.
pub struct WidgetSink<W: LogWidget> {
    widget: W,
    buffer: String<LOG_WIDGET_BUFFER_LEN>,
    max_lines: usize,
}

impl<W: LogWidget> WidgetSink<W> {
    /// Keeps at most [`LOG_WIDGET_MAX_LINES`] lines.
    pub fn new(widget: W) -> Self {
        Self::with_max_lines(widget, LOG_WIDGET_MAX_LINES)
    }

    /// `max_lines == 0` keeps as many lines as the buffer holds.
    pub fn with_max_lines(widget: W, max_lines: usize) -> Self {
        Self {
            widget,
            buffer: String::new(),
            max_lines,
        }
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.widget.set_text("");
    }

    fn line_count(&self) -> usize {
        if self.buffer.is_empty() {
            0
        } else {
            self.buffer.matches('\n').count() + 1
        }
    }

    fn drop_oldest_line(&mut self) {
        match self.buffer.find('\n') {
            Some(pos) => {
                let mut rest: String<LOG_WIDGET_BUFFER_LEN> = String::new();
                let _ = rest.push_str(&self.buffer[pos + 1..]);
                self.buffer = rest;
            }
            None => self.buffer.clear(),
        }
    }
}

impl<W: LogWidget> LogSink for WidgetSink<W> {
    fn target(&self) -> LogTargets {
        LogTargets::WIDGET
    }

    fn write_entry(&mut self, entry: &LogEntry) {
        let level = entry.level();

        if self.max_lines > 0 {
            while self.line_count() >= self.max_lines {
                self.drop_oldest_line();
            }
        }

        let needed = 1 + level.prefix().len() + entry.message().len();
        while !self.buffer.is_empty() && self.buffer.len() + needed > LOG_WIDGET_BUFFER_LEN {
            self.drop_oldest_line();
        }

        if !self.buffer.is_empty() {
            let _ = self.buffer.push('\n');
        }
        let _ = self.buffer.push_str(level.prefix());
        for c in entry.message().chars() {
            if self.buffer.push(c).is_err() {
                break;
            }
        }

        self.widget.set_text(&self.buffer);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IPC forwarding
// ═══════════════════════════════════════════════════════════════════════════

/// Forwards each entry to the peer processor, one frame per entry.
///
/// The frame code is chosen by level, the value carries the level and the
/// payload the NUL-terminated message.
pub struct ForwardSink<L: IpcLink> {
    link: L,
}

impl<L: IpcLink> ForwardSink<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    pub fn frame_for(entry: &LogEntry) -> IpcFrame {
        let level = entry.level();
        let mut frame = IpcFrame::with_value(IpcCommand::for_log_level(level), level as u32);
        frame.set_text(entry.message());
        frame
    }
}

impl<L: IpcLink> LogSink for ForwardSink<L> {
    fn target(&self) -> LogTargets {
        LogTargets::IPC
    }

    fn write_entry(&mut self, entry: &LogEntry) {
        // Lines that came from the peer are never sent back to it.
        if is_peer_line(entry.message()) {
            return;
        }
        // Logging a failed log forward would feed back into this sink.
        let _ = self.link.send_retry(&Self::frame_for(entry), 0);
    }
}

fn is_peer_line(message: &str) -> bool {
    message
        .strip_prefix('[')
        .and_then(|m| m.strip_prefix(PEER_LOG_TAG))
        .is_some_and(|m| m.starts_with("] "))
}
