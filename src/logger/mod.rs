//! Non-blocking, multi-producer log pipeline.
//!
//! Producers format into a fixed-size [`LogEntry`] on their own stack and
//! hand it to a bounded queue without waiting; a full queue counts a drop.
//! A single drainer ([`Logger::run`] or [`Logger::process`]) fans entries
//! out to the enabled [`LogSink`]s in FIFO order.
//!
//! Before [`Logger::init`] the pipeline is bypassed: entries go straight to
//! the fallback writer, if one is installed.

pub mod sink;

pub use sink::{ConsoleSink, ForwardSink, LogSink, LogTargets, LogWidget, WidgetSink};

use crate::config::{LOG_FLUSH_SETTLE_MS, LOG_MSG_CAPACITY, LOG_QUEUE_SIZE};
use core::cell::Cell;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use heapless::String;

/// The application logger.
pub static LOGGER: Logger = Logger::new();

/// Severity, ordered from least to most verbose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Level {
    None = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Verbose = 5,
}

impl Level {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Level::None),
            1 => Some(Level::Error),
            2 => Some(Level::Warn),
            3 => Some(Level::Info),
            4 => Some(Level::Debug),
            5 => Some(Level::Verbose),
            _ => None,
        }
    }

    /// Level carried in the value field of a forwarded log frame.
    pub fn from_forward_value(value: u32) -> Option<Level> {
        u8::try_from(value).ok().and_then(Level::from_u8)
    }

    pub const fn prefix(self) -> &'static str {
        match self {
            Level::None => "",
            Level::Error => "[E] ",
            Level::Warn => "[W] ",
            Level::Info => "[I] ",
            Level::Debug => "[D] ",
            Level::Verbose => "[V] ",
        }
    }

    /// ANSI SGR colour sequence.
    pub const fn color(self) -> &'static str {
        match self {
            Level::None => "",
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Verbose => "\x1b[37m",
        }
    }
}

/// ANSI SGR reset sequence.
pub const COLOR_RESET: &str = "\x1b[0m";

// ═══════════════════════════════════════════════════════════════════════════
// Log Entry
// ═══════════════════════════════════════════════════════════════════════════

/// One formatted message. Writes past capacity are silently truncated at a
/// character boundary; once truncated, later writes are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    level: Level,
    message: String<LOG_MSG_CAPACITY>,
    truncated: bool,
}

impl LogEntry {
    pub const fn new(level: Level) -> Self {
        Self {
            level,
            message: String::new(),
            truncated: false,
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl Write for LogEntry {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        for c in s.chars() {
            if self.message.push(c).is_err() {
                self.truncated = true;
                break;
            }
        }
        Ok(())
    }
}

/// Synchronous writer used before the pipeline is initialized.
pub type FallbackWriter = fn(Level, &str);

// ═══════════════════════════════════════════════════════════════════════════
// Logger
// ═══════════════════════════════════════════════════════════════════════════

pub struct Logger {
    queue: Channel<CriticalSectionRawMutex, LogEntry, LOG_QUEUE_SIZE>,
    level: AtomicU8,
    targets: AtomicU8,
    dropped: AtomicU32,
    initialized: AtomicBool,
    stop: Signal<CriticalSectionRawMutex, ()>,
    started: Signal<CriticalSectionRawMutex, ()>,
    fallback: Mutex<CriticalSectionRawMutex, Cell<Option<FallbackWriter>>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Level `Info`, console target only, not yet initialized.
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            level: AtomicU8::new(Level::Info as u8),
            targets: AtomicU8::new(LogTargets::CONSOLE.bits()),
            dropped: AtomicU32::new(0),
            initialized: AtomicBool::new(false),
            stop: Signal::new(),
            started: Signal::new(),
            fallback: Mutex::new(Cell::new(None)),
        }
    }

    /// Start queueing. Calling it again while initialized does nothing.
    pub fn init(&self) {
        if self.initialized.load(Ordering::Acquire) {
            return;
        }
        self.queue.clear();
        self.dropped.store(0, Ordering::Relaxed);
        self.stop.reset();
        self.initialized.store(true, Ordering::Release);
        self.started.signal(());
    }

    /// Stop queueing, discard pending entries and park the drainer.
    pub fn deinit(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        self.started.reset();
        self.queue.clear();
        self.stop.signal(());
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed)).unwrap_or(Level::Info)
    }

    pub fn set_targets(&self, targets: LogTargets) {
        self.targets.store(targets.bits(), Ordering::Relaxed);
    }

    pub fn targets(&self) -> LogTargets {
        LogTargets::from_bits(self.targets.load(Ordering::Relaxed))
    }

    pub fn set_fallback(&self, writer: Option<FallbackWriter>) {
        self.fallback.lock(|f| f.set(writer));
    }

    pub fn queue_count(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped_count(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    // ── Producer path ────────────────────────────────────────────────────

    /// Never blocks; safe from interrupt context.
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        self.submit(level, None, args);
    }

    /// Like [`log`](Self::log), with the message prefixed by `[tag] `.
    pub fn log_tag(&self, level: Level, tag: &str, args: fmt::Arguments<'_>) {
        self.submit(level, Some(tag), args);
    }

    fn submit(&self, level: Level, tag: Option<&str>, args: fmt::Arguments<'_>) {
        if level == Level::None || level > self.level() {
            return;
        }

        let mut entry = LogEntry::new(level);
        if let Some(tag) = tag {
            let _ = write!(entry, "[{}] ", tag);
        }
        let _ = entry.write_fmt(args);

        if !self.is_initialized() {
            if let Some(writer) = self.fallback.lock(|f| f.get()) {
                writer(level, entry.message());
            }
            return;
        }

        if self.queue.try_send(entry).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ── Drainer path ─────────────────────────────────────────────────────

    /// Drain entries into `sinks` forever.
    ///
    /// Between [`deinit`](Self::deinit) and the next [`init`](Self::init)
    /// the drainer is parked; it picks up again on its own.
    pub async fn run(&self, sinks: &mut [&mut dyn LogSink]) -> ! {
        loop {
            if !self.is_initialized() {
                self.started.wait().await;
                continue;
            }
            if let Either::First(entry) = select(self.queue.receive(), self.stop.wait()).await {
                self.dispatch(&entry, sinks);
            }
        }
    }

    /// Drain whatever is queued right now without waiting.
    /// Returns the number of entries delivered.
    pub fn process(&self, sinks: &mut [&mut dyn LogSink]) -> usize {
        let mut n = 0;
        while let Ok(entry) = self.queue.try_receive() {
            self.dispatch(&entry, sinks);
            n += 1;
        }
        n
    }

    fn dispatch(&self, entry: &LogEntry, sinks: &mut [&mut dyn LogSink]) {
        let targets = self.targets();
        for sink in sinks.iter_mut() {
            if targets.contains(sink.target()) {
                sink.write_entry(entry);
            }
        }
    }

    /// Wait until the drainer has emptied the queue, then give the sinks a
    /// moment to finish.
    pub async fn flush(&self) {
        while self.queue_count() > 0 {
            Timer::after(Duration::from_millis(1)).await;
        }
        Timer::after(Duration::from_millis(LOG_FLUSH_SETTLE_MS)).await;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Macros
// ═══════════════════════════════════════════════════════════════════════════

/// Log through [`LOGGER`] at an explicit level.
#[macro_export]
macro_rules! log_at {
    ($level:expr, tag: $tag:expr, $($arg:tt)+) => {
        $crate::logger::LOGGER.log_tag($level, $tag, ::core::format_args!($($arg)+))
    };
    ($level:expr, $($arg:tt)+) => {
        $crate::logger::LOGGER.log($level, ::core::format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::Level::Error, $($arg)+) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::Level::Debug, $($arg)+) };
}

#[macro_export]
macro_rules! log_verbose {
    ($($arg:tt)+) => { $crate::log_at!($crate::logger::Level::Verbose, $($arg)+) };
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
