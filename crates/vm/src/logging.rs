//! Kernel log sink for the virtual memory subsystem.
//!
//! `KernelLog` implements [`log::Log`] and writes every record to each attached output.
//! Outputs are plain [`core::fmt::Write`] implementations, such as a serial port or a
//! framebuffer console.

use alloc::{boxed::Box, vec::Vec};
use core::{
    fmt::Write,
    sync::atomic::{AtomicBool, Ordering},
};

use log::{LevelFilter, SetLoggerError};
use spin::{Mutex, Once};

type Sink = Box<dyn Write + Send>;

pub struct KernelLog {
    has_output: AtomicBool,
    sinks: Mutex<Vec<Sink>>,
}

static DEFAULT: Once<KernelLog> = Once::new();

impl KernelLog {
    pub const fn new() -> Self {
        Self {
            has_output: AtomicBool::new(false),
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Returns the global instance, creating it on first use.
    pub fn global() -> &'static Self {
        DEFAULT.call_once(Self::new)
    }

    /// Installs the global instance as the logger.
    pub fn init() -> Result<&'static Self, SetLoggerError> {
        let log = Self::global();
        log.install()?;
        Ok(log)
    }

    /// Installs this instance as the logger. Fails if a logger is already installed.
    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;

        #[cfg(debug_assertions)]
        log::set_max_level(LevelFilter::Trace);

        #[cfg(not(debug_assertions))]
        log::set_max_level(LevelFilter::Info);

        Ok(())
    }

    pub fn has_output(&self) -> bool {
        self.has_output.load(Ordering::SeqCst)
    }

    /// Adds an output. Records are written to outputs in the order they were attached.
    pub fn attach(&self, sink: impl Write + Send + 'static) {
        self.sinks.lock().push(Box::new(sink));
        self.has_output.store(true, Ordering::SeqCst);
    }
}

impl Default for KernelLog {
    fn default() -> Self {
        Self::new()
    }
}

impl log::Log for KernelLog {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        self.has_output()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        for sink in self.sinks.lock().iter_mut() {
            write_log_entry_to(&mut **sink, record).ok();
        }
    }

    fn flush(&self) {}
}

fn write_log_entry_to<W: Write + ?Sized>(
    writer: &mut W,
    record: &log::Record,
) -> core::fmt::Result {
    #[cfg(any(debug_assertions, feature = "detailed-logging"))]
    return writeln!(
        writer,
        "[{} {}:{} {}] {}",
        record.level(),
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
        record.target(),
        record.args()
    );
    #[cfg(not(any(debug_assertions, feature = "detailed-logging")))]
    return writeln!(writer, "[{:5}] {}", record.level(), record.args());
}
