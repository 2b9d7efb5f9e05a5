use std::fmt::{self, Write as _};

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::uart::TxRing;

/// Bytes waiting for the debug UART.
pub static UART_LOG: TxRing = TxRing::new();

const LINE_CAPACITY: usize = 96;

/// Formats log records into [`UART_LOG`]. A line longer than the stack
/// buffer is truncated; a line that does not fit in the ring is dropped.
pub struct UartLogger;

static LOGGER: UartLogger = UartLogger;

struct LineBuffer {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl fmt::Write for LineBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = LINE_CAPACITY - 2 - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "E",
        Level::Warn => "W",
        Level::Info => "I",
        Level::Debug => "D",
        Level::Trace => "T",
    }
}

impl Log for UartLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line = LineBuffer {
            buf: [0; LINE_CAPACITY],
            len: 0,
        };
        let _ = write!(line, "{} {}", level_tag(record.level()), record.args());
        line.buf[line.len] = b'\r';
        line.buf[line.len + 1] = b'\n';
        UART_LOG.send(&line.buf[..line.len + 2]);
    }

    fn flush(&self) {}
}

/// Routes the `log` facade to the debug UART.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Drops queued output, used when the UART clock is about to change.
pub fn discard_pending() {
    UART_LOG.discard_pending();
}
