//! Bus trace files.
//!
//! One access per line: `R <addr>`, `W <addr> <data>` or `T <microseconds>`
//! to let time pass. Numbers are decimal or `0x` hex. `#` starts a comment.

use std::io::BufRead;
use std::thread;

use crossbeam_channel as cb;
use thiserror::Error;

const QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Read(u16),
    Write(u16, u8),
    Advance(u64),
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("reading trace failed: {0}")]
    Io(#[from] std::io::Error),
}

fn number(field: Option<&str>) -> Result<u64, String> {
    let field = field.ok_or_else(|| "missing operand".to_string())?;
    let parsed = match field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => field.parse(),
    };
    parsed.map_err(|e| format!("bad number {field:?}: {e}"))
}

fn narrow<T: TryFrom<u64>>(value: u64) -> Result<T, String> {
    T::try_from(value).map_err(|_| format!("{value:#x} out of range"))
}

/// Parses one line. Blank lines and comments yield `None`.
pub fn parse_line(text: &str, line: usize) -> Result<Option<TraceOp>, TraceError> {
    let text = text.split('#').next().unwrap_or("").trim();
    if text.is_empty() {
        return Ok(None);
    }

    let mut fields = text.split_whitespace();
    let op = fields.next().unwrap_or("");
    let parsed = match op.to_ascii_uppercase().as_str() {
        "R" => number(fields.next())
            .and_then(narrow)
            .map(TraceOp::Read),
        "W" => number(fields.next()).and_then(narrow).and_then(|addr| {
            let data = number(fields.next()).and_then(narrow)?;
            Ok(TraceOp::Write(addr, data))
        }),
        "T" => number(fields.next()).map(TraceOp::Advance),
        other => Err(format!("unknown operation {other:?}")),
    };
    parsed
        .map(Some)
        .map_err(|message| TraceError::Parse { line, message })
}

/// Parses `reader` on its own thread. The channel closes after the last
/// line or the first error.
pub fn spawn_reader<R>(reader: R) -> cb::Receiver<Result<TraceOp, TraceError>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = cb::bounded(QUEUE_DEPTH);
    thread::spawn(move || {
        for (i, line) in reader.lines().enumerate() {
            let item = match line {
                Ok(text) => match parse_line(&text, i + 1) {
                    Ok(Some(op)) => Ok(op),
                    Ok(None) => continue,
                    Err(e) => Err(e),
                },
                Err(e) => Err(TraceError::Io(e)),
            };
            let failed = item.is_err();
            if tx.send(item).is_err() || failed {
                return;
            }
        }
    });
    rx
}
