use crate::core::records::MessageEvent;
use crate::error::{ImportError, ParseFailure};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

const PROGRESS_EVERY: u64 = 10_000;

/// A dataset on disk that can be read from the start any number of times.
#[derive(Debug, Clone)]
pub struct EdgeListSource {
    path: PathBuf,
}

impl EdgeListSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&self) -> Result<EdgeListReader<BufReader<File>>, ImportError> {
        let file = File::open(&self.path)?;
        Ok(EdgeListReader::new(BufReader::new(file)))
    }
}

/// Lazily parses `SRC DST TIMESTAMP` lines.
///
/// Blank lines and lines starting with `#` or `%` are skipped but still
/// counted, so reported line numbers match the file. Lines are decoded one at
/// a time, so bad UTF-8 is reported against its own line.
pub struct EdgeListReader<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
}

impl<R: BufRead> EdgeListReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }
}

fn strip_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

impl<R: BufRead> Iterator for EdgeListReader<R> {
    type Item = Result<MessageEvent, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;
            if self.line_no % PROGRESS_EVERY == 0 {
                debug!(lines = self.line_no, "parsing dataset");
            }

            let raw = strip_line_ending(&self.buf);
            let Ok(line) = std::str::from_utf8(raw) else {
                return Some(Err(ImportError::Parse {
                    line: self.line_no,
                    content: String::from_utf8_lossy(raw).into_owned(),
                    reason: ParseFailure::InvalidUtf8,
                }));
            };

            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('%') {
                continue;
            }
            return Some(parse_line(self.line_no, line));
        }
    }
}

pub fn parse_line(line_no: u64, line: &str) -> Result<MessageEvent, ImportError> {
    let fail = |reason| ImportError::Parse {
        line: line_no,
        content: line.to_string(),
        reason,
    };

    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.len() != 3 {
        return Err(fail(ParseFailure::TokenCount(tokens.len())));
    }
    let timestamp = tokens[2]
        .parse::<u64>()
        .map_err(|_| fail(ParseFailure::BadTimestamp(tokens[2].to_string())))?;

    MessageEvent::new(tokens[0], tokens[1], timestamp).map_err(|_| fail(ParseFailure::EmptyIdentifier))
}
