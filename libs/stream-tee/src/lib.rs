// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Read-through tee.
//!
//! [`StreamTee`] sits between a source (typically an HTTP response body) and
//! a consumer (typically a parser). Every chunk pulled from the source is
//! written to a sink (typically a compressed cache file) before the consumer
//! sees it. Closing the tee drains whatever the consumer left unread into the
//! sink, so the sink always ends up with the complete source, no matter how
//! much was actually consumed or whether the consumer bailed out on an error.
//!
//! ```ignore
//! let mut tee = StreamTee::new(response_body, GzEncoder::new(file, Compression::default()));
//! let parsed = serde_json::from_reader::<_, Batch>(&mut tee);
//! let encoder = tee.close()?;
//! encoder.finish()?;
//! ```

use std::io::{self, BufRead, Read, Write};

use thiserror::Error;

/// Default refill size. Large enough to keep a network stream and a gzip
/// encoder busy without holding whole responses in memory.
pub const DEFAULT_BUFFER_SIZE: usize = 512 * 1024;

/// Tee failures.
///
/// Both variants carry how many bytes had already reached the sink; the sink
/// holds exactly that prefix of the source when the error is returned.
#[derive(Debug, Error)]
pub enum TeeError {
    #[error("failed to read source after {copied} bytes: {source}")]
    Source {
        copied: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to write sink after {copied} bytes: {source}")]
    Sink {
        copied: u64,
        #[source]
        source: io::Error,
    },
}

impl TeeError {
    /// Number of bytes durably handed to the sink before the failure
    pub fn bytes_copied(&self) -> u64 {
        match self {
            TeeError::Source { copied, .. } | TeeError::Sink { copied, .. } => *copied,
        }
    }

    /// Same failure with a detached copy of the underlying I/O error
    fn replay(&self) -> TeeError {
        let copy = |source: &io::Error| io::Error::new(source.kind(), source.to_string());
        match self {
            TeeError::Source { copied, source } => TeeError::Source {
                copied: *copied,
                source: copy(source),
            },
            TeeError::Sink { copied, source } => TeeError::Sink {
                copied: *copied,
                source: copy(source),
            },
        }
    }
}

impl From<TeeError> for io::Error {
    fn from(e: TeeError) -> Self {
        let kind = match &e {
            TeeError::Source { source, .. } | TeeError::Sink { source, .. } => source.kind(),
        };
        io::Error::new(kind, e)
    }
}

/// A reader that copies everything it reads from `source` into `sink`.
///
/// The tee owns both ends. [`StreamTee::close`] drains the rest of the
/// source into the sink, flushes it and hands it back so the caller can
/// finalize it (e.g. write a gzip trailer). Dropping an unclosed tee performs
/// the same drain on a best-effort basis and logs failures.
///
/// The first source or sink failure poisons the tee: every later read fails
/// with the same error and `close` returns it, so the sink can never end up
/// with a hole in the middle.
pub struct StreamTee<R: Read, W: Write> {
    source: R,
    /// `None` once the sink has been released by `close`
    sink: Option<W>,
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
    eof: bool,
    copied: u64,
    /// First failure; once set nothing more is read or written
    failed: Option<TeeError>,
}

impl<R: Read, W: Write> StreamTee<R, W> {
    /// Create a tee with the default 512 KiB buffer.
    pub fn new(source: R, sink: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, source, sink)
    }

    /// Create a tee that refills `capacity` bytes at a time.
    pub fn with_capacity(capacity: usize, source: R, sink: W) -> Self {
        Self {
            source,
            sink: Some(sink),
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            filled: 0,
            eof: false,
            copied: 0,
            failed: None,
        }
    }

    /// Bytes pulled from the source and written to the sink so far.
    pub fn bytes_copied(&self) -> u64 {
        self.copied
    }

    /// Read a single byte; `None` at end of stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>, TeeError> {
        if self.pos >= self.filled && !self.refill()? {
            return Ok(None);
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }

    /// Drain the unread remainder of the source into the sink, flush the
    /// sink, release the source and return the sink.
    ///
    /// On error the sink holds the first [`TeeError::bytes_copied`] bytes of
    /// the source and is dropped.
    pub fn close(mut self) -> Result<W, TeeError> {
        if let Some(e) = self.failed.take() {
            self.sink = None;
            return Err(e);
        }
        let drained = match self.drain() {
            Ok(drained) => drained,
            Err(e) => {
                self.sink = None;
                return Err(e);
            }
        };
        tracing::trace!(drained, total = self.copied, "tee drained on close");

        let copied = self.copied;
        match self.sink.take() {
            Some(mut sink) => {
                sink.flush()
                    .map_err(|source| TeeError::Sink { copied, source })?;
                Ok(sink)
            }
            // Only `close` takes the sink, and it consumes the tee.
            None => Err(TeeError::Sink {
                copied,
                source: io::Error::other("sink already released"),
            }),
        }
    }

    /// Pull the next chunk from the source and copy it to the sink.
    ///
    /// Returns `false` once the source is exhausted.
    fn refill(&mut self) -> Result<bool, TeeError> {
        if let Some(e) = &self.failed {
            return Err(e.replay());
        }
        if self.eof {
            return Ok(false);
        }

        let n = loop {
            match self.source.read(&mut self.buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(self.poison(TeeError::Source {
                        copied: self.copied,
                        source,
                    }));
                }
            }
        };

        self.pos = 0;
        self.filled = 0;
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }

        // Bytes only become readable once they are in the sink.
        if let Some(sink) = self.sink.as_mut() {
            if let Err(source) = sink.write_all(&self.buf[..n]) {
                return Err(self.poison(TeeError::Sink {
                    copied: self.copied,
                    source,
                }));
            }
        }
        self.filled = n;
        self.copied += n as u64;
        Ok(true)
    }

    /// Remember the first failure and hand it back to the caller.
    fn poison(&mut self, err: TeeError) -> TeeError {
        self.failed = Some(err.replay());
        err
    }

    /// Skip whatever is buffered (it is already in the sink) and copy the
    /// rest of the source across. Returns the number of bytes drained.
    fn drain(&mut self) -> Result<u64, TeeError> {
        let start = self.copied;
        self.pos = self.filled;
        while self.refill()? {
            self.pos = self.filled;
        }
        Ok(self.copied - start)
    }
}

impl<R: Read, W: Write> BufRead for StreamTee<R, W> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.filled {
            self.refill()?;
        }
        Ok(&self.buf[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

impl<R: Read, W: Write> Read for StreamTee<R, W> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read, W: Write> Drop for StreamTee<R, W> {
    fn drop(&mut self) {
        if self.sink.is_none() {
            return;
        }
        if let Err(e) = self.drain() {
            tracing::warn!(
                error = %e,
                copied = e.bytes_copied(),
                "Tee dropped without close, sink is incomplete"
            );
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush() {
                tracing::warn!(error = %e, "Failed to flush tee sink on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_is_clamped() {
        let tee = StreamTee::with_capacity(0, &b"abc"[..], Vec::new());
        assert_eq!(tee.buf.len(), 1);
    }

    #[test]
    fn test_read_byte_refills_transparently() {
        let mut tee = StreamTee::with_capacity(2, &b"hello"[..], Vec::new());
        let mut seen = Vec::new();
        while let Some(b) = tee.read_byte().expect("read byte") {
            seen.push(b);
        }
        assert_eq!(seen, b"hello");
        assert_eq!(tee.bytes_copied(), 5);
        let sink = tee.close().expect("close");
        assert_eq!(sink, b"hello");
    }

    #[test]
    fn test_empty_source() {
        let mut tee = StreamTee::new(io::empty(), Vec::new());
        assert_eq!(tee.read_byte().expect("read byte"), None);
        let sink = tee.close().expect("close");
        assert!(sink.is_empty());
    }
}
