//! Streaming tokenizer over a byte range of a text file.
//!
//! Tokens are runs of non-whitespace bytes. Every newline also yields the
//! end-of-sentence token [`SENTENCE_END`]. Tokens longer than
//! [`MAX_TOKEN_LENGTH`] bytes are skipped entirely.
//!
//! The reader hands out slices of its own buffer, so a token is only valid
//! until the next call to [`TokenReader::read`].

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{io_error, Result};

pub const MAX_TOKEN_LENGTH: usize = 256;

/// The token standing for a line break.
pub const SENTENCE_END: &[u8] = b"</s>";

const BUFFER_SIZE: usize = 4 * 1024 * 1024;

pub struct TokenReader {
    path: PathBuf,
    file: File,
    offset: u64,
    length: u64,
    /// Bytes of the range not yet pulled into `buf`.
    remaining: u64,
    buf: Vec<u8>,
    pos: usize,
    end: usize,
    /// We are in the middle of a token that is too long and must be skipped.
    skipping: bool,
}

impl TokenReader {
    /// Read the whole file.
    pub fn open(path: &Path) -> Result<Self> {
        let length = std::fs::metadata(path)
            .map_err(io_error("checking size of", path))?
            .len();
        TokenReader::new(path, 0, length)
    }

    /// Read `length` bytes of `path` starting at byte `offset`.
    pub fn new(path: &Path, offset: u64, length: u64) -> Result<Self> {
        TokenReader::with_buffer_size(path, offset, length, BUFFER_SIZE)
    }

    pub(crate) fn with_buffer_size(
        path: &Path,
        offset: u64,
        length: u64,
        buffer_size: usize,
    ) -> Result<Self> {
        assert!(buffer_size > MAX_TOKEN_LENGTH);
        let file = File::open(path).map_err(io_error("opening", path))?;
        let mut reader = TokenReader {
            path: path.to_path_buf(),
            file,
            offset,
            length,
            remaining: 0,
            buf: vec![0; buffer_size],
            pos: 0,
            end: 0,
            skipping: false,
        };
        reader.restart()?;
        Ok(reader)
    }

    /// Go back to the start of the range.
    pub fn restart(&mut self) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(self.offset))
            .map_err(io_error("seeking in", &self.path))?;
        self.remaining = self.length;
        self.pos = 0;
        self.end = 0;
        self.skipping = false;
        Ok(())
    }

    /// True once every byte of the range has been consumed.
    pub fn is_done(&self) -> bool {
        self.pos == self.end && self.remaining == 0
    }

    /// Returns the next token, or `None` at the end of the range.
    pub fn read(&mut self) -> Result<Option<&[u8]>> {
        loop {
            if self.skipping {
                while self.pos < self.end && !is_separator(self.buf[self.pos]) {
                    self.pos += 1;
                }
                if self.pos == self.end {
                    if !self.refill()? {
                        return Ok(None);
                    }
                    continue;
                }
                self.skipping = false;
            }

            while self.pos < self.end && is_separator(self.buf[self.pos]) {
                let b = self.buf[self.pos];
                self.pos += 1;
                if b == b'\n' {
                    return Ok(Some(SENTENCE_END));
                }
            }
            if self.pos == self.end {
                if !self.refill()? {
                    return Ok(None);
                }
                continue;
            }

            let start = self.pos;
            let mut stop = start;
            while stop < self.end && !is_separator(self.buf[stop]) {
                stop += 1;
            }
            if stop == self.end && self.remaining > 0 {
                // The token may continue past the buffer.
                if stop - start > MAX_TOKEN_LENGTH {
                    self.pos = stop;
                    self.skipping = true;
                } else {
                    self.refill()?;
                }
                continue;
            }

            self.pos = stop;
            if stop - start > MAX_TOKEN_LENGTH {
                continue;
            }
            return Ok(Some(&self.buf[start..stop]));
        }
    }

    /// Move unread bytes to the front of the buffer and read more after them.
    /// Returns false if there was nothing left to read.
    fn refill(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            self.pos = self.end;
            return Ok(false);
        }
        self.buf.copy_within(self.pos..self.end, 0);
        self.end -= self.pos;
        self.pos = 0;

        let want = (self.buf.len() - self.end).min(self.remaining as usize);
        let mut got = 0;
        while got < want {
            match self.file.read(&mut self.buf[self.end + got..self.end + want]) {
                Ok(0) => {
                    // The file is shorter than the range we were given.
                    self.remaining = got as u64;
                    break;
                }
                Ok(n) => got += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_error("reading", &self.path)(e)),
            }
        }
        self.end += got;
        self.remaining -= got as u64;
        Ok(got > 0 || self.pos < self.end)
    }
}

fn is_separator(b: u8) -> bool {
    b.is_ascii_whitespace()
}
