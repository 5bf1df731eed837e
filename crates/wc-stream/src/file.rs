// SPDX-License-Identifier: Apache-2.0
//! File-backed stream, optionally restricted to a half-open byte range.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{Mark, Result, Stream};

/// A stream backed by an open file handle, optionally clamped to
/// `[start, end)` so callers can stream a sub-range (e.g. a pristine blob
/// slice) without exposing the rest of the file.
pub struct FileStream {
    file: File,
    start: u64,
    end: Option<u64>,
}

impl FileStream {
    /// Open `path` for reading, streaming the whole file.
    pub fn open_read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file,
            start: 0,
            end: None,
        })
    }

    /// Open `path` for writing (truncating any existing content).
    pub fn create_write(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file,
            start: 0,
            end: None,
        })
    }

    /// Wrap an already-open file, restricting reads to `[start, end)`.
    pub fn ranged(mut file: File, start: u64, end: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            file,
            start,
            end: Some(end),
        })
    }
}

impl Stream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let cap = match self.end {
            Some(end) => {
                let pos = self.file.stream_position()?;
                if pos >= end {
                    return Ok(0);
                }
                buf.len().min(usize::try_from(end - pos).unwrap_or(usize::MAX))
            }
            None => buf.len(),
        };
        Ok(self.file.read(&mut buf[..cap])?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        Ok(self.file.write_all(buf)?)
    }

    fn close(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }

    fn mark(&mut self) -> Result<Mark> {
        Ok(Mark(self.file.stream_position()?))
    }

    fn seek(&mut self, mark: Mark) -> Result<()> {
        self.file.seek(SeekFrom::Start(mark.0))?;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.start))?;
        Ok(())
    }
}
