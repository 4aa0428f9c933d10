/*
 * sink.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Burl, an HTTP(S) command-line transfer agent.
 *
 * Burl is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Burl is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Burl.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Output sinks and input sources. `"-"` means stdout (or stdin for input),
//! `"%"` means stderr; anything else is a regular file. TTY detection is
//! consulted only for the standard streams.

use std::fs::File;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug)]
enum SinkKind {
    Stdout,
    Stderr,
    File(File),
}

/// Unified write target for response bodies and dumped headers.
#[derive(Debug)]
pub struct Sink {
    kind: SinkKind,
    path: Option<PathBuf>,
    is_tty: bool,
    /// Flush after every write (--no-buffer).
    pub unbuffered: bool,
}

impl Sink {
    /// Stdout sink (the default destination).
    pub fn stdout() -> Self {
        Self {
            kind: SinkKind::Stdout,
            path: None,
            is_tty: io::stdout().is_terminal(),
            unbuffered: false,
        }
    }

    /// Open a sink from a path token: `-` stdout, `%` stderr, else a file.
    /// A failed file open is a configuration error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new("-") {
            return Ok(Self::stdout());
        }
        if path == Path::new("%") {
            return Ok(Self {
                kind: SinkKind::Stderr,
                path: None,
                is_tty: io::stderr().is_terminal(),
                unbuffered: false,
            });
        }
        let file = File::create(path)
            .map_err(|e| Error::config(format!("Couldn't open {}: {}", path.display(), e)))?;
        Ok(Self {
            kind: SinkKind::File(file),
            path: Some(path.to_path_buf()),
            is_tty: false,
            unbuffered: false,
        })
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, SinkKind::File(_))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append bytes. File errors propagate; the standard streams report
    /// errors too (a broken pipe on stdout is fatal to the transfer).
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.kind {
            SinkKind::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(data).map_err(Error::Io)?;
                if self.unbuffered {
                    out.flush().map_err(Error::Io)?;
                }
            }
            SinkKind::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(data).map_err(Error::Io)?;
            }
            SinkKind::File(f) => {
                f.write_all(data).map_err(Error::Io)?;
                if self.unbuffered {
                    f.flush().map_err(Error::Io)?;
                }
            }
        }
        Ok(())
    }

    /// Unlink the backing file, if any. No-op for the standard streams.
    /// Closes the handle first so the unlink works on every platform.
    pub fn remove_file(&mut self) -> bool {
        let Some(path) = self.path.take() else {
            return false;
        };
        self.kind = SinkKind::Stdout;
        self.is_tty = io::stdout().is_terminal();
        std::fs::remove_file(&path).is_ok()
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::stdout()
    }
}

enum SourceKind {
    Stdin,
    File(File),
}

/// Unified read source for `-d @file`, cookie files, and form file parts
/// read eagerly. `-` means stdin.
pub struct Source {
    kind: SourceKind,
}

impl Source {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new("-") {
            return Ok(Self {
                kind: SourceKind::Stdin,
            });
        }
        let file = File::open(path)
            .map_err(|e| Error::config(format!("Couldn't open {}: {}", path.display(), e)))?;
        Ok(Self {
            kind: SourceKind::File(file),
        })
    }

    /// Read the whole source into a byte vector.
    pub fn read_all(mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match &mut self.kind {
            SourceKind::Stdin => io::stdin().lock().read_to_end(&mut buf).map_err(Error::Io)?,
            SourceKind::File(f) => f.read_to_end(&mut buf).map_err(Error::Io)?,
        };
        Ok(buf)
    }

    /// Read the whole source as text, stripping CR, LF, and NUL bytes
    /// (ASCII mode for `-d @file`).
    pub fn read_stripped(self) -> Result<String> {
        let raw = self.read_all()?;
        let mut out = String::with_capacity(raw.len());
        for &b in &raw {
            if b != b'\r' && b != b'\n' && b != 0 {
                out.push(b as char);
            }
        }
        Ok(out)
    }
}
