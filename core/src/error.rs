/*
 * error.rs
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

//! Transfer errors. One enum for the whole engine; the retry driver inspects
//! the variant to decide whether an attempt may be repeated.

use std::fmt;
use std::io;

/// Errors surfaced by the request executor and its collaborators.
#[derive(Debug)]
pub enum Error {
    /// Bad flags, unparseable URL, disallowed scheme.
    Config(String),
    /// Host name resolution failed.
    Resolve(String),
    /// TCP connect failed. `refused` distinguishes ECONNREFUSED for
    /// `--retry-connrefused`.
    Connect { message: String, refused: bool },
    /// TLS handshake or certificate verification failed.
    Tls(String),
    /// Malformed response, bad redirect, expectation violation.
    Protocol(String),
    /// Max-redirs exceeded, userinfo disallowed, status >= 400 under --fail.
    Policy(String),
    /// File open/read/write.
    Io(io::Error),
    /// Timeout or external cancellation.
    Cancel(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    pub fn cancel(msg: impl Into<String>) -> Self {
        Self::Cancel(msg.into())
    }

    /// True for timeouts and external cancellation.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancel(_))
    }

    /// True when the peer actively refused the TCP connection.
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::Connect { refused: true, .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(m) => write!(f, "{}", m),
            Error::Resolve(m) => write!(f, "Could not resolve host: {}", m),
            Error::Connect { message, .. } => write!(f, "{}", message),
            Error::Tls(m) => write!(f, "TLS error: {}", m),
            Error::Protocol(m) => write!(f, "{}", m),
            Error::Policy(m) => write!(f, "{}", m),
            Error::Io(e) => write!(f, "{}", e),
            Error::Cancel(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut => Self::Cancel(e.to_string()),
            io::ErrorKind::ConnectionRefused => Self::Connect {
                message: e.to_string(),
                refused: true,
            },
            _ => Self::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_io_error_maps_to_connect() {
        let e: Error = io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(e.is_connection_refused());
        assert!(!e.is_cancel());
    }

    #[test]
    fn timed_out_maps_to_cancel() {
        let e: Error = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(e.is_cancel());
    }
}
