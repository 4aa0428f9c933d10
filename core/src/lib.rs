/*
 * lib.rs
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

//! Engine for burl, an HTTP/1.x command-line transfer agent.
//!
//! Design:
//! - One request at a time on one connection; connections are reused only
//!   across redirects within a request.
//! - A hand-written incremental HTTP/1.x response parser over `bytes`
//!   buffers; TLS via tokio-rustls with native roots and webpki fallback.
//! - Forms (urlencoded, multipart) precompute Content-Length; the multipart
//!   serializer is resumable and re-opens files at send time.
//! - The cookie jar and sinks outlive attempts; everything else is rebuilt
//!   per attempt, and the retry driver decides what is worth repeating.

pub mod base64;
pub mod body;
pub mod config;
pub mod connect;
pub mod cookie;
pub mod error;
pub mod executor;
pub mod h1;
pub mod mime;
pub mod request;
pub mod retry;
pub mod sink;
pub mod stream;

pub use body::{Body, MultipartForm, UrlEncodedForm};
pub use config::{
    FailMode, OperationConfig, OutputTarget, RedirectConfig, RequestInfo, RetryConfig,
};
pub use cookie::CookieJar;
pub use error::{Error, Result};
pub use executor::Executor;
pub use sink::{Sink, Source};
