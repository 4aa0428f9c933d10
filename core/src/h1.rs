/*
 * h1.rs
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

//! HTTP/1.x response parser: status line, headers, body (Content-Length,
//! chunked, or read-until-close). Incremental: feed bytes as they arrive,
//! pull decoded body out. One parser instance serves a whole connection;
//! call `start` before each response.

use std::io::Write;

use bytes::{Buf, Bytes, BytesMut};
use flate2::write::{GzDecoder, ZlibDecoder};

use crate::error::{Error, Result};
use crate::request::{Headers, Version};

/// Parsed response head, available once `headers_complete` reports true.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    /// Connection: close requested, or implied by HTTP/1.0 without
    /// keep-alive.
    pub close: bool,
    /// The head exactly as received, for --show-headers / --dump-header.
    pub raw: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StatusLine,
    Headers,
    Body,
    UntilClose,
    ChunkSize,
    ChunkData,
    ChunkCrlf,
    ChunkTrailer,
    Complete,
}

enum ContentDecoder {
    Identity,
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl ContentDecoder {
    fn push(&mut self, raw: &[u8], out: &mut BytesMut) -> Result<()> {
        match self {
            ContentDecoder::Identity => {
                out.extend_from_slice(raw);
                Ok(())
            }
            ContentDecoder::Gzip(d) => {
                d.write_all(raw)
                    .map_err(|e| Error::protocol(format!("gzip decode failed: {}", e)))?;
                out.extend_from_slice(d.get_ref());
                d.get_mut().clear();
                Ok(())
            }
            ContentDecoder::Deflate(d) => {
                d.write_all(raw)
                    .map_err(|e| Error::protocol(format!("deflate decode failed: {}", e)))?;
                out.extend_from_slice(d.get_ref());
                d.get_mut().clear();
                Ok(())
            }
        }
    }

    fn finish(&mut self, out: &mut BytesMut) -> Result<()> {
        let buf = match std::mem::replace(self, ContentDecoder::Identity) {
            ContentDecoder::Identity => return Ok(()),
            ContentDecoder::Gzip(d) => d
                .finish()
                .map_err(|e| Error::protocol(format!("gzip stream truncated: {}", e)))?,
            ContentDecoder::Deflate(d) => d
                .finish()
                .map_err(|e| Error::protocol(format!("deflate stream truncated: {}", e)))?,
        };
        out.extend_from_slice(&buf);
        Ok(())
    }
}

/// Incremental HTTP/1.x response parser.
pub struct ResponseParser {
    decode_content: bool,
    body_limit: Option<u64>,
    state: State,
    head_request: bool,
    head: Option<ResponseHead>,
    raw_head: Vec<u8>,
    content_length: u64,
    body_received: u64,
    chunk_remaining: u64,
    decoder: ContentDecoder,
    input: BytesMut,
    out: BytesMut,
    delivered: u64,
}

impl ResponseParser {
    /// `decode_content` enables gzip/deflate decoding of the body;
    /// `body_limit` caps the delivered (decoded) byte count.
    pub fn new(decode_content: bool, body_limit: Option<u64>) -> Self {
        Self {
            decode_content,
            body_limit,
            state: State::Complete,
            head_request: false,
            head: None,
            raw_head: Vec::new(),
            content_length: 0,
            body_received: 0,
            chunk_remaining: 0,
            decoder: ContentDecoder::Identity,
            input: BytesMut::with_capacity(16 * 1024),
            out: BytesMut::new(),
            delivered: 0,
        }
    }

    /// Arm the parser for the next response on this connection. Unparsed
    /// bytes already fed (pipelined data) are kept. `head_request` elides
    /// the body per RFC 9112 §6.3.
    pub fn start(&mut self, head_request: bool) {
        self.state = State::StatusLine;
        self.head_request = head_request;
        self.head = None;
        self.raw_head.clear();
        self.content_length = 0;
        self.body_received = 0;
        self.chunk_remaining = 0;
        self.decoder = ContentDecoder::Identity;
        self.out.clear();
        self.delivered = 0;
    }

    /// Drop any buffered state, for a fresh connection.
    pub fn reset(&mut self) {
        self.input.clear();
        self.out.clear();
        self.state = State::Complete;
        self.head = None;
    }

    pub fn headers_complete(&self) -> bool {
        self.head.is_some()
    }

    pub fn head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Take whatever decoded body bytes are ready. Empty when more input is
    /// needed; check `is_complete` before reading more from the stream.
    pub fn pull_body(&mut self) -> Bytes {
        self.out.split().freeze()
    }

    /// Feed raw bytes from the stream and advance as far as possible.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.input.extend_from_slice(data);
        self.advance()
    }

    /// The stream reached EOF. Legal only for read-until-close bodies.
    pub fn on_eof(&mut self) -> Result<()> {
        match self.state {
            State::UntilClose => {
                let before = self.out.len();
                self.decoder.finish(&mut self.out)?;
                self.enforce_limit(self.out.len() - before)?;
                self.state = State::Complete;
                Ok(())
            }
            State::Complete => Ok(()),
            _ => Err(Error::protocol("connection closed mid-response")),
        }
    }

    fn find_crlf(buf: &[u8]) -> Option<usize> {
        buf.windows(2).position(|w| w == b"\r\n")
    }

    fn take_line(&mut self) -> Result<Option<String>> {
        let Some(end) = Self::find_crlf(&self.input) else {
            return Ok(None);
        };
        let line = self.input.split_to(end + 2);
        if matches!(self.state, State::StatusLine | State::Headers) {
            self.raw_head.extend_from_slice(&line);
        }
        let text = std::str::from_utf8(&line[..end])
            .map_err(|_| Error::protocol("response head is not valid UTF-8"))?;
        Ok(Some(text.to_string()))
    }

    fn advance(&mut self) -> Result<()> {
        loop {
            match self.state {
                State::StatusLine => {
                    let Some(line) = self.take_line()? else {
                        return Ok(());
                    };
                    self.parse_status_line(&line)?;
                    self.state = State::Headers;
                }
                State::Headers => {
                    let Some(line) = self.take_line()? else {
                        return Ok(());
                    };
                    if line.is_empty() {
                        self.finish_headers()?;
                        continue;
                    }
                    let Some(colon) = line.find(':') else {
                        return Err(Error::protocol("malformed header field"));
                    };
                    let name = line[..colon].trim().to_string();
                    let value = line[colon + 1..].trim().to_string();
                    if let Some(head) = &mut self.head {
                        head.headers.append(&name, value);
                    }
                }
                State::Body => {
                    if self.input.is_empty() {
                        return Ok(());
                    }
                    let remaining = (self.content_length - self.body_received) as usize;
                    let take = remaining.min(self.input.len());
                    let raw = self.input.split_to(take);
                    self.body_received += take as u64;
                    let before = self.out.len();
                    self.decoder.push(&raw, &mut self.out)?;
                    if self.body_received == self.content_length {
                        self.decoder.finish(&mut self.out)?;
                        self.state = State::Complete;
                    }
                    self.enforce_limit(self.out.len() - before)?;
                    return Ok(());
                }
                State::UntilClose => {
                    if self.input.is_empty() {
                        return Ok(());
                    }
                    let raw = self.input.split();
                    let before = self.out.len();
                    self.decoder.push(&raw, &mut self.out)?;
                    self.enforce_limit(self.out.len() - before)?;
                    return Ok(());
                }
                State::ChunkSize => {
                    let Some(line) = self.take_line()? else {
                        return Ok(());
                    };
                    let hex = line.split(';').next().unwrap_or("").trim();
                    let size = u64::from_str_radix(hex, 16)
                        .map_err(|_| Error::protocol("bad chunk size"))?;
                    if size == 0 {
                        self.state = State::ChunkTrailer;
                    } else {
                        self.chunk_remaining = size;
                        self.state = State::ChunkData;
                    }
                }
                State::ChunkData => {
                    if self.input.is_empty() {
                        return Ok(());
                    }
                    let take = (self.chunk_remaining as usize).min(self.input.len());
                    let raw = self.input.split_to(take);
                    self.chunk_remaining -= take as u64;
                    let before = self.out.len();
                    self.decoder.push(&raw, &mut self.out)?;
                    self.enforce_limit(self.out.len() - before)?;
                    if self.chunk_remaining == 0 {
                        self.state = State::ChunkCrlf;
                    }
                }
                State::ChunkCrlf => {
                    if self.input.len() < 2 {
                        return Ok(());
                    }
                    if &self.input[..2] != b"\r\n" {
                        return Err(Error::protocol("missing CRLF after chunk"));
                    }
                    self.input.advance(2);
                    self.state = State::ChunkSize;
                }
                State::ChunkTrailer => {
                    let Some(line) = self.take_line()? else {
                        return Ok(());
                    };
                    if line.is_empty() {
                        let before = self.out.len();
                        self.decoder.finish(&mut self.out)?;
                        self.enforce_limit(self.out.len() - before)?;
                        self.state = State::Complete;
                    }
                    // Trailer fields are consumed and ignored.
                }
                State::Complete => return Ok(()),
            }
        }
    }

    fn parse_status_line(&mut self, line: &str) -> Result<()> {
        let mut parts = line.splitn(3, ' ');
        let version = match parts.next() {
            Some("HTTP/1.1") => Version::Http11,
            Some("HTTP/1.0") => Version::Http10,
            _ => return Err(Error::protocol("unsupported protocol in status line")),
        };
        let status: u16 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::protocol("bad status code"))?;
        let reason = parts.next().unwrap_or("").to_string();
        self.head = Some(ResponseHead {
            version,
            status,
            reason,
            headers: Headers::new(),
            close: false,
            raw: Bytes::new(),
        });
        Ok(())
    }

    fn finish_headers(&mut self) -> Result<()> {
        let raw = Bytes::copy_from_slice(&self.raw_head);
        let head = self.head.as_mut().ok_or_else(|| Error::protocol("no status line"))?;
        head.raw = raw;

        let connection = head.headers.get("Connection").unwrap_or("");
        head.close = match head.version {
            Version::Http11 => token_listed(connection, "close"),
            Version::Http10 => !token_listed(connection, "keep-alive"),
        };

        let status = head.status;
        let chunked = head
            .headers
            .get("Transfer-Encoding")
            .map(|v| token_listed(v, "chunked"))
            .unwrap_or(false);
        let content_length = head
            .headers
            .get("Content-Length")
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|_| Error::protocol("bad Content-Length"))
            })
            .transpose()?;

        if self.decode_content {
            self.decoder = match head.headers.get("Content-Encoding").map(str::trim) {
                Some(e) if e.eq_ignore_ascii_case("gzip") => {
                    ContentDecoder::Gzip(GzDecoder::new(Vec::new()))
                }
                Some(e) if e.eq_ignore_ascii_case("deflate") => {
                    ContentDecoder::Deflate(ZlibDecoder::new(Vec::new()))
                }
                _ => ContentDecoder::Identity,
            };
        }

        // RFC 9112 §6.3: no body for HEAD, 1xx, 204, 304.
        if self.head_request || status < 200 || status == 204 || status == 304 {
            self.state = State::Complete;
        } else if chunked {
            self.state = State::ChunkSize;
        } else if let Some(len) = content_length {
            if len == 0 {
                self.state = State::Complete;
            } else {
                self.content_length = len;
                self.state = State::Body;
            }
        } else {
            self.state = State::UntilClose;
        }
        Ok(())
    }

    fn enforce_limit(&mut self, added: usize) -> Result<()> {
        self.delivered = self.delivered.saturating_add(added as u64);
        if let Some(limit) = self.body_limit {
            if self.delivered > limit {
                return Err(Error::policy("Exceeded the maximum allowed file size"));
            }
        }
        Ok(())
    }
}

/// True when `token` appears in a comma-separated header value.
fn token_listed(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut ResponseParser, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        parser.feed(data).unwrap();
        body.extend_from_slice(&parser.pull_body());
        body
    }

    #[test]
    fn content_length_body() {
        let mut p = ResponseParser::new(false, None);
        p.start(false);
        let body = feed_all(
            &mut p,
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
        );
        assert!(p.is_complete());
        assert_eq!(body, b"hello");
        let head = p.head().unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.version, Version::Http11);
        assert!(!head.close);
    }

    #[test]
    fn split_delivery_any_boundary() {
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n0123456789";
        for cut in 1..wire.len() {
            let mut p = ResponseParser::new(false, None);
            p.start(false);
            let mut body = Vec::new();
            p.feed(&wire[..cut]).unwrap();
            body.extend_from_slice(&p.pull_body());
            p.feed(&wire[cut..]).unwrap();
            body.extend_from_slice(&p.pull_body());
            assert!(p.is_complete(), "cut at {}", cut);
            assert_eq!(body, b"0123456789");
        }
    }

    #[test]
    fn chunked_body_with_trailer() {
        let mut p = ResponseParser::new(false, None);
        p.start(false);
        let body = feed_all(
            &mut p,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              4\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Checksum: abc\r\n\r\n",
        );
        assert!(p.is_complete());
        assert_eq!(body, b"Wikipedia");
    }

    #[test]
    fn head_response_has_no_body() {
        let mut p = ResponseParser::new(false, None);
        p.start(true);
        p.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")
            .unwrap();
        assert!(p.is_complete());
        assert!(p.pull_body().is_empty());
    }

    #[test]
    fn until_close_needs_eof() {
        let mut p = ResponseParser::new(false, None);
        p.start(false);
        p.feed(b"HTTP/1.0 200 OK\r\n\r\npartial").unwrap();
        assert!(!p.is_complete());
        assert_eq!(&p.pull_body()[..], b"partial");
        p.on_eof().unwrap();
        assert!(p.is_complete());
        assert!(p.head().unwrap().close);
    }

    #[test]
    fn connection_close_flag() {
        let mut p = ResponseParser::new(false, None);
        p.start(false);
        p.feed(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
        assert!(p.head().unwrap().close);
        assert!(p.is_complete());
    }

    #[test]
    fn interim_100_is_bodyless() {
        let mut p = ResponseParser::new(false, None);
        p.start(false);
        p.feed(b"HTTP/1.1 100 Continue\r\n\r\n").unwrap();
        assert!(p.is_complete());
        assert_eq!(p.head().unwrap().status, 100);
    }

    #[test]
    fn body_limit_enforced() {
        let mut p = ResponseParser::new(false, Some(4));
        p.start(false);
        let err = p
            .feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap_err();
        assert!(matches!(err, Error::Policy(_)));
    }

    #[test]
    fn gzip_body_decodes() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"compressed payload").unwrap();
        let gz = enc.finish().unwrap();

        let mut wire = format!(
            "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
            gz.len()
        )
        .into_bytes();
        wire.extend_from_slice(&gz);

        let mut p = ResponseParser::new(true, None);
        p.start(false);
        let body = feed_all(&mut p, &wire);
        assert!(p.is_complete());
        assert_eq!(body, b"compressed payload");
    }

    #[test]
    fn second_response_after_start() {
        let mut p = ResponseParser::new(false, None);
        p.start(false);
        p.feed(b"HTTP/1.1 302 Found\r\nLocation: /b\r\nContent-Length: 0\r\n\r\n")
            .unwrap();
        assert!(p.is_complete());
        p.start(false);
        p.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .unwrap();
        assert!(p.is_complete());
        assert_eq!(&p.pull_body()[..], b"ok");
    }
}
