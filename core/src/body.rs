/*
 * body.rs
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

//! Request body producers: urlencoded and multipart forms.
//!
//! Both precompute an exact Content-Length. The multipart serializer is a
//! resumable byte source: it survives short writes, produces identical
//! output for any buffer size, and re-opens file parts at serialization
//! time. File sizes are snapshotted at append; a disagreement at serialize
//! time pads or truncates to the snapshot and marks the transfer failed so
//! the wire never contradicts Content-Length.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;

use crate::error::{Error, Result};
use crate::mime;

/// Everything outside the URL "pchar" set gets percent-encoded. `+` is
/// escaped too so that the space-as-plus convention stays reversible.
const FORM_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// Percent-encode `data` into `out` with space encoded as `+`.
pub fn append_form_encoded(out: &mut String, data: &[u8]) {
    let mut first = true;
    for chunk in data.split(|b| *b == b' ') {
        if !first {
            out.push('+');
        }
        first = false;
        for piece in percent_encode(chunk, FORM_ENCODE) {
            out.push_str(piece);
        }
    }
}

// ---------------------------------------------------------------------------

/// application/x-www-form-urlencoded accumulator (-d).
#[derive(Debug, Default, Clone)]
pub struct UrlEncodedForm {
    body: String,
}

impl UrlEncodedForm {
    pub fn new() -> Self {
        Self::default()
    }

    fn separate(&mut self) {
        if !self.body.is_empty() {
            self.body.push('&');
        }
    }

    /// Append `name[=value]`; the value is encoded, the name is taken as-is.
    pub fn append(&mut self, name: &str, value: &str) {
        self.separate();
        self.body.push_str(name);
        if !value.is_empty() {
            self.body.push('=');
        }
        append_form_encoded(&mut self.body, value.as_bytes());
    }

    /// Append raw pre-encoded data (an `a=1&b=2` fragment).
    pub fn append_raw(&mut self, data: &str) {
        self.separate();
        self.body.push_str(data);
    }

    /// Append file contents through the encoder.
    pub fn append_file_bytes(&mut self, data: &[u8]) {
        self.separate();
        append_form_encoded(&mut self.body, data);
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn content_type(&self) -> &'static str {
        "application/x-www-form-urlencoded"
    }

    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }
}

// ---------------------------------------------------------------------------

const BOUNDARY_STORAGE: usize = 2 + 46 + 2;

const CONTENT_DISPOSITION: &str = "\r\nContent-Disposition: form-data; name=\"";
const FILENAME: &str = "; filename=\"";
const CONTENT_TYPE: &str = "\r\nContent-Type: ";

/// One boundary per form: a 50-byte window of `-`, with 22 random
/// alphanumerics at bytes [26, 48). The Content-Type boundary parameter is
/// bytes [2, 48); the wire dash-boundary is [0, 48); the closing delimiter
/// is the whole window.
fn generate_boundary() -> [u8; BOUNDARY_STORAGE] {
    const CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let mut storage = [b'-'; BOUNDARY_STORAGE];
    for slot in &mut storage[2 + 24..BOUNDARY_STORAGE - 2] {
        *slot = CHARS[rng.gen_range(0..CHARS.len())];
    }
    storage
}

#[derive(Debug, Clone)]
enum PartData {
    Text(String),
    File(PathBuf),
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    /// Byte count captured at append time; the wire contract.
    size: u64,
    data: PartData,
}

/// multipart/form-data accumulator (-F).
#[derive(Debug, Clone)]
pub struct MultipartForm {
    storage: [u8; BOUNDARY_STORAGE],
    parts: Vec<Part>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            storage: generate_boundary(),
            parts: Vec::new(),
        }
    }

    pub fn append_text(&mut self, name: &str, value: &str, content_type: Option<String>) {
        self.parts.push(Part {
            name: name.to_string(),
            filename: None,
            content_type,
            size: value.len() as u64,
            data: PartData::Text(value.to_string()),
        });
    }

    /// Append a file part. The size is snapshotted now; serialization
    /// re-opens the file and enforces the snapshot.
    pub fn append_file(
        &mut self,
        name: &str,
        path: impl Into<PathBuf>,
        content_type: Option<String>,
    ) -> Result<()> {
        let path = path.into();
        let size = std::fs::metadata(&path)
            .map_err(|e| Error::config(format!("Couldn't open {}: {}", path.display(), e)))?
            .len();
        let filename = mime::filename(&path.to_string_lossy()).to_string();
        self.parts.push(Part {
            name: name.to_string(),
            filename: Some(filename),
            content_type,
            size,
            data: PartData::File(path),
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn content_type(&self) -> String {
        let mut out = String::from("multipart/form-data; boundary=");
        out.push_str(std::str::from_utf8(&self.storage[2..BOUNDARY_STORAGE - 2]).unwrap_or(""));
        out
    }

    pub fn content_length(&self) -> u64 {
        let mut total = 0u64;
        for part in &self.parts {
            total += (BOUNDARY_STORAGE - 2) as u64; // --boundary
            total += CONTENT_DISPOSITION.len() as u64;
            total += part.name.len() as u64;
            total += 1; // closing quote
            if let Some(filename) = &part.filename {
                total += FILENAME.len() as u64;
                total += filename.len() as u64;
                total += 1; // closing quote
            }
            if let Some(ct) = &part.content_type {
                total += CONTENT_TYPE.len() as u64;
                total += ct.len() as u64;
            }
            total += 4; // CRLF CRLF after the part header
            total += part.size;
            total += 2; // CRLF after the content
        }
        total += BOUNDARY_STORAGE as u64; // --boundary--
        total
    }

    /// Fresh serializer positioned at the start of the form.
    pub fn source(&self) -> MultipartSource<'_> {
        MultipartSource {
            form: self,
            part: 0,
            step: if self.parts.is_empty() {
                Step::Close
            } else {
                Step::Boundary
            },
            skip: 0,
            file: None,
            failed: None,
        }
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Boundary,
    Disposition,
    Name,
    NameQuote,
    FilenamePrefix,
    Filename,
    FilenameQuote,
    ContentTypePrefix,
    ContentTypeValue,
    HeaderEnd,
    Content,
    ContentCrlf,
    Close,
    Done,
}

/// Resumable multipart serializer. `read` fills as much of the buffer as it
/// can and returns the produced byte count; 0 means the form is finished.
pub struct MultipartSource<'a> {
    form: &'a MultipartForm,
    part: usize,
    step: Step,
    /// Bytes of the current segment already produced.
    skip: u64,
    file: Option<File>,
    failed: Option<String>,
}

impl MultipartSource<'_> {
    /// A size disagreement observed during serialization; the bytes were
    /// padded or truncated to the snapshot, and the transfer must fail.
    pub fn failure(&self) -> Option<Error> {
        self.failed.clone().map(Error::Protocol)
    }

    fn copy(slice: &[u8], skip: &mut u64, out: &mut [u8], produced: &mut usize) -> bool {
        let start = *skip as usize;
        let room = out.len() - *produced;
        let take = (slice.len() - start).min(room);
        out[*produced..*produced + take].copy_from_slice(&slice[start..start + take]);
        *produced += take;
        *skip += take as u64;
        if (*skip as usize) < slice.len() {
            return false;
        }
        *skip = 0;
        true
    }

    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let form = self.form;
        let mut produced = 0usize;
        while produced < out.len() {
            let Some(part) = form.parts.get(self.part) else {
                break;
            };
            let advanced = match self.step {
                Step::Boundary => Self::copy(
                    &form.storage[..BOUNDARY_STORAGE - 2],
                    &mut self.skip,
                    out,
                    &mut produced,
                ),
                Step::Disposition => Self::copy(
                    CONTENT_DISPOSITION.as_bytes(),
                    &mut self.skip,
                    out,
                    &mut produced,
                ),
                Step::Name => Self::copy(part.name.as_bytes(), &mut self.skip, out, &mut produced),
                Step::NameQuote => Self::copy(b"\"", &mut self.skip, out, &mut produced),
                Step::FilenamePrefix => {
                    Self::copy(FILENAME.as_bytes(), &mut self.skip, out, &mut produced)
                }
                Step::Filename => {
                    let filename = part.filename.as_deref().unwrap_or("");
                    Self::copy(filename.as_bytes(), &mut self.skip, out, &mut produced)
                }
                Step::FilenameQuote => Self::copy(b"\"", &mut self.skip, out, &mut produced),
                Step::ContentTypePrefix => {
                    Self::copy(CONTENT_TYPE.as_bytes(), &mut self.skip, out, &mut produced)
                }
                Step::ContentTypeValue => {
                    let ct = part.content_type.as_deref().unwrap_or("");
                    Self::copy(ct.as_bytes(), &mut self.skip, out, &mut produced)
                }
                Step::HeaderEnd => Self::copy(b"\r\n\r\n", &mut self.skip, out, &mut produced),
                Step::Content => match &part.data {
                    PartData::Text(value) => {
                        Self::copy(value.as_bytes(), &mut self.skip, out, &mut produced)
                    }
                    PartData::File(_) => self.read_file_content(part, out, &mut produced)?,
                },
                Step::ContentCrlf => Self::copy(b"\r\n", &mut self.skip, out, &mut produced),
                Step::Close | Step::Done => break,
            };
            if !advanced {
                return Ok(produced);
            }
            self.step = self.next_step(part);
        }

        if produced < out.len() && self.step == Step::Close {
            if Self::copy(&form.storage, &mut self.skip, out, &mut produced) {
                self.step = Step::Done;
            }
        }
        Ok(produced)
    }

    fn next_step(&mut self, part: &Part) -> Step {
        match self.step {
            Step::Boundary => Step::Disposition,
            Step::Disposition => Step::Name,
            Step::Name => Step::NameQuote,
            Step::NameQuote => {
                if part.filename.is_some() {
                    Step::FilenamePrefix
                } else if part.content_type.is_some() {
                    Step::ContentTypePrefix
                } else {
                    Step::HeaderEnd
                }
            }
            Step::FilenamePrefix => Step::Filename,
            Step::Filename => Step::FilenameQuote,
            Step::FilenameQuote => {
                if part.content_type.is_some() {
                    Step::ContentTypePrefix
                } else {
                    Step::HeaderEnd
                }
            }
            Step::ContentTypePrefix => Step::ContentTypeValue,
            Step::ContentTypeValue => Step::HeaderEnd,
            Step::HeaderEnd => Step::Content,
            Step::Content => Step::ContentCrlf,
            Step::ContentCrlf => {
                self.part += 1;
                self.file = None;
                if self.part == self.form.parts.len() {
                    Step::Close
                } else {
                    Step::Boundary
                }
            }
            Step::Close => Step::Done,
            Step::Done => Step::Done,
        }
    }

    /// Produce exactly `part.size` bytes for a file part, re-opening the
    /// file now. Shrunk files are zero-padded, grown files truncated; either
    /// way the mismatch is recorded as a failure.
    fn read_file_content(
        &mut self,
        part: &Part,
        out: &mut [u8],
        produced: &mut usize,
    ) -> Result<bool> {
        let PartData::File(path) = &part.data else {
            return Ok(true);
        };
        if self.file.is_none() && self.skip == 0 {
            let file = File::open(&path)
                .map_err(|e| Error::config(format!("Couldn't open {}: {}", path.display(), e)))?;
            let current = file.metadata().map_err(Error::Io)?.len();
            if current != part.size && self.failed.is_none() {
                self.failed = Some(format!(
                    "{}: size changed since it was added to the form",
                    path.display()
                ));
            }
            self.file = Some(file);
        }

        let remaining = (part.size - self.skip) as usize;
        let room = out.len() - *produced;
        let want = remaining.min(room);
        if want == 0 && remaining == 0 {
            self.skip = 0;
            self.file = None;
            return Ok(true);
        }

        let n = match &mut self.file {
            Some(file) => file.read(&mut out[*produced..*produced + want]).map_err(Error::Io)?,
            None => 0,
        };
        if n == 0 {
            // File ran dry before the snapshot; pad with zeros.
            if self.failed.is_none() {
                self.failed = Some(format!(
                    "{}: size changed since it was added to the form",
                    path.display()
                ));
            }
            out[*produced..*produced + want].fill(0);
            *produced += want;
            self.skip += want as u64;
        } else {
            *produced += n;
            self.skip += n as u64;
        }

        if self.skip == part.size {
            self.skip = 0;
            self.file = None;
            return Ok(true);
        }
        Ok(false)
    }
}

// ---------------------------------------------------------------------------

/// Message body attached to the request.
#[derive(Debug, Default, Clone)]
pub enum Body {
    #[default]
    None,
    UrlEncoded(UrlEncodedForm),
    Multipart(MultipartForm),
}

impl Body {
    pub fn is_none(&self) -> bool {
        matches!(self, Body::None)
    }

    pub fn content_type(&self) -> Option<String> {
        match self {
            Body::None => None,
            Body::UrlEncoded(form) => Some(form.content_type().to_string()),
            Body::Multipart(form) => Some(form.content_type()),
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        match self {
            Body::None => None,
            Body::UrlEncoded(form) => Some(form.content_length()),
            Body::Multipart(form) => Some(form.content_length()),
        }
    }

    /// Fresh serializer for one transmission of this body.
    pub fn source(&self) -> BodySource<'_> {
        match self {
            Body::None => BodySource::Empty,
            Body::UrlEncoded(form) => BodySource::Slice {
                data: form.as_str().as_bytes(),
                pos: 0,
            },
            Body::Multipart(form) => BodySource::Multipart(form.source()),
        }
    }
}

/// Byte source for one transmission of a body.
pub enum BodySource<'a> {
    Empty,
    Slice { data: &'a [u8], pos: usize },
    Multipart(MultipartSource<'a>),
}

impl BodySource<'_> {
    /// Fill `out`; 0 means the body is exhausted.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        match self {
            BodySource::Empty => Ok(0),
            BodySource::Slice { data, pos } => {
                let take = (data.len() - *pos).min(out.len());
                out[..take].copy_from_slice(&data[*pos..*pos + take]);
                *pos += take;
                Ok(take)
            }
            BodySource::Multipart(src) => src.read(out),
        }
    }

    /// Deferred failure (multipart size mismatch), checked after the last
    /// byte went out.
    pub fn failure(&self) -> Option<Error> {
        match self {
            BodySource::Multipart(src) => src.failure(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn decode_form(s: &str) -> Vec<u8> {
        let with_spaces = s.replace('+', " ");
        percent_encoding::percent_decode_str(&with_spaces)
            .collect::<Vec<u8>>()
    }

    #[test]
    fn urlencoded_encoding_round_trips() {
        let mut out = String::new();
        append_form_encoded(&mut out, b"a b+c/d~e&f");
        assert_eq!(out, "a+b%2Bc%2Fd~e&f");
        assert_eq!(decode_form(&out), b"a b+c/d~e&f");
    }

    #[test]
    fn urlencoded_form_layout() {
        let mut form = UrlEncodedForm::new();
        form.append("name", "Shadi M");
        form.append("flag", "");
        form.append("q", "1+1=2");
        // '=' is a pchar and rides through unencoded; '+' must not.
        assert_eq!(form.as_str(), "name=Shadi+M&flag&q=1%2B1=2");
        assert_eq!(form.content_length(), form.as_str().len() as u64);
    }

    fn drive(form: &MultipartForm, buf_size: usize) -> Vec<u8> {
        let mut src = form.source();
        let mut wire = Vec::new();
        let mut buf = vec![0u8; buf_size];
        loop {
            let n = src.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            wire.extend_from_slice(&buf[..n]);
        }
        assert!(src.failure().is_none());
        wire
    }

    #[test]
    fn multipart_length_matches_for_all_buffer_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avatar.jpeg");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut form = MultipartForm::new();
        form.append_text("name", "Shadi", None);
        form.append_file("img", &path, Some("image/jpeg".to_string()))
            .unwrap();

        let expected = form.content_length();
        let reference = drive(&form, 8192);
        assert_eq!(reference.len() as u64, expected);
        for size in [1, 2, 3, 7, 64, 1000] {
            assert_eq!(drive(&form, size), reference, "buffer size {}", size);
        }
    }

    #[test]
    fn multipart_boundary_shape() {
        let form = MultipartForm::new();
        let ct = form.content_type();
        let boundary = ct.strip_prefix("multipart/form-data; boundary=").unwrap();
        assert_eq!(boundary.len(), 46);
        assert!(boundary[..24].bytes().all(|b| b == b'-'));
        assert!(boundary[24..].bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn multipart_boundary_occurrences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avatar.jpeg");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut form = MultipartForm::new();
        form.append_text("name", "Shadi", None);
        form.append_file("img", &path, Some("image/jpeg".to_string()))
            .unwrap();

        let wire = String::from_utf8(drive(&form, 512)).unwrap();
        let ct = form.content_type();
        let boundary = ct.strip_prefix("multipart/form-data; boundary=").unwrap();
        let dash_boundary = format!("--{}", boundary);
        assert_eq!(wire.matches(&dash_boundary).count(), 3); // 2 parts + close
        assert!(wire.ends_with(&format!("--{}--", boundary)));
        assert!(wire.contains("Content-Disposition: form-data; name=\"img\"; filename=\"avatar.jpeg\""));
        assert!(wire.contains("Content-Type: image/jpeg"));
    }

    #[test]
    fn multipart_shrunk_file_pads_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&[9u8; 20]).unwrap();
        }
        let mut form = MultipartForm::new();
        form.append_file("f", &path, None).unwrap();
        let expected = form.content_length();

        std::fs::write(&path, &[9u8; 5]).unwrap(); // shrink after append

        let mut src = form.source();
        let mut wire = Vec::new();
        let mut buf = [0u8; 33];
        loop {
            let n = src.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            wire.extend_from_slice(&buf[..n]);
        }
        assert_eq!(wire.len() as u64, expected, "wire length must match");
        assert!(src.failure().is_some());
    }

    #[test]
    fn empty_form_is_close_delimiter_only() {
        let form = MultipartForm::new();
        assert_eq!(form.content_length(), 50);
        let wire = drive(&form, 16);
        assert_eq!(wire.len(), 50);
    }
}
