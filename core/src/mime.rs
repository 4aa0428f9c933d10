/*
 * mime.rs
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

//! Media type detection for form file parts and Content-Disposition filename
//! extraction for `--remote-header-name`.

/// Content type for a file path, by extension. Unknown extensions get
/// application/octet-stream.
pub fn mime_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "htm" | "html" => "text/html",
        "pdf" => "application/pdf",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

/// Last path component of `path` (either separator accepted).
pub fn filename(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

fn is_attr_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '!' | '#' | '$' | '&' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~')
}

/// Read a parameter value starting at `rest`: either a quoted string with
/// backslash escapes or a bare token. Returns (value, remainder).
fn read_value(rest: &str) -> Option<(String, &str)> {
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, '"')) => {
            let mut value = String::new();
            let mut escaped = false;
            for (i, c) in chars {
                if escaped {
                    value.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    return Some((value, &rest[i + 1..]));
                } else {
                    value.push(c);
                }
            }
            None // unterminated quote
        }
        _ => {
            let end = rest
                .find(|c: char| !(is_attr_char(c) || c == '%'))
                .unwrap_or(rest.len());
            if end == 0 {
                return None;
            }
            Some((rest[..end].to_string(), &rest[end..]))
        }
    }
}

/// Extract the `filename` parameter from a Content-Disposition header value.
/// Returns None when the header carries no usable filename.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let mut rest = value;
    loop {
        rest = rest.trim_start_matches([';', ' ']);
        if rest.is_empty() {
            return None;
        }
        let name_end = rest.find(|c: char| !is_attr_char(c)).unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = &rest[name_end..];
        if let Some(stripped) = rest.strip_prefix('=') {
            let (value, remainder) = read_value(stripped)?;
            if name.eq_ignore_ascii_case("filename") {
                return Some(value);
            }
            rest = remainder;
        } else if name.is_empty() {
            // Unparseable junk; give up rather than loop.
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_by_extension() {
        assert_eq!(mime_type("avatar.jpeg"), "image/jpeg");
        assert_eq!(mime_type("a/b/logo.SVG"), "image/svg+xml");
        assert_eq!(mime_type("notes.txt"), "text/plain");
        assert_eq!(mime_type("blob"), "application/octet-stream");
    }

    #[test]
    fn filename_strips_directories() {
        assert_eq!(filename("/tmp/a/b.txt"), "b.txt");
        assert_eq!(filename("c:\\data\\b.txt"), "b.txt");
        assert_eq!(filename("plain"), "plain");
    }

    #[test]
    fn content_disposition_quoted() {
        let v = r#"attachment; filename="report final.pdf""#;
        assert_eq!(
            filename_from_content_disposition(v).as_deref(),
            Some("report final.pdf")
        );
    }

    #[test]
    fn content_disposition_token_and_escapes() {
        assert_eq!(
            filename_from_content_disposition("attachment; filename=data.bin").as_deref(),
            Some("data.bin")
        );
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="a\"b""#).as_deref(),
            Some(r#"a"b"#)
        );
    }

    #[test]
    fn content_disposition_missing() {
        assert_eq!(filename_from_content_disposition("inline"), None);
        assert_eq!(filename_from_content_disposition(""), None);
    }
}
