/*
 * cookie.rs
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

//! Cookie jar: Set-Cookie parsing, per-origin storage and selection
//! (RFC 6265 to a practical subset), and the Netscape cookie file format.
//!
//! Keyed by (domain, path, name); insertion updates value and attributes but
//! keeps the creation time. Expiry is checked lazily on access.

use chrono::{NaiveDateTime, Utc};
use url::Url;

/// One cookie as stored in the jar.
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lowercase, no leading dot.
    pub domain: String,
    /// Set when no Domain attribute was present; matches only the exact host.
    pub host_only: bool,
    pub path: String,
    /// Unix seconds; None for session cookies.
    pub expires: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    /// Persistent cookies survive `clear_session`.
    pub fn is_persistent(&self) -> bool {
        self.expires.is_some()
    }
}

/// A parsed `Set-Cookie` value, before origin scoping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

fn valid_name_byte(b: u8) -> bool {
    b > 0x20
        && b != 0x7f
        && !matches!(
            b,
            b'(' | b')'
                | b'<'
                | b'>'
                | b'@'
                | b','
                | b';'
                | b':'
                | b'\\'
                | b'"'
                | b'/'
                | b'['
                | b']'
                | b'?'
                | b'='
                | b'{'
                | b'}'
        )
}

/// Cookie date, both the RFC 1123 shape and the old dashed variant.
fn parse_date(s: &str) -> Option<i64> {
    let fmt = if s.contains('-') {
        "%a, %d-%b-%Y %H:%M:%S GMT"
    } else {
        "%a, %d %b %Y %H:%M:%S GMT"
    };
    NaiveDateTime::parse_from_str(s, fmt)
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Parse a `Set-Cookie` header value. Returns None for nameless or
/// malformed cookies. `Max-Age` overrides `Expires`.
pub fn parse_set_cookie(value: &str) -> Option<SetCookie> {
    let mut segments = value.split(';');
    let pair = segments.next()?;
    let eq = pair.find('=')?;
    let name = pair[..eq].trim();
    if name.is_empty() || !name.bytes().all(valid_name_byte) {
        return None;
    }
    let mut cookie = SetCookie {
        name: name.to_string(),
        value: pair[eq + 1..].trim().to_string(),
        ..SetCookie::default()
    };

    let mut max_age: Option<i64> = None;
    for segment in segments {
        let segment = segment.trim();
        let (attr, attr_value) = match segment.find('=') {
            Some(i) => (&segment[..i], Some(segment[i + 1..].trim())),
            None => (segment, None),
        };
        if attr.eq_ignore_ascii_case("Domain") {
            let v = attr_value?.trim_start_matches('.');
            if v.is_empty() {
                return None;
            }
            cookie.domain = Some(v.to_ascii_lowercase());
        } else if attr.eq_ignore_ascii_case("Path") {
            cookie.path = Some(attr_value?.to_string());
        } else if attr.eq_ignore_ascii_case("Expires") {
            cookie.expires = parse_date(attr_value?);
        } else if attr.eq_ignore_ascii_case("Max-Age") {
            max_age = attr_value?.parse::<i64>().ok();
        } else if attr.eq_ignore_ascii_case("Secure") {
            cookie.secure = true;
        } else if attr.eq_ignore_ascii_case("HttpOnly") {
            cookie.http_only = true;
        }
        // Unknown attributes (SameSite, Partitioned, ...) are ignored.
    }
    if let Some(seconds) = max_age {
        cookie.expires = Some(Utc::now().timestamp() + seconds);
    }
    Some(cookie)
}

/// Default cookie path for a request URL (RFC 6265 §5.1.4): everything up
/// to the last `/`, or `/`.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn domain_match(request_host: &str, cookie_domain: &str, host_only: bool) -> bool {
    if host_only {
        return request_host == cookie_domain;
    }
    if let Some(prefix) = request_host.strip_suffix(cookie_domain) {
        prefix.is_empty() || prefix.ends_with('.')
    } else {
        false
    }
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    if request_path.is_empty() {
        return true;
    }
    if let Some(rest) = request_path.strip_prefix(cookie_path) {
        rest.is_empty() || cookie_path.ends_with('/') || rest.starts_with('/')
    } else {
        false
    }
}

#[derive(Debug, Clone)]
struct Entry {
    created: u64,
    cookie: Cookie,
}

/// Cookie storage for the whole batch.
#[derive(Debug, Default)]
pub struct CookieJar {
    entries: Vec<Entry>,
    next_creation: u64,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a parsed Set-Cookie scoped to the response origin. Applies the
    /// domain/path defaulting and rejection rules; an expired cookie removes
    /// a matching stored one (server-driven deletion).
    pub fn add(&mut self, url: &Url, set: SetCookie) {
        let request_host = match url.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return,
        };

        let (domain, host_only) = match set.domain {
            Some(domain) => {
                // The request host must equal the domain or be a subdomain.
                if !domain_match(&request_host, &domain, false) {
                    return;
                }
                (domain, false)
            }
            None => (request_host, true),
        };

        let path = set.path.unwrap_or_else(|| default_path(url));

        // A Secure cookie set over plaintext is dropped.
        if set.secure && url.scheme() != "https" {
            return;
        }

        let cookie = Cookie {
            name: set.name,
            value: set.value,
            domain,
            host_only,
            path,
            expires: set.expires,
            secure: set.secure,
            http_only: set.http_only,
        };

        let existing = self.entries.iter().position(|e| {
            e.cookie.name == cookie.name
                && e.cookie.domain == cookie.domain
                && e.cookie.path == cookie.path
        });

        // Expiry is applied last so servers can delete cookies.
        let expired = cookie
            .expires
            .map(|t| t <= Utc::now().timestamp())
            .unwrap_or(false);

        match existing {
            Some(i) if expired => {
                self.entries.remove(i);
            }
            Some(i) => {
                // Update in place; creation time is preserved.
                self.entries[i].cookie = cookie;
            }
            None if expired => {}
            None => {
                let created = self.next_creation;
                self.next_creation += 1;
                self.entries.push(Entry { created, cookie });
            }
        }
    }

    /// Insert a cookie loaded from a file, preserving its stored scope.
    pub fn insert(&mut self, cookie: Cookie) {
        let created = self.next_creation;
        self.next_creation += 1;
        self.entries
            .retain(|e| {
                !(e.cookie.name == cookie.name
                    && e.cookie.domain == cookie.domain
                    && e.cookie.path == cookie.path)
            });
        self.entries.push(Entry { created, cookie });
    }

    /// Build the `Cookie:` header value for a URL: matching, unexpired
    /// cookies in longest-path-first, then creation-order. Empty string when
    /// nothing matches.
    pub fn make_field(&mut self, url: &Url) -> String {
        let now = Utc::now().timestamp();
        self.entries
            .retain(|e| e.cookie.expires.map(|t| t > now).unwrap_or(true));

        let request_host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let request_path = url.path();
        let is_secure = url.scheme() == "https";

        let mut matched: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|e| {
                domain_match(&request_host, &e.cookie.domain, e.cookie.host_only)
                    && path_match(request_path, &e.cookie.path)
                    && (!e.cookie.secure || is_secure)
            })
            .collect();
        matched.sort_by(|a, b| {
            b.cookie
                .path
                .len()
                .cmp(&a.cookie.path.len())
                .then(a.created.cmp(&b.created))
        });

        let mut field = String::new();
        for entry in matched {
            if !field.is_empty() {
                field.push_str("; ");
            }
            field.push_str(&entry.cookie.name);
            field.push('=');
            field.push_str(&entry.cookie.value);
        }
        field
    }

    /// Drop cookies without an explicit expiry (--junk-session-cookies).
    pub fn clear_session(&mut self) {
        self.entries.retain(|e| e.cookie.is_persistent());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.entries.iter().map(|e| &e.cookie)
    }

    /// Serialize in Netscape cookie file format.
    pub fn to_netscape(&self) -> String {
        let mut out = String::from("# Netscape HTTP Cookie File\n");
        for entry in &self.entries {
            let c = &entry.cookie;
            if c.http_only {
                out.push_str("#HttpOnly_");
            }
            let domain = if c.host_only {
                c.domain.clone()
            } else {
                format!(".{}", c.domain)
            };
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                domain,
                if c.host_only { "FALSE" } else { "TRUE" },
                c.path,
                if c.secure { "TRUE" } else { "FALSE" },
                c.expires.unwrap_or(0),
                c.name,
                c.value,
            ));
        }
        out
    }

    /// Load cookies from Netscape format text. Comment and unknown lines are
    /// ignored; `#HttpOnly_` marks HttpOnly entries.
    pub fn load_netscape(&mut self, text: &str) {
        for line in text.lines() {
            let (line, http_only) = match line.strip_prefix("#HttpOnly_") {
                Some(rest) => (rest, true),
                None => (line, false),
            };
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 7 {
                continue;
            }
            let include_subdomains = fields[1].eq_ignore_ascii_case("TRUE");
            let domain = fields[0].trim_start_matches('.').to_ascii_lowercase();
            if domain.is_empty() || fields[5].is_empty() {
                continue;
            }
            let Ok(expiry) = fields[4].parse::<i64>() else {
                continue;
            };
            self.insert(Cookie {
                name: fields[5].to_string(),
                value: fields[6].to_string(),
                domain,
                host_only: !include_subdomains,
                path: fields[2].to_string(),
                expires: (expiry != 0).then_some(expiry),
                secure: fields[3].eq_ignore_ascii_case("TRUE"),
                http_only,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn parse_basic_and_attributes() {
        let c = parse_set_cookie("sid=abc123; Path=/app; Secure; HttpOnly").unwrap();
        assert_eq!(c.name, "sid");
        assert_eq!(c.value, "abc123");
        assert_eq!(c.path.as_deref(), Some("/app"));
        assert!(c.secure);
        assert!(c.http_only);
        assert!(c.expires.is_none());
    }

    #[test]
    fn max_age_overrides_expires() {
        let c = parse_set_cookie(
            "a=1; Expires=Wed, 09 Jun 2021 10:18:14 GMT; Max-Age=60",
        )
        .unwrap();
        let expires = c.expires.unwrap();
        let now = Utc::now().timestamp();
        assert!((expires - now - 60).abs() <= 2);
    }

    #[test]
    fn expires_both_date_shapes() {
        let a = parse_set_cookie("a=1; Expires=Wed, 09 Jun 2021 10:18:14 GMT").unwrap();
        let b = parse_set_cookie("b=2; Expires=Wed, 09-Jun-2021 10:18:14 GMT").unwrap();
        assert_eq!(a.expires, b.expires);
        assert_eq!(a.expires, Some(1623233894));
    }

    #[test]
    fn nameless_cookie_rejected() {
        assert!(parse_set_cookie("=v").is_none());
        assert!(parse_set_cookie("novalue").is_none());
    }

    #[test]
    fn host_only_scoping() {
        let mut jar = CookieJar::new();
        jar.add(&url("http://example.test/a"), parse_set_cookie("a=1").unwrap());
        assert_eq!(jar.make_field(&url("http://example.test/a")), "a=1");
        assert_eq!(jar.make_field(&url("http://sub.example.test/a")), "");
    }

    #[test]
    fn domain_cookie_matches_subdomains() {
        let mut jar = CookieJar::new();
        jar.add(
            &url("http://sub.example.test/"),
            parse_set_cookie("a=1; Domain=example.test; Path=/").unwrap(),
        );
        assert_eq!(jar.make_field(&url("http://example.test/")), "a=1");
        assert_eq!(jar.make_field(&url("http://deep.sub.example.test/")), "a=1");
        assert_eq!(jar.make_field(&url("http://notexample.test/")), "");
    }

    #[test]
    fn foreign_domain_rejected() {
        let mut jar = CookieJar::new();
        jar.add(
            &url("http://example.test/"),
            parse_set_cookie("a=1; Domain=other.test").unwrap(),
        );
        assert!(jar.is_empty());
    }

    #[test]
    fn default_path_is_request_directory() {
        let mut jar = CookieJar::new();
        jar.add(&url("http://h.test/dir/page"), parse_set_cookie("a=1").unwrap());
        assert_eq!(jar.make_field(&url("http://h.test/dir/other")), "a=1");
        assert_eq!(jar.make_field(&url("http://h.test/dir")), "a=1");
        assert_eq!(jar.make_field(&url("http://h.test/dirx")), "");
        assert_eq!(jar.make_field(&url("http://h.test/")), "");
    }

    #[test]
    fn secure_cookie_only_over_https() {
        let mut jar = CookieJar::new();
        jar.add(
            &url("https://h.test/"),
            parse_set_cookie("s=1; Path=/; Secure").unwrap(),
        );
        assert_eq!(jar.make_field(&url("https://h.test/")), "s=1");
        assert_eq!(jar.make_field(&url("http://h.test/")), "");
    }

    #[test]
    fn selection_order_longest_path_then_creation() {
        let mut jar = CookieJar::new();
        let u = url("http://h.test/a/b/c");
        jar.add(&u, parse_set_cookie("first=1; Path=/").unwrap());
        jar.add(&u, parse_set_cookie("deep=2; Path=/a/b").unwrap());
        jar.add(&u, parse_set_cookie("second=3; Path=/").unwrap());
        assert_eq!(jar.make_field(&u), "deep=2; first=1; second=3");
    }

    #[test]
    fn update_preserves_creation_order() {
        let mut jar = CookieJar::new();
        let u = url("http://h.test/");
        jar.add(&u, parse_set_cookie("a=1; Path=/").unwrap());
        jar.add(&u, parse_set_cookie("b=2; Path=/").unwrap());
        jar.add(&u, parse_set_cookie("a=updated; Path=/").unwrap());
        assert_eq!(jar.make_field(&u), "a=updated; b=2");
    }

    #[test]
    fn server_can_delete_with_past_expiry() {
        let mut jar = CookieJar::new();
        let u = url("http://h.test/");
        jar.add(&u, parse_set_cookie("a=1; Path=/").unwrap());
        jar.add(
            &u,
            parse_set_cookie("a=gone; Path=/; Expires=Wed, 09 Jun 2021 10:18:14 GMT").unwrap(),
        );
        assert!(jar.is_empty());
    }

    #[test]
    fn clear_session_keeps_persistent() {
        let mut jar = CookieJar::new();
        let u = url("http://h.test/");
        jar.add(&u, parse_set_cookie("session=1; Path=/").unwrap());
        jar.add(&u, parse_set_cookie("persistent=1; Path=/; Max-Age=3600").unwrap());
        jar.clear_session();
        assert_eq!(jar.make_field(&u), "persistent=1");
    }

    #[test]
    fn netscape_round_trip() {
        let mut jar = CookieJar::new();
        let u = url("https://h.test/");
        jar.add(&u, parse_set_cookie("b=2; Path=/; Max-Age=60").unwrap());
        jar.add(&u, parse_set_cookie("hs=x; Path=/; HttpOnly").unwrap());
        let text = jar.to_netscape();

        let mut line_iter = text.lines();
        assert_eq!(line_iter.next(), Some("# Netscape HTTP Cookie File"));
        let b_line = text
            .lines()
            .find(|l| l.split('\t').nth(5) == Some("b"))
            .unwrap();
        let fields: Vec<&str> = b_line.split('\t').collect();
        assert_eq!(fields[0], "h.test");
        assert_eq!(fields[1], "FALSE");
        assert_eq!(fields[5], "b");
        assert_eq!(fields[6], "2");
        assert!(text.contains("#HttpOnly_h.test"));

        let mut reloaded = CookieJar::new();
        reloaded.load_netscape(&text);
        let cookies: Vec<_> = reloaded.iter().collect();
        assert_eq!(cookies.len(), 2);
        let b = reloaded.iter().find(|c| c.name == "b").unwrap();
        assert!(b.is_persistent());
        let hs = reloaded.iter().find(|c| c.name == "hs").unwrap();
        assert!(hs.http_only);
        assert!(!hs.is_persistent());
    }

    #[test]
    fn netscape_ignores_junk_lines() {
        let mut jar = CookieJar::new();
        jar.load_netscape("# comment\n\nnot a cookie line\nh.test\tFALSE\t/\tFALSE\t0\ta\t1\n");
        assert_eq!(jar.iter().count(), 1);
    }
}
