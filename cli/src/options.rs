/*
 * options.rs
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

//! Command-line surface (a subset of curl's flags) and its translation into
//! the engine's OperationConfig plus the initial cookie jar.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use burl_core::body::{Body, MultipartForm, UrlEncodedForm};
use burl_core::config::{
    FailMode, OperationConfig, OutputTarget, RedirectConfig, RequestInfo, RetryConfig,
};
use burl_core::cookie::CookieJar;
use burl_core::error::{Error, Result};
use burl_core::mime;
use burl_core::sink::Source;

#[derive(Debug, Parser)]
#[command(
    name = "burl",
    version,
    about = "HTTP/1.x command-line transfer agent",
    after_help = "Example:\n    burl https://www.example.com\n    burl -L http://httpstat.us/301\n    burl https://httpbin.org/post -F name=Shadi -F img=@./avatar.jpeg"
)]
pub struct Args {
    /// URL(s) to work with
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// URL to work with
    #[arg(long, value_name = "URL")]
    pub url: Vec<String>,

    /// HTTP POST data
    #[arg(short = 'd', long = "data", value_name = "DATA")]
    pub data: Vec<String>,

    /// Put the post data in the URL and use GET
    #[arg(short = 'G', long = "get")]
    pub get: bool,

    /// Specify multipart MIME data
    #[arg(short = 'F', long = "form", value_name = "NAME=CONTENT")]
    pub form: Vec<String>,

    /// Specify multipart MIME data (value taken literally)
    #[arg(long = "form-string", value_name = "NAME=STRING")]
    pub form_string: Vec<String>,

    /// Pass custom header(s) to server
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub header: Vec<String>,

    /// Show document info only
    #[arg(short = 'I', long = "head")]
    pub head: bool,

    /// Specify request method to use
    #[arg(short = 'X', long = "request", value_name = "METHOD")]
    pub request: Option<String>,

    /// Specify the target for this request
    #[arg(long = "request-target", value_name = "PATH")]
    pub request_target: Option<String>,

    /// Follow redirects
    #[arg(short = 'L', long = "location")]
    pub location: bool,

    /// Like --location, and send auth to other hosts
    #[arg(long = "location-trusted")]
    pub location_trusted: bool,

    /// Write to file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Vec<String>,

    /// Write output to a file named as the remote file
    #[arg(short = 'O', long = "remote-name")]
    pub remote_name: bool,

    /// Directory to save files in
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Create necessary local directory hierarchy
    #[arg(long = "create-dirs")]
    pub create_dirs: bool,

    /// Use the header-provided filename
    #[arg(short = 'J', long = "remote-header-name")]
    pub remote_header_name: bool,

    /// Retrieve only the bytes within range
    #[arg(short = 'r', long = "range", value_name = "RANGE")]
    pub range: Option<String>,

    /// Resume transfer offset
    #[arg(short = 'C', long = "continue-at", value_name = "OFFSET")]
    pub continue_at: Option<u64>,

    /// Referer URL; append ";auto" to follow redirects
    #[arg(short = 'e', long = "referer", value_name = "URL")]
    pub referer: Option<String>,

    /// Server user and password
    #[arg(short = 'u', long = "user", value_name = "USER:PASSWORD")]
    pub user: Option<String>,

    /// Send User-Agent <name> to server
    #[arg(short = 'A', long = "user-agent", value_name = "NAME")]
    pub user_agent: Option<String>,

    /// Request compressed response
    #[arg(long)]
    pub compressed: bool,

    /// Show response headers in the output
    #[arg(short = 'i', long = "show-headers", alias = "include")]
    pub show_headers: bool,

    /// Write the received headers to <filename>
    #[arg(short = 'D', long = "dump-header", value_name = "FILENAME")]
    pub dump_header: Option<PathBuf>,

    /// Use HTTP 1.0
    #[arg(long = "http1.0")]
    pub http10: bool,

    /// Send cookies from string/file
    #[arg(short = 'b', long = "cookie", value_name = "DATA|FILENAME")]
    pub cookie: Vec<String>,

    /// Write cookies to <filename> after operation
    #[arg(short = 'c', long = "cookie-jar", value_name = "FILENAME")]
    pub cookie_jar: Option<PathBuf>,

    /// Ignore session cookies read from file
    #[arg(short = 'j', long = "junk-session-cookies")]
    pub junk_session_cookies: bool,

    /// Maximum number of redirects allowed (negative means unlimited)
    #[arg(long = "max-redirs", value_name = "NUM", allow_negative_numbers = true)]
    pub max_redirs: Option<i32>,

    /// Enable/disable PROTOCOLS on redirect
    #[arg(long = "proto-redir", value_name = "PROTOCOL")]
    pub proto_redir: Vec<String>,

    /// Do not switch to GET after following a 301
    #[arg(long)]
    pub post301: bool,

    /// Do not switch to GET after following a 302
    #[arg(long)]
    pub post302: bool,

    /// Do not switch to GET after following a 303
    #[arg(long)]
    pub post303: bool,

    /// Allow sending auth to hosts other than the first
    #[arg(long = "unrestricted-auth")]
    pub unrestricted_auth: bool,

    /// Maximum time allowed for connection
    #[arg(long = "connect-timeout", value_name = "FRAC SEC")]
    pub connect_timeout: Option<f64>,

    /// Maximum time allowed for transfer
    #[arg(long = "max-time", value_name = "FRAC SEC")]
    pub max_time: Option<f64>,

    /// How long to wait for 100-continue
    #[arg(long = "expect100-timeout", value_name = "FRAC SEC")]
    pub expect100_timeout: Option<f64>,

    /// Maximum file size to download
    #[arg(long = "max-filesize", value_name = "BYTES")]
    pub max_filesize: Option<u64>,

    /// Retry request if transient problems occur
    #[arg(long, value_name = "NUM")]
    pub retry: Option<u32>,

    /// Wait time between retries
    #[arg(long = "retry-delay", value_name = "SECONDS")]
    pub retry_delay: Option<f64>,

    /// Retry only within this period
    #[arg(long = "retry-max-time", value_name = "SECONDS")]
    pub retry_max_time: Option<f64>,

    /// Retry all errors (use with --retry)
    #[arg(long = "retry-all-errors")]
    pub retry_all_errors: bool,

    /// Retry on connection refused (use with --retry)
    #[arg(long = "retry-connrefused")]
    pub retry_connrefused: bool,

    /// Use this proxy
    #[arg(short = 'x', long = "proxy", value_name = "URL")]
    pub proxy: Option<String>,

    /// Limit upload rate in bytes per second
    #[arg(long = "send-per-second", value_name = "BYTES")]
    pub send_per_second: Option<u64>,

    /// Limit download rate in bytes per second
    #[arg(long = "recv-per-second", value_name = "BYTES")]
    pub recv_per_second: Option<u64>,

    /// Fail fast with no output on HTTP errors
    #[arg(short = 'f', long)]
    pub fail: bool,

    /// Fail on HTTP errors but save the body
    #[arg(long = "fail-with-body")]
    pub fail_with_body: bool,

    /// Remove output file on errors
    #[arg(long = "remove-on-error")]
    pub remove_on_error: bool,

    /// Disable output buffering
    #[arg(short = 'N', long = "no-buffer")]
    pub no_buffer: bool,
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}

/// One -F argument: `name=value[;filename=...][;type=...]`. A value
/// starting with `@` is a file part.
fn parse_form_arg(arg: &str) -> Result<(String, String, Option<String>, Option<String>)> {
    let (name, rest) = arg
        .split_once('=')
        .ok_or_else(|| Error::config("Illegally formatted input field"))?;
    let mut segments = rest.split(';');
    let value = unquote(segments.next().unwrap_or("")).to_string();
    let mut filename = None;
    let mut content_type = None;
    for segment in segments {
        let Some((key, v)) = segment.trim().split_once('=') else {
            return Err(Error::config("Illegally formatted input field"));
        };
        match key.trim() {
            "filename" => filename = Some(unquote(v).to_string()),
            "type" => content_type = Some(unquote(v).to_string()),
            _ => return Err(Error::config("Illegally formatted input field")),
        }
    }
    Ok((name.to_string(), value, filename, content_type))
}

/// Accumulate -d options into a urlencoded form.
fn build_data(args: &Args) -> Result<Option<UrlEncodedForm>> {
    if args.data.is_empty() {
        return Ok(None);
    }
    let mut form = UrlEncodedForm::new();
    for item in &args.data {
        if let Some(path) = item.strip_prefix('@') {
            let text = Source::open(path)?.read_stripped()?;
            form.append_file_bytes(text.as_bytes());
        } else if let Some((name, value)) = item.split_once('=') {
            form.append(name, value);
        } else {
            form.append(item, "");
        }
    }
    Ok(Some(form))
}

/// Accumulate -F / --form-string options into a multipart form.
fn build_form(args: &Args) -> Result<Option<MultipartForm>> {
    if args.form.is_empty() && args.form_string.is_empty() {
        return Ok(None);
    }
    let mut form = MultipartForm::new();
    for item in &args.form {
        let (name, value, filename, mut content_type) = parse_form_arg(item)?;
        if let Some(path) = value.strip_prefix('@') {
            if content_type.is_none() {
                content_type = Some(mime::mime_type(path).to_string());
            }
            form.append_file(&name, path, content_type)?;
            let _ = filename; // the part keeps the file's own basename
        } else {
            form.append_text(&name, &value, content_type);
        }
    }
    for item in &args.form_string {
        let (name, value) = item
            .split_once('=')
            .ok_or_else(|| Error::config("Illegally formatted input field"))?;
        form.append_text(name, value, None);
    }
    Ok(Some(form))
}

/// Everything main() needs to run the batch.
pub struct Invocation {
    pub config: OperationConfig,
    pub jar: Option<CookieJar>,
}

impl Args {
    pub fn into_invocation(self) -> Result<Invocation> {
        if self.fail && self.fail_with_body {
            return Err(Error::config(
                "You must select either --fail or --fail-with-body, not both.",
            ));
        }
        if (self.head || self.show_headers) && self.remote_header_name {
            return Err(Error::config(
                "showing headers and --remote-header-name cannot be combined",
            ));
        }
        if !self.data.is_empty() && (!self.form.is_empty() || !self.form_string.is_empty()) {
            return Err(Error::config("You can only select one HTTP request method"));
        }

        let mut all_urls: Vec<String> = self.url.clone();
        all_urls.extend(self.urls.iter().cloned());
        if all_urls.is_empty() {
            return Err(Error::config("no URL specified"));
        }

        // Pair -o values with URLs in order; leftover URLs fall back to -O
        // or stdout.
        let urls = all_urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                let output = match self.output.get(i) {
                    Some(path) => OutputTarget::Path(PathBuf::from(path)),
                    None if self.remote_name => OutputTarget::RemoteName,
                    None => OutputTarget::Stdout,
                };
                RequestInfo { url, output }
            })
            .collect();

        let (referer, autoreferer) = match &self.referer {
            Some(value) => match value.strip_suffix(";auto") {
                Some(prefix) if prefix.is_empty() => (None, true),
                Some(prefix) => (Some(prefix.to_string()), true),
                None => (Some(value.clone()), false),
            },
            None => (None, false),
        };

        let proxy = self
            .proxy
            .as_ref()
            .map(|p| Url::parse(p).map_err(|e| Error::config(format!("Failed to parse proxy: {}", e))))
            .transpose()?;

        let data = build_data(&self)?;
        let form = build_form(&self)?;
        let mut query = None;
        let body = if let Some(form) = form {
            Body::Multipart(form)
        } else if let Some(data) = data {
            if self.get {
                query = Some(data.as_str().to_string());
                Body::None
            } else {
                Body::UrlEncoded(data)
            }
        } else {
            Body::None
        };

        // Any -b/-c switches the cookie engine on; -b values with '=' are
        // explicit cookies, anything else names a cookie file.
        let cookie_engine = !self.cookie.is_empty() || self.cookie_jar.is_some();
        let mut jar = cookie_engine.then(CookieJar::new);
        let mut explicit_cookies = String::new();
        for option in &self.cookie {
            if option.contains('=') {
                if !explicit_cookies.is_empty() {
                    explicit_cookies.push_str("; ");
                }
                explicit_cookies.push_str(option.trim());
            } else if !option.is_empty() {
                let text_bytes = Source::open(option)?.read_all()?;
                let text = String::from_utf8_lossy(&text_bytes);
                if let Some(jar) = jar.as_mut() {
                    jar.load_netscape(&text);
                }
            }
        }
        if self.junk_session_cookies {
            if let Some(jar) = jar.as_mut() {
                jar.clear_session();
            }
        }

        let redirect = RedirectConfig {
            follow: self.location || self.location_trusted,
            max_redirects: match self.max_redirs {
                Some(n) if n < 0 => u32::MAX,
                Some(n) => n as u32,
                None => 50,
            },
            allow_http: self.proto_redir.is_empty() || self.proto_redir.iter().any(|s| s == "http"),
            allow_https: self.proto_redir.is_empty()
                || self.proto_redir.iter().any(|s| s == "https"),
            post301: self.post301,
            post302: self.post302,
            post303: self.post303,
        };

        let retry = RetryConfig {
            retries: self.retry.unwrap_or(0),
            max_time: self.retry_max_time.map(seconds),
            delay: self.retry_delay.map(seconds),
            all_errors: self.retry_all_errors,
            connrefused: self.retry_connrefused,
        };

        let fail = if self.fail {
            FailMode::Fail
        } else if self.fail_with_body {
            FailMode::FailWithBody
        } else {
            FailMode::None
        };

        let config = OperationConfig {
            urls,
            method: self.request,
            no_body: self.head,
            http10: self.http10,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| "Boost.Http.Io".to_string()),
            referer,
            autoreferer,
            credentials: self.user,
            headers: self.header,
            query,
            output_dir: self.output_dir,
            create_dirs: self.create_dirs,
            proxy,
            redirect,
            unrestricted_auth: self.unrestricted_auth || self.location_trusted,
            connect_timeout: self.connect_timeout.map(seconds),
            expect100_timeout: self.expect100_timeout.map(seconds).unwrap_or(Duration::from_secs(1)),
            max_time: self.max_time.map(seconds),
            max_filesize: self.max_filesize,
            send_per_second: self.send_per_second,
            recv_per_second: self.recv_per_second,
            retry,
            fail,
            compressed: self.compressed,
            continue_at: self.continue_at,
            range: self.range,
            show_headers: self.show_headers || self.head,
            dump_header: self.dump_header,
            remote_header_name: self.remote_header_name,
            remove_on_error: self.remove_on_error,
            no_buffer: self.no_buffer,
            request_target: self.request_target,
            cookie_engine,
            cookie_jar_path: self.cookie_jar,
            explicit_cookies,
            body,
        };

        Ok(Invocation { config, jar })
    }
}
