/*
 * config.rs
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

//! Operation configuration: everything decided before the first byte moves.
//! Immutable for the whole batch; per-request state lives in the executor.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::body::Body;

/// Where a response body goes when no Content-Disposition override applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputTarget {
    #[default]
    Stdout,
    /// Fixed path from -o (`-` and `%` keep their sink meaning).
    Path(PathBuf),
    /// Last non-empty URL path segment, fallback "burl_response" (-O).
    RemoteName,
}

/// One entry in the batch: a URL and its output policy.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub url: String,
    pub output: OutputTarget,
}

/// Redirect handling switches.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    pub follow: bool,
    pub max_redirects: u32,
    /// Schemes a redirect may switch to (--proto-redir).
    pub allow_http: bool,
    pub allow_https: bool,
    /// Keep the method on 301/302/303 (--post301/302/303).
    pub post301: bool,
    pub post302: bool,
    pub post303: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            follow: false,
            max_redirects: 50,
            allow_http: true,
            allow_https: true,
            post301: false,
            post302: false,
            post303: false,
        }
    }
}

/// Retry driver parameters (--retry and friends).
#[derive(Debug, Clone, Default)]
pub struct RetryConfig {
    /// Number of retries after the first attempt.
    pub retries: u32,
    /// Wallclock budget for all retries, measured from driver start.
    pub max_time: Option<Duration>,
    /// Fixed delay; None selects exponential backoff.
    pub delay: Option<Duration>,
    pub all_errors: bool,
    pub connrefused: bool,
}

/// --fail / --fail-with-body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailMode {
    #[default]
    None,
    /// Fail fast with no output on HTTP errors.
    Fail,
    /// Deliver the body first, then fail.
    FailWithBody,
}

/// Immutable configuration for one invocation.
#[derive(Debug, Clone)]
pub struct OperationConfig {
    pub urls: Vec<RequestInfo>,
    /// -X override.
    pub method: Option<String>,
    /// -I: HEAD, show headers, no body.
    pub no_body: bool,
    pub http10: bool,
    pub user_agent: String,
    pub referer: Option<String>,
    /// --referer ';auto' / autoreferer.
    pub autoreferer: bool,
    /// -u user:password (URL userinfo is the fallback).
    pub credentials: Option<String>,
    /// Raw -H values; "Name: v" sets, "Name;" sets empty, "Name:" removes.
    pub headers: Vec<String>,
    /// Query string appended to every URL (-G data).
    pub query: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub create_dirs: bool,
    pub proxy: Option<Url>,
    pub redirect: RedirectConfig,
    pub unrestricted_auth: bool,
    pub connect_timeout: Option<Duration>,
    pub expect100_timeout: Duration,
    pub max_time: Option<Duration>,
    pub max_filesize: Option<u64>,
    pub send_per_second: Option<u64>,
    pub recv_per_second: Option<u64>,
    pub retry: RetryConfig,
    pub fail: FailMode,
    pub compressed: bool,
    /// -C resume offset.
    pub continue_at: Option<u64>,
    /// -r range spec (the part after "bytes=").
    pub range: Option<String>,
    pub show_headers: bool,
    pub dump_header: Option<PathBuf>,
    pub remote_header_name: bool,
    pub remove_on_error: bool,
    pub no_buffer: bool,
    /// --request-target override.
    pub request_target: Option<String>,
    /// Cookie engine on (any -b/-c seen).
    pub cookie_engine: bool,
    pub cookie_jar_path: Option<PathBuf>,
    /// Pre-joined explicit -b name=value cookies ("a=1; b=2").
    pub explicit_cookies: String,
    pub body: Body,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            method: None,
            no_body: false,
            http10: false,
            user_agent: "Boost.Http.Io".to_string(),
            referer: None,
            autoreferer: false,
            credentials: None,
            headers: Vec::new(),
            query: None,
            output_dir: None,
            create_dirs: false,
            proxy: None,
            redirect: RedirectConfig::default(),
            unrestricted_auth: false,
            connect_timeout: None,
            expect100_timeout: Duration::from_secs(1),
            max_time: None,
            max_filesize: None,
            send_per_second: None,
            recv_per_second: None,
            retry: RetryConfig::default(),
            fail: FailMode::None,
            compressed: false,
            continue_at: None,
            range: None,
            show_headers: false,
            dump_header: None,
            remote_header_name: false,
            remove_on_error: false,
            no_buffer: false,
            request_target: None,
            cookie_engine: false,
            cookie_jar_path: None,
            explicit_cookies: String::new(),
            body: Body::None,
        }
    }
}
