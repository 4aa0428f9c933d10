/*
 * connect.rs
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

//! Connection establishment: resolve the authority, open the socket,
//! optionally tunnel through an HTTP or SOCKS5 proxy, optionally perform the
//! TLS handshake with SNI. The proxy authority is resolved instead of the
//! target's when a proxy is configured.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use url::Url;

use crate::base64;
use crate::error::{Error, Result};
use crate::h1::ResponseParser;
use crate::request::{Method, Request, Version};
use crate::stream::Stream;

/// Default port for a scheme, per RFC 9110.
pub fn effective_port(url: &Url) -> Result<u16> {
    if let Some(port) = url.port() {
        return Ok(port);
    }
    match url.scheme() {
        "http" => Ok(80),
        "https" => Ok(443),
        other => Err(Error::config(format!("Unsupported scheme: {}", other))),
    }
}

/// Build a root certificate store: platform native certs first, then
/// webpki-roots as fallback.
fn build_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().certs {
        let _ = root_store.add(cert);
    }
    if root_store.is_empty() {
        root_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    root_store
}

/// TLS connector for HTTP/1.1 (no ALPN; this agent never negotiates h2).
pub fn build_tls_connector() -> TlsConnector {
    let config = ClientConfig::builder()
        .with_root_certificates(build_root_store())
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn resolve_and_connect(host: &str, port: u16) -> Result<TcpStream> {
    let addrs: Vec<_> = lookup_host((host, port))
        .await
        .map_err(|e| Error::Resolve(format!("{}: {}", host, e)))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::Resolve(host.to_string()));
    }
    let mut last = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(socket) => return Ok(socket),
            Err(e) => last = Some(e),
        }
    }
    let e = last.expect("at least one address attempted");
    let refused = e.kind() == std::io::ErrorKind::ConnectionRefused;
    Err(Error::Connect {
        message: format!("Failed to connect to {} port {}: {}", host, port, e),
        refused,
    })
}

fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}

/// Issue `CONNECT host:port` through an already-connected HTTP proxy socket
/// and await a 2xx.
async fn tunnel_http_proxy(
    socket: &mut TcpStream,
    target: &Url,
    proxy: &Url,
    user_agent: &str,
) -> Result<()> {
    let host_port = format!(
        "{}:{}",
        target.host_str().unwrap_or_default(),
        effective_port(target)?
    );

    let mut request = Request::new(Method::Connect, host_port.clone(), Version::Http11);
    request.headers.set("Host", host_port);
    request.headers.set("Proxy-Connection", "keep-alive");
    request.headers.set("User-Agent", user_agent);
    if !proxy.username().is_empty() {
        let mut credentials = percent_decode(proxy.username());
        credentials.push(':');
        credentials.push_str(&percent_decode(proxy.password().unwrap_or("")));
        let mut value = String::from("Basic ");
        base64::encode_append(&mut value, credentials.as_bytes());
        request.headers.set("Proxy-Authorization", value);
    }

    socket.write_all(&request.serialize_head()).await?;

    // CONNECT responses have no body on success.
    let mut parser = ResponseParser::new(false, None);
    parser.start(true);
    let mut buf = [0u8; 4096];
    while !parser.headers_complete() || !parser.is_complete() {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::protocol("proxy closed the connection"));
        }
        parser.feed(&buf[..n])?;
    }
    let status = parser.head().map(|h| h.status).unwrap_or(0);
    if !(200..300).contains(&status) {
        return Err(Error::protocol(format!(
            "Proxy server rejected the connection: {}",
            status
        )));
    }
    Ok(())
}

/// SOCKS5 handshake (RFC 1928): greeting, optional username/password
/// subnegotiation (RFC 1929), then a domain-name CONNECT.
async fn tunnel_socks5_proxy(socket: &mut TcpStream, target: &Url, proxy: &Url) -> Result<()> {
    if proxy.username().is_empty() {
        socket.write_all(&[0x05, 0x01, 0x00]).await?;
    } else {
        socket.write_all(&[0x05, 0x02, 0x00, 0x02]).await?;
    }

    let mut greeting = [0u8; 2];
    socket.read_exact(&mut greeting).await?;
    if greeting[0] != 0x05 {
        return Err(Error::protocol("SOCKS5 invalid version"));
    }
    match greeting[1] {
        0x00 => {}
        0x02 => {
            let user = percent_decode(proxy.username());
            let pass = percent_decode(proxy.password().unwrap_or(""));
            let mut auth = vec![0x01, user.len() as u8];
            auth.extend_from_slice(user.as_bytes());
            auth.push(pass.len() as u8);
            auth.extend_from_slice(pass.as_bytes());
            socket.write_all(&auth).await?;

            let mut reply = [0u8; 2];
            socket.read_exact(&mut reply).await?;
            if reply[1] != 0x00 {
                return Err(Error::protocol("SOCKS5 authentication failed"));
            }
        }
        _ => return Err(Error::protocol("SOCKS5 no acceptable authentication method")),
    }

    let host = target
        .host_str()
        .ok_or_else(|| Error::config("URL has no host"))?;
    let port = effective_port(target)?;
    let mut request = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    socket.write_all(&request).await?;

    let mut head = [0u8; 5];
    socket.read_exact(&mut head).await?;
    if head[1] != 0x00 {
        return Err(Error::protocol("SOCKS5 connection request failed"));
    }
    // One byte of the bound address was pre-read into head[4].
    let tail_len = match head[3] {
        0x01 => 4 + 2 - 1,
        0x03 => head[4] as usize + 2 - 1,
        0x04 => 16 + 2 - 1,
        _ => return Err(Error::protocol("SOCKS5 invalid address type")),
    };
    let mut tail = vec![0u8; tail_len];
    socket.read_exact(&mut tail).await?;
    Ok(())
}

/// Open a connected (and, for https targets, TLS-established) stream to the
/// target, honoring the proxy and connect-timeout configuration.
pub async fn connect(
    url: &Url,
    proxy: Option<&Url>,
    connect_timeout: Option<Duration>,
    user_agent: &str,
    tls: &TlsConnector,
) -> Result<Stream> {
    let fut = connect_inner(url, proxy, user_agent, tls);
    match connect_timeout {
        Some(t) => timeout(t, fut)
            .await
            .map_err(|_| Error::cancel("Connection timed out"))?,
        None => fut.await,
    }
}

async fn connect_inner(
    url: &Url,
    proxy: Option<&Url>,
    user_agent: &str,
    tls: &TlsConnector,
) -> Result<Stream> {
    let socket = match proxy {
        Some(proxy_url) => {
            let host = proxy_url
                .host_str()
                .ok_or_else(|| Error::config("Failed to parse proxy"))?;
            let port = effective_port(proxy_url)?;
            debug!("connecting via {} proxy {}:{}", proxy_url.scheme(), host, port);
            let mut socket = resolve_and_connect(host, port).await?;
            match proxy_url.scheme() {
                // Plaintext http through an HTTP proxy is not tunneled; the
                // executor switches to absolute-form targets instead.
                "http" if url.scheme() == "https" => {
                    tunnel_http_proxy(&mut socket, url, proxy_url, user_agent).await?;
                }
                "http" => {}
                "socks5" => {
                    tunnel_socks5_proxy(&mut socket, url, proxy_url).await?;
                }
                other => {
                    return Err(Error::config(format!(
                        "only HTTP and SOCKS5 proxies are supported, not {}",
                        other
                    )))
                }
            }
            socket
        }
        None => {
            let host = url
                .host_str()
                .ok_or_else(|| Error::config("URL has no host"))?;
            let port = effective_port(url)?;
            debug!("connecting to {}:{}", host, port);
            resolve_and_connect(host, port).await?
        }
    };

    if url.scheme() == "https" {
        let host = url
            .host_str()
            .ok_or_else(|| Error::config("URL has no host"))?
            .to_string();
        let server_name = ServerName::try_from(host)
            .map_err(|_| Error::config("invalid host name for TLS"))?;
        let stream = tls
            .connect(server_name, socket)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;
        return Ok(Stream::tls(stream));
    }

    Ok(Stream::plain(socket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn default_ports() {
        let http = Url::parse("http://h/").unwrap();
        let https = Url::parse("https://h/").unwrap();
        let custom = Url::parse("http://h:8080/").unwrap();
        assert_eq!(effective_port(&http).unwrap(), 80);
        assert_eq!(effective_port(&https).unwrap(), 443);
        assert_eq!(effective_port(&custom).unwrap(), 8080);
        assert!(effective_port(&Url::parse("ftp://h/").unwrap()).is_err());
    }

    #[tokio::test]
    async fn refused_connect_is_distinguishable() {
        // Port 1 on loopback: nothing listens there.
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let tls = build_tls_connector();
        let err = connect(&url, None, None, "test", &tls).await.unwrap_err();
        assert!(err.is_connection_refused(), "got: {}", err);
    }

    #[tokio::test]
    async fn socks5_handshake_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            sock.read_exact(&mut greeting).await.unwrap();
            assert_eq!(greeting, [0x05, 0x01, 0x00]);
            sock.write_all(&[0x05, 0x00]).await.unwrap();

            // CONNECT example.test:80
            let mut head = [0u8; 5];
            sock.read_exact(&mut head).await.unwrap();
            assert_eq!(&head[..4], &[0x05, 0x01, 0x00, 0x03]);
            let mut rest = vec![0u8; head[4] as usize + 2];
            sock.read_exact(&mut rest).await.unwrap();
            assert_eq!(&rest[..head[4] as usize], b"example.test");
            assert_eq!(&rest[head[4] as usize..], &[0, 80]);

            // Reply with an IPv4 bound address.
            sock.write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();
        });

        let target = Url::parse("http://example.test/").unwrap();
        let proxy = Url::parse(&format!("socks5://{}", addr)).unwrap();
        let mut socket = TcpStream::connect(addr).await.unwrap();
        tunnel_socks5_proxy(&mut socket, &target, &proxy).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn http_connect_tunnel_2xx() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = sock.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).into_owned();
            assert!(head.starts_with("CONNECT secure.test:443 HTTP/1.1\r\n"));
            assert!(head.contains("Host: secure.test:443\r\n"));
            sock.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .unwrap();
        });

        let target = Url::parse("https://secure.test/").unwrap();
        let proxy = Url::parse(&format!("http://{}", addr)).unwrap();
        let mut socket = TcpStream::connect(addr).await.unwrap();
        tunnel_http_proxy(&mut socket, &target, &proxy, "Boost.Http.Io")
            .await
            .unwrap();
        server.await.unwrap();
    }
}
