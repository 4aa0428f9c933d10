/*
 * stream.rs
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

//! Unified transfer stream: plain TCP or TLS, with optional per-direction
//! byte-rate caps. Used from one task at a time.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tokio_rustls::client::TlsStream;

/// Grace period for the polite shutdown; expiry counts as success.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Token bucket refill granularity.
const REFILL_STEP: Duration = Duration::from_millis(100);

/// Byte-rate cap over one-second windows, implemented as a token bucket
/// refilled continuously at `rate` bytes per second.
#[derive(Debug)]
struct Bucket {
    rate: u64,
    tokens: u64,
    refilled: Instant,
}

impl Bucket {
    fn new(rate: u64) -> Self {
        Self {
            rate,
            tokens: rate,
            refilled: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.refilled);
        let earned = (elapsed.as_secs_f64() * self.rate as f64) as u64;
        if earned > 0 {
            self.tokens = (self.tokens + earned).min(self.rate);
            self.refilled = now;
        }
    }

    /// Wait until at least one token is available, then claim up to
    /// `wanted` tokens. Returns the claimed amount.
    async fn take(&mut self, wanted: usize) -> usize {
        loop {
            self.refill();
            if self.tokens > 0 {
                let n = (wanted as u64).min(self.tokens).max(1);
                self.tokens -= n.min(self.tokens);
                return n as usize;
            }
            sleep(REFILL_STEP).await;
        }
    }
}

#[derive(Debug)]
enum Inner {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// Transfer stream over plain TCP or TLS.
#[derive(Debug)]
pub struct Stream {
    inner: Inner,
    read_cap: Option<Bucket>,
    write_cap: Option<Bucket>,
}

impl Stream {
    pub fn plain(socket: TcpStream) -> Self {
        Self {
            inner: Inner::Plain(socket),
            read_cap: None,
            write_cap: None,
        }
    }

    pub fn tls(stream: TlsStream<TcpStream>) -> Self {
        Self {
            inner: Inner::Tls(Box::new(stream)),
            read_cap: None,
            write_cap: None,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.inner, Inner::Tls(_))
    }

    /// Set per-direction byte-per-second caps (--recv-per-second /
    /// --send-per-second).
    pub fn set_rate_limits(&mut self, read: Option<u64>, write: Option<u64>) {
        self.read_cap = read.filter(|r| *r > 0).map(Bucket::new);
        self.write_cap = write.filter(|r| *r > 0).map(Bucket::new);
    }

    /// Read some bytes, honoring the receive cap. Returns 0 at EOF.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = match &mut self.read_cap {
            Some(bucket) => bucket.take(buf.len()).await,
            None => buf.len(),
        };
        let len = limit.min(buf.len());
        let buf = &mut buf[..len];
        match &mut self.inner {
            Inner::Plain(s) => s.read(buf).await,
            Inner::Tls(s) => s.read(buf).await,
        }
    }

    /// Write some bytes, honoring the send cap. May write fewer bytes than
    /// given; the caller resumes from the returned count.
    pub async fn write_some(&mut self, data: &[u8]) -> io::Result<usize> {
        let limit = match &mut self.write_cap {
            Some(bucket) => bucket.take(data.len()).await,
            None => data.len(),
        };
        let data = &data[..limit.min(data.len())];
        match &mut self.inner {
            Inner::Plain(s) => s.write(data).await,
            Inner::Tls(s) => s.write(data).await,
        }
    }

    /// Write the whole buffer through the send cap.
    pub async fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let n = self.write_some(data).await?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            data = &data[n..];
        }
        Ok(())
    }

    /// Polite shutdown: TLS close-notify (or TCP FIN) with a 500 ms budget.
    /// Timeout expiry is success; the peer may already be gone.
    pub async fn shutdown(&mut self) {
        let fut = async {
            let _ = match &mut self.inner {
                Inner::Plain(s) => s.shutdown().await,
                Inner::Tls(s) => s.shutdown().await,
            };
        };
        let _ = timeout(SHUTDOWN_TIMEOUT, fut).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn loopback_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(b"pong").await.unwrap();
        });

        let mut stream = Stream::plain(TcpStream::connect(addr).await.unwrap());
        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 16];
        let n = stream.read_some(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
        stream.shutdown().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn write_cap_paces_transfer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut sunk = Vec::new();
            sock.read_to_end(&mut sunk).await.unwrap();
            sunk.len()
        });

        let mut stream = Stream::plain(TcpStream::connect(addr).await.unwrap());
        // 100 bytes at 50 B/s: the first 50 go immediately, the rest needs
        // roughly another second of refill.
        stream.set_rate_limits(None, Some(50));
        let started = std::time::Instant::now();
        stream.write_all(&[7u8; 100]).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(800));
        drop(stream);
        assert_eq!(server.await.unwrap(), 100);
    }
}
