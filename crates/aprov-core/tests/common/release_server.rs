//! Minimal HTTP/1.1 server that serves release assets by path for integration tests.
//!
//! Each registered path maps to a body; unknown paths get 404. An asset can
//! advertise a larger `Content-Length` than it sends to simulate a dropped
//! connection, or trickle its body out in small chunks to keep a transfer
//! in flight.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TRICKLE_CHUNK: usize = 1024;

#[derive(Debug, Clone)]
pub struct Asset {
    pub body: Vec<u8>,
    /// Extra bytes claimed in `Content-Length` but never sent.
    pub short_by: usize,
    /// Pause between 1 KiB chunks of the body.
    pub chunk_delay: Option<Duration>,
}

impl Asset {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            short_by: 0,
            chunk_delay: None,
        }
    }

    /// Body sent 1 KiB at a time with `delay` between chunks.
    pub fn trickle(body: Vec<u8>, delay: Duration) -> Self {
        Self {
            chunk_delay: Some(delay),
            ..Self::new(body)
        }
    }
}

pub struct ReleaseServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl ReleaseServer {
    /// Number of GET requests served so far (any path).
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. `assets` keys are request paths
/// such as `/v34.0.4/aapt2-arm64-v8a`. The server runs until the process exits.
pub fn start(assets: HashMap<String, Asset>) -> ReleaseServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let assets = Arc::new(assets);
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_srv = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let assets = Arc::clone(&assets);
            let hits = Arc::clone(&hits_srv);
            thread::spawn(move || handle(stream, &assets, &hits));
        }
    });
    ReleaseServer {
        base_url: format!("http://127.0.0.1:{}", port),
        hits,
    }
}

fn handle(mut stream: std::net::TcpStream, assets: &HashMap<String, Asset>, hits: &AtomicUsize) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("/");
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    hits.fetch_add(1, Ordering::SeqCst);
    match assets.get(path) {
        Some(asset) => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                asset.body.len() + asset.short_by
            );
            let _ = stream.write_all(response.as_bytes());
            match asset.chunk_delay {
                None => {
                    let _ = stream.write_all(&asset.body);
                }
                Some(delay) => {
                    for chunk in asset.body.chunks(TRICKLE_CHUNK) {
                        // Client hung up (e.g. aborted transfer).
                        if stream.write_all(chunk).and_then(|()| stream.flush()).is_err() {
                            return;
                        }
                        thread::sleep(delay);
                    }
                }
            }
        }
        None => {
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
            );
        }
    }
}
