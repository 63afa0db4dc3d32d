//! Minimal HTTP/1.1 server for integration tests.
//!
//! Routes by path and records every request (method, path, headers, body) so
//! tests can assert on what was delivered:
//!
//! - `/html`, `/json`, `/binary`: 200 with a matching content type
//! - `/status/<code>`: empty body with that status
//! - `/slow/<ms>`: 200 after a delay
//! - `/redirect?to=<url>`: 302 to `to`
//! - `/big/<n>`: 200 with an `n`-byte body
//! - `/accented`: 200 with a non-ASCII response header
//! - `/hook`: 200 (webhook sink), `/hook/fail`: 500
//! - `/hook/throttled`: 429 with `Retry-After: 1`

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub received_at: Instant,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct TestServer {
    base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    /// Starts the server in a background thread; it runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let log = Arc::clone(&log);
                thread::spawn(move || handle(stream, &log));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Poll until at least `n` requests hit `path`, or panic after `timeout`.
    pub fn wait_for(&self, path: &str, n: usize, timeout: Duration) -> Vec<RecordedRequest> {
        let start = Instant::now();
        loop {
            let seen = self.requests_to(path);
            if seen.len() >= n {
                return seen;
            }
            if start.elapsed() > timeout {
                panic!("expected {} request(s) to {}, saw {}", n, path, seen.len());
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

fn handle(mut stream: TcpStream, log: &Mutex<Vec<RecordedRequest>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    log.lock().unwrap().push(req.clone());

    let (route, query) = req.path.split_once('?').unwrap_or((req.path.as_str(), ""));
    let mut extra: Vec<(&str, String)> = Vec::new();
    let (status, content_type, body): (u32, &str, Vec<u8>) = match route {
        "/html" => (200, "text/html; charset=utf-8", b"<html><body>hello</body></html>".to_vec()),
        "/json" => (200, "application/json", br#"{"hello":"world"}"#.to_vec()),
        "/binary" => (200, "image/png", vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3]),
        "/accented" => {
            // Byte 5 falls inside the multi-byte character.
            extra.push(("Xy", "é".to_string()));
            (200, "text/plain", b"accented".to_vec())
        }
        "/hook" => (200, "text/plain", b"ok".to_vec()),
        "/hook/fail" => (500, "text/plain", b"nope".to_vec()),
        "/hook/throttled" => {
            extra.push(("Retry-After", "1".to_string()));
            (429, "text/plain", b"slow down".to_vec())
        }
        "/redirect" => {
            let to = query.strip_prefix("to=").unwrap_or("/html").to_string();
            extra.push(("Location", to));
            (302, "text/plain", Vec::new())
        }
        other => {
            if let Some(code) = other.strip_prefix("/status/") {
                (code.parse().unwrap_or(500), "text/plain", Vec::new())
            } else if let Some(ms) = other.strip_prefix("/slow/") {
                thread::sleep(Duration::from_millis(ms.parse().unwrap_or(0)));
                (200, "text/plain", b"slow".to_vec())
            } else if let Some(n) = other.strip_prefix("/big/") {
                (200, "application/octet-stream", vec![b'x'; n.parse().unwrap_or(0)])
            } else {
                (404, "text/plain", b"not found".to_vec())
            }
        }
    };

    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        reason(status),
        content_type,
        body.len()
    );
    for (name, value) in extra {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

fn reason(status: u32) -> &'static str {
    match status {
        200 => "OK",
        302 => "Found",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };
    let head = std::str::from_utf8(&data[..header_end]).ok()?;
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);
    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
        received_at: Instant::now(),
    })
}
