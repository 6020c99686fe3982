//! Minimal in-process HTTP server for exercising the auth layer in tests
//!
//! Serves scripted responses over a real TCP socket so the refresh
//! coordinator and request interceptor are tested through the same reqwest
//! path they use in production. Single-threaded accept loop; each response
//! closes the connection so every logical request is observable.

#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A parsed incoming request
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    /// HTTP method
    pub method: String,
    /// Request path including query string
    pub path: String,
    /// Header lines as (lowercased-name, value)
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: String,
}

impl ParsedRequest {
    /// The bearer token from the Authorization header, if any
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name == "authorization")
            .and_then(|(_, value)| value.strip_prefix("Bearer "))
    }
}

/// A scripted response: status code and JSON body
pub type CannedResponse = (u16, String);

type Handler = Box<dyn FnMut(&ParsedRequest) -> CannedResponse + Send>;

/// Scripted HTTP server bound to a random localhost port
pub struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ParsedRequest>>>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for TestServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestServer")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TestServer {
    /// Start a server whose responses come from `handler`
    pub fn start(mut handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        listener.set_nonblocking(true).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));

        let thread_hits = hits.clone();
        let thread_requests = requests.clone();
        let thread_running = running.clone();

        std::thread::spawn(move || {
            while thread_running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        let request = read_request(&mut stream);
                        thread_hits.fetch_add(1, Ordering::SeqCst);
                        thread_requests.lock().unwrap().push(request.clone());

                        let (status, body) = handler(&request);
                        write_response(&mut stream, status, &body);
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            hits,
            requests,
            running,
        }
    }

    /// Start a server answering every request identically
    pub fn with_fixed_response(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::start(Box::new(move |_| (status, body.clone())))
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:PORT`
    pub fn url(&self) -> String {
        self.base_url.clone()
    }

    /// Number of requests served so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Copies of all requests served so far
    pub fn requests(&self) -> Vec<ParsedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn read_request(stream: &mut TcpStream) -> ParsedRequest {
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let mut raw = Vec::new();
    let mut buffer = [0_u8; 4096];

    // Read until the header terminator, then drain the declared body length
    let header_end = loop {
        let n = stream.read(&mut buffer).unwrap_or(0);
        if n == 0 {
            break raw.len();
        }
        raw.extend_from_slice(&buffer[..n]);
        if let Some(pos) = find_header_end(&raw) {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            line.split_once(": ")
                .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
        })
        .collect();

    let content_length: usize = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    let mut body_bytes = if raw.len() > body_start {
        raw[body_start..].to_vec()
    } else {
        Vec::new()
    };

    while body_bytes.len() < content_length {
        let n = stream.read(&mut buffer).unwrap_or(0);
        if n == 0 {
            break;
        }
        body_bytes.extend_from_slice(&buffer[..n]);
    }

    ParsedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body_bytes).to_string(),
    }
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|window| window == b"\r\n\r\n")
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) {
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        500 => "Internal Server Error",
        _ => "Unknown",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
}

/// JSON body of a successful refresh/login token response
pub fn token_response_body(access: &str, refresh: &str) -> String {
    format!(
        r#"{{"success":true,"data":{{"access_token":"{access}","refresh_token":"{refresh}"}}}}"#
    )
}

/// JSON body of an application-level failure envelope
pub fn failure_body(message: &str) -> String {
    format!(r#"{{"success":false,"message":"{message}"}}"#)
}
