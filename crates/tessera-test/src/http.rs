//! A scripted HTTP/1.1 responder on a loopback socket.
//!
//! Serves a fixed number of connections, one request each, answering with
//! whatever the handler returns. Enough for blocking client tests without
//! pulling a server framework into the test tree.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;

/// A canned response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header.
    pub content_type: String,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpReply {
    /// `200 OK` with a body.
    #[must_use]
    pub fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: content_type.to_string(),
            body,
        }
    }

    /// An empty response with `status`.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            body: Vec::new(),
        }
    }
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request line, e.g. `POST /tsr HTTP/1.1`.
    pub request_line: String,
    /// `Content-Type` header, if sent.
    pub content_type: Option<String>,
    /// Request body.
    pub body: Vec<u8>,
}

/// A background server answering a fixed number of requests.
#[derive(Debug)]
pub struct ScriptedServer {
    url: String,
    handle: JoinHandle<Vec<RecordedRequest>>,
}

impl ScriptedServer {
    /// Serve `connections` requests with `handler`.
    ///
    /// # Panics
    ///
    /// Panics if the loopback socket cannot be bound.
    pub fn start<F>(connections: usize, handler: F) -> Self
    where
        F: Fn(&[u8]) -> HttpReply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let handle = std::thread::spawn(move || {
            let mut seen = Vec::with_capacity(connections);
            for _ in 0..connections {
                let Ok((stream, _)) = listener.accept() else {
                    break;
                };
                if let Some(request) = serve(stream, &handler) {
                    seen.push(request);
                }
            }
            seen
        });
        Self {
            url: format!("http://{addr}/tsr"),
            handle,
        }
    }

    /// URL of the endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait for all scripted connections and return what was received.
    ///
    /// # Panics
    ///
    /// Panics if the server thread panicked.
    #[must_use]
    pub fn finish(self) -> Vec<RecordedRequest> {
        self.handle.join().expect("server thread panicked")
    }
}

fn serve<F>(stream: TcpStream, handler: &F) -> Option<RecordedRequest>
where
    F: Fn(&[u8]) -> HttpReply,
{
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;

    let mut content_length = 0usize;
    let mut content_type = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().ok()?;
            } else if name.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_string());
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;

    let reply = handler(&body);
    let mut stream = stream;
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reason(reply.status),
        reply.content_type,
        reply.body.len()
    );
    // The client may hang up early on oversized replies.
    let _ = stream
        .write_all(head.as_bytes())
        .and_then(|()| stream.write_all(&reply.body))
        .and_then(|()| stream.flush());

    Some(RecordedRequest {
        request_line: request_line.trim_end().to_string(),
        content_type,
        body,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
