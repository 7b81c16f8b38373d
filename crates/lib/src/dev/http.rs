//! Just enough HTTP/1.1 for a local dev server.
//!
//! One request per connection; every response closes the connection except
//! the reload event stream, which stays open until the client goes away.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::DevError;

const MAX_HEADERS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  /// Percent-decoded path without the query string.
  pub path: String,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }

  pub fn is_head(&self) -> bool {
    self.method == "HEAD"
  }
}

/// Read one request head. `None` when the client closed the connection first.
pub async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<Request>, DevError> {
  let mut line = String::new();
  if reader.read_line(&mut line).await? == 0 {
    return Ok(None);
  }

  let mut parts = line.split_whitespace();
  let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
    return Err(DevError::BadRequest(line.trim_end().to_string()));
  };
  if !version.starts_with("HTTP/1.") {
    return Err(DevError::BadRequest(format!("unsupported version {}", version)));
  }
  let method = method.to_ascii_uppercase();
  let path = percent_decode(target.split(['?', '#']).next().unwrap_or("/"));

  let mut headers = Vec::new();
  loop {
    line.clear();
    if reader.read_line(&mut line).await? == 0 {
      break;
    }
    let header = line.trim_end();
    if header.is_empty() {
      break;
    }
    if headers.len() == MAX_HEADERS {
      return Err(DevError::BadRequest("too many headers".to_string()));
    }
    if let Some((name, value)) = header.split_once(':') {
      headers.push((name.trim().to_string(), value.trim().to_string()));
    }
  }

  Ok(Some(Request { method, path, headers }))
}

/// Decode `%XX` escapes. Malformed escapes are kept as written.
pub fn percent_decode(input: &str) -> String {
  let bytes = input.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'%'
      && let Some(hex) = input.get(i + 1..i + 3)
      && let Ok(byte) = u8::from_str_radix(hex, 16)
    {
      out.push(byte);
      i += 3;
      continue;
    }
    out.push(bytes[i]);
    i += 1;
  }
  String::from_utf8_lossy(&out).into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: vec![("Content-Type".to_string(), content_type.to_string())],
      body: body.into(),
    }
  }

  pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
    Self::new(200, content_type, body)
  }

  pub fn not_found() -> Self {
    Self::new(404, "text/plain; charset=utf-8", "Not Found")
  }

  pub fn redirect(location: &str) -> Self {
    let mut response = Self::new(301, "text/plain; charset=utf-8", format!("Redirecting to {}", location));
    response.headers.push(("Location".to_string(), location.to_string()));
    response
  }

  pub fn error(message: &str) -> Self {
    Self::new(500, "text/plain; charset=utf-8", message.to_string())
  }

  pub fn method_not_allowed() -> Self {
    let mut response = Self::new(405, "text/plain; charset=utf-8", "Method Not Allowed");
    response.headers.push(("Allow".to_string(), "GET, HEAD".to_string()));
    response
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }

  /// Serialize the response. `head_only` omits the body but keeps its length.
  pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W, head_only: bool) -> Result<(), DevError> {
    let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status));
    for (name, value) in &self.headers {
      head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
    head.push_str("Cache-Control: no-cache\r\nConnection: close\r\n\r\n");

    writer.write_all(head.as_bytes()).await?;
    if !head_only {
      writer.write_all(&self.body).await?;
    }
    writer.flush().await?;
    Ok(())
  }
}

/// Response head that opens a server-sent events stream.
pub const EVENT_STREAM_HEAD: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\n\r\n";

/// Format one server-sent event.
pub fn event(data: &str) -> String {
  let mut out = String::new();
  for line in data.lines() {
    out.push_str("data: ");
    out.push_str(line);
    out.push('\n');
  }
  if data.is_empty() {
    out.push_str("data: \n");
  }
  out.push('\n');
  out
}

fn reason(status: u16) -> &'static str {
  match status {
    200 => "OK",
    301 => "Moved Permanently",
    400 => "Bad Request",
    404 => "Not Found",
    405 => "Method Not Allowed",
    500 => "Internal Server Error",
    _ => "",
  }
}
