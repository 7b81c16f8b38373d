//! Content types by output extension.

use std::path::Path;

use crate::util::path::extension_of;

pub const HTML: &str = "text/html; charset=utf-8";
const FALLBACK: &str = "application/octet-stream";

/// The `Content-Type` for a served path.
pub fn content_type(path: &str) -> &'static str {
  let Some(ext) = extension_of(Path::new(path)) else {
    return FALLBACK;
  };
  match ext.as_str() {
    "html" | "htm" => HTML,
    "css" => "text/css; charset=utf-8",
    "js" | "mjs" => "text/javascript; charset=utf-8",
    "json" | "map" => "application/json",
    "txt" => "text/plain; charset=utf-8",
    "xml" => "application/xml",
    "svg" => "image/svg+xml",
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "ico" => "image/x-icon",
    "woff" => "font/woff",
    "woff2" => "font/woff2",
    "wasm" => "application/wasm",
    _ => FALLBACK,
  }
}

pub fn is_html(path: &str) -> bool {
  content_type(path) == HTML
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_extensions() {
    assert_eq!(content_type("/index.html"), HTML);
    assert_eq!(content_type("/js/app.JS"), "text/javascript; charset=utf-8");
    assert_eq!(content_type("/img/logo.svg"), "image/svg+xml");
    assert!(is_html("/docs/page.htm"));
  }

  #[test]
  fn unknown_or_missing_extension_falls_back() {
    assert_eq!(content_type("/data.bin"), FALLBACK);
    assert_eq!(content_type("/LICENSE"), FALLBACK);
  }
}
