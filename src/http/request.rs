//! Request line, header block and URI parsing.

use std::collections::BTreeMap;

/// Parsed `METHOD SP URI SP VERSION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// Upper-cased.
    pub method: String,
    /// Percent-decoded.
    pub uri: String,
    pub version: String,
}

/// Split a request line on its first two spaces. `None` if there are
/// fewer than two.
pub fn parse_request_line(line: &str) -> Option<RequestLine> {
    let (method, rest) = line.split_once(' ')?;
    let (uri, version) = rest.split_once(' ')?;
    Some(RequestLine {
        method: method.to_ascii_uppercase(),
        uri: url_decode(uri),
        version: version.to_string(),
    })
}

/// Parse `key: value` lines. Keys are trimmed and lower-cased, values
/// trimmed; lines without a colon are ignored and parsing stops at the
/// first empty line.
pub fn parse_headers(block: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for line in block.split("\r\n") {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// Declared body length. Absent means 0; anything but plain decimal
/// digits that fit a `usize` is an error.
pub fn parse_content_length(headers: &BTreeMap<String, String>) -> Result<usize, ()> {
    let Some(value) = headers.get("content-length") else {
        return Ok(0);
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(());
    }
    value.parse().map_err(|_| ())
}

/// Decode `%XX` escapes and `+` (space). Malformed escapes pass through
/// unchanged.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

/// Position of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
