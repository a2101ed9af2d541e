//! MD5 digests exchanged as packet zero.

use std::io::{self, Read};

use md5::{Digest, Md5};

/// Length of a lowercase hex MD5 digest.
pub const DIGEST_LEN: usize = 32;

const CHUNK: usize = 4096;

/// Hex MD5 of everything `reader` yields.
pub fn md5_hex<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = [0u8; CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

/// Read a cached digest sidecar. Empty or unreadable contents yield `None`.
pub fn read_cached<R: Read>(mut reader: R) -> Option<String> {
    let mut raw = Vec::with_capacity(DIGEST_LEN);
    reader.read_to_end(&mut raw).ok()?;
    let text = String::from_utf8_lossy(&raw);
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    (!trimmed.is_empty()).then(|| trimmed.chars().take(DIGEST_LEN).collect())
}
