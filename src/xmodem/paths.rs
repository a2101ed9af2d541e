//! Sidecar file locations.
//!
//! Every stored file may have two hidden siblings: its MD5 digest under
//! `.md5/` and its compressed form under `.lz/`. Under a `gcodes/` tree
//! the hidden directory sits directly below `gcodes/` and keeps the rest
//! of the path; elsewhere it sits next to the file.

pub const MD5_DIR: &str = ".md5";
pub const LZ_DIR: &str = ".lz";

/// Upload names ending in this are compressed containers.
pub const LZ_SUFFIX: &str = ".lz";

const GCODES: &str = "gcodes/";

fn sidecar(path: &str, dir: &str) -> String {
    if let Some(i) = path.find(GCODES) {
        let split = i + GCODES.len();
        return format!("{}{}/{}", &path[..split], dir, &path[split..]);
    }
    match path.rfind('/') {
        Some(i) => format!("{}/{}/{}", &path[..i], dir, &path[i + 1..]),
        None => format!("{}/{}", dir, path),
    }
}

pub fn md5_path(path: &str) -> String {
    sidecar(path, MD5_DIR)
}

pub fn lz_path(path: &str) -> String {
    sidecar(path, LZ_DIR)
}

/// Directory part of `path`, if any.
pub fn parent_dir(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

/// Where an upload to `path` lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTargets {
    /// File receiving the transferred bytes.
    pub stored: String,
    /// Digest sidecar; `None` for firmware images.
    pub digest: Option<String>,
    /// Final file for compressed uploads.
    pub decompress_to: Option<String>,
}

impl UploadTargets {
    pub fn for_path(path: &str) -> Self {
        let compressed = path.strip_suffix(LZ_SUFFIX);
        let dest = compressed.unwrap_or(path);
        Self {
            stored: match compressed {
                Some(dest) => lz_path(dest),
                None => path.to_string(),
            },
            digest: (!path.contains("firmware.bin")).then(|| md5_path(dest)),
            decompress_to: compressed.map(str::to_string),
        }
    }
}
