//! Console commands that move files: `upload`, `download` and `md5sum`.
//!
//! Other console commands belong to the surrounding firmware;
//! [`Shell::execute`] reports whether it recognised the line so the
//! caller can pass the rest on.

use log::{debug, info, warn};

use crate::app::ports::{FileStore, MachinePort, TimePort};
use crate::stream::ByteStream;
use crate::xmodem::digest::md5_hex;
use crate::xmodem::{TransferError, TransferStats, UploadTargets, XModem};

/// Working directory for relative paths.
pub const DEFAULT_CWD: &str = "/sd";

pub struct Shell<F, T> {
    xmodem: XModem<F, T>,
    cwd: String,
}

impl<F: FileStore, T: TimePort> Shell<F, T> {
    pub fn new(files: F, clock: T) -> Self {
        Self {
            xmodem: XModem::new(files, clock),
            cwd: DEFAULT_CWD.to_string(),
        }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn set_cwd(&mut self, dir: &str) {
        self.cwd = self.absolute(dir);
    }

    pub fn xmodem(&self) -> &XModem<F, T> {
        &self.xmodem
    }

    /// Resolve `arg` against the working directory.
    pub fn absolute(&self, arg: &str) -> String {
        if arg.starts_with('/') {
            arg.to_string()
        } else if arg.is_empty() {
            self.cwd.clone()
        } else {
            format!("{}/{}", self.cwd.trim_end_matches('/'), arg)
        }
    }

    /// Run `line` if it is one of ours. Returns `false` for anything else.
    pub fn execute<S: ByteStream, M: MachinePort>(
        &mut self,
        line: &str,
        stream: &mut S,
        machine: &mut M,
    ) -> bool {
        let line = line.trim();
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        match cmd {
            "upload" => {
                if let Err(e) = self.upload(arg, stream, machine) {
                    debug!("shell: upload {:?}: {}", arg, e);
                }
            }
            "download" => {
                if let Err(e) = self.download(arg, stream, machine) {
                    debug!("shell: download {:?}: {}", arg, e);
                }
            }
            "md5sum" => self.md5sum(arg, stream),
            _ => return false,
        }
        true
    }

    /// Receive a file. A compressed upload whose container fails to
    /// inflate leaves no destination file behind.
    pub fn upload<S: ByteStream, M: MachinePort>(
        &mut self,
        arg: &str,
        stream: &mut S,
        machine: &mut M,
    ) -> Result<TransferStats, TransferError> {
        let path = self.absolute(arg);
        let result = self.xmodem.upload(&path, stream, machine);
        match &result {
            Ok(_) => stream.print(&format!("Info: upload success: {path}.\r\n")),
            Err(e) => {
                if let (TransferError::Decompress(_), Some(dest)) =
                    (e, UploadTargets::for_path(&path).decompress_to)
                {
                    warn!("shell: removing unreliable {}", dest);
                    if let Err(e) = self.xmodem.files_mut().remove(&dest) {
                        warn!("shell: could not remove {}: {}", dest, e);
                    }
                }
                stream.print(&format!("Error: upload failed: {path}.\r\n"));
            }
        }
        result
    }

    pub fn download<S: ByteStream, M: MachinePort>(
        &mut self,
        arg: &str,
        stream: &mut S,
        machine: &mut M,
    ) -> Result<TransferStats, TransferError> {
        let path = self.absolute(arg);
        let result = self.xmodem.download(&path, stream, machine);
        match &result {
            Ok(_) => stream.print(&format!("Info: download success: {path}.\r\n")),
            Err(_) => stream.print(&format!("Error: download failed: {path}.\r\n")),
        }
        result
    }

    /// Print `<hex digest> <path>` for a stored file.
    pub fn md5sum<S: ByteStream>(&mut self, arg: &str, stream: &mut S) {
        let path = self.absolute(arg);
        let digest = self
            .xmodem
            .files()
            .open(&path)
            .ok()
            .and_then(|r| md5_hex(r).ok());
        match digest {
            Some(hex) => {
                info!("shell: md5sum {} = {}", path, hex);
                stream.print(&format!("{hex} {path}\r\n"));
            }
            None => stream.print(&format!("File not found: {path}\r\n")),
        }
    }
}
