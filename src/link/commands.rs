//! Console commands that manage the radio itself: `wlan`, `ap` and the
//! `M481`/`M482`/`M483`/`M489` codes.
//!
//! Like [`crate::shell::Shell::execute`], [`execute`] reports whether it
//! recognised the line so the caller can pass the rest on.

use log::{debug, warn};

use super::{LinkMux, CONSOLE_LINK};
use crate::app::ports::TimePort;
use crate::drivers::radio::{ApParam, OpMode, RadioDriver, StaParam};
use crate::stream::ByteStream;
use crate::xmodem::{CAN, EOT};

/// Run `line` if it is a radio command. Returns `false` for anything else.
pub fn execute<R: RadioDriver, T: TimePort, S: ByteStream>(
    mux: &mut LinkMux<R>,
    clock: &mut T,
    line: &str,
    out: &mut S,
) -> bool {
    let line = line.trim();
    let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
    match cmd {
        "wlan" => wlan(mux, clock, arg, out),
        "ap" => ap(mux, arg.trim(), out),
        _ => return mcode(mux, cmd, out),
    }
    true
}

/// Undo the console's argument escapes: bytes 1 to 5 stand for characters
/// the host cannot send inside a token.
fn unescape(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            '\u{1}' => ' ',
            '\u{2}' => '?',
            '\u{3}' => '*',
            '\u{4}' => '!',
            '\u{5}' => '~',
            other => other,
        })
        .collect()
}

/// `wlan [ssid [password]] [-d] [-e]`
///
/// No SSID scans. `-d` leaves the current network. `-e` drops the progress
/// text and ends with EOT on success or CAN on failure, for host tools.
fn wlan<R: RadioDriver, T: TimePort, S: ByteStream>(mux: &LinkMux<R>, clock: &mut T, arg: &str, out: &mut S) {
    let mut framed = false;
    let mut disconnect = false;
    let mut ssid = None;
    let mut password = None;
    for token in arg.split_whitespace() {
        match token {
            "-e" => framed = true,
            "-d" => disconnect = true,
            t if ssid.is_none() => ssid = Some(unescape(t)),
            t if password.is_none() => password = Some(unescape(t)),
            t => debug!("wlan: extra argument {:?}", t),
        }
    }

    let ok = if disconnect {
        if !framed {
            out.print("Disconnecting from wifi...\n");
        }
        match mux.disconnect_sta() {
            Ok(()) => {
                out.print("Wifi Disconnected!\n");
                true
            }
            Err(e) => {
                out.print(&format!("Error: {e}\n"));
                false
            }
        }
    } else if let Some(ssid) = ssid {
        if !framed {
            out.print(&format!("Connecting to wifi: {ssid}...\n"));
        }
        match mux.connect_sta(&ssid, password.as_deref().unwrap_or(""), clock) {
            Ok(ip) => {
                out.print(&format!("Wifi connected, ip: {ip}\n"));
                true
            }
            Err(e) => {
                out.print(&format!("Error: {e}\n"));
                false
            }
        }
    } else {
        if !framed {
            out.print("Scanning wifi signals...\n");
        }
        match mux.scan_report(clock) {
            Ok(report) if !report.is_empty() => {
                out.print(&report);
                true
            }
            result => {
                if let Err(e) = result {
                    debug!("wlan: scan failed: {}", e);
                }
                if !framed {
                    out.print("No wlan detected\n");
                }
                false
            }
        }
    };

    if framed && let Err(e) = out.write(&[if ok { EOT } else { CAN }]) {
        debug!("wlan: end marker dropped ({:?})", e);
    }
}

/// `ap channel <1-14> | ssid <name> | password [secret] | enable | disable`
fn ap<R: RadioDriver, S: ByteStream>(mux: &LinkMux<R>, arg: &str, out: &mut S) {
    if arg.is_empty() {
        return;
    }
    let (sub, value) = arg.split_once(' ').unwrap_or((arg, ""));
    let value = value.trim();
    let result = match sub {
        "channel" if value.is_empty() => return,
        // Unparsable channels are reported as out of range.
        "channel" => mux.set_ap_channel(value.parse().unwrap_or(0)),
        "ssid" if value.is_empty() => return,
        "ssid" => mux.set_ap_ssid(value),
        "password" => mux.set_ap_password(value),
        "enable" => mux.set_ap_enabled(true),
        "disable" => mux.set_ap_enabled(false),
        _ => {
            out.print("ERROR: Invalid AP Command!\n");
            return;
        }
    };
    if let Err(e) = result {
        warn!("ap {}: {}", sub, e);
        out.print(&format!("{e}\n"));
    }
}

/// Split `M482.5` into `(482, 5)`. A missing subcode is 0.
fn parse_mcode(token: &str) -> Option<(u16, u8)> {
    let rest = token.strip_prefix(['M', 'm'])?;
    let (code, sub) = rest.split_once('.').unwrap_or((rest, "0"));
    Some((code.parse().ok()?, sub.parse().ok()?))
}

fn mcode<R: RadioDriver, S: ByteStream>(mux: &mut LinkMux<R>, token: &str, out: &mut S) -> bool {
    let Some((code, sub)) = parse_mcode(token) else {
        return false;
    };
    match (code, sub) {
        (481, 1) => {
            if let Err(e) = mux.reset_module() {
                out.print(&format!("WiFi module reset failed: {e}\n"));
            }
        }
        (481, 2) => {
            if let Err(e) = mux.set_op_mode(OpMode::StationAndAccessPoint) {
                out.print(&format!("WiFi set op mode failed: {e}\n"));
            }
        }
        (481, 3) => match mux.connection_state(CONSOLE_LINK) {
            Ok(state) => out.print(&format!("connection_state : {state}\n")),
            Err(e) => {
                debug!("M481.3: {}", e);
                out.print("Query WiFi connection ERROR!\n");
            }
        },
        (481, _) => {}
        (482, n) => match mux.sta_param_text(StaParam::from_subcode(n)) {
            Ok(v) => out.print(&format!("STA param[{n}]: {v}\n")),
            Err(e) => {
                debug!("M482.{}: {}", n, e);
                out.print("Query WiFi STA parameters ERROR!\n");
            }
        },
        (483, n) => match mux.ap_param_text(ApParam::from_subcode(n)) {
            Ok(v) => out.print(&format!("AP param[{n}]: {v}\n")),
            Err(e) => {
                debug!("M483.{}: {}", n, e);
                out.print("Query WiFi AP parameters ERROR!\n");
            }
        },
        (489, _) => match mux.module_info() {
            Ok(info) => out.print(&format!("{info}\n")),
            Err(e) => {
                debug!("M489: {}", e);
                out.print("Query WiFi module ERROR!\n");
            }
        },
        _ => return false,
    }
    true
}
