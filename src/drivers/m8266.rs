//! ESP-IDF binding for the M8266 SPI WiFi co-processor.
//!
//! The vendor host library is linked as a prebuilt ESP-IDF component; this
//! module declares the handful of entry points the link layer needs and
//! wraps them in [`RadioDriver`]. Every vendor call reports failure by
//! returning 0 and writing a 16-bit status through the last argument.

use core::fmt::Write as _;
use core::net::Ipv4Addr;
use std::ffi::CString;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use super::radio::{
    ApParam, ClientInfo, ClientList, IfAddr, LinkId, LinkKind, ModuleInfo, OpMode, RadioDriver, RxFrame, ScanList,
    ScannedSignal, StaParam, StaStatus, MAX_CLIENTS, MAX_WLAN_SIGNALS,
};
use super::reset::hardware_reset;
use crate::endpoint::Endpoint;
use crate::error::{DriverError, DriverOp};

fn sta_param_code(param: StaParam) -> u8 {
    match param {
        StaParam::Ssid => 0,
        StaParam::Password => 1,
        StaParam::Channel => 2,
        StaParam::IpAddr => 3,
        StaParam::GatewayAddr => 4,
        StaParam::NetmaskAddr => 5,
        StaParam::Mac => 6,
        StaParam::Hostname => 7,
    }
}

fn ap_param_code(param: ApParam) -> u8 {
    match param {
        ApParam::Ssid => 0,
        ApParam::Password => 1,
        ApParam::Channel => 2,
        ApParam::AuthMode => 3,
        ApParam::PhyMode => 6,
        ApParam::IpAddr => 7,
        ApParam::GatewayAddr => 8,
        ApParam::NetmaskAddr => 9,
    }
}

/// Low status byte while a scan is still running.
const SCAN_IN_PROGRESS: u16 = 0x26;

/// Save configuration changes to the module's flash.
const SAVED: u8 = 1;

/// SPI prescaler 4 on the host bus.
const SPI_PRESCALER_4: u32 = 4;

/// Send attempts the vendor library makes before giving up on a block.
const SEND_MAX_LOOPS: u16 = 5000;

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct RawClientInfo {
    remote_ip: [u8; 4],
    remote_port: u16,
}

/// One scan record as the vendor library lays it out.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawScannedSig {
    ssid: [u8; 33],
    bssid: [u8; 6],
    channel: u8,
    authmode: u8,
    rssi: i8,
}

impl Default for RawScannedSig {
    fn default() -> Self {
        Self {
            ssid: [0; 33],
            bssid: [0; 6],
            channel: 0,
            authmode: 0,
            rssi: 0,
        }
    }
}

unsafe extern "C" {
    fn M8266HostIf_Init();
    fn M8266HostIf_SPI_SetSpeed(prescaler: u32);
    fn M8266HostIf_SPI_Select(spi_base: u32, spi_clock: u32, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Interface_Communication_OK(byte: *mut u8) -> u8;
    fn M8266WIFI_SPI_Interface_Communication_Stress_Test(max_times: u32) -> u32;
    fn M8266WIFI_SPI_Set_Tx_Max_Power(power: u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Set_Opmode(op_mode: u8, saved: u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Setup_Connection(
        tcp_udp: u8,
        local_port: u16,
        remote_addr: *const u8,
        remote_port: u16,
        link_no: u8,
        timeout_s: u8,
        status: *mut u16,
    ) -> u8;
    fn M8266WIFI_SPI_Delete_Connection(link_no: u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Config_Max_Clients_Allowed_To_A_Tcp_Server(link_no: u8, max: u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Set_TcpServer_Auto_Discon_Timeout(link_no: u8, timeout_s: u16, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Has_DataReceived() -> u8;
    fn M8266WIFI_SPI_RecvData_ex(
        data: *mut u8,
        max_len: u16,
        max_wait_ms: u16,
        link_no: *mut u8,
        remote_ip: *mut u8,
        remote_port: *mut u16,
        status: *mut u16,
    ) -> u16;
    fn M8266WIFI_SPI_Send_BlockData(
        data: *const u8,
        len: u32,
        max_loops: u16,
        link_no: u8,
        remote_ip: *const u8,
        remote_port: u16,
        status: *mut u16,
    ) -> u32;
    fn M8266WIFI_SPI_Send_Udp_Data(
        data: *const u8,
        len: u16,
        link_no: u8,
        udp_dest_addr: *const u8,
        udp_dest_port: u16,
        status: *mut u16,
    ) -> u16;
    fn M8266WIFI_SPI_List_Clients_On_A_TCP_Server(
        link_no: u8,
        client_num: *mut u8,
        clients: *mut RawClientInfo,
        status: *mut u16,
    ) -> u8;
    fn M8266WIFI_SPI_Disconnect_TcpClient(link_no: u8, client: *const RawClientInfo, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Get_STA_Connection_Status(connection_status: *mut u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_STA_DisConnect_Ap(status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Query_STA_Param(param_type: u8, param: *mut u8, param_len: *mut u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Query_AP_Param(param_type: u8, param: *mut u8, param_len: *mut u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Get_Opmode(op_mode: *mut u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_STA_Scan_Signals(sigs: *mut RawScannedSig, max: u8, channel: u8, printout: u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_STA_Fetch_Last_Scanned_Signals(sigs: *mut RawScannedSig, max: u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_STA_Connect_Ap(ssid: *const u8, password: *const u8, saved: u8, timeout_s: u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Config_AP_Param(param_type: u8, param: *const u8, param_len: u8, saved: u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Get_Module_Info(chip_id: *mut u32, flash_size: *mut u8, fw_ver: *mut u8, status: *mut u16) -> u8;
    fn M8266WIFI_SPI_Query_Connection(
        link_no: u8,
        conn_type: *mut u8,
        state: *mut u8,
        local_port: *mut u16,
        remote_addr: *mut u8,
        remote_port: *mut u16,
        status: *mut u16,
    ) -> u8;
}

/// Dotted-quad C string, as the vendor API expects addresses.
type CAddr = heapless::String<16>;

fn c_addr(ip: Ipv4Addr) -> CAddr {
    let mut s = CAddr::new();
    let _ = write!(s, "{ip}\0");
    s
}

fn c_text(raw: &[u8]) -> &str {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    core::str::from_utf8(&raw[..end]).unwrap_or("")
}

fn parse_c_addr(raw: &[u8]) -> Ipv4Addr {
    c_text(raw).parse().unwrap_or(Ipv4Addr::UNSPECIFIED)
}

fn c_string(op: DriverOp, text: &str) -> Result<CString, DriverError> {
    CString::new(text).map_err(|_| DriverError::new(op, 0))
}

fn check(op: DriverOp, ok: u8, status: u16) -> Result<(), DriverError> {
    if ok == 0 {
        Err(DriverError::new(op, status))
    } else {
        Ok(())
    }
}

/// M8266 module on the host SPI bus.
pub struct M8266Radio<RST, CS, D> {
    nreset: RST,
    ncs: CS,
    delay: D,
    spi_base: u32,
}

impl<RST: OutputPin, CS: OutputPin, D: DelayNs> M8266Radio<RST, CS, D> {
    pub fn new(nreset: RST, ncs: CS, delay: D, spi_base: u32) -> Self {
        // SAFETY: configures the host SPI peripheral; called once from the
        // main task before any other vendor call.
        unsafe { M8266HostIf_Init() };
        Self {
            nreset,
            ncs,
            delay,
            spi_base,
        }
    }

    fn query_raw(
        query: unsafe extern "C" fn(u8, *mut u8, *mut u8, *mut u16) -> u8,
        code: u8,
        buf: &mut [u8],
    ) -> Result<usize, DriverError> {
        let mut scratch = [0u8; 64];
        let mut len = 0u8;
        let mut status = 0u16;
        // SAFETY: scratch outlives the call and holds the longest parameter
        // the module returns.
        let ok = unsafe { query(code, scratch.as_mut_ptr(), &mut len, &mut status) };
        check(DriverOp::QueryParam, ok, status)?;
        let n = (len as usize).min(scratch.len()).min(buf.len());
        buf[..n].copy_from_slice(&scratch[..n]);
        Ok(n)
    }

    fn query_addr(
        query: unsafe extern "C" fn(u8, *mut u8, *mut u8, *mut u16) -> u8,
        code: u8,
    ) -> Result<Ipv4Addr, DriverError> {
        let mut buf = [0u8; 16];
        let n = Self::query_raw(query, code, &mut buf)
            .map_err(|e| DriverError::new(DriverOp::QueryAddress, e.status))?;
        Ok(parse_c_addr(&buf[..n]))
    }
}

impl<RST: OutputPin, CS: OutputPin, D: DelayNs> RadioDriver for M8266Radio<RST, CS, D> {
    fn hardware_reset(&mut self) -> Result<(), DriverError> {
        hardware_reset(&mut self.nreset, &mut self.ncs, &mut self.delay)
    }

    fn select_interface(&mut self, clock_hz: u32) -> Result<(), DriverError> {
        let mut status = 0u16;
        // SAFETY: plain register configuration in the vendor library.
        let ok = unsafe {
            M8266HostIf_SPI_SetSpeed(SPI_PRESCALER_4);
            M8266HostIf_SPI_Select(self.spi_base, clock_hz, &mut status)
        };
        self.delay.delay_ms(1);
        check(DriverOp::SelectInterface, ok, status)
    }

    fn self_test(&mut self) -> bool {
        let mut byte = 0u8;
        // SAFETY: `byte` is a valid out-pointer for the duration of the call.
        unsafe { M8266WIFI_SPI_Interface_Communication_OK(&mut byte) != 0 }
    }

    fn stress_test(&mut self, rounds: u32) -> u32 {
        // SAFETY: no pointers cross the boundary.
        unsafe { M8266WIFI_SPI_Interface_Communication_Stress_Test(rounds) }
    }

    fn set_tx_max_power(&mut self, level: u8) -> Result<(), DriverError> {
        let mut status = 0u16;
        // SAFETY: status is a valid out-pointer.
        let ok = unsafe { M8266WIFI_SPI_Set_Tx_Max_Power(level, &mut status) };
        check(DriverOp::SetTxPower, ok, status)
    }

    fn set_op_mode(&mut self, mode: OpMode) -> Result<(), DriverError> {
        let mut status = 0u16;
        // SAFETY: status is a valid out-pointer.
        let ok = unsafe { M8266WIFI_SPI_Set_Opmode(mode as u8, 1, &mut status) };
        check(DriverOp::SetOpMode, ok, status)
    }

    fn setup_connection(
        &mut self,
        link: LinkId,
        kind: LinkKind,
        local_port: u16,
        remote: Endpoint,
    ) -> Result<(), DriverError> {
        let addr = c_addr(remote.ip());
        let mut status = 0u16;
        // SAFETY: addr is NUL-terminated and lives across the call.
        let ok = unsafe {
            M8266WIFI_SPI_Setup_Connection(
                kind as u8,
                local_port,
                addr.as_ptr(),
                remote.port,
                link.0,
                3,
                &mut status,
            )
        };
        check(DriverOp::SetupConnection, ok, status)
    }

    fn delete_connection(&mut self, link: LinkId) -> Result<(), DriverError> {
        let mut status = 0u16;
        // SAFETY: status is a valid out-pointer.
        let ok = unsafe { M8266WIFI_SPI_Delete_Connection(link.0, &mut status) };
        check(DriverOp::DeleteConnection, ok, status)
    }

    fn config_max_clients(&mut self, link: LinkId, max: u8) -> Result<(), DriverError> {
        let mut status = 0u16;
        // SAFETY: status is a valid out-pointer.
        let ok = unsafe { M8266WIFI_SPI_Config_Max_Clients_Allowed_To_A_Tcp_Server(link.0, max, &mut status) };
        check(DriverOp::ConfigMaxClients, ok, status)
    }

    fn set_auto_disconnect(&mut self, link: LinkId, timeout_s: u16) -> Result<(), DriverError> {
        let mut status = 0u16;
        // SAFETY: status is a valid out-pointer.
        let ok = unsafe { M8266WIFI_SPI_Set_TcpServer_Auto_Discon_Timeout(link.0, timeout_s, &mut status) };
        check(DriverOp::SetAutoDisconnect, ok, status)
    }

    fn has_data(&mut self) -> bool {
        // SAFETY: no pointers cross the boundary.
        unsafe { M8266WIFI_SPI_Has_DataReceived() != 0 }
    }

    fn recv(&mut self, buf: &mut [u8], timeout_ms: u16) -> Result<Option<RxFrame>, DriverError> {
        let mut link = 0u8;
        let mut ip = [0u8; 4];
        let mut port = 0u16;
        let mut status = 0u16;
        let max = buf.len().min(usize::from(u16::MAX)) as u16;
        // SAFETY: every pointer refers to a live local or to `buf`, whose
        // length bounds `max`.
        let n = unsafe {
            M8266WIFI_SPI_RecvData_ex(buf.as_mut_ptr(), max, timeout_ms, &mut link, ip.as_mut_ptr(), &mut port, &mut status)
        };
        if n == 0 {
            // Low byte 0x22 is "no data within the wait window".
            return if status & 0xFF == 0x22 || status == 0 {
                Ok(None)
            } else {
                Err(DriverError::new(DriverOp::Receive, status))
            };
        }
        Ok(Some(RxFrame {
            link: LinkId(link),
            peer: Endpoint::new(ip, port),
            len: n as usize,
        }))
    }

    fn send(&mut self, link: LinkId, peer: Option<Endpoint>, data: &[u8]) -> Result<usize, DriverError> {
        let mut status = 0u16;
        let sent = match peer {
            Some(ep) => {
                let addr = c_addr(ep.ip());
                // SAFETY: data and addr outlive the call.
                unsafe {
                    M8266WIFI_SPI_Send_BlockData(
                        data.as_ptr(),
                        data.len() as u32,
                        SEND_MAX_LOOPS,
                        link.0,
                        addr.as_ptr(),
                        ep.port,
                        &mut status,
                    ) as usize
                }
            }
            None => {
                // SAFETY: a null address selects the link's default peer.
                unsafe {
                    M8266WIFI_SPI_Send_BlockData(
                        data.as_ptr(),
                        data.len() as u32,
                        SEND_MAX_LOOPS,
                        link.0,
                        core::ptr::null(),
                        0,
                        &mut status,
                    ) as usize
                }
            }
        };
        if sent == 0 && !data.is_empty() {
            return Err(DriverError::new(DriverOp::Send, status));
        }
        Ok(sent)
    }

    fn list_clients(&mut self, link: LinkId) -> Result<ClientList, DriverError> {
        let mut raw = [RawClientInfo::default(); MAX_CLIENTS];
        let mut count = 0u8;
        let mut status = 0u16;
        // SAFETY: raw holds MAX_CLIENTS records, the documented maximum.
        let ok = unsafe { M8266WIFI_SPI_List_Clients_On_A_TCP_Server(link.0, &mut count, raw.as_mut_ptr(), &mut status) };
        check(DriverOp::ListClients, ok, status)?;
        let mut out = ClientList::new();
        for (slot, c) in raw.iter().take(count as usize).enumerate() {
            let _ = out.push(ClientInfo {
                peer: Endpoint::new(c.remote_ip, c.remote_port),
                slot: slot as u8,
            });
        }
        Ok(out)
    }

    fn disconnect_client(&mut self, link: LinkId, client: &ClientInfo) -> Result<(), DriverError> {
        let raw = RawClientInfo {
            remote_ip: client.peer.address,
            remote_port: client.peer.port,
        };
        let mut status = 0u16;
        // SAFETY: raw lives across the call.
        let ok = unsafe { M8266WIFI_SPI_Disconnect_TcpClient(link.0, &raw, &mut status) };
        check(DriverOp::DisconnectClient, ok, status)
    }

    fn sta_status(&mut self) -> Result<StaStatus, DriverError> {
        let mut raw = 0u8;
        let mut status = 0u16;
        // SAFETY: both out-pointers are live locals.
        let ok = unsafe { M8266WIFI_SPI_Get_STA_Connection_Status(&mut raw, &mut status) };
        check(DriverOp::QueryStatus, ok, status)?;
        Ok(StaStatus::from_raw(raw))
    }

    fn sta_disconnect(&mut self) -> Result<(), DriverError> {
        let mut status = 0u16;
        // SAFETY: status is a valid out-pointer.
        let ok = unsafe { M8266WIFI_SPI_STA_DisConnect_Ap(&mut status) };
        check(DriverOp::Disconnect, ok, status)
    }

    fn sta_address(&mut self) -> Result<IfAddr, DriverError> {
        let query = M8266WIFI_SPI_Query_STA_Param;
        Ok(IfAddr {
            ip: Self::query_addr(query, sta_param_code(StaParam::IpAddr))?,
            netmask: Self::query_addr(query, sta_param_code(StaParam::NetmaskAddr))?,
        })
    }

    fn ap_address(&mut self) -> Result<IfAddr, DriverError> {
        let query = M8266WIFI_SPI_Query_AP_Param;
        Ok(IfAddr {
            ip: Self::query_addr(query, ap_param_code(ApParam::IpAddr))?,
            netmask: Self::query_addr(query, ap_param_code(ApParam::NetmaskAddr))?,
        })
    }

    fn start_scan(&mut self) -> Result<(), DriverError> {
        let mut raw = [RawScannedSig::default(); MAX_WLAN_SIGNALS];
        let mut status = 0u16;
        // SAFETY: raw holds MAX_WLAN_SIGNALS records; channel 0xFF scans
        // every channel.
        let ok = unsafe {
            M8266WIFI_SPI_STA_Scan_Signals(raw.as_mut_ptr(), MAX_WLAN_SIGNALS as u8, 0xFF, 0, &mut status)
        };
        // A started scan reports "in progress" through the status.
        if ok == 0 && status & 0xFF != SCAN_IN_PROGRESS {
            return Err(DriverError::new(DriverOp::Scan, status));
        }
        Ok(())
    }

    fn fetch_scan(&mut self) -> Result<Option<ScanList>, DriverError> {
        let mut raw = [RawScannedSig::default(); MAX_WLAN_SIGNALS];
        let mut status = 0u16;
        // SAFETY: raw holds MAX_WLAN_SIGNALS records.
        let count = unsafe {
            M8266WIFI_SPI_STA_Fetch_Last_Scanned_Signals(raw.as_mut_ptr(), MAX_WLAN_SIGNALS as u8, &mut status)
        };
        if count == 0 {
            return if status & 0xFF == SCAN_IN_PROGRESS {
                Ok(None)
            } else {
                Err(DriverError::new(DriverOp::Scan, status))
            };
        }
        let mut out = ScanList::new();
        for sig in raw.iter().take(count as usize) {
            let _ = out.push(ScannedSignal {
                ssid: heapless::String::try_from(c_text(&sig.ssid)).unwrap_or_default(),
                authmode: sig.authmode,
                rssi: sig.rssi,
                channel: sig.channel,
            });
        }
        Ok(Some(out))
    }

    fn sta_connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        let ssid = c_string(DriverOp::Connect, ssid)?;
        let password = c_string(DriverOp::Connect, password)?;
        let mut status = 0u16;
        // SAFETY: both strings are NUL-terminated and outlive the call. A
        // zero timeout returns at once; progress is polled via sta_status.
        let ok = unsafe {
            M8266WIFI_SPI_STA_Connect_Ap(
                ssid.as_ptr().cast(),
                password.as_ptr().cast(),
                SAVED,
                0,
                &mut status,
            )
        };
        check(DriverOp::Connect, ok, status)
    }

    fn query_sta_param(&mut self, param: StaParam, buf: &mut [u8]) -> Result<usize, DriverError> {
        Self::query_raw(M8266WIFI_SPI_Query_STA_Param, sta_param_code(param), buf)
    }

    fn query_ap_param(&mut self, param: ApParam, buf: &mut [u8]) -> Result<usize, DriverError> {
        Self::query_raw(M8266WIFI_SPI_Query_AP_Param, ap_param_code(param), buf)
    }

    fn config_ap_param(&mut self, param: ApParam, value: &[u8]) -> Result<(), DriverError> {
        let len = u8::try_from(value.len()).map_err(|_| DriverError::new(DriverOp::ConfigAp, 0))?;
        let mut status = 0u16;
        // SAFETY: value is valid for `len` bytes across the call.
        let ok = unsafe { M8266WIFI_SPI_Config_AP_Param(ap_param_code(param), value.as_ptr(), len, SAVED, &mut status) };
        check(DriverOp::ConfigAp, ok, status)
    }

    fn op_mode(&mut self) -> Result<OpMode, DriverError> {
        let mut raw = 0u8;
        let mut status = 0u16;
        // SAFETY: both out-pointers are live locals.
        let ok = unsafe { M8266WIFI_SPI_Get_Opmode(&mut raw, &mut status) };
        check(DriverOp::GetOpMode, ok, status)?;
        OpMode::from_raw(raw).ok_or(DriverError::new(DriverOp::GetOpMode, u16::from(raw)))
    }

    fn module_info(&mut self) -> Result<ModuleInfo, DriverError> {
        let mut chip_id = 0u32;
        let mut flash_size = 0u8;
        let mut fw = [0u8; 24];
        let mut status = 0u16;
        // SAFETY: fw is the 24-byte buffer the library fills.
        let ok = unsafe { M8266WIFI_SPI_Get_Module_Info(&mut chip_id, &mut flash_size, fw.as_mut_ptr(), &mut status) };
        check(DriverOp::ModuleInfo, ok, status)?;
        Ok(ModuleInfo {
            chip_id,
            flash_size,
            firmware: heapless::String::try_from(c_text(&fw)).unwrap_or_default(),
        })
    }

    fn connection_state(&mut self, link: LinkId) -> Result<u8, DriverError> {
        let mut state = 0u8;
        let mut status = 0u16;
        // SAFETY: null out-pointers are skipped by the library.
        let ok = unsafe {
            M8266WIFI_SPI_Query_Connection(
                link.0,
                core::ptr::null_mut(),
                &mut state,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
                core::ptr::null_mut(),
                &mut status,
            )
        };
        check(DriverOp::QueryConnection, ok, status)?;
        Ok(state)
    }
}
