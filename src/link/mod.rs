//! Link multiplexer: the only owner of the radio co-processor.
//!
//! ```text
//!             ┌──────────────────── LinkMux ─────────────────────┐
//!  GPIO ISR ─▶│ IrqFlag ─▶ poll() ─▶ recv ─┬─ callback(link)     │─▶ TcpServer / WebServer
//!             │                            ├─ console (link 1) ──│─▶ ConsoleBuffer ─▶ ConsoleSink
//!             │                            └─ other: dropped     │
//!             │ on_second_tick() ─▶ StaHealth ─▶ beacon (link 0)  │
//!             │ wlan: scan · join · AP settings · module queries │
//!             └───────────────────────────┬──────────────────────┘
//!                                         │ LinkIo (shared, short borrows)
//!                                   RadioDriver (SPI)
//! ```
//!
//! Until [`LinkMux::initialize`] succeeds every operation fails fast with
//! [`LinkError::Disabled`]; the rest of the firmware keeps running.

pub mod commands;
pub mod console;
pub mod discovery;
pub mod io;
pub mod registry;
pub mod stream;
pub mod wlan;

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::app::ports::{ConsoleSink, MachinePort};
use crate::config::WifiConfig;
use crate::drivers::radio::{IfAddr, LinkId, LinkKind, OpMode, RadioDriver, MAX_FRAME};
use crate::endpoint::Endpoint;
use crate::error::{DriverError, DriverOp, LinkError};
use crate::events::IrqFlag;

use self::console::ConsoleBuffer;
use self::discovery::{beacon, HealthAction, StaHealth};
use self::io::LinkIo;
use self::registry::{LinkTable, FIRST_DYNAMIC_LINK};
use self::stream::ConsoleStream;

/// Broadcast/discovery UDP link.
pub const DISCOVERY_LINK: LinkId = LinkId(0);
/// Console TCP server link.
pub const CONSOLE_LINK: LinkId = LinkId(1);

/// Bulk round trips run by the start-up stress test.
pub const STRESS_TEST_ROUNDS: u32 = 100_000;
/// Failed stress rounds tolerated before the bus is declared unusable.
pub const STRESS_TEST_TOLERANCE: u32 = 5;

/// Default peer of the console server (the first AP client address).
const CONSOLE_REMOTE: Endpoint = Endpoint::new([192, 168, 4, 10], 0);
/// Default peer of the discovery link.
const DISCOVERY_REMOTE: Endpoint = Endpoint::new([192, 168, 4, 255], 0);

pub struct LinkMux<R> {
    io: LinkIo<R>,
    irq: Arc<IrqFlag>,
    links: LinkTable,
    console: ConsoleBuffer,
    health: StaHealth,
    config: WifiConfig,
    ap_addr: Option<IfAddr>,
    ready: bool,
    rx_buf: Vec<u8>,
}

impl<R: RadioDriver> LinkMux<R> {
    pub fn new(radio: R, config: WifiConfig) -> Self {
        Self {
            io: LinkIo::new(radio),
            irq: Arc::new(IrqFlag::new()),
            links: LinkTable::new(),
            console: ConsoleBuffer::new(),
            health: StaHealth::new(),
            config,
            ap_addr: None,
            ready: false,
            rx_buf: vec![0; MAX_FRAME],
        }
    }

    // ── Bring-up ──────────────────────────────────────────────

    /// Reset and self-test the co-processor, then open the reserved links.
    ///
    /// Dynamic links already in the table (after [`Self::reset_module`])
    /// are opened again with their original parameters.
    pub fn initialize(&mut self) -> Result<(), LinkError> {
        self.ready = false;
        let config = &self.config;
        let result = self
            .io
            .with_radio(|r| bring_up(r, config))
            .and_then(|r| r.map_err(LinkError::from));
        let ap = match result {
            Ok(ap) => ap,
            Err(e) => {
                error!("wifi: init failed, networking disabled: {}", e);
                return Err(e);
            }
        };

        self.links
            .reserve(DISCOVERY_LINK, LinkKind::Udp, self.config.udp_recv_port);
        self.links
            .reserve(CONSOLE_LINK, LinkKind::TcpServer, self.config.tcp_port);

        let dynamic: Vec<_> = self
            .links
            .dynamic()
            .map(|(id, e)| (id, e.kind, e.local_port, e.max_clients))
            .collect();
        for (id, kind, port, max_clients) in dynamic {
            self.io
                .with_radio(|r| open_link(r, id, kind, port, max_clients))
                .and_then(|r| r.map_err(LinkError::from))?;
        }

        self.ap_addr = Some(ap);
        self.ready = true;
        info!(
            "wifi: ready, AP {} console port {} discovery port {}",
            ap.ip, self.config.tcp_port, self.config.udp_recv_port
        );
        Ok(())
    }

    /// Tear down every link on the co-processor and bring it up again.
    pub fn reset_module(&mut self) -> Result<(), LinkError> {
        info!("wifi: resetting module");
        let open: Vec<LinkId> = [DISCOVERY_LINK, CONSOLE_LINK]
            .into_iter()
            .chain(self.links.dynamic().map(|(id, _)| id))
            .collect();
        if self.ready {
            for id in open {
                match self.io.with_radio(|r| r.delete_connection(id)) {
                    Ok(Err(e)) => debug!("wifi: delete link {}: {}", id, e),
                    Err(e) => debug!("wifi: delete link {}: {}", id, e),
                    Ok(Ok(())) => {}
                }
            }
        }
        self.console.clear();
        self.irq.take();
        self.initialize()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn ensure_ready(&self) -> Result<(), LinkError> {
        if self.ready {
            Ok(())
        } else {
            Err(LinkError::Disabled)
        }
    }

    pub fn set_op_mode(&mut self, mode: OpMode) -> Result<(), LinkError> {
        self.ensure_ready()?;
        self.io.with_radio(|r| r.set_op_mode(mode))??;
        Ok(())
    }

    // ── Links ─────────────────────────────────────────────────

    /// Open the next free link as `kind` on `local_port`.
    pub fn allocate_link(
        &mut self,
        kind: LinkKind,
        local_port: u16,
        max_clients: Option<u8>,
    ) -> Result<LinkId, LinkError> {
        self.ensure_ready()?;
        let id = self.links.allocate(kind, local_port, max_clients)?;
        let opened = self
            .io
            .with_radio(|r| open_link(r, id, kind, local_port, max_clients))
            .and_then(|r| r.map_err(LinkError::from));
        if let Err(e) = opened {
            warn!("link {}: open on port {} failed: {}", id, local_port, e);
            self.links.remove(id);
            return Err(e);
        }
        info!("link {}: {:?} on port {}", id, kind, local_port);
        Ok(id)
    }

    /// Close a dynamic link and drop its callback.
    pub fn remove_server(&mut self, link: LinkId) -> Result<(), LinkError> {
        self.ensure_ready()?;
        if link.0 < FIRST_DYNAMIC_LINK || self.links.remove(link).is_none() {
            return Err(LinkError::UnknownLink(link.0));
        }
        self.io.with_radio(|r| r.delete_connection(link))??;
        info!("link {}: removed", link);
        Ok(())
    }

    /// Route data arriving on `link` to `callback`, replacing any previous one.
    pub fn register_callback(
        &mut self,
        link: LinkId,
        callback: impl FnMut(Endpoint, &[u8]) + 'static,
    ) -> Result<(), LinkError> {
        self.links.register(link, Box::new(callback))
    }

    pub fn deregister(&mut self, link: LinkId) {
        self.links.deregister(link);
    }

    /// Send on an open link. `peer` may be `None` on connection-oriented
    /// links.
    pub fn send(&self, link: LinkId, peer: Option<Endpoint>, data: &[u8]) -> Result<usize, LinkError> {
        self.ensure_ready()?;
        if !self.links.contains(link) {
            return Err(LinkError::UnknownLink(link.0));
        }
        self.io.send(link, peer, data)
    }

    /// Send text to the console client.
    pub fn console_puts(&self, text: &str) -> Result<usize, LinkError> {
        self.send(CONSOLE_LINK, None, text.as_bytes())
    }

    /// Shared driver handle for transport facades.
    pub fn io(&self) -> LinkIo<R> {
        self.io.clone()
    }

    /// Raw byte stream over the console link.
    pub fn console_stream(&self) -> ConsoleStream<R> {
        ConsoleStream::new(self.io.clone(), CONSOLE_LINK)
    }

    // ── Interrupt handoff ─────────────────────────────────────

    /// Data-ready notification. The only entry point allowed in ISR context.
    #[inline]
    pub fn on_data_ready_interrupt(&self) {
        self.irq.raise();
    }

    /// Flag handle for the GPIO ISR closure.
    pub fn irq_handle(&self) -> Arc<IrqFlag> {
        Arc::clone(&self.irq)
    }

    // ── Main loop ─────────────────────────────────────────────

    /// Idle-loop pass: drain inbound frames, then hand at most one complete
    /// console line to `sink`.
    pub fn poll<M: MachinePort, S: ConsoleSink>(&mut self, machine: &mut M, sink: &mut S) {
        if !self.ready {
            return;
        }
        if !machine.is_uploading() && self.io.rx_enabled() {
            let flagged = self.irq.take();
            if flagged || self.io.has_data() {
                self.service_rx(machine);
            }
        }
        self.deliver_console_line(sink);
    }

    fn service_rx<M: MachinePort>(&mut self, machine: &mut M) {
        loop {
            let frame = match self.io.recv(&mut self.rx_buf) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("wifi: receive failed: {}", e);
                    break;
                }
            };
            let data = &self.rx_buf[..frame.len];

            if let Some(callback) = self.links.callback_mut(frame.link) {
                callback(frame.peer, data);
            } else if frame.link == CONSOLE_LINK {
                let io = &self.io;
                self.console.ingest(data, machine, |text| {
                    if let Err(e) = io.send(CONSOLE_LINK, None, text.as_bytes()) {
                        warn!("console: reply failed: {}", e);
                    }
                });
            } else {
                debug!(
                    "link {}: dropped {} bytes from {}",
                    frame.link, frame.len, frame.peer
                );
            }

            if frame.len < MAX_FRAME {
                break;
            }
        }
    }

    /// Hand the oldest complete console line to `sink`.
    pub fn deliver_console_line<S: ConsoleSink>(&mut self, sink: &mut S) -> bool {
        match self.console.take_line() {
            Some(line) => {
                sink.on_console_line(&line);
                true
            }
            None => false,
        }
    }

    /// 1 Hz housekeeping: station health and discovery beacons.
    pub fn on_second_tick<M: MachinePort>(&mut self, machine: &M) {
        if !self.ready || machine.is_uploading() {
            return;
        }

        let connected = match self.io.list_clients(CONSOLE_LINK) {
            Ok(clients) => !clients.is_empty(),
            Err(e) => {
                debug!("wifi: list console clients: {}", e);
                false
            }
        };

        let status = self
            .io
            .with_radio(|r| r.sta_status())
            .and_then(|r| r.map_err(LinkError::from));
        match status {
            Ok(status) => match self.health.observe(status) {
                HealthAction::Connected => {
                    let addr = self
                        .io
                        .with_radio(|r| r.sta_address())
                        .and_then(|r| r.map_err(LinkError::from));
                    match addr {
                        Ok(sta) => self.send_beacon(sta, connected),
                        Err(e) => debug!("wifi: station address: {}", e),
                    }
                }
                HealthAction::ForceDisconnect => {
                    if let Err(e) = self
                        .io
                        .with_radio(|r| r.sta_disconnect())
                        .and_then(|r| r.map_err(LinkError::from))
                    {
                        warn!("wifi: station disconnect failed: {}", e);
                    }
                }
                HealthAction::Retry => {}
            },
            Err(e) => debug!("wifi: station status: {}", e),
        }

        if let Some(ap) = self.ap_addr {
            self.send_beacon(ap, connected);
        }
    }

    fn send_beacon(&self, iface: IfAddr, connected: bool) {
        let msg = beacon(
            &self.config.machine_name,
            iface.ip,
            self.config.tcp_port,
            connected,
        );
        let dest = Endpoint::new(iface.broadcast().octets(), self.config.udp_send_port);
        if let Err(e) = self.io.send(DISCOVERY_LINK, Some(dest), msg.as_bytes()) {
            debug!("wifi: beacon to {} failed: {}", dest, e);
        }
    }
}

fn bring_up<R: RadioDriver>(radio: &mut R, config: &WifiConfig) -> Result<IfAddr, DriverError> {
    radio.hardware_reset()?;
    radio.select_interface(config.spi_clock_hz)?;
    if !radio.self_test() {
        return Err(DriverError::new(DriverOp::SelfTest, 0));
    }
    let ok = radio.stress_test(STRESS_TEST_ROUNDS);
    if ok + STRESS_TEST_TOLERANCE < STRESS_TEST_ROUNDS {
        let failed = STRESS_TEST_ROUNDS - ok;
        warn!("wifi: stress test failed {} of {} rounds", failed, STRESS_TEST_ROUNDS);
        return Err(DriverError::new(
            DriverOp::StressTest,
            u16::try_from(failed).unwrap_or(u16::MAX),
        ));
    }
    radio.set_tx_max_power(config.tx_max_power)?;

    radio.setup_connection(CONSOLE_LINK, LinkKind::TcpServer, config.tcp_port, CONSOLE_REMOTE)?;
    radio.set_auto_disconnect(CONSOLE_LINK, config.tcp_timeout_s)?;
    radio.setup_connection(DISCOVERY_LINK, LinkKind::Udp, config.udp_recv_port, DISCOVERY_REMOTE)?;

    radio.ap_address()
}

fn open_link<R: RadioDriver>(
    radio: &mut R,
    id: LinkId,
    kind: LinkKind,
    local_port: u16,
    max_clients: Option<u8>,
) -> Result<(), DriverError> {
    radio.setup_connection(id, kind, local_port, Endpoint::default())?;
    if let Some(max) = max_clients {
        radio.config_max_clients(id, max)?;
    }
    Ok(())
}
