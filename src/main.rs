//! Wireless transport firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  M8266Radio        StdFileStore   Esp32Time     LineQueue      │
//! │  (RadioDriver)     (FileStore)    (TimePort)    (ConsoleSink)  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  LinkMux · TcpServer · WebServer · Shell · XModem      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  data-ready ISR ─▶ IrqFlag ─▶ poll()      1 Hz ─▶ beacons      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{AnyOutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use log::{debug, error, info, warn};

use wifilink::adapters::fs::StdFileStore;
use wifilink::adapters::line_queue::LineQueue;
use wifilink::adapters::machine::StandaloneMachine;
use wifilink::adapters::time::Esp32TimeAdapter;
use wifilink::config::{WifiConfig, CONFIG_PATH};
use wifilink::drivers::hw_init;
use wifilink::drivers::m8266::M8266Radio;
use wifilink::http::{HelloWorld, SimpleHandler, WebServer};
use wifilink::link::{commands, LinkMux};
use wifilink::pins;
use wifilink::shell::Shell;
use wifilink::stream::ByteStream;

/// Mount point of the SD card VFS.
const SD_ROOT: &str = "/";

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  wifilink v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let files = StdFileStore::new(SD_ROOT);
    let config = match WifiConfig::load(&files, CONFIG_PATH) {
        Ok(c) => c,
        Err(e) => {
            warn!("{}; using defaults", e);
            WifiConfig::default()
        }
    };

    // ── 3. Radio co-processor ─────────────────────────────────
    let _peripherals = Peripherals::take()?;
    // SAFETY: the singleton above is held for the life of main() and no
    // other driver is created for these two pins.
    let (nreset_pin, ncs_pin) = unsafe {
        (
            AnyOutputPin::new(pins::RADIO_NRESET_GPIO),
            AnyOutputPin::new(pins::RADIO_NCS_GPIO),
        )
    };
    let nreset = PinDriver::output(nreset_pin)?;
    let ncs = PinDriver::output(ncs_pin)?;
    let radio = M8266Radio::new(nreset, ncs, Esp32TimeAdapter::new(), pins::RADIO_SPI_HOST);

    let mut mux = LinkMux::new(radio, config.clone());
    if let Err(e) = mux.initialize() {
        error!("radio bring-up failed ({}), networking disabled", e);
    }
    if let Err(e) = hw_init::install_radio_isr(mux.irq_handle()) {
        warn!("{}; falling back to polling the radio", e);
    }

    // ── 4. Web server ─────────────────────────────────────────
    let web = if config.webserver_enable && mux.is_ready() {
        let web = WebServer::new(&mut mux, config.webserver_port, config.max_http_clients);
        web.register_handler(SimpleHandler::new(HelloWorld));
        info!("web server on port {} (enabled={})", config.webserver_port, web.is_enabled());
        Some(web)
    } else {
        None
    };

    // ── 5. Console consumers ──────────────────────────────────
    let mut machine = StandaloneMachine::new();
    machine.feed_hold_enabled = config.feed_hold_enabled;
    let mut lines = LineQueue::new();
    let mut console = mux.console_stream();
    let mut shell = Shell::new(files, Esp32TimeAdapter::new());

    let mut clock = Esp32TimeAdapter::new();
    let mut last_tick = clock.uptime_secs();

    info!("System ready. Entering main loop.");

    // ── 6. Main loop ──────────────────────────────────────────
    loop {
        mux.poll(&mut machine, &mut lines);

        while let Some(line) = lines.pop() {
            if commands::execute(&mut mux, &mut clock, &line, &mut console) {
                continue;
            }
            if !shell.execute(&line, &mut console, &mut machine) {
                debug!("console: unhandled {:?}", line);
                console.print("ok\r\n");
            }
        }

        let now = clock.uptime_secs();
        if now != last_tick {
            last_tick = now;
            mux.on_second_tick(&machine);
            if let Some(web) = &web {
                web.on_second_tick();
            }
        }

        FreeRtos::delay_ms(1);
    }
}
