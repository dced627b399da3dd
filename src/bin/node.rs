use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::time;
use tracing::{error, info, warn};

use mcremote::command::Command;
use mcremote::device::{DallasDevice, Device, DeviceKind, DeviceRegistry};
use mcremote::dispatch::{CommandDispatcher, CommandReport};
use mcremote::engine::{BusEngine, CycleReadings, CycleTimer, LocalPwmEngine};
use mcremote::identity::{node_id_from_mac, BusFamily, IdentityBuffer};
use mcremote::monitor::{HeapMonitor, DEFAULT_SAMPLE_PERIOD_S};
use mcremote::reading::Reading;
use mcremote::DeviceAddress;

const TCP_PORT: u16 = 8484;
const REPORT_BROADCAST_BUFFER_SIZE: usize = 256;
const CYCLE_PERIOD_MS: u64 = 1000;
const STARTUP_GATE_MAX_WAIT_MS: u64 = 2000;
const SIMULATED_HEAP_BYTES: u32 = 192 * 1024;
const NODE_MAC: [u8; 6] = [0xde, 0xad, 0x28, 0x01, 0x02, 0x03];

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Stand-in 1-Wire worker: two fixed ROM codes and a slow-drifting
/// temperature, so the node exercises the full reading path without bus
/// hardware attached.
struct MockDallasEngine {
    rom_codes: [[u8; 8]; 2],
}

impl MockDallasEngine {
    fn new() -> Self {
        Self {
            rom_codes: [
                [0x28, 0xff, 0x64, 0x0e, 0x71, 0x16, 0x03, 0x62],
                [0x29, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77],
            ],
        }
    }
}

impl BusEngine for MockDallasEngine {
    fn family(&self) -> BusFamily {
        BusFamily::OneWire
    }

    fn engine_id(&self) -> &'static str {
        "ds"
    }

    fn discover(
        &mut self,
        registry: &mut DeviceRegistry,
        _now_us: u64,
    ) -> Result<usize, &'static str> {
        for rom in &self.rom_codes {
            let address = DeviceAddress::from_bytes(rom).map_err(|_| "bad rom code")?;
            let kind = DeviceKind::Dallas(DallasDevice::from_address(&address, false));
            registry
                .register(Device::new(address, kind))
                .map_err(|_| "device table full")?;
        }
        Ok(self.rom_codes.len())
    }

    fn read_all(
        &mut self,
        registry: &mut DeviceRegistry,
        now_us: u64,
        readings: &mut CycleReadings,
    ) -> Result<(), &'static str> {
        let drift = ((now_us as f32) * 1e-6).sin() * 2.0;
        for device in registry.iter_mut() {
            let DeviceKind::Dallas(dallas) = *device.kind() else {
                continue;
            };
            device.mark_read(now_us);
            let id = *device.identity();
            let mtime_s = now_us / 1_000_000;

            let reading = if dallas.has_temperature() {
                Reading::celsius(id.as_str(), mtime_s, 21.0 + drift)
            } else if dallas.pio_count() > 0 {
                Reading::switch(
                    id.as_str(),
                    mtime_s,
                    dallas.pio_count(),
                    u16::from(device.output_state()),
                )
                .map_err(|_| "switch reading out of range")?
            } else {
                continue;
            };
            readings.push(reading).map_err(|_| "reading buffer full")?;
        }
        Ok(())
    }

    fn execute(
        &mut self,
        registry: &mut DeviceRegistry,
        command: &Command,
        now_us: u64,
    ) -> Result<bool, &'static str> {
        let Some(target) = command.target_id() else {
            return Ok(false);
        };
        let Some(device) = registry.lookup_mut(target) else {
            return Ok(false);
        };
        if device.family() != BusFamily::OneWire || !device.is_switch() {
            return Ok(false);
        }

        device.apply_switch(command.mask, command.state, now_us);
        Ok(true)
    }
}

struct NodeCore {
    node_id: IdentityBuffer,
    registry: DeviceRegistry,
    dispatcher: CommandDispatcher,
    dallas: MockDallasEngine,
    pwm: LocalPwmEngine,
    monitor: HeapMonitor,
}

impl NodeCore {
    fn new() -> Self {
        let node_id = node_id_from_mac(&NODE_MAC);
        let monitor = HeapMonitor::new(node_id, DEFAULT_SAMPLE_PERIOD_S);
        let mut dispatcher = CommandDispatcher::new();
        dispatcher
            .register_bus(BusFamily::OneWire)
            .expect("bus table");
        dispatcher.register_bus(BusFamily::Local).expect("bus table");

        Self {
            node_id,
            registry: DeviceRegistry::new(),
            dispatcher,
            dallas: MockDallasEngine::new(),
            pwm: LocalPwmEngine::new(&[0, 1]),
            monitor,
        }
    }

    fn startup(&mut self) -> Vec<String> {
        let now = now_us();
        if let Err(reason) = self.dallas.discover(&mut self.registry, now) {
            warn!(reason, "1-wire discovery failed");
        }
        if let Err(reason) = self.pwm.discover(&mut self.registry, now) {
            warn!(reason, "pwm discovery failed");
        }
        info!(devices = self.registry.len(), "bus enumeration complete");

        let startup = Reading::startup(self.node_id.as_str(), now / 1_000_000);
        vec![render_reading(&startup)]
    }

    fn handle_line(&mut self, line: &str) -> Vec<String> {
        if line == "status" {
            let mut status = self.registry.snapshot();
            if let Some(root) = status.as_object_mut() {
                root.insert("node".into(), self.node_id.as_str().into());
                if let Ok(stats) = serde_json::to_value(self.dispatcher.stats()) {
                    root.insert("dispatch".into(), stats);
                }
            }
            return vec![status.to_string()];
        }

        let now = now_us();
        let mut command = match Command::parse(line, now) {
            Ok(command) => command,
            Err(reason) => {
                warn!(%reason, "rejecting unparseable command frame");
                return vec![
                    serde_json::json!({ "ack": false, "reason": reason.to_string() }).to_string(),
                ];
            }
        };

        if command.needs_time_sync {
            // The clock subsystem owns the actual adjustment.
            info!(mtime = command.mtime_s, "clock skew beyond threshold, signaling time sync");
        }

        if command.resolve(&self.registry).is_err() {
            warn!(refid = command.refid.as_str(), "command target not registered");
            return vec![serde_json::json!({
                "refid": command.refid.as_str(),
                "ack": false,
                "reason": "unresolved",
                "mtime": now / 1_000_000,
            })
            .to_string()];
        }

        match self.dispatcher.dispatch(command, now) {
            Ok(Some(report)) => vec![render_report(&report)],
            Ok(None) => Vec::new(),
            Err(reason) => {
                warn!(%reason, "dispatch failed");
                vec![serde_json::json!({ "ack": false, "reason": reason.to_string() }).to_string()]
            }
        }
    }

    fn cycle(&mut self) -> Vec<String> {
        let mut out = Vec::new();

        out.extend(self.run_engine_cycle(EngineSlot::Dallas));
        out.extend(self.run_engine_cycle(EngineSlot::Pwm));

        let now = now_us();
        for report in self.dispatcher.expire_stale(now) {
            out.push(render_report(&report));
        }

        if let Some(reading) = self
            .monitor
            .sample(SIMULATED_HEAP_BYTES / 2, SIMULATED_HEAP_BYTES, now / 1_000_000)
        {
            out.push(render_reading(&reading));
        }

        out
    }

    fn run_engine_cycle(&mut self, slot: EngineSlot) -> Vec<String> {
        let mut out = Vec::new();
        let family = match slot {
            EngineSlot::Dallas => self.dallas.family(),
            EngineSlot::Pwm => self.pwm.family(),
        };

        let mut timer = CycleTimer::start(now_us());

        // Execute queued switch writes before sampling, so readings reflect
        // the commanded state.
        while let Some(command) = self.dispatcher.pop_for(family) {
            let now = now_us();
            let applied = match slot {
                EngineSlot::Dallas => self.dallas.execute(&mut self.registry, &command, now),
                EngineSlot::Pwm => self.pwm.execute(&mut self.registry, &command, now),
            };
            match applied {
                Ok(true) if command.has_refid() => {
                    if let Some(report) = self.dispatcher.acknowledge(&command.refid, now_us()) {
                        out.push(render_report(&report));
                    }
                }
                Ok(_) => {}
                Err(reason) => warn!(reason, "bus write failed"),
            }
        }
        timer.mark_discover(now_us());

        let mut readings = CycleReadings::new();
        let read = match slot {
            EngineSlot::Dallas => self.dallas.read_all(&mut self.registry, now_us(), &mut readings),
            EngineSlot::Pwm => self.pwm.read_all(&mut self.registry, now_us(), &mut readings),
        };
        if let Err(reason) = read {
            warn!(reason, "bus read failed");
        }
        timer.mark_convert(now_us());

        for reading in &readings {
            out.push(render_reading(reading));
        }
        timer.mark_report(now_us());

        let engine_id = match slot {
            EngineSlot::Dallas => self.dallas.engine_id(),
            EngineSlot::Pwm => self.pwm.engine_id(),
        };
        let timing = timer.timing(engine_id);
        if timing.has_nonzero_values() {
            let reading =
                Reading::engine_timing(self.node_id.as_str(), now_us() / 1_000_000, timing);
            out.push(render_reading(&reading));
        }

        out
    }
}

#[derive(Clone, Copy)]
enum EngineSlot {
    Dallas,
    Pwm,
}

fn render_reading(reading: &Reading) -> String {
    // Report-buffer overflow signals systemic scarcity; continuing would
    // silently drop telemetry.
    reading
        .to_json()
        .expect("report buffer overflow")
        .as_str()
        .to_string()
}

fn render_report(report: &CommandReport) -> String {
    report
        .to_json()
        .expect("report buffer overflow")
        .as_str()
        .to_string()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Master Control Remote node");
    println!("==========================");

    let core = Arc::new(Mutex::new(NodeCore::new()));
    let (report_tx, _) = broadcast::channel::<String>(REPORT_BROADCAST_BUFFER_SIZE);
    let startup_gate = Arc::new(Notify::new());

    let tcp_core = Arc::clone(&core);
    let tcp_report_tx = report_tx.clone();
    let tcp_gate = Arc::clone(&startup_gate);
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = run_tcp_server(tcp_core, tcp_report_tx, tcp_gate).await {
            error!("TCP server error: {}", e);
        }
    });

    // Engines hold until the transport is up, bounded so a wedged network
    // stack cannot stall enumeration forever.
    let _ = time::timeout(
        Duration::from_millis(STARTUP_GATE_MAX_WAIT_MS),
        startup_gate.notified(),
    )
    .await;

    {
        let mut core_guard = core.lock().await;
        for line in core_guard.startup() {
            let _ = report_tx.send(line);
        }
    }

    let mut interval = time::interval(Duration::from_millis(CYCLE_PERIOD_MS));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let reports = {
                    let mut core_guard = core.lock().await;
                    core_guard.cycle()
                };

                for line in reports {
                    info!("report: {}", line);
                    let _ = report_tx.send(line);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    tcp_server.abort();
    println!("Master Control Remote node stopped");
    Ok(())
}

async fn run_tcp_server(
    core: Arc<Mutex<NodeCore>>,
    report_tx: broadcast::Sender<String>,
    startup_gate: Arc<Notify>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", TCP_PORT)).await?;
    info!("command transport listening on port {}", TCP_PORT);
    startup_gate.notify_waiters();

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("server connected: {}", addr);
                let client_core = Arc::clone(&core);
                let client_report_rx = report_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_core, client_report_rx).await {
                        warn!("client {} error: {}", addr, e);
                    }
                    info!("client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    core: Arc<Mutex<NodeCore>>,
    mut report_rx: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    let report_writer = Arc::clone(&writer);
    let report_task = tokio::spawn(async move {
        while let Ok(report) = report_rx.recv().await {
            let mut writer_guard = report_writer.lock().await;
            if writer_guard.write_all(report.as_bytes()).await.is_err() {
                break;
            }
            if writer_guard.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let responses = {
                    let mut core_guard = core.lock().await;
                    core_guard.handle_line(trimmed)
                };

                let mut writer_guard = writer.lock().await;
                for response in responses {
                    writer_guard.write_all(response.as_bytes()).await?;
                    writer_guard.write_all(b"\n").await?;
                }
            }
            Err(e) => {
                error!("error reading from client: {}", e);
                break;
            }
        }
    }

    report_task.abort();
    Ok(())
}
