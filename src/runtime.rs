// Event loop: 50ms speed ramp, 100ms control sample, byte-level receive links
// Note: everything runs on one task, so handlers never race each other; serial
// reader threads only hand bytes over through channels or the DMA ring

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{
    Args, DMA_BUFFER_SIZE, SAMPLE_TIME_MS, SCAN_REQUEST, SPEED_UPDATE_INTERVAL, TOPIC_CMD_BYTE,
    TOPIC_HEALTH, TOPIC_HW_FEEDBACK, TOPIC_RT_DUTY, TOPIC_SCAN, TOPIC_TELEMETRY,
};
use crate::control::ControlContext;
use crate::hw::serial::{self, SerialTelemetry};
use crate::hw::{BridgeChassis, Chassis, DmaRing, SimChassis, TelemetrySink};
use crate::lidar::{FramedScanDecoder, START_COMMAND, STOP_COMMAND, StreamingRangeDecoder};
use crate::messages::{
    DutyCycle, HardwareFeedback, HealthStatus, RuntimeHealth, ScanFrame, TelemetryLine,
};
use crate::rx::{Rearm, RxChannel};

/// Pending bytes per receive link before the reader thread blocks
const RX_QUEUE_DEPTH: usize = 512;

pub struct Runtime<C: Chassis> {
    cx: ControlContext<C>,
    stream: Option<StreamingRangeDecoder<DmaRing>>,
    framed: FramedScanDecoder,
    outbox: Vec<TelemetryLine>,
    imu_pending: bool,
    started: Instant,
}

impl<C: Chassis> Runtime<C> {
    /// With `defer_imu` the inertial sensor is brought up on the first
    /// hardware feedback instead of immediately
    pub fn new(
        chassis: C,
        stream: Option<StreamingRangeDecoder<DmaRing>>,
        defer_imu: bool,
    ) -> Self {
        let mut runtime = Self {
            cx: ControlContext::new(chassis),
            stream,
            framed: FramedScanDecoder::new(),
            outbox: Vec::new(),
            imu_pending: true,
            started: Instant::now(),
        };
        if !defer_imu {
            runtime.init_imu();
        }
        runtime
    }

    fn init_imu(&mut self) {
        self.cx.init_imu(&mut self.outbox);
        self.imu_pending = false;
    }

    pub fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn context(&self) -> &ControlContext<C> {
        &self.cx
    }

    pub fn subscribe_scans(&self) -> watch::Receiver<Arc<ScanFrame>> {
        self.framed.subscribe()
    }

    pub fn on_command_byte(&mut self, byte: u8) -> Rearm {
        self.cx.on_command_byte(byte)
    }

    pub fn on_scan_byte(&mut self, byte: u8) -> Rearm {
        self.framed.on_byte(byte)
    }

    pub fn on_feedback(&mut self, feedback: &HardwareFeedback) {
        self.cx.chassis_mut().ingest(feedback);
        if self.imu_pending {
            self.init_imu();
        }
    }

    pub fn on_ramp_tick(&mut self, now_ms: u64) {
        self.cx.ramp_tick(now_ms);
    }

    pub fn on_control_tick(&mut self, now_ms: u64) {
        self.cx.control_tick(&mut self.outbox);
        if let Some(stream) = self.stream.as_mut() {
            stream.poll(now_ms, &mut self.outbox);
        }
    }

    /// Telemetry produced since the last call, in emission order
    pub fn take_telemetry(&mut self) -> Vec<TelemetryLine> {
        std::mem::take(&mut self.outbox)
    }

    pub fn duty(&self) -> DutyCycle {
        self.cx.duty()
    }

    pub fn emergency_stop(&mut self) {
        self.cx.emergency_stop();
    }

    pub fn health(&mut self) -> RuntimeHealth {
        let stream = self.stream.as_ref().map(|s| s.stats()).unwrap_or_default();
        let framed = self.framed.stats();
        let imu_ok = self.cx.imu_ok();
        let state = *self.cx.motion.state();
        let status = if imu_ok && self.cx.encoders_live() {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };
        RuntimeHealth {
            status,
            imu_ok,
            link_connected: self.cx.commands.is_connected(),
            direction: state.current_direction,
            speed: state.current_speed,
            battery_volts: self.cx.battery_volts(),
            ring_overruns: stream.overruns,
            stalled_packets: stream.stalls,
            dropped_frames: framed.dropped,
            revolutions: framed.revolutions,
        }
    }
}

pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if args.simulate {
        info!("Driving simulated base");
        serve(args, SimChassis::new(), false).await
    } else {
        info!("Driving base through hardware bridge");
        serve(args, BridgeChassis::new(), true).await
    }
}

async fn serve<C: Chassis>(
    args: Args,
    chassis: C,
    defer_imu: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_cmd = session.declare_subscriber(TOPIC_CMD_BYTE).await?;
    let sub_feedback = session.declare_subscriber(TOPIC_HW_FEEDBACK).await?;
    let pub_duty = session.declare_publisher(TOPIC_RT_DUTY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_scan = session.declare_publisher(TOPIC_SCAN).await?;

    // Command link: serial bytes and zenoh bytes share one receive channel
    let (cmd_tx, mut cmd_rx) = RxChannel::with_capacity("command", RX_QUEUE_DEPTH);
    let mut serial_telemetry = None;
    if let Some(name) = &args.command_port {
        let port = serial::open(name, args.command_baud)?;
        let writer = port.try_clone()?;
        serial::spawn_byte_reader("command", port, cmd_tx.clone());
        serial_telemetry = Some(SerialTelemetry::new(writer));
    }

    // Streaming rangefinder: autonomous ring fill, drained each control tick
    let stream = match &args.stream_lidar_port {
        Some(name) => {
            let mut port = serial::open(name, args.lidar_baud)?;
            serial::send_command(port.as_mut(), &SCAN_REQUEST)?;
            let ring = Arc::new(DmaRing::new(DMA_BUFFER_SIZE));
            serial::spawn_ring_filler(port, ring.clone());
            Some(StreamingRangeDecoder::new(ring))
        }
        None => None,
    };

    // Framed rangefinder: byte-at-a-time receive
    let (scan_tx, mut scan_rx) = RxChannel::with_capacity("framed lidar", RX_QUEUE_DEPTH);
    let mut framed_port = None;
    if let Some(name) = &args.framed_lidar_port {
        let mut port = serial::open(name, args.lidar_baud)?;
        serial::send_command(port.as_mut(), &START_COMMAND)?;
        framed_port = Some(port.try_clone()?);
        serial::spawn_byte_reader("framed lidar", port, scan_tx);
    }

    let mut runtime = Runtime::new(chassis, stream, defer_imu);
    let mut scans = runtime.subscribe_scans();
    let mut ramp = interval(Duration::from_millis(SPEED_UPDATE_INTERVAL));
    let mut control = interval(Duration::from_millis(SAMPLE_TIME_MS as u64));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {}ms ramp, {}ms control sample",
        SPEED_UPDATE_INTERVAL, SAMPLE_TIME_MS
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_BYTE, TOPIC_HW_FEEDBACK);
    info!(
        "Publishing to: {}, {}, {}, {}",
        TOPIC_RT_DUTY, TOPIC_HEALTH, TOPIC_TELEMETRY, TOPIC_SCAN
    );

    loop {
        tokio::select! {
            _ = ramp.tick() => {
                let now = runtime.now_ms();
                runtime.on_ramp_tick(now);
            }
            _ = control.tick() => {
                // 1. Remote command bytes join the serial ones
                while let Ok(Some(sample)) = sub_cmd.try_recv() {
                    for &byte in sample.payload().to_bytes().iter() {
                        if cmd_tx.try_send(byte).is_err() {
                            warn!("Command queue full, dropping 0x{:02X}", byte);
                        }
                    }
                }

                // 2. Drain bridge feedback, keep latest
                while let Ok(Some(sample)) = sub_feedback.try_recv() {
                    let payload = sample.payload().to_bytes();
                    match serde_json::from_slice::<HardwareFeedback>(&payload) {
                        Ok(feedback) => runtime.on_feedback(&feedback),
                        Err(e) => warn!("Failed to parse feedback: {}", e),
                    }
                }

                // 3. Control sample and range drain
                let now = runtime.now_ms();
                runtime.on_control_tick(now);

                // 4. Telemetry, duty and health out
                for line in runtime.take_telemetry() {
                    let text = line.to_string();
                    if let Some(sink) = serial_telemetry.as_mut() {
                        sink.emit(line);
                    }
                    pub_telemetry.put(text).await?;
                }
                pub_duty.put(serde_json::to_string(&runtime.duty())?).await?;
                pub_health.put(serde_json::to_string(&runtime.health())?).await?;
            }
            Some(byte) = cmd_rx.recv() => {
                let token = runtime.on_command_byte(byte);
                cmd_rx.rearm(token);
            }
            Some(byte) = scan_rx.recv() => {
                let token = runtime.on_scan_byte(byte);
                scan_rx.rearm(token);
            }
            Ok(()) = scans.changed() => {
                let frame = scans.borrow_and_update().clone();
                pub_scan.put(serde_json::to_string(&*frame)?).await?;
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping motors");
                runtime.emergency_stop();
                pub_duty.put(serde_json::to_string(&runtime.duty())?).await?;
                if let Some(port) = framed_port.as_mut() {
                    if let Err(e) = serial::send_command(port.as_mut(), &STOP_COMMAND) {
                        warn!("Failed to stop framed rangefinder: {}", e);
                    }
                }
                break;
            }
        }
    }

    info!(
        "Command link handled {} bytes, framed lidar {} bytes",
        cmd_rx.received(),
        scan_rx.received()
    );
    Ok(())
}
