// Framed rangefinder decoder (84-byte capsules)
//
// Frame layout (84 bytes):
//
// ```text
// byte 0       high nibble 0xA, low nibble = checksum low nibble
// byte 1       high nibble 0x5, low nibble = checksum high nibble
// bytes 2-3    start angle, little-endian, low 15 bits, 1/64 degree
// bytes 4..84  20 samples, 4 byte stride, distance = little-endian u16 at offset 0
// ```
//
// The checksum is the XOR of bytes 2..84. Each frame's samples span from its
// own start angle to the next frame's start angle, so a frame is turned into
// points once its successor arrives.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{
    LS_FRAME_LEN, LS_HEADER1, LS_HEADER2, REVOLUTION_THRESHOLD, SAMPLES_PER_FRAME, SCAN_POINTS,
};
use crate::messages::{ScanFrame, ScanPoint};
use crate::rx::Rearm;

/// Start continuous scanning: express scan request, payload size 5, all-zero payload
pub const START_COMMAND: [u8; 9] = [0xA5, 0x82, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x22];

/// Stop scanning; the last byte is the sum of the two header bytes
pub const STOP_COMMAND: [u8; 3] = [0xA5, 0x25, 0xA5u8.wrapping_add(0x25)];

/// Working buffer slots: the threshold is checked after a frame is written
const WORKING_CAPACITY: usize = REVOLUTION_THRESHOLD + SAMPLES_PER_FRAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    WaitHeader1,
    WaitHeader2,
    Collect,
}

/// Byte-level assembly of one frame
#[derive(Debug, Clone)]
pub struct FrameAssembly {
    state: FrameState,
    buf: [u8; LS_FRAME_LEN],
    len: usize,
    checksum: u8,
}

impl FrameAssembly {
    fn new() -> Self {
        Self {
            state: FrameState::WaitHeader1,
            buf: [0; LS_FRAME_LEN],
            len: 0,
            checksum: 0,
        }
    }

    fn reset(&mut self) {
        self.state = FrameState::WaitHeader1;
        self.len = 0;
        self.checksum = 0;
    }

    /// Checksum carried in the header nibbles
    fn expected_checksum(&self) -> u8 {
        (self.buf[1] << 4) | (self.buf[0] & 0x0F)
    }
}

/// One decoded frame before angular interpolation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub start_angle: f32,
    pub distances: [u16; SAMPLES_PER_FRAME],
}

/// Parse the payload of a frame whose checksum already matched
pub fn parse_capsule(frame: &[u8; LS_FRAME_LEN]) -> Capsule {
    let raw_angle = u16::from_le_bytes([frame[2], frame[3] & 0x7F]);
    let mut distances = [0u16; SAMPLES_PER_FRAME];
    for (i, d) in distances.iter_mut().enumerate() {
        let at = 4 + i * 4;
        *d = u16::from_le_bytes([frame[at], frame[at + 1]]);
    }
    Capsule {
        start_angle: raw_angle as f32 / 64.0,
        distances,
    }
}

/// Angular span from `old` to `new`, wrapping through 360 degrees
pub fn angular_gap(old: f32, new: f32) -> f32 {
    if new > old { new - old } else { new + 360.0 - old }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub dropped: u64,
    pub revolutions: u64,
}

pub struct FramedScanDecoder {
    assembly: FrameAssembly,
    pending: Option<Capsule>,
    working: Vec<ScanPoint>,
    count: usize,
    published: watch::Sender<Arc<ScanFrame>>,
    stats: FrameStats,
}

impl FramedScanDecoder {
    pub fn new() -> Self {
        let (published, _) = watch::channel(Arc::new(ScanFrame::default()));
        Self {
            assembly: FrameAssembly::new(),
            pending: None,
            working: vec![ScanPoint::default(); WORKING_CAPACITY],
            count: 0,
            published,
            stats: FrameStats::default(),
        }
    }

    /// Reader handle; every value it observes is a complete revolution
    pub fn subscribe(&self) -> watch::Receiver<Arc<ScanFrame>> {
        self.published.subscribe()
    }

    pub fn latest(&self) -> Arc<ScanFrame> {
        self.published.borrow().clone()
    }

    pub fn state(&self) -> FrameState {
        self.assembly.state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Samples accumulated toward the current revolution
    pub fn sample_count(&self) -> usize {
        self.count
    }

    /// Handle one received byte
    pub fn on_byte(&mut self, byte: u8) -> Rearm {
        let asm = &mut self.assembly;
        match asm.state {
            FrameState::WaitHeader1 => {
                if byte >> 4 == LS_HEADER1 {
                    asm.buf[0] = byte;
                    asm.len = 1;
                    asm.state = FrameState::WaitHeader2;
                }
            }
            FrameState::WaitHeader2 => {
                if byte >> 4 == LS_HEADER2 {
                    asm.buf[1] = byte;
                    asm.len = 2;
                    asm.state = FrameState::Collect;
                } else {
                    asm.reset();
                }
            }
            FrameState::Collect => {
                asm.buf[asm.len] = byte;
                // First payload byte seeds the running checksum
                asm.checksum = if asm.len == 2 { byte } else { asm.checksum ^ byte };
                asm.len += 1;

                if asm.len == LS_FRAME_LEN {
                    let matched = asm.checksum == asm.expected_checksum();
                    let frame = asm.buf;
                    asm.reset();

                    if matched {
                        self.stats.frames += 1;
                        self.extract(&frame);
                    } else {
                        self.stats.dropped += 1;
                        debug!("Scan frame checksum mismatch, dropped");
                    }
                }
            }
        }
        Rearm::next()
    }

    fn extract(&mut self, frame: &[u8; LS_FRAME_LEN]) {
        let capsule = parse_capsule(frame);
        let Some(prev) = self.pending.replace(capsule) else {
            return;
        };

        let gap = angular_gap(prev.start_angle, capsule.start_angle);
        let step = gap / SAMPLES_PER_FRAME as f32;
        for (i, &distance) in prev.distances.iter().enumerate() {
            let angle = (prev.start_angle + step * i as f32).rem_euclid(360.0);
            self.working[self.count + i] = ScanPoint {
                angle: (angle * 100.0) as u16,
                distance,
            };
        }
        self.count += SAMPLES_PER_FRAME;

        if self.count > REVOLUTION_THRESHOLD {
            self.publish();
            self.count = 0;
        }
    }

    /// Replace the published scan with a full copy of the completed revolution
    fn publish(&mut self) {
        self.stats.revolutions += 1;
        let frame = ScanFrame {
            revolution: self.stats.revolutions,
            points: self.working[..SCAN_POINTS].to_vec(),
        };
        info!("Published scan revolution {}", frame.revolution);
        self.published.send_replace(Arc::new(frame));
    }
}

impl Default for FramedScanDecoder {
    fn default() -> Self {
        Self::new()
    }
}
