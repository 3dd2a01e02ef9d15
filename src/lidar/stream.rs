// Streaming rangefinder decoder (5-byte measurement packets)
//
// Bytes are drained from a hardware-filled circular buffer once per control
// tick. Packets are 5 bytes, little-endian:
//
// ```text
// byte 0     bit 7 = start flag, bits 0-6 = quality
// bytes 1-2  (angle_q6 << 1) | check_bit     angle in 1/64 degree
// bytes 3-4  distance_q2                     distance in 1/4 mm
// ```
//
// Assembly only starts on the sync byte; anything else between packets is
// dropped, which is also how the decoder resynchronizes after noise.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{
    ANGLE_FILTER_THRESHOLD, DATA_PACKET_SIZE, LIDAR_TIMEOUT_THRESHOLD, MAX_VALID_DISTANCE,
    MIN_VALID_DISTANCE, SYNC_BYTE,
};
use crate::hw::{HardwareRing, TelemetrySink};
use crate::messages::{RangeReading, TelemetryLine};

/// Decode one packet. Validity is reported, not enforced; see `is_valid`.
pub fn decode_packet(pkt: &[u8; DATA_PACKET_SIZE]) -> RangeReading {
    let angle_field = u16::from_le_bytes([pkt[1], pkt[2]]);
    let distance_q2 = u16::from_le_bytes([pkt[3], pkt[4]]);
    RangeReading {
        quality: pkt[0] & 0x7F,
        angle: (angle_field >> 1) as f32 / 64.0,
        distance: distance_q2 as f32 / 4.0,
        start_flag: pkt[0] & 0x80 != 0,
        check_bit: angle_field & 0x01 != 0,
    }
}

/// A reading is usable when both flag bits are set, quality is non-zero and
/// the distance lies within the rangefinder's trusted band
pub fn is_valid(reading: &RangeReading) -> bool {
    reading.start_flag
        && reading.check_bit
        && reading.quality > 0
        && (MIN_VALID_DISTANCE..=MAX_VALID_DISTANCE).contains(&reading.distance)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes: u64,
    pub packets: u64,
    pub emitted: u64,
    pub rejected: u64,
    pub suppressed: u64,
    pub stalls: u64,
    pub overruns: u64,
}

pub struct StreamingRangeDecoder<R: HardwareRing> {
    ring: Arc<R>,
    read_index: usize,
    packet: [u8; DATA_PACKET_SIZE],
    filled: usize,
    last_angle: f32,
    last_progress_ms: u64,
    stats: StreamStats,
}

impl<R: HardwareRing> StreamingRangeDecoder<R> {
    pub fn new(ring: Arc<R>) -> Self {
        Self {
            ring,
            read_index: 0,
            packet: [0; DATA_PACKET_SIZE],
            filled: 0,
            last_angle: 0.0,
            last_progress_ms: 0,
            stats: StreamStats::default(),
        }
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn is_mid_packet(&self) -> bool {
        self.filled > 0
    }

    /// Drain newly written bytes, emit readings, and run stall/overrun recovery
    ///
    /// Returns the number of bytes consumed.
    pub fn poll<S: TelemetrySink>(&mut self, now_ms: u64, telemetry: &mut S) -> usize {
        let capacity = self.ring.capacity();
        let write = self.ring.write_index() % capacity;
        let read = self.read_index;

        let available = if write >= read {
            write - read
        } else {
            capacity - read + write
        };

        for i in 0..available {
            let byte = self.ring.byte_at((read + i) % capacity);
            self.push_byte(byte, now_ms, telemetry);
        }
        self.read_index = write;
        self.stats.bytes += available as u64;

        if self.filled > 0
            && now_ms.saturating_sub(self.last_progress_ms) > LIDAR_TIMEOUT_THRESHOLD
        {
            debug!("Range packet stalled with {} bytes, resetting", self.filled);
            self.filled = 0;
            self.stats.stalls += 1;
        }

        if self.ring.take_wrap_sync() {
            warn!("Range ring may have overrun, restarting fill");
            self.ring.restart_fill();
            self.read_index = 0;
            self.last_progress_ms = now_ms;
            self.stats.overruns += 1;
        }

        available
    }

    fn push_byte<S: TelemetrySink>(&mut self, byte: u8, now_ms: u64, telemetry: &mut S) {
        if self.filled == 0 && byte != SYNC_BYTE {
            return;
        }
        self.packet[self.filled] = byte;
        self.filled += 1;
        self.last_progress_ms = now_ms;

        if self.filled == DATA_PACKET_SIZE {
            self.filled = 0;
            self.stats.packets += 1;
            let reading = decode_packet(&self.packet);
            self.handle_reading(reading, telemetry);
        }
    }

    fn handle_reading<S: TelemetrySink>(&mut self, reading: RangeReading, telemetry: &mut S) {
        if !is_valid(&reading) {
            self.stats.rejected += 1;
            return;
        }

        // Emit on a real angular step, or when the angle went backwards (new sweep)
        if (reading.angle - self.last_angle).abs() >= ANGLE_FILTER_THRESHOLD
            || reading.angle < self.last_angle
        {
            self.last_angle = reading.angle;
            self.stats.emitted += 1;
            telemetry.emit(TelemetryLine::Range(reading));
        } else {
            self.stats.suppressed += 1;
        }
    }
}
