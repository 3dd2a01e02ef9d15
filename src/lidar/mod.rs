// Rangefinder ingestion
//
// Two independent wire protocols:
// - stream: 5 byte measurement packets drained from a hardware-filled ring
// - framed: checksum framed 20-sample capsules assembled byte by byte into full scans

pub mod framed;
pub mod stream;

pub use framed::{FrameState, FramedScanDecoder, START_COMMAND, STOP_COMMAND};
pub use stream::{StreamingRangeDecoder, decode_packet, is_valid};
