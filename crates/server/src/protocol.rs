//! Wire format shared by the time server and the device side.
//!
//! Every message is a single datagram with no framing. Requests are the
//! plain ASCII commands below, replies are the Unix epoch time in
//! milliseconds written as a decimal string.

use chrono::{DateTime, Utc};

/// Request sent by a device to start the timestamp stream.
pub const GET_TIME: &[u8] = b"Get time";
/// Acknowledgment sent by a device to stop the timestamp stream.
pub const GET_OK: &[u8] = b"Get OK";
/// Largest datagram we read; anything longer is truncated and never matches a command.
pub const MAX_DATAGRAM: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetTime,
    GetOk,
}

impl Command {
    /// Exact match only, `"Get time\n"` is not a request.
    pub fn parse(payload: &[u8]) -> Option<Command> {
        match payload {
            GET_TIME => Some(Command::GetTime),
            GET_OK => Some(Command::GetOk),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Command::GetTime => GET_TIME,
            Command::GetOk => GET_OK,
        }
    }
}

/// Milliseconds since the epoch, rounded to the nearest millisecond.
pub fn epoch_millis(now: DateTime<Utc>) -> i64 {
    (now.timestamp_micros() + 500).div_euclid(1000)
}

pub fn encode_timestamp(now: DateTime<Utc>) -> String {
    epoch_millis(now).to_string()
}

pub fn decode_timestamp(payload: &[u8]) -> Option<DateTime<Utc>> {
    if payload.is_empty() || !payload.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let millis = std::str::from_utf8(payload).ok()?.parse::<i64>().ok()?;
    DateTime::<Utc>::from_timestamp_millis(millis)
}
