//! Wire codec for the bike's proprietary notification and write frames.
//!
//! Inbound frames are `[sender][channel][payload LE]`. A read request writes
//! the 2-byte big-endian key `(sender << 8) | channel`; the read-back channel
//! answers with the same key followed by the payload, so both share one
//! decode table.

use crate::link::types::{SampleValue, SignalSample, MAX_FRAME_LEN};
use crate::signals::{SignalId, Tick};

/// Payload width of a field in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    U8,
    U16,
    U32,
    Bytes(usize),
}

impl Width {
    fn len(self) -> usize {
        match self {
            Width::U8 => 1,
            Width::U16 => 2,
            Width::U32 => 4,
            Width::Bytes(n) => n,
        }
    }
}

/// Conversion from the raw payload to the physical value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Transform {
    Identity,
    /// raw / divisor
    Div(f32),
    /// round(raw * 1.1111), battery energy is reported in 0.9 Wh units
    WattHours,
    /// raw / 10 + 28
    Voltage,
    /// (raw - 3000) / 60
    AccelSensitivity,
    /// Payload kept verbatim
    RawEcho,
}

#[derive(Debug, Clone, Copy)]
struct DecodeEntry {
    id: SignalId,
    width: Width,
    transform: Transform,
}

const fn field(id: SignalId, width: Width, transform: Transform) -> Option<DecodeEntry> {
    Some(DecodeEntry {
        id,
        width,
        transform,
    })
}

/// Two-level dispatch on `(sender, channel)`.
fn lookup(sender: u8, channel: u8) -> Option<DecodeEntry> {
    use SignalId::*;
    use Transform::*;
    use Width::*;

    match sender {
        // battery
        0x00 => match channel {
            0x00 => field(BattSizeWh, U16, WattHours),
            0x01 => field(BattRemainWh, U16, WattHours),
            0x02 => field(BattHealth, U8, Identity),
            0x03 => field(BattTemp, U8, Identity),
            0x04 => field(BattChargeCycles, U16, Identity),
            0x05 => field(BattVoltage, U8, Voltage),
            0x06 => field(BattCurrent, U8, Div(10.0)),
            0x0c => field(BattChargePercent, U8, Identity),
            _ => None,
        },
        // motor
        0x01 => match channel {
            0x00 => field(RiderPower, U16, Identity),
            0x01 => field(MotCadence, U16, Div(10.0)),
            0x02 => field(MotSpeed, U16, Div(10.0)),
            0x04 => field(MotOdometer, U32, Div(1000.0)),
            0x05 => field(MotAssistLevel, U16, Identity),
            0x07 => field(MotTemp, U8, Identity),
            0x0c => field(MotPower, U16, Div(10.0)),
            0x10 => field(MotPeakAssist, Bytes(3), RawEcho),
            0x15 => field(MotShuttle, U8, Identity),
            _ => None,
        },
        // bike settings
        0x02 => match channel {
            0x00 => field(BikeWheelCirc, U16, Identity),
            0x03 => field(BikeAssistLev1, U8, Identity),
            0x04 => field(BikeAssistLev2, U8, Identity),
            0x05 => field(BikeAssistLev3, U8, Identity),
            0x06 => field(BikeFakeChannel, U8, Identity),
            0x07 => field(BikeAccel, U16, AccelSensitivity),
            _ => None,
        },
        _ => None,
    }
}

/// Wire key `(sender << 8) | channel` of a readable signal.
pub fn wire_key(id: SignalId) -> Option<u16> {
    (0u8..=0x02)
        .flat_map(|sender| (0u8..=0x15).map(move |channel| (sender, channel)))
        .find(|&(sender, channel)| lookup(sender, channel).map(|e| e.id) == Some(id))
        .map(|(sender, channel)| (u16::from(sender) << 8) | u16::from(channel))
}

/// Read up to `width` little-endian bytes, using what is available.
fn read_le(payload: &[u8], width: Width) -> u32 {
    payload
        .iter()
        .take(width.len())
        .enumerate()
        .fold(0u32, |acc, (i, b)| acc | (u32::from(*b) << (8 * i)))
}

fn unknown(frame: &[u8], timestamp: Tick) -> SignalSample {
    let len = frame.len().min(MAX_FRAME_LEN);
    SignalSample {
        id: None,
        value: SampleValue::Raw(frame[..len].to_vec()),
        timestamp,
    }
}

/// Decode a notification or read-back frame.
///
/// Never fails: frames that are too short or not in the table come back as
/// an unknown sample holding the first [`MAX_FRAME_LEN`] bytes.
pub fn decode_frame(frame: &[u8], timestamp: Tick) -> SignalSample {
    if frame.len() < 3 {
        return unknown(frame, timestamp);
    }

    let entry = match lookup(frame[0], frame[1]) {
        Some(entry) => entry,
        None => return unknown(frame, timestamp),
    };

    let payload = &frame[2..];
    let raw = read_le(payload, entry.width) as f32;

    let value = match entry.transform {
        Transform::Identity => SampleValue::Scalar(raw),
        Transform::Div(d) => SampleValue::Scalar(raw / d),
        Transform::WattHours => SampleValue::Scalar((raw * 1.1111).round()),
        Transform::Voltage => SampleValue::Scalar(raw / 10.0 + 28.0),
        Transform::AccelSensitivity => SampleValue::Scalar((raw - 3000.0) / 60.0),
        Transform::RawEcho => {
            let len = payload.len().min(entry.width.len());
            SampleValue::Raw(payload[..len].to_vec())
        }
    };

    SignalSample {
        id: Some(entry.id),
        value,
        timestamp,
    }
}

/// Build a read request frame for `id`.
pub fn build_request(id: SignalId) -> Option<[u8; 2]> {
    wire_key(id).map(u16::to_be_bytes)
}

/// Decode a read-back frame if it answers the request for `expected`.
pub fn parse_read_back(frame: &[u8], expected: SignalId, timestamp: Tick) -> Option<SignalSample> {
    let key = wire_key(expected)?.to_be_bytes();
    if frame.len() < 3 || frame[..2] != key {
        return None;
    }
    Some(decode_frame(frame, timestamp))
}

/// Highest assist level (turbo).
pub const MAX_ASSIST_LEVEL: u8 = 3;

/// Highest percentage accepted by the percentage fields.
pub const MAX_PERCENT: u8 = 100;

/// Set the active assist level, 0 (off) to 3 (turbo).
pub fn build_assist_level(level: u8) -> Option<Vec<u8>> {
    (level <= MAX_ASSIST_LEVEL).then(|| vec![0x01, 0x05, level])
}

/// Set the peak assist percentage of all three levels at once.
pub fn build_peak_assist(levels: [u8; 3]) -> Option<Vec<u8>> {
    if levels.iter().any(|&p| p > MAX_PERCENT) {
        return None;
    }
    Some(vec![0x01, 0x10, levels[0], levels[1], levels[2], 0x32])
}

/// Set the assist percentage of one level (`index` 0..3).
pub fn build_assist(index: usize, percent: u8) -> Option<Vec<u8>> {
    if index >= 3 || percent > MAX_PERCENT {
        return None;
    }
    Some(vec![0x02, 0x03 + index as u8, percent])
}

/// Set the fake channel byte.
pub fn build_fake_channel(value: u8) -> Option<Vec<u8>> {
    (value <= MAX_PERCENT).then(|| vec![0x02, 0x06, value])
}

/// Set the shuttle percentage.
pub fn build_shuttle(percent: u8) -> Option<Vec<u8>> {
    (percent <= MAX_PERCENT).then(|| vec![0x01, 0x15, percent])
}

/// Set the acceleration sensitivity, rescaled to the motor's 3000..9000 range.
pub fn build_accel_sensitivity(percent: u8) -> Option<Vec<u8>> {
    if percent > MAX_PERCENT {
        return None;
    }
    let acc = u16::from(percent) * 60 + 3000;
    let [lo, hi] = acc.to_le_bytes();
    Some(vec![0x02, 0x07, lo, hi])
}

/// Bit mask selecting which fields of [`AssistSettings`] are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteMask(u16);

impl WriteMask {
    pub const PEAK_ASSIST: WriteMask = WriteMask(1 << 0);
    pub const ASSIST: WriteMask = WriteMask(1 << 1);
    pub const SHUTTLE: WriteMask = WriteMask(1 << 2);
    pub const ACCEL_SENS: WriteMask = WriteMask(1 << 3);
    pub const FAKE_CHANNEL: WriteMask = WriteMask(1 << 4);
    pub const ALL: WriteMask = WriteMask(0x1f);

    pub fn contains(self, other: WriteMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for WriteMask {
    type Output = WriteMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        WriteMask(self.0 | rhs.0)
    }
}

/// Motor tuning block. `None` marks a field that was not read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssistSettings {
    /// Assist percentage per level (eco, trail, turbo)
    pub assist: [Option<u8>; 3],
    /// Peak assist percentage per level
    pub peak_assist: [Option<u8>; 3],
    pub shuttle: Option<u8>,
    pub accel_sensitivity: Option<u8>,
    pub fake_channel: Option<u8>,
}

impl AssistSettings {
    /// Signals read to fill the block, in request order.
    pub const FIELDS: [SignalId; 7] = [
        SignalId::MotPeakAssist,
        SignalId::MotShuttle,
        SignalId::BikeAssistLev1,
        SignalId::BikeAssistLev2,
        SignalId::BikeAssistLev3,
        SignalId::BikeFakeChannel,
        SignalId::BikeAccel,
    ];

    /// Store a read-back sample into its field.
    pub fn apply(&mut self, sample: &SignalSample) {
        let byte = |v: &SampleValue| v.as_f32().map(|f| f.round().clamp(0.0, 255.0) as u8);
        match sample.id {
            Some(SignalId::MotPeakAssist) => {
                if let Some(bytes) = sample.value.as_bytes() {
                    for (slot, b) in self.peak_assist.iter_mut().zip(bytes) {
                        *slot = Some(*b);
                    }
                }
            }
            Some(SignalId::MotShuttle) => self.shuttle = byte(&sample.value),
            Some(SignalId::BikeAssistLev1) => self.assist[0] = byte(&sample.value),
            Some(SignalId::BikeAssistLev2) => self.assist[1] = byte(&sample.value),
            Some(SignalId::BikeAssistLev3) => self.assist[2] = byte(&sample.value),
            Some(SignalId::BikeFakeChannel) => self.fake_channel = byte(&sample.value),
            Some(SignalId::BikeAccel) => self.accel_sensitivity = byte(&sample.value),
            _ => {}
        }
    }

    /// Whether every field holds a value.
    pub fn is_complete(&self) -> bool {
        self.assist.iter().all(Option::is_some)
            && self.peak_assist.iter().all(Option::is_some)
            && self.shuttle.is_some()
            && self.accel_sensitivity.is_some()
            && self.fake_channel.is_some()
    }

    /// Build the write frames for the masked fields that are set and in range.
    pub fn build_frames(&self, mask: WriteMask) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();

        if mask.contains(WriteMask::PEAK_ASSIST) {
            if let [Some(a), Some(b), Some(c)] = self.peak_assist {
                frames.extend(build_peak_assist([a, b, c]));
            }
        }

        if mask.contains(WriteMask::ASSIST) {
            for (i, level) in self.assist.iter().enumerate() {
                if let Some(percent) = level {
                    frames.extend(build_assist(i, *percent));
                }
            }
        }

        if mask.contains(WriteMask::FAKE_CHANNEL) {
            frames.extend(self.fake_channel.and_then(build_fake_channel));
        }

        if mask.contains(WriteMask::SHUTTLE) {
            frames.extend(self.shuttle.and_then(build_shuttle));
        }

        if mask.contains(WriteMask::ACCEL_SENS) {
            frames.extend(self.accel_sensitivity.and_then(build_accel_sensitivity));
        }

        frames
    }
}
