use crate::prelude::*;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::datapoints::CellVoltages;
use crate::jk::datapoints::{label, DataPointContainer, DataPointLabel};
use crate::reader::{ByteReader, OutOfBounds};

pub const START_MARKER: u16 = 0x4e57;
pub const END_MARKER: u8 = 0x68;

/// A frame without any variable fields: start marker, length, terminal id,
/// command, source, type, record number, end marker, two reserved bytes and
/// the checksum.
pub const MIN_FRAME_SIZE: usize = 20;
pub const COMMAND_FRAME_SIZE: usize = MIN_FRAME_SIZE;

const HEADER_SIZE: usize = 11;

// the frame length field does not count the two start marker bytes
const FRAME_LENGTH_OVERHEAD: usize = MIN_FRAME_SIZE - 2;

// {{{ Command
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    Activate = 0x01,
    Write = 0x02,
    Read = 0x03,
    Password = 0x05,
    ReadAll = 0x06,
}
// }}}

// {{{ Source
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Source {
    Bms = 0x00,
    Bluetooth = 0x01,
    Gps = 0x02,
    Host = 0x03,
}
// }}}

// {{{ MessageType
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Command = 0x00,
    Response = 0x01,
    Unsolicited = 0x02,
}
// }}}

/// 16 bit additive sum of everything but the last four bytes.
pub fn checksum(raw: &[u8]) -> u16 {
    let end = raw.len().saturating_sub(4);
    raw[..end]
        .iter()
        .fold(0u16, |sum, &byte| sum.wrapping_add(u16::from(byte)))
}

/// Structural checks, first failure wins: start marker, frame length, end
/// marker, checksum.
pub fn validate(raw: &[u8]) -> Result<(), FrameError> {
    let size = raw.len();
    if let Ok(start_marker) = ByteReader::new(raw).read_u16() {
        if start_marker != START_MARKER {
            return Err(FrameError::StartMarker {
                expected: START_MARKER,
                actual: start_marker,
            });
        }
    }

    if size < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort {
            actual: size,
            minimum: MIN_FRAME_SIZE,
        });
    }

    let frame_length = ByteReader::at(raw, 2).read_u16()? as usize;
    if frame_length != size - 2 {
        return Err(FrameError::FrameLength {
            expected: size - 2,
            actual: frame_length,
        });
    }

    let end_marker = raw[size - 5];
    if end_marker != END_MARKER {
        return Err(FrameError::EndMarker {
            expected: END_MARKER,
            actual: end_marker,
        });
    }

    let actual = ByteReader::at(raw, size - 2).read_u16()?;
    let expected = checksum(raw);
    if actual != expected {
        return Err(FrameError::Checksum { expected, actual });
    }

    Ok(())
}

pub trait SerialMessage {
    fn raw(&self) -> &[u8];

    /// Byte count after the start marker.
    fn frame_length(&self) -> Option<u16> {
        ByteReader::at(self.raw(), 2).read_u16().ok()
    }

    fn terminal_id(&self) -> Option<u32> {
        ByteReader::at(self.raw(), 4).read_u32().ok()
    }

    fn command(&self) -> Option<Command> {
        self.raw().get(8).and_then(|&b| Command::try_from(b).ok())
    }

    fn source(&self) -> Option<Source> {
        self.raw().get(9).and_then(|&b| Source::try_from(b).ok())
    }

    fn message_type(&self) -> Option<MessageType> {
        self.raw().get(10).and_then(|&b| MessageType::try_from(b).ok())
    }

    fn variable_field_length(&self) -> Option<usize> {
        self.frame_length()
            .and_then(|len| (len as usize).checked_sub(FRAME_LENGTH_OVERHEAD))
    }

    /// Record number. Its upper byte is reserved.
    fn sequence(&self) -> Option<u32> {
        let raw = self.raw();
        let pos = raw.len().checked_sub(9)?;
        ByteReader::at(raw, pos).read_u32().ok().map(|seq| seq >> 8)
    }

    fn validate(&self) -> Result<(), FrameError> {
        validate(self.raw())
    }
}

#[derive(Clone, Debug)]
pub enum Message {
    Command(SerialCommand),
    Response(SerialResponse),
}

// Hand-written equivalent of `#[enum_dispatch(SerialMessage)]`; the macro
// matches traits by bare name and collides with `jbd::message::SerialMessage`.
macro_rules! dispatch {
    ($self:ident, $m:ident) => {
        match $self {
            Message::Command(inner) => inner.$m(),
            Message::Response(inner) => inner.$m(),
        }
    };
}

impl SerialMessage for Message {
    fn raw(&self) -> &[u8] { dispatch!(self, raw) }
    fn frame_length(&self) -> Option<u16> { dispatch!(self, frame_length) }
    fn terminal_id(&self) -> Option<u32> { dispatch!(self, terminal_id) }
    fn command(&self) -> Option<Command> { dispatch!(self, command) }
    fn source(&self) -> Option<Source> { dispatch!(self, source) }
    fn message_type(&self) -> Option<MessageType> { dispatch!(self, message_type) }
    fn variable_field_length(&self) -> Option<usize> { dispatch!(self, variable_field_length) }
    fn sequence(&self) -> Option<u32> { dispatch!(self, sequence) }
    fn validate(&self) -> Result<(), FrameError> { dispatch!(self, validate) }
}

impl From<SerialCommand> for Message {
    fn from(v: SerialCommand) -> Self { Message::Command(v) }
}

impl From<SerialResponse> for Message {
    fn from(v: SerialResponse) -> Self { Message::Response(v) }
}

impl Message {
    /// Validates `raw` and decodes it according to its type byte.
    pub fn parse(raw: Vec<u8>, protocol_version: Option<u8>, timestamp: u32) -> Result<Self, FrameError> {
        match raw.get(10).and_then(|&b| MessageType::try_from(b).ok()) {
            Some(MessageType::Command) => Ok(Message::Command(SerialCommand::from_raw(raw)?)),
            _ => Ok(Message::Response(SerialResponse::decode(
                raw,
                protocol_version,
                timestamp,
            )?)),
        }
    }
}

// {{{ SerialCommand
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SerialCommand {
    raw: Vec<u8>,
}

impl SerialCommand {
    pub fn new(command: Command) -> Self {
        let mut raw = vec![0; COMMAND_FRAME_SIZE];

        raw[0..2].copy_from_slice(&START_MARKER.to_be_bytes());
        raw[2..4].copy_from_slice(&((COMMAND_FRAME_SIZE - 2) as u16).to_be_bytes());
        raw[8] = command.into();
        raw[9] = Source::Host.into();
        raw[10] = MessageType::Command.into();
        raw[COMMAND_FRAME_SIZE - 5] = END_MARKER;

        let checksum = checksum(&raw);
        raw[COMMAND_FRAME_SIZE - 2..].copy_from_slice(&checksum.to_be_bytes());

        Self { raw }
    }

    pub fn from_raw(raw: Vec<u8>) -> Result<Self, FrameError> {
        validate(&raw)?;
        Ok(Self { raw })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }
}

impl SerialMessage for SerialCommand {
    fn raw(&self) -> &[u8] {
        &self.raw
    }
}
// }}}

// {{{ SerialResponse
#[derive(Clone, Debug)]
pub struct SerialResponse {
    raw: Vec<u8>,
    data_points: DataPointContainer,
}

impl SerialResponse {
    /// Validates the frame and decodes its variable section.
    ///
    /// The battery current can only be decoded once `protocol_version` is
    /// known; until then the field is skipped with a warning.
    pub fn decode(raw: Vec<u8>, protocol_version: Option<u8>, timestamp: u32) -> Result<Self, FrameError> {
        validate(&raw)?;

        let section_len = raw.len() - MIN_FRAME_SIZE;
        let section = &raw[HEADER_SIZE..HEADER_SIZE + section_len];

        let mut data_points = DataPointContainer::new();
        let mut reader = ByteReader::new(section);

        while !reader.is_empty() {
            let tag = reader.read_u8()?;
            match DataPointLabel::try_from(tag) {
                Ok(label) => {
                    decode_field(label, &mut reader, protocol_version, &mut data_points, timestamp)?
                }
                Err(_) => {
                    // width unknown, nothing after this tag can be located
                    warn!(
                        "unknown field type 0x{:02x} at offset {}, skipping rest of frame",
                        tag,
                        HEADER_SIZE + reader.position() - 1
                    );
                    break;
                }
            }
        }

        Ok(Self { raw, data_points })
    }

    pub fn data_points(&self) -> &DataPointContainer {
        &self.data_points
    }

    pub fn into_data_points(self) -> DataPointContainer {
        self.data_points
    }
}

impl SerialMessage for SerialResponse {
    fn raw(&self) -> &[u8] {
        &self.raw
    }
}
// }}}

fn read_temperature(reader: &mut ByteReader) -> Result<i16, OutOfBounds> {
    let raw = reader.read_u16()?;
    if raw <= 100 {
        return Ok(raw as i16);
    }
    Ok(((raw - 100) as i16).wrapping_neg())
}

fn read_current(reader: &mut ByteReader, protocol_version: Option<u8>) -> Result<Option<i32>, OutOfBounds> {
    let raw = reader.read_u16()?;

    match protocol_version {
        Some(0x00) => Ok(Some((10000 - i32::from(raw)) * 10)),
        Some(0x01) => {
            let charging = raw & 0x8000 != 0;
            let magnitude = i32::from(raw & 0x7fff) * 10;
            Ok(Some(if charging { magnitude } else { -magnitude }))
        }
        _ => {
            warn!(
                "cannot decode battery current field without knowing the protocol version ({:?})",
                protocol_version
            );
            Ok(None)
        }
    }
}

fn read_cells(reader: &mut ByteReader) -> Result<CellVoltages, OutOfBounds> {
    // byte length of the triplet list
    let count = reader.read_u8()? / 3;

    let mut cells = CellVoltages::new();
    for _ in 0..count {
        let idx = reader.read_u8()?;
        let millivolt = reader.read_u16()?;
        cells.insert(idx, millivolt);
    }
    Ok(cells)
}

fn decode_field(
    field: DataPointLabel,
    reader: &mut ByteReader,
    protocol_version: Option<u8>,
    dp: &mut DataPointContainer,
    ts: u32,
) -> Result<(), OutOfBounds> {
    use DataPointLabel as L;

    macro_rules! add {
        ($label:ident, $value:expr) => {
            dp.add::<label::$label>($value, ts)
        };
    }

    match field {
        L::CellsMilliVolt => add!(CellsMilliVolt, read_cells(reader)?),
        L::BmsTempCelsius => add!(BmsTempCelsius, read_temperature(reader)?),
        L::BatteryTempOneCelsius => add!(BatteryTempOneCelsius, read_temperature(reader)?),
        L::BatteryTempTwoCelsius => add!(BatteryTempTwoCelsius, read_temperature(reader)?),
        L::BatteryVoltageMilliVolt => {
            add!(BatteryVoltageMilliVolt, u32::from(reader.read_u16()?) * 10)
        }
        L::BatteryCurrentMilliAmps => {
            if let Some(current) = read_current(reader, protocol_version)? {
                add!(BatteryCurrentMilliAmps, current);
            }
        }
        L::BatterySoCPercent => add!(BatterySoCPercent, reader.read_u8()?),
        L::BatteryTemperatureSensorAmount => add!(BatteryTemperatureSensorAmount, reader.read_u8()?),
        L::BatteryCycles => add!(BatteryCycles, reader.read_u16()?),
        L::BatteryCycleCapacity => add!(BatteryCycleCapacity, reader.read_u32()?),
        L::BatteryCellAmount => add!(BatteryCellAmount, reader.read_u16()?),
        L::AlarmsBitmask => add!(AlarmsBitmask, reader.read_u16()?),
        L::StatusBitmask => add!(StatusBitmask, reader.read_u16()?),
        L::TotalOvervoltageThresholdMilliVolt => add!(
            TotalOvervoltageThresholdMilliVolt,
            u32::from(reader.read_u16()?) * 10
        ),
        L::TotalUndervoltageThresholdMilliVolt => add!(
            TotalUndervoltageThresholdMilliVolt,
            u32::from(reader.read_u16()?) * 10
        ),
        L::CellOvervoltageThresholdMilliVolt => {
            add!(CellOvervoltageThresholdMilliVolt, reader.read_u16()?)
        }
        L::CellOvervoltageRecoveryMilliVolt => {
            add!(CellOvervoltageRecoveryMilliVolt, reader.read_u16()?)
        }
        L::CellOvervoltageProtectionDelaySeconds => {
            add!(CellOvervoltageProtectionDelaySeconds, reader.read_u16()?)
        }
        L::CellUndervoltageThresholdMilliVolt => {
            add!(CellUndervoltageThresholdMilliVolt, reader.read_u16()?)
        }
        L::CellUndervoltageRecoveryMilliVolt => {
            add!(CellUndervoltageRecoveryMilliVolt, reader.read_u16()?)
        }
        L::CellUndervoltageProtectionDelaySeconds => {
            add!(CellUndervoltageProtectionDelaySeconds, reader.read_u16()?)
        }
        L::CellVoltageDiffThresholdMilliVolt => {
            add!(CellVoltageDiffThresholdMilliVolt, reader.read_u16()?)
        }
        L::DischargeOvercurrentThresholdAmperes => {
            add!(DischargeOvercurrentThresholdAmperes, reader.read_u16()?)
        }
        L::DischargeOvercurrentDelaySeconds => {
            add!(DischargeOvercurrentDelaySeconds, reader.read_u16()?)
        }
        L::ChargeOvercurrentThresholdAmps => add!(ChargeOvercurrentThresholdAmps, reader.read_u16()?),
        L::ChargeOvercurrentDelaySeconds => add!(ChargeOvercurrentDelaySeconds, reader.read_u16()?),
        L::BalanceCellVoltageThresholdMilliVolt => {
            add!(BalanceCellVoltageThresholdMilliVolt, reader.read_u16()?)
        }
        L::BalanceVoltageDiffThresholdMilliVolt => {
            add!(BalanceVoltageDiffThresholdMilliVolt, reader.read_u16()?)
        }
        L::BalancingEnabled => add!(BalancingEnabled, reader.read_bool()?),
        L::BmsTempProtectionThresholdCelsius => {
            add!(BmsTempProtectionThresholdCelsius, reader.read_u16()?)
        }
        L::BmsTempRecoveryThresholdCelsius => {
            add!(BmsTempRecoveryThresholdCelsius, reader.read_u16()?)
        }
        L::BatteryTempProtectionThresholdCelsius => {
            add!(BatteryTempProtectionThresholdCelsius, reader.read_u16()?)
        }
        L::BatteryTempRecoveryThresholdCelsius => {
            add!(BatteryTempRecoveryThresholdCelsius, reader.read_u16()?)
        }
        L::BatteryTempDiffThresholdCelsius => {
            add!(BatteryTempDiffThresholdCelsius, reader.read_u16()?)
        }
        L::ChargeHighTempThresholdCelsius => add!(ChargeHighTempThresholdCelsius, reader.read_u16()?),
        L::DischargeHighTempThresholdCelsius => {
            add!(DischargeHighTempThresholdCelsius, reader.read_u16()?)
        }
        L::ChargeLowTempThresholdCelsius => add!(ChargeLowTempThresholdCelsius, reader.read_i16()?),
        L::ChargeLowTempRecoveryCelsius => add!(ChargeLowTempRecoveryCelsius, reader.read_i16()?),
        L::DischargeLowTempThresholdCelsius => {
            add!(DischargeLowTempThresholdCelsius, reader.read_i16()?)
        }
        L::DischargeLowTempRecoveryCelsius => {
            add!(DischargeLowTempRecoveryCelsius, reader.read_i16()?)
        }
        L::CellAmountSetting => add!(CellAmountSetting, reader.read_u8()?),
        L::BatteryCapacitySettingAmpHours => add!(BatteryCapacitySettingAmpHours, reader.read_u32()?),
        L::BatteryChargeEnabled => add!(BatteryChargeEnabled, reader.read_bool()?),
        L::BatteryDischargeEnabled => add!(BatteryDischargeEnabled, reader.read_bool()?),
        L::CurrentCalibrationMilliAmps => add!(CurrentCalibrationMilliAmps, reader.read_u16()?),
        L::BmsAddress => add!(BmsAddress, reader.read_u8()?),
        L::BatteryType => add!(BatteryType, reader.read_u8()?),
        L::SleepWaitTime => add!(SleepWaitTime, reader.read_u16()?),
        L::LowCapacityAlarmThresholdPercent => {
            add!(LowCapacityAlarmThresholdPercent, reader.read_u8()?)
        }
        L::ModificationPassword => add!(ModificationPassword, reader.read_string(10, false)?),
        L::DedicatedChargerSwitch => add!(DedicatedChargerSwitch, reader.read_bool()?),
        L::EquipmentId => add!(EquipmentId, reader.read_string(8, false)?),
        L::DateOfManufacturing => add!(DateOfManufacturing, reader.read_string(4, false)?),
        L::BmsHourMeterMinutes => add!(BmsHourMeterMinutes, reader.read_u32()?),
        L::BmsSoftwareVersion => add!(BmsSoftwareVersion, reader.read_string(15, false)?),
        L::CurrentCalibration => add!(CurrentCalibration, reader.read_bool()?),
        L::ActualBatteryCapacityAmpHours => add!(ActualBatteryCapacityAmpHours, reader.read_u32()?),
        L::ProductId => add!(ProductId, reader.read_string(24, true)?),
        L::ProtocolVersion => add!(ProtocolVersion, reader.read_u8()?),
    }

    Ok(())
}
