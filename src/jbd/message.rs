use crate::prelude::*;

use enum_dispatch::*;
use nom::combinator::opt;
use nom::number::complete::be_u16;
use nom::IResult;
use nom_derive::{Nom, Parse};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::datapoints::CellVoltages;
use crate::jbd::datapoints::{label, DataPointContainer};
use crate::reader::{ByteReader, OutOfBounds};

pub const START_MARKER: u8 = 0xdd;
pub const END_MARKER: u8 = 0x77;

/// Start marker, two header bytes, data length, checksum and end marker.
pub const MIN_FRAME_SIZE: usize = 7;

const DATA_OFFSET: usize = 4;

// {{{ Command
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    /// Never sent, marks that no request went out yet.
    Init = 0x00,
    ReadBasicInformation = 0x03,
    ReadCellVoltages = 0x04,
    ReadHardwareVersionNumber = 0x05,
    ControlMosInstruction = 0xe1,
}

impl Command {
    /// The request to send after `self`. The hardware version is read once,
    /// afterwards basic information and cell voltages alternate.
    pub fn next_request(self) -> Command {
        match self {
            Command::Init => Command::ReadHardwareVersionNumber,
            Command::ReadBasicInformation => Command::ReadCellVoltages,
            Command::ReadCellVoltages => Command::ReadBasicInformation,
            _ => Command::ReadBasicInformation,
        }
    }
}
// }}}

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RequestStatus {
    Read = 0xa5,
    Write = 0x5a,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ResponseStatus {
    Ok = 0x00,
    Error = 0x80,
}

/// Two's complement of the byte sum from offset 2 up to the checksum.
pub fn checksum(raw: &[u8]) -> u16 {
    let end = raw.len().saturating_sub(3);
    let sum = raw
        .get(2..end)
        .unwrap_or_default()
        .iter()
        .fold(0u16, |sum, &byte| sum.wrapping_add(u16::from(byte)));
    (!sum).wrapping_add(1)
}

/// Structural checks, first failure wins: start marker, data length, end
/// marker, checksum.
pub fn validate(raw: &[u8]) -> Result<(), FrameError> {
    let size = raw.len();
    if let Some(&start_marker) = raw.first() {
        if start_marker != START_MARKER {
            return Err(FrameError::StartMarker {
                expected: u16::from(START_MARKER),
                actual: u16::from(start_marker),
            });
        }
    }

    if size < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort {
            actual: size,
            minimum: MIN_FRAME_SIZE,
        });
    }

    let data_length = raw[3] as usize;
    if data_length != size - MIN_FRAME_SIZE {
        return Err(FrameError::DataLength {
            expected: size - MIN_FRAME_SIZE,
            actual: data_length,
        });
    }

    let end_marker = raw[size - 1];
    if end_marker != END_MARKER {
        return Err(FrameError::EndMarker {
            expected: END_MARKER,
            actual: end_marker,
        });
    }

    let actual = ByteReader::at(raw, size - 3).read_u16()?;
    let expected = checksum(raw);
    if actual != expected {
        return Err(FrameError::Checksum { expected, actual });
    }

    Ok(())
}

#[enum_dispatch]
pub trait SerialMessage {
    fn raw(&self) -> &[u8];
    fn command(&self) -> Option<Command>;

    fn start_marker(&self) -> Option<u8> {
        self.raw().first().copied()
    }

    fn data_length(&self) -> Option<u8> {
        self.raw().get(3).copied()
    }

    fn stored_checksum(&self) -> Option<u16> {
        let raw = self.raw();
        let pos = raw.len().checked_sub(3)?;
        ByteReader::at(raw, pos).read_u16().ok()
    }

    fn end_marker(&self) -> Option<u8> {
        self.raw().last().copied()
    }

    fn validate(&self) -> Result<(), FrameError> {
        validate(self.raw())
    }
}

#[enum_dispatch(SerialMessage)]
#[derive(Clone, Debug)]
pub enum Message {
    Command(SerialCommand),
    Response(SerialResponse),
}

impl Message {
    /// Requests carry a read/write status in their second byte, responses
    /// carry the command there.
    pub fn parse(raw: Vec<u8>, timestamp: u32) -> Result<Self, FrameError> {
        match raw.get(1).and_then(|&b| RequestStatus::try_from(b).ok()) {
            Some(_) => Ok(Message::Command(SerialCommand::from_raw(raw)?)),
            None => Ok(Message::Response(SerialResponse::decode(raw, timestamp)?)),
        }
    }
}

// {{{ SerialCommand
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SerialCommand {
    raw: Vec<u8>,
}

impl SerialCommand {
    pub fn new(status: RequestStatus, command: Command) -> Self {
        let mut raw = vec![0; MIN_FRAME_SIZE];

        raw[0] = START_MARKER;
        raw[1] = status.into();
        raw[2] = command.into();
        raw[3] = 0x00; // no data

        let checksum = checksum(&raw);
        raw[4..6].copy_from_slice(&checksum.to_be_bytes());
        raw[6] = END_MARKER;

        Self { raw }
    }

    pub fn from_raw(raw: Vec<u8>) -> Result<Self, FrameError> {
        validate(&raw)?;
        if RequestStatus::try_from(raw[1]).is_err() {
            return Err(FrameError::Status {
                expected: RequestStatus::Read.into(),
                actual: raw[1],
            });
        }
        Ok(Self { raw })
    }

    pub fn status(&self) -> Option<RequestStatus> {
        self.raw.get(1).and_then(|&b| RequestStatus::try_from(b).ok())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }
}

impl SerialMessage for SerialCommand {
    fn raw(&self) -> &[u8] {
        &self.raw
    }

    fn command(&self) -> Option<Command> {
        self.raw.get(2).and_then(|&b| Command::try_from(b).ok())
    }
}
// }}}

// {{{ BasicInformation
/// Fixed layout of the `ReadBasicInformation` payload.
#[derive(Clone, Debug, PartialEq, Nom)]
#[nom(BigEndian)]
pub struct BasicInformation {
    pub voltage: u16,
    pub current: i16,
    pub remaining_capacity: u16,
    pub nominal_capacity: u16,
    pub cycles: u16,
    pub production_date: u16,
    pub balance_low: u16,
    pub balance_high: u16,
    pub protection_status: u16,
    pub software_version: u8,
    pub rsoc: u8,
    pub fet_control: u8,
    pub cell_count: u8,
    pub ntc_count: u8,
    #[nom(Parse = "opt(be_u16)")]
    pub ntc_one: Option<u16>,
    #[nom(Parse = "opt(be_u16)")]
    pub ntc_two: Option<u16>,
}

/// Bytes up to and including the NTC count.
pub const BASIC_INFORMATION_SIZE: usize = 23;

impl BasicInformation {
    /// `DD.MM.YYYY` from `day | month << 5 | (year - 2000) << 9`.
    pub fn production_date_text(&self) -> String {
        let raw = self.production_date;
        let day = raw & 0x1f;
        let month = (raw >> 5) & 0x0f;
        let year = 2000 + (raw >> 9);
        format!("{:02}.{:02}.{:04}", day, month, year)
    }

    pub fn software_version_text(&self) -> String {
        format!("{}.{}", self.software_version & 0x0f, self.software_version >> 4)
    }

    pub fn balancing_enabled(&self) -> bool {
        self.balance_low != 0 || self.balance_high != 0
    }

    pub fn charge_enabled(&self) -> bool {
        self.fet_control & (1 << 0) != 0
    }

    pub fn discharge_enabled(&self) -> bool {
        self.fet_control & (1 << 1) != 0
    }
}
// }}}

/// Tenths of a Kelvin to degrees Celsius.
pub fn kelvin_to_celsius(raw: u16) -> i16 {
    ((i32::from(raw) - 2731) / 10) as i16
}

// {{{ SerialResponse
#[derive(Clone, Debug)]
pub struct SerialResponse {
    raw: Vec<u8>,
    data_points: DataPointContainer,
}

impl SerialResponse {
    pub fn decode(raw: Vec<u8>, timestamp: u32) -> Result<Self, FrameError> {
        validate(&raw)?;

        let status = raw[2];
        if status != u8::from(ResponseStatus::Ok) {
            return Err(FrameError::Status {
                expected: ResponseStatus::Ok.into(),
                actual: status,
            });
        }

        let command = Command::try_from(raw[1]).map_err(|_| FrameError::UnknownCommand(raw[1]))?;

        let data = &raw[DATA_OFFSET..raw.len() - 3];
        let mut data_points = DataPointContainer::new();

        if !data.is_empty() {
            match command {
                Command::ReadBasicInformation => {
                    decode_basic_information(data, raw.len(), &mut data_points, timestamp)?
                }
                Command::ReadCellVoltages => {
                    data_points.add::<label::CellsMilliVolt>(decode_cells(data)?, timestamp)
                }
                Command::ReadHardwareVersionNumber => data_points.add::<label::BmsHardwareVersion>(
                    String::from_utf8_lossy(data).into_owned(),
                    timestamp,
                ),
                Command::ControlMosInstruction | Command::Init => {
                    debug!("ignoring {} byte payload of {:?} response", data.len(), command);
                }
            }
        }

        Ok(Self { raw, data_points })
    }

    pub fn status(&self) -> Option<ResponseStatus> {
        self.raw.get(2).and_then(|&b| ResponseStatus::try_from(b).ok())
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

    fn command(&self) -> Option<Command> {
        self.raw.get(1).and_then(|&b| Command::try_from(b).ok())
    }
}
// }}}

fn decode_basic_information(
    data: &[u8],
    frame_size: usize,
    dp: &mut DataPointContainer,
    ts: u32,
) -> Result<(), FrameError> {
    let parsed: IResult<&[u8], BasicInformation> = BasicInformation::parse(data);
    let info = match parsed {
        Ok((_, info)) => info,
        Err(_) => {
            return Err(FrameError::Truncated(OutOfBounds {
                offset: DATA_OFFSET,
                wanted: BASIC_INFORMATION_SIZE,
                len: frame_size,
            }))
        }
    };

    dp.add::<label::BatteryVoltageMilliVolt>(u32::from(info.voltage) * 10, ts);
    dp.add::<label::BatteryCurrentMilliAmps>(i32::from(info.current) * 10, ts);
    dp.add::<label::ActualBatteryCapacityAmpHours>(u32::from(info.remaining_capacity) * 10 / 1000, ts);
    dp.add::<label::BatteryCapacitySettingAmpHours>(u32::from(info.nominal_capacity) * 10 / 1000, ts);
    dp.add::<label::BatteryCycles>(info.cycles, ts);
    dp.add::<label::DateOfManufacturing>(info.production_date_text(), ts);
    dp.add::<label::BalancingEnabled>(info.balancing_enabled(), ts);
    dp.add::<label::AlarmsBitmask>(info.protection_status, ts);
    dp.add::<label::BmsSoftwareVersion>(info.software_version_text(), ts);
    dp.add::<label::BatterySoCPercent>(info.rsoc, ts);
    dp.add::<label::BatteryChargeEnabled>(info.charge_enabled(), ts);
    dp.add::<label::BatteryDischargeEnabled>(info.discharge_enabled(), ts);
    dp.add::<label::BatteryCellAmount>(u16::from(info.cell_count), ts);
    dp.add::<label::BatteryTemperatureSensorAmount>(info.ntc_count, ts);

    if let Some(raw) = info.ntc_one {
        dp.add::<label::BatteryTempOneCelsius>(kelvin_to_celsius(raw), ts);
    }
    if let Some(raw) = info.ntc_two {
        dp.add::<label::BatteryTempTwoCelsius>(kelvin_to_celsius(raw), ts);
    }

    Ok(())
}

fn decode_cells(data: &[u8]) -> Result<CellVoltages, OutOfBounds> {
    let mut reader = ByteReader::new(data);
    let mut cells = CellVoltages::new();

    for idx in 0..(data.len() / 2) {
        cells.insert(idx as u8, reader.read_u16()?);
    }
    Ok(cells)
}
