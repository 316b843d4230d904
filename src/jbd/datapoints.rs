use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::datapoints::CellVoltages;

crate::datapoint_labels! {
    pub enum DataPointLabel: u8 {
        CellsMilliVolt => (CellVoltages, "mV"),
        BatteryTempOneCelsius => (i16, "°C"),
        BatteryTempTwoCelsius => (i16, "°C"),
        BatteryVoltageMilliVolt => (u32, "mV"),
        BatteryCurrentMilliAmps => (i32, "mA"),
        BatterySoCPercent => (u8, "%"),
        BatteryTemperatureSensorAmount => (u8, ""),
        BatteryCycles => (u16, ""),
        BatteryCellAmount => (u16, ""),
        AlarmsBitmask => (u16, ""),
        BalancingEnabled => (bool, ""),
        BatteryCapacitySettingAmpHours => (u32, "Ah"),
        BatteryChargeEnabled => (bool, ""),
        BatteryDischargeEnabled => (bool, ""),
        DateOfManufacturing => (String, ""),
        BmsSoftwareVersion => (String, ""),
        BmsHardwareVersion => (String, ""),
        ActualBatteryCapacityAmpHours => (u32, "Ah"),
    }
}

pub type DataPointContainer = crate::datapoints::DataPointContainer<DataPointLabel>;

// AlarmBits {{{
/// Protection status word of the basic information response.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum AlarmBits {
    CellOverVoltage = 1 << 0,
    CellUnderVoltage = 1 << 1,
    PackOverVoltage = 1 << 2,
    PackUnderVoltage = 1 << 3,
    ChargingOverTemperature = 1 << 4,
    ChargingLowTemperature = 1 << 5,
    DischargingOverTemperature = 1 << 6,
    DischargingLowTemperature = 1 << 7,
    ChargingOverCurrent = 1 << 8,
    DischargeOverCurrent = 1 << 9,
    ShortCircuit = 1 << 10,
    IcFrontEndError = 1 << 11,
    MosSoftwareLock = 1 << 12,
    Reserved1 = 1 << 13,
    Reserved2 = 1 << 14,
    Reserved3 = 1 << 15,
}

impl AlarmBits {
    pub const ALL: [AlarmBits; 16] = [
        AlarmBits::CellOverVoltage,
        AlarmBits::CellUnderVoltage,
        AlarmBits::PackOverVoltage,
        AlarmBits::PackUnderVoltage,
        AlarmBits::ChargingOverTemperature,
        AlarmBits::ChargingLowTemperature,
        AlarmBits::DischargingOverTemperature,
        AlarmBits::DischargingLowTemperature,
        AlarmBits::ChargingOverCurrent,
        AlarmBits::DischargeOverCurrent,
        AlarmBits::ShortCircuit,
        AlarmBits::IcFrontEndError,
        AlarmBits::MosSoftwareLock,
        AlarmBits::Reserved1,
        AlarmBits::Reserved2,
        AlarmBits::Reserved3,
    ];

    pub fn text(self) -> &'static str {
        match self {
            AlarmBits::CellOverVoltage => "CellOverVoltage",
            AlarmBits::CellUnderVoltage => "CellUnderVoltage",
            AlarmBits::PackOverVoltage => "PackOverVoltage",
            AlarmBits::PackUnderVoltage => "PackUnderVoltage",
            AlarmBits::ChargingOverTemperature => "ChargingOverTemperature",
            AlarmBits::ChargingLowTemperature => "ChargingLowTemperature",
            AlarmBits::DischargingOverTemperature => "DischargingOverTemperature",
            AlarmBits::DischargingLowTemperature => "DischargingLowTemperature",
            AlarmBits::ChargingOverCurrent => "ChargingOverCurrent",
            AlarmBits::DischargeOverCurrent => "DischargeOverCurrent",
            AlarmBits::ShortCircuit => "ShortCircuit",
            AlarmBits::IcFrontEndError => "IcFrontEndError",
            AlarmBits::MosSoftwareLock => "MosSoftwareLock",
            AlarmBits::Reserved1 => "Reserved1",
            AlarmBits::Reserved2 => "Reserved2",
            AlarmBits::Reserved3 => "Reserved3",
        }
    }

    pub fn is_set(self, bitmask: u16) -> bool {
        bitmask & u16::from(self) != 0
    }

    pub fn active(bitmask: u16) -> Vec<AlarmBits> {
        Self::ALL.into_iter().filter(|bit| bit.is_set(bitmask)).collect()
    }
}
// }}}
