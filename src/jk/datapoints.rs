use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::datapoints::CellVoltages;

crate::datapoint_labels! {
    /// Field tags of the JK BMS variable section. The discriminant is the
    /// tag byte on the wire.
    #[derive(IntoPrimitive, TryFromPrimitive)]
    pub enum DataPointLabel: u8 {
        CellsMilliVolt = 0x79 => (CellVoltages, "mV"),
        BmsTempCelsius = 0x80 => (i16, "°C"),
        BatteryTempOneCelsius = 0x81 => (i16, "°C"),
        BatteryTempTwoCelsius = 0x82 => (i16, "°C"),
        BatteryVoltageMilliVolt = 0x83 => (u32, "mV"),
        BatteryCurrentMilliAmps = 0x84 => (i32, "mA"),
        BatterySoCPercent = 0x85 => (u8, "%"),
        BatteryTemperatureSensorAmount = 0x86 => (u8, ""),
        BatteryCycles = 0x87 => (u16, ""),
        BatteryCycleCapacity = 0x89 => (u32, "Ah"),
        BatteryCellAmount = 0x8a => (u16, ""),
        AlarmsBitmask = 0x8b => (u16, ""),
        StatusBitmask = 0x8c => (u16, ""),
        TotalOvervoltageThresholdMilliVolt = 0x8e => (u32, "mV"),
        TotalUndervoltageThresholdMilliVolt = 0x8f => (u32, "mV"),
        CellOvervoltageThresholdMilliVolt = 0x90 => (u16, "mV"),
        CellOvervoltageRecoveryMilliVolt = 0x91 => (u16, "mV"),
        CellOvervoltageProtectionDelaySeconds = 0x92 => (u16, "s"),
        CellUndervoltageThresholdMilliVolt = 0x93 => (u16, "mV"),
        CellUndervoltageRecoveryMilliVolt = 0x94 => (u16, "mV"),
        CellUndervoltageProtectionDelaySeconds = 0x95 => (u16, "s"),
        CellVoltageDiffThresholdMilliVolt = 0x96 => (u16, "mV"),
        DischargeOvercurrentThresholdAmperes = 0x97 => (u16, "A"),
        DischargeOvercurrentDelaySeconds = 0x98 => (u16, "s"),
        ChargeOvercurrentThresholdAmps = 0x99 => (u16, "A"),
        ChargeOvercurrentDelaySeconds = 0x9a => (u16, "s"),
        BalanceCellVoltageThresholdMilliVolt = 0x9b => (u16, "mV"),
        BalanceVoltageDiffThresholdMilliVolt = 0x9c => (u16, "mV"),
        BalancingEnabled = 0x9d => (bool, ""),
        BmsTempProtectionThresholdCelsius = 0x9e => (u16, "°C"),
        BmsTempRecoveryThresholdCelsius = 0x9f => (u16, "°C"),
        BatteryTempProtectionThresholdCelsius = 0xa0 => (u16, "°C"),
        BatteryTempRecoveryThresholdCelsius = 0xa1 => (u16, "°C"),
        BatteryTempDiffThresholdCelsius = 0xa2 => (u16, "°C"),
        ChargeHighTempThresholdCelsius = 0xa3 => (u16, "°C"),
        DischargeHighTempThresholdCelsius = 0xa4 => (u16, "°C"),
        ChargeLowTempThresholdCelsius = 0xa5 => (i16, "°C"),
        ChargeLowTempRecoveryCelsius = 0xa6 => (i16, "°C"),
        DischargeLowTempThresholdCelsius = 0xa7 => (i16, "°C"),
        DischargeLowTempRecoveryCelsius = 0xa8 => (i16, "°C"),
        CellAmountSetting = 0xa9 => (u8, ""),
        BatteryCapacitySettingAmpHours = 0xaa => (u32, "Ah"),
        BatteryChargeEnabled = 0xab => (bool, ""),
        BatteryDischargeEnabled = 0xac => (bool, ""),
        CurrentCalibrationMilliAmps = 0xad => (u16, "mA"),
        BmsAddress = 0xae => (u8, ""),
        BatteryType = 0xaf => (u8, ""),
        SleepWaitTime = 0xb0 => (u16, "s"),
        LowCapacityAlarmThresholdPercent = 0xb1 => (u8, "%"),
        ModificationPassword = 0xb2 => (String, ""),
        DedicatedChargerSwitch = 0xb3 => (bool, ""),
        EquipmentId = 0xb4 => (String, ""),
        DateOfManufacturing = 0xb5 => (String, ""),
        BmsHourMeterMinutes = 0xb6 => (u32, "min"),
        BmsSoftwareVersion = 0xb7 => (String, ""),
        CurrentCalibration = 0xb8 => (bool, ""),
        ActualBatteryCapacityAmpHours = 0xb9 => (u32, "Ah"),
        ProductId = 0xba => (String, ""),
        ProtocolVersion = 0xc0 => (u8, ""),
    }
}

pub type DataPointContainer = crate::datapoints::DataPointContainer<DataPointLabel>;

// AlarmBits {{{
/// Bits of the `AlarmsBitmask` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum AlarmBits {
    LowCapacity = 1 << 0,
    BmsOvertemperature = 1 << 1,
    ChargingOvervoltage = 1 << 2,
    DischargeUndervoltage = 1 << 3,
    BatteryOvertemperature = 1 << 4,
    ChargingOvercurrent = 1 << 5,
    DischargeOvercurrent = 1 << 6,
    CellVoltageDifference = 1 << 7,
    BatteryBoxOvertemperature = 1 << 8,
    BatteryUndertemperature = 1 << 9,
    CellOvervoltage = 1 << 10,
    CellUndervoltage = 1 << 11,
    AProtect = 1 << 12,
    BProtect = 1 << 13,
}

impl AlarmBits {
    pub const ALL: [AlarmBits; 14] = [
        AlarmBits::LowCapacity,
        AlarmBits::BmsOvertemperature,
        AlarmBits::ChargingOvervoltage,
        AlarmBits::DischargeUndervoltage,
        AlarmBits::BatteryOvertemperature,
        AlarmBits::ChargingOvercurrent,
        AlarmBits::DischargeOvercurrent,
        AlarmBits::CellVoltageDifference,
        AlarmBits::BatteryBoxOvertemperature,
        AlarmBits::BatteryUndertemperature,
        AlarmBits::CellOvervoltage,
        AlarmBits::CellUndervoltage,
        AlarmBits::AProtect,
        AlarmBits::BProtect,
    ];

    pub fn is_set(self, bitmask: u16) -> bool {
        bitmask & u16::from(self) != 0
    }

    /// Every alarm flagged in `bitmask`, lowest bit first.
    pub fn active(bitmask: u16) -> Vec<AlarmBits> {
        Self::ALL.into_iter().filter(|bit| bit.is_set(bitmask)).collect()
    }
}
// }}}
