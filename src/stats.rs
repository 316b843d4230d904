use crate::prelude::*;

use crate::clock;
use crate::jbd::datapoints::{self as jbd_dp, label as jbd_label};
use crate::jk::datapoints::{self as jk_dp, label as jk_label};

/// State shared by every battery snapshot.
#[derive(Clone, Debug, Default)]
pub struct StatsBase {
    manufacturer: String,
    soc: u8,
    last_update_soc: Option<u32>,
    last_update: Option<u32>,
}

impl StatsBase {
    fn new(manufacturer: &str) -> Self {
        Self {
            manufacturer: manufacturer.to_string(),
            ..Default::default()
        }
    }
}

/// Long-lived view of one battery, fed exclusively by merging decoded
/// frames into it.
pub trait BatteryStats: Send {
    fn base(&self) -> &StatsBase;

    fn manufacturer(&self) -> &str {
        &self.base().manufacturer
    }

    /// State of charge in percent.
    fn soc(&self) -> u8 {
        self.base().soc
    }

    fn last_update_soc(&self) -> Option<u32> {
        self.base().last_update_soc
    }

    fn last_update(&self) -> Option<u32> {
        self.base().last_update
    }

    /// Seconds since the last merge, `None` before the first one.
    fn age_seconds(&self, now: u32) -> Option<u32> {
        self.last_update()
            .map(|last| clock::elapsed(now, last) / 1000)
    }

    /// True once both a state of charge and some update were seen.
    fn is_valid(&self) -> bool {
        self.last_update_soc().is_some() && self.last_update().is_some()
    }

    fn update_available(&self, since: u32) -> bool {
        self.last_update()
            .map_or(false, |last| clock::is_after(last, since))
    }

    /// Pack voltage in volts.
    fn voltage(&self) -> Option<f32>;

    /// Pack current in amperes, negative while discharging.
    fn current(&self) -> Option<f32>;

    fn temperature(&self) -> Option<i16>;

    fn cell_voltages(&self) -> Option<CellVoltages>;

    fn cell_min_milli_volt(&self) -> Option<u16> {
        self.cell_voltages()?.values().copied().min()
    }

    fn cell_max_milli_volt(&self) -> Option<u16> {
        self.cell_voltages()?.values().copied().max()
    }

    fn cell_diff_milli_volt(&self) -> Option<u16> {
        Some(self.cell_max_milli_volt()? - self.cell_min_milli_volt()?)
    }

    fn charge_enabled(&self) -> Option<bool>;

    fn discharge_enabled(&self) -> Option<bool>;

    fn alarms_bitmask(&self) -> Option<u16>;

    /// Names of the alarms currently flagged by the BMS.
    fn active_alarms(&self) -> Vec<String>;

    fn print_summary(&self, now: u32) {
        info!("Battery {}:", self.manufacturer());
        if !self.is_valid() {
            info!("  no data received");
            return;
        }
        info!("  SoC: {}%", self.soc());
        if let Some(age) = self.age_seconds(now) {
            info!("  Data age: {}s", age);
        }
        if let Some(voltage) = self.voltage() {
            info!("  Voltage: {:.2}V", voltage);
        }
        if let Some(current) = self.current() {
            info!("  Current: {:.2}A", current);
        }
        if let Some(temperature) = self.temperature() {
            info!("  Temperature: {}°C", temperature);
        }
        if let (Some(min), Some(max)) = (self.cell_min_milli_volt(), self.cell_max_milli_volt()) {
            info!("  Cells: min {}mV, max {}mV, diff {}mV", min, max, max - min);
        }
        let alarms = self.active_alarms();
        if !alarms.is_empty() {
            info!("  Alarms: {}", alarms.join(", "));
        }
    }
}

fn milli_to_unit<T: Into<f64>>(value: T) -> f32 {
    (value.into() / 1000.0) as f32
}

// JkBmsBatteryStats {{{
#[derive(Clone, Debug)]
pub struct JkBmsBatteryStats {
    base: StatsBase,
    data_points: jk_dp::DataPointContainer,
}

impl Default for JkBmsBatteryStats {
    fn default() -> Self {
        Self {
            base: StatsBase::new("JKBMS"),
            data_points: jk_dp::DataPointContainer::new(),
        }
    }
}

impl JkBmsBatteryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_points(&self) -> &jk_dp::DataPointContainer {
        &self.data_points
    }

    pub fn update_from(&mut self, dp: &jk_dp::DataPointContainer, now: u32) {
        self.data_points.merge_from(dp);

        self.base.manufacturer = match self.data_points.get::<jk_label::ProductId>() {
            Some(product_id) => match product_id.rfind("JK") {
                Some(pos) => product_id[pos..].to_string(),
                None => product_id,
            },
            None => "JKBMS".to_string(),
        };

        if let Some(soc) = self.data_points.data_point_for::<jk_label::BatterySoCPercent>() {
            if let Value::U8(percent) = soc.value() {
                self.base.soc = *percent;
            }
            self.base.last_update_soc = Some(soc.timestamp());
        }

        self.base.last_update = Some(now);
    }
}

impl BatteryStats for JkBmsBatteryStats {
    fn base(&self) -> &StatsBase {
        &self.base
    }

    fn voltage(&self) -> Option<f32> {
        self.data_points
            .get::<jk_label::BatteryVoltageMilliVolt>()
            .map(milli_to_unit)
    }

    fn current(&self) -> Option<f32> {
        self.data_points
            .get::<jk_label::BatteryCurrentMilliAmps>()
            .map(milli_to_unit)
    }

    fn temperature(&self) -> Option<i16> {
        self.data_points.get::<jk_label::BatteryTempOneCelsius>()
    }

    fn cell_voltages(&self) -> Option<CellVoltages> {
        self.data_points.get::<jk_label::CellsMilliVolt>()
    }

    fn charge_enabled(&self) -> Option<bool> {
        self.data_points.get::<jk_label::BatteryChargeEnabled>()
    }

    fn discharge_enabled(&self) -> Option<bool> {
        self.data_points.get::<jk_label::BatteryDischargeEnabled>()
    }

    fn alarms_bitmask(&self) -> Option<u16> {
        self.data_points.get::<jk_label::AlarmsBitmask>()
    }

    fn active_alarms(&self) -> Vec<String> {
        self.alarms_bitmask()
            .map(|bitmask| {
                jk_dp::AlarmBits::active(bitmask)
                    .into_iter()
                    .map(|bit| format!("{:?}", bit))
                    .collect()
            })
            .unwrap_or_default()
    }
} // }}}

// JbdBmsBatteryStats {{{
#[derive(Clone, Debug)]
pub struct JbdBmsBatteryStats {
    base: StatsBase,
    data_points: jbd_dp::DataPointContainer,
}

impl Default for JbdBmsBatteryStats {
    fn default() -> Self {
        Self {
            base: StatsBase::new("JBDBMS"),
            data_points: jbd_dp::DataPointContainer::new(),
        }
    }
}

impl JbdBmsBatteryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_points(&self) -> &jbd_dp::DataPointContainer {
        &self.data_points
    }

    pub fn update_from(&mut self, dp: &jbd_dp::DataPointContainer, now: u32) {
        self.data_points.merge_from(dp);

        self.base.manufacturer = match self.data_points.get::<jbd_label::BmsHardwareVersion>() {
            Some(version) if !version.trim().is_empty() => version.trim().to_string(),
            _ => "JBDBMS".to_string(),
        };

        if let Some(soc) = self.data_points.data_point_for::<jbd_label::BatterySoCPercent>() {
            if let Value::U8(percent) = soc.value() {
                self.base.soc = *percent;
            }
            self.base.last_update_soc = Some(soc.timestamp());
        }

        self.base.last_update = Some(now);
    }
}

impl BatteryStats for JbdBmsBatteryStats {
    fn base(&self) -> &StatsBase {
        &self.base
    }

    fn voltage(&self) -> Option<f32> {
        self.data_points
            .get::<jbd_label::BatteryVoltageMilliVolt>()
            .map(milli_to_unit)
    }

    fn current(&self) -> Option<f32> {
        self.data_points
            .get::<jbd_label::BatteryCurrentMilliAmps>()
            .map(milli_to_unit)
    }

    fn temperature(&self) -> Option<i16> {
        self.data_points.get::<jbd_label::BatteryTempOneCelsius>()
    }

    fn cell_voltages(&self) -> Option<CellVoltages> {
        self.data_points.get::<jbd_label::CellsMilliVolt>()
    }

    fn charge_enabled(&self) -> Option<bool> {
        self.data_points.get::<jbd_label::BatteryChargeEnabled>()
    }

    fn discharge_enabled(&self) -> Option<bool> {
        self.data_points.get::<jbd_label::BatteryDischargeEnabled>()
    }

    fn alarms_bitmask(&self) -> Option<u16> {
        self.data_points.get::<jbd_label::AlarmsBitmask>()
    }

    fn active_alarms(&self) -> Vec<String> {
        self.alarms_bitmask()
            .map(|bitmask| {
                jbd_dp::AlarmBits::active(bitmask)
                    .into_iter()
                    .map(|bit| bit.text().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
} // }}}
