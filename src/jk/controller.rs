use crate::prelude::*;

use crate::controller::{BmsController, BmsProtocol};
use crate::jk::assembler::FrameAssembler;
use crate::jk::datapoints::{label, DataPointContainer, DataPointLabel};
use crate::jk::message::{Command, SerialCommand, SerialResponse};
use crate::stats::JkBmsBatteryStats;
use crate::RawFrame;

/// Polls a JK BMS with `ReadAll` requests.
pub type Controller = BmsController<Protocol>;

#[derive(Debug, Default)]
pub struct Protocol {
    // current field encoding depends on it, unknown until the first frame
    protocol_version: Option<u8>,
}

impl BmsProtocol for Protocol {
    const NAME: &'static str = "[JK BMS]";

    type Assembler = FrameAssembler;
    type Labels = DataPointLabel;
    type Stats = JkBmsBatteryStats;
    type Request = Command;

    fn reset(&mut self) {
        self.protocol_version = None;
    }

    fn next_request(&self) -> Command {
        Command::ReadAll
    }

    fn encode(&self, request: Command) -> RawFrame {
        SerialCommand::new(request).into_bytes()
    }

    fn decode(&self, frame: RawFrame, now: u32) -> Result<DataPointContainer, FrameError> {
        Ok(SerialResponse::decode(frame, self.protocol_version, now)?.into_data_points())
    }

    fn frame_decoded(&mut self, data_points: &DataPointContainer) {
        if let Some(version) = data_points.get::<label::ProtocolVersion>() {
            self.protocol_version = Some(version);
        }
    }

    fn update_stats(stats: &mut JkBmsBatteryStats, data_points: &DataPointContainer, now: u32) {
        stats.update_from(data_points, now);
    }
}

impl Controller {
    /// Learned from the most recent frame that carried it.
    pub fn protocol_version(&self) -> Option<u8> {
        self.protocol().protocol_version
    }
}
