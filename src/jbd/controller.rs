use crate::prelude::*;

use crate::controller::{BmsController, BmsProtocol};
use crate::jbd::assembler::FrameAssembler;
use crate::jbd::datapoints::{DataPointContainer, DataPointLabel};
use crate::jbd::message::{Command, RequestStatus, SerialCommand, SerialResponse};
use crate::stats::JbdBmsBatteryStats;
use crate::RawFrame;

/// Polls a JBD BMS. The hardware version is requested once, afterwards
/// basic information and cell voltages alternate.
pub type Controller = BmsController<Protocol>;

#[derive(Debug)]
pub struct Protocol {
    last_command: Command,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            last_command: Command::Init,
        }
    }
}

impl BmsProtocol for Protocol {
    const NAME: &'static str = "[JBD BMS]";

    type Assembler = FrameAssembler;
    type Labels = DataPointLabel;
    type Stats = JbdBmsBatteryStats;
    type Request = Command;

    fn reset(&mut self) {
        self.last_command = Command::Init;
    }

    fn next_request(&self) -> Command {
        self.last_command.next_request()
    }

    fn encode(&self, request: Command) -> RawFrame {
        SerialCommand::new(RequestStatus::Read, request).into_bytes()
    }

    fn request_sent(&mut self, request: Command) {
        self.last_command = request;
    }

    fn decode(&self, frame: RawFrame, now: u32) -> Result<DataPointContainer, FrameError> {
        Ok(SerialResponse::decode(frame, now)?.into_data_points())
    }

    fn update_stats(stats: &mut JbdBmsBatteryStats, data_points: &DataPointContainer, now: u32) {
        stats.update_from(data_points, now);
    }
}

impl Controller {
    /// The request sent most recently, `Init` before the first one.
    pub fn last_command(&self) -> Command {
        self.protocol().last_command
    }
}
