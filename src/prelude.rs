pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};

pub use crate::clock::{Clock, SystemClock};
pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::datapoints::{CellVoltages, DataPoint, DataPointContainer, Label, LabelSet, Value};
pub use crate::error::FrameError;
pub use crate::link::{Direction, Link};
pub use crate::{file_error, file_error_with_source};

pub use std::sync::{Arc, Mutex};
pub use tokio::sync::broadcast;
