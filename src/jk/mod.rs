pub mod assembler;
pub mod controller;
pub mod datapoints;
pub mod message;

pub use controller::Controller;
