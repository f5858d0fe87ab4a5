// THEORY:
// This file is the main entry point for the `chroma_pilot` library crate.
// It exposes the closed tracking-and-control core of a colour-following RC car:
// a frame goes in, a steering decision comes out, and the decision may be
// handed to a background sender that drives the car's actuator over HTTP.
//
// The `ControlLoop` is the high-level interface. The analysis layers underneath
// it (`core_modules`) stay usable on their own: calibration, segmentation,
// steering and dispatch can each be called and tested in isolation.

pub mod control_loop;
pub mod core_modules;

pub use control_loop::{ControlConfig, ControlEvent, ControlLoop, ControlState, Modes, TickReport};
pub use core_modules::actuator::{Actuator, HttpActuator, TransportError};
pub use core_modules::calibrator::{CalibrationError, calibrate};
pub use core_modules::detector::{DetectedObject, detect};
pub use core_modules::dispatcher::{CommandDispatcher, CommandSink, DispatchConfig};
pub use core_modules::hsv::{ColorRange, Hsv};
pub use core_modules::steering::{ActuatorCommand, CommandKind, Direction, SteeringZone, decide};
