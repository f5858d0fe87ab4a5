// THEORY:
// The `control_loop` module is the top-level API of the tracking core. It plays
// the role a pipeline façade plays in a vision engine: the caller hands it one
// frame at a time and gets back a report, without knowing about masks, contours
// or sockets.
//
// It owns all mutable control state explicitly (modes, thresholds, the active
// colour range inside the detector, the command sink) instead of scattering it
// across globals. Input from the UI arrives as `ControlEvent`s on a channel and
// is drained once at the start of every tick, so key presses and slider moves
// never interleave with a half-processed frame.
//
// Per tick:
// 1.  Drain events (calibration, mode toggles, setters, manual moves).
// 2.  Paused → stop here. Not detecting → stop here.
// 3.  Detect → decide → (automatic mode only) submit the steering command.

use crate::core_modules::calibrator::{CalibrationError, calibrate};
use crate::core_modules::detector::{DetectedObject, FrameAnalysis, ObjectDetector, Segmentation};
use crate::core_modules::dispatcher::{CommandSink, DispatchConfig};
use crate::core_modules::hsv::ColorRange;
use crate::core_modules::steering::{ActuatorCommand, Direction, SteeringZone, decide};
use image::RgbImage;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Upper bound of the firmware's PWM speed setting.
pub const MAX_MOTOR_SPEED: u16 = 1023;

/// Startup configuration. Everything here can be changed at runtime through events;
/// nothing is persisted.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Base URL of the car's HTTP firmware.
    pub actuator_url: String,
    /// URL of the camera stream.
    pub video_url: String,
    /// Half-width of the calibration square. Also the morphology pass count.
    pub sample_half_width: u32,
    /// Hold-duration attached to steering and manual move commands.
    pub step_duration_ms: u32,
    /// Motor speed the car starts with.
    pub motor_speed: u16,
    /// Hold-duration attached to speed commands.
    pub speed_hold_ms: u32,
    /// How long one actuator request may take before it is dropped.
    pub request_timeout: Duration,
    /// How often the idle sender re-checks its slot.
    pub idle_poll: Duration,
    /// How often a paused loop wakes up to look for events.
    pub paused_cadence: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            actuator_url: "http://192.168.1.46/".to_string(),
            video_url: "http://192.168.1.30:8080/video".to_string(),
            sample_half_width: 10,
            step_duration_ms: 40,
            motor_speed: 1000,
            speed_hold_ms: 20,
            request_timeout: Duration::from_secs(2),
            idle_poll: Duration::from_millis(10),
            paused_cadence: Duration::from_millis(300),
        }
    }
}

impl ControlConfig {
    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            idle_poll: self.idle_poll,
        }
    }
}

/// Operating modes, toggled by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modes {
    /// Steering decisions are sent to the car, not only shown.
    pub automatic: bool,
    /// Tracking runs on every frame.
    pub detecting: bool,
    /// Tracking and drawing are suspended.
    pub paused: bool,
}

/// The runtime-mutable part of the control state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    pub modes: Modes,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Objects left of this x steer left.
    pub left_range: i32,
    /// Objects right of this x steer right.
    pub right_range: i32,
    pub step_duration_ms: u32,
    pub motor_speed: u16,
}

impl ControlState {
    pub fn new(frame_width: u32, frame_height: u32, config: &ControlConfig) -> Self {
        let (left_range, right_range) = default_thresholds(frame_width);
        Self {
            modes: Modes::default(),
            frame_width,
            frame_height,
            left_range,
            right_range,
            step_duration_ms: config.step_duration_ms,
            motor_speed: config.motor_speed.min(MAX_MOTOR_SPEED),
        }
    }
}

/// A dead-band a quarter of the frame wide, centred.
pub fn default_thresholds(frame_width: u32) -> (i32, i32) {
    let center = frame_width as i32 / 2;
    let half_band = frame_width as i32 / 8;
    (center - half_band, center + half_band)
}

/// Discrete input from the operator's UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Sample the colour under the centre square and start detecting.
    CalibrateAtCenter,
    ToggleAutomatic,
    ToggleDetecting,
    TogglePause,
    /// Send a one-off drive command regardless of mode.
    ManualMove(Direction),
    SetLeftThreshold(i32),
    SetRightThreshold(i32),
    SetDuration(u32),
    /// Set the motor speed and forward it to the car immediately.
    SetSpeed(i32),
}

/// What one tick did, for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// The loop is paused; only events were handled.
    Paused,
    /// Running but not detecting.
    Idle,
    /// Detection ran on this frame.
    Tracking {
        object: Option<DetectedObject>,
        zone: SteeringZone,
        /// The command handed to the sink, if automatic mode produced one.
        command: Option<ActuatorCommand>,
        /// Mask and regions of this frame. `None` until a range is calibrated.
        segmentation: Option<Segmentation>,
    },
}

/// Orchestrates detect → decide → dispatch for every frame.
pub struct ControlLoop<S: CommandSink> {
    config: ControlConfig,
    state: ControlState,
    detector: ObjectDetector,
    sink: S,
    events_tx: UnboundedSender<ControlEvent>,
    events_rx: UnboundedReceiver<ControlEvent>,
}

impl<S: CommandSink> ControlLoop<S> {
    pub fn new(config: ControlConfig, frame_width: u32, frame_height: u32, sink: S) -> Self {
        let state = ControlState::new(frame_width, frame_height, &config);
        let detector = ObjectDetector::new(config.sample_half_width);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        info!(
            frame_width,
            frame_height,
            left = state.left_range,
            right = state.right_range,
            "control loop ready"
        );
        Self {
            config,
            state,
            detector,
            sink,
            events_tx,
            events_rx,
        }
    }

    /// A handle the UI can push events through from anywhere.
    pub fn events(&self) -> UnboundedSender<ControlEvent> {
        self.events_tx.clone()
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn active_range(&self) -> Option<ColorRange> {
        self.detector.range()
    }

    /// Processes one frame. While paused, pass the last frame again so that
    /// calibration still has something to sample.
    pub fn tick(&mut self, frame: &RgbImage) -> TickReport {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event, frame);
        }

        if self.state.modes.paused {
            return TickReport::Paused;
        }
        if !self.state.modes.detecting {
            return TickReport::Idle;
        }

        let (object, segmentation) = match self.detector.analyze(frame) {
            Some(FrameAnalysis {
                segmentation,
                object,
            }) => (object, Some(segmentation)),
            None => (None, None),
        };
        let (left, right) = (self.state.left_range, self.state.right_range);
        let zone = match &object {
            Some(object) => decide(object.centroid_x(), left, right),
            None => SteeringZone::None,
        };

        let command = if self.state.modes.automatic {
            ActuatorCommand::for_zone(zone, self.state.step_duration_ms)
        } else {
            None
        };
        if let Some(command) = command {
            self.sink.submit(command);
        }

        debug!(?zone, x = object.as_ref().map(DetectedObject::centroid_x), "tracked");
        TickReport::Tracking {
            object,
            zone,
            command,
            segmentation,
        }
    }

    /// Applies one event immediately.
    pub fn handle_event(&mut self, event: ControlEvent, frame: &RgbImage) {
        match event {
            ControlEvent::CalibrateAtCenter => {
                // A rejected sample leaves the previous range active.
                if let Err(error) = self.calibrate_at_center(frame) {
                    warn!(%error, "calibration rejected");
                }
            }
            ControlEvent::ToggleAutomatic => {
                self.state.modes.automatic = !self.state.modes.automatic;
                info!(automatic = self.state.modes.automatic, "mode changed");
            }
            ControlEvent::ToggleDetecting => {
                self.state.modes.detecting = !self.state.modes.detecting;
                info!(detecting = self.state.modes.detecting, "mode changed");
            }
            ControlEvent::TogglePause => {
                self.state.modes.paused = !self.state.modes.paused;
                info!(paused = self.state.modes.paused, "mode changed");
            }
            ControlEvent::ManualMove(direction) => {
                let command = ActuatorCommand::manual(direction, self.state.step_duration_ms);
                self.sink.submit(command);
            }
            ControlEvent::SetLeftThreshold(x) => self.set_left_threshold(x),
            ControlEvent::SetRightThreshold(x) => self.set_right_threshold(x),
            ControlEvent::SetDuration(ms) => self.set_step_duration(ms),
            ControlEvent::SetSpeed(speed) => self.set_motor_speed(speed),
        }
    }

    /// Samples the centre square of `frame`, replaces the active range and turns
    /// detection on.
    pub fn calibrate_at_center(
        &mut self,
        frame: &RgbImage,
    ) -> Result<ColorRange, CalibrationError> {
        let center = (frame.width() / 2, frame.height() / 2);
        let range = calibrate(frame, center, self.config.sample_half_width)?;
        self.detector.set_range(range);
        self.state.modes.detecting = true;
        Ok(range)
    }

    pub fn set_left_threshold(&mut self, x: i32) {
        self.state.left_range = self.clamp_to_frame(x);
    }

    pub fn set_right_threshold(&mut self, x: i32) {
        self.state.right_range = self.clamp_to_frame(x);
    }

    pub fn set_step_duration(&mut self, ms: u32) {
        self.state.step_duration_ms = ms;
    }

    /// Stores the new speed and sends it to the car straight away.
    pub fn set_motor_speed(&mut self, speed: i32) {
        let speed = speed.clamp(0, MAX_MOTOR_SPEED as i32) as u16;
        self.state.motor_speed = speed;
        let command = ActuatorCommand::speed(speed, self.config.speed_hold_ms);
        self.sink.submit(command);
    }

    fn clamp_to_frame(&self, x: i32) -> i32 {
        x.clamp(0, self.state.frame_width as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink(RefCell<Vec<ActuatorCommand>>);

    impl CommandSink for RecordingSink {
        fn submit(&self, command: ActuatorCommand) {
            self.0.borrow_mut().push(command);
        }
    }

    impl RecordingSink {
        fn take(&self) -> Vec<ActuatorCommand> {
            self.0.borrow_mut().drain(..).collect()
        }
    }

    const TARGET: Rgb<u8> = Rgb([240, 200, 20]);
    const BACKGROUND: Rgb<u8> = Rgb([20, 20, 120]);

    fn frame_with_blob(cx: u32, cy: u32) -> RgbImage {
        let mut frame = RgbImage::from_pixel(320, 240, BACKGROUND);
        for y in cy - 15..cy + 15 {
            for x in cx - 15..cx + 15 {
                frame.put_pixel(x, y, TARGET);
            }
        }
        frame
    }

    fn control() -> ControlLoop<RecordingSink> {
        let config = ControlConfig {
            sample_half_width: 4,
            ..ControlConfig::default()
        };
        ControlLoop::new(config, 320, 240, RecordingSink::default())
    }

    #[test]
    fn default_thresholds_form_a_quarter_width_dead_band() {
        assert_eq!(default_thresholds(640), (240, 400));
        assert_eq!(default_thresholds(320), (120, 200));
    }

    #[test]
    fn fresh_loop_is_idle_and_sends_nothing() {
        let mut control = control();
        assert_eq!(control.tick(&frame_with_blob(160, 120)), TickReport::Idle);
        assert!(control.sink().take().is_empty());
    }

    #[test]
    fn calibration_event_starts_detecting() {
        let mut control = control();
        let frame = frame_with_blob(160, 120);
        let events = control.events();
        events.send(ControlEvent::CalibrateAtCenter).unwrap();

        let report = control.tick(&frame);
        assert!(control.active_range().is_some());
        assert!(control.state().modes.detecting);
        match report {
            TickReport::Tracking {
                object,
                zone,
                command,
                ..
            } => {
                assert!(object.is_some());
                assert_eq!(zone, SteeringZone::Straight);
                // Manual mode: decided, not sent.
                assert_eq!(command, None);
            }
            other => panic!("unexpected report {other:?}"),
        }
        assert!(control.sink().take().is_empty());
    }

    #[test]
    fn automatic_mode_sends_the_zone_command() {
        let mut control = control();
        control.handle_event(ControlEvent::CalibrateAtCenter, &frame_with_blob(160, 120));
        control.handle_event(ControlEvent::ToggleAutomatic, &frame_with_blob(160, 120));

        let report = control.tick(&frame_with_blob(260, 120));
        let expected = ActuatorCommand::for_zone(SteeringZone::Right, 40).unwrap();
        match report {
            TickReport::Tracking {
                zone,
                command,
                ..
            } => {
                assert_eq!(zone, SteeringZone::Right);
                assert_eq!(command, Some(expected));
            }
            other => panic!("unexpected report {other:?}"),
        }
        assert_eq!(control.sink().take(), vec![expected]);

        control.tick(&frame_with_blob(40, 120));
        assert_eq!(
            control.sink().take(),
            vec![ActuatorCommand::for_zone(SteeringZone::Left, 40).unwrap()]
        );
    }

    #[test]
    fn lost_object_means_no_zone_and_no_command() {
        let mut control = control();
        control.handle_event(ControlEvent::CalibrateAtCenter, &frame_with_blob(160, 120));
        control.handle_event(ControlEvent::ToggleAutomatic, &frame_with_blob(160, 120));

        let empty = RgbImage::from_pixel(320, 240, BACKGROUND);
        match control.tick(&empty) {
            TickReport::Tracking {
                object,
                zone,
                command,
                segmentation,
            } => {
                assert_eq!(object, None);
                assert_eq!(zone, SteeringZone::None);
                assert_eq!(command, None);
                assert!(segmentation.is_some_and(|s| s.contours.is_empty()));
            }
            other => panic!("unexpected report {other:?}"),
        }
        assert!(control.sink().take().is_empty());
    }

    #[test]
    fn report_carries_the_regions_of_the_tracked_frame() {
        let mut control = control();
        control.handle_event(ControlEvent::CalibrateAtCenter, &frame_with_blob(160, 120));

        let frame = frame_with_blob(260, 120);
        let expected = crate::core_modules::detector::segment(
            &frame,
            &control.active_range().unwrap(),
            control.config().sample_half_width,
        );
        match control.tick(&frame) {
            TickReport::Tracking {
                object: Some(object),
                segmentation: Some(segmentation),
                ..
            } => {
                assert_eq!(segmentation, expected);
                assert_eq!(segmentation.contours.len(), 1);
                assert!(segmentation.mask.get(260, 120));
                assert!(!segmentation.mask.get(160, 120));
                assert_eq!(object.area, segmentation.contours[0].area());
            }
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn detecting_without_a_range_has_no_segmentation() {
        let mut control = control();
        control.handle_event(ControlEvent::ToggleDetecting, &frame_with_blob(160, 120));
        assert_eq!(
            control.tick(&frame_with_blob(160, 120)),
            TickReport::Tracking {
                object: None,
                zone: SteeringZone::None,
                command: None,
                segmentation: None,
            }
        );
    }

    #[test]
    fn paused_loop_skips_tracking_but_handles_events() {
        let mut control = control();
        let frame = frame_with_blob(160, 120);
        control.handle_event(ControlEvent::ToggleAutomatic, &frame);
        let events = control.events();
        events.send(ControlEvent::TogglePause).unwrap();
        events.send(ControlEvent::CalibrateAtCenter).unwrap();

        assert_eq!(control.tick(&frame), TickReport::Paused);
        assert!(control.active_range().is_some());
        assert!(control.sink().take().is_empty());

        events.send(ControlEvent::TogglePause).unwrap();
        assert!(matches!(control.tick(&frame), TickReport::Tracking { .. }));
    }

    #[test]
    fn rejected_calibration_keeps_previous_range() {
        let mut control = control();
        control.handle_event(ControlEvent::CalibrateAtCenter, &frame_with_blob(160, 120));
        let before = control.active_range();

        // Too small to hold the sample square.
        let tiny = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        control.handle_event(ControlEvent::CalibrateAtCenter, &tiny);
        assert_eq!(control.active_range(), before);
    }

    #[test]
    fn threshold_setters_clamp_to_the_frame() {
        let mut control = control();
        let frame = frame_with_blob(160, 120);
        control.handle_event(ControlEvent::SetLeftThreshold(-30), &frame);
        control.handle_event(ControlEvent::SetRightThreshold(9000), &frame);
        assert_eq!(control.state().left_range, 0);
        assert_eq!(control.state().right_range, 320);
    }

    #[test]
    fn manual_moves_and_speed_are_sent_in_any_mode() {
        let mut control = control();
        let frame = frame_with_blob(160, 120);
        control.handle_event(ControlEvent::SetDuration(75), &frame);
        control.handle_event(ControlEvent::ManualMove(Direction::Backward), &frame);
        control.handle_event(ControlEvent::SetSpeed(5000), &frame);

        assert_eq!(
            control.sink().take(),
            vec![
                ActuatorCommand::manual(Direction::Backward, 75),
                ActuatorCommand::speed(MAX_MOTOR_SPEED, 20),
            ]
        );
        assert_eq!(control.state().motor_speed, MAX_MOTOR_SPEED);
    }

    #[test]
    fn detecting_can_be_toggled_off() {
        let mut control = control();
        let frame = frame_with_blob(160, 120);
        control.handle_event(ControlEvent::CalibrateAtCenter, &frame);
        control.handle_event(ControlEvent::ToggleDetecting, &frame);
        assert_eq!(control.tick(&frame), TickReport::Idle);
    }
}
