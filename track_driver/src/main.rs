use anyhow::{Context, Result, bail};
use chroma_pilot::control_loop::MAX_MOTOR_SPEED;
use chroma_pilot::{
    CommandDispatcher, ControlConfig, ControlEvent, ControlLoop, DetectedObject, Direction,
    HttpActuator, SteeringZone, TickReport,
};
use clap::Parser;
use image::RgbImage;
use opencv::{
    core::{self, Mat, Point, Rect, Scalar, Vector},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WINDOW: &str = "Color tracking car";
const MASK_WINDOW: &str = "mask";

// BGR, as OpenCV draws.
const LIGHT_BLUE: (f64, f64, f64) = (243.0, 168.0, 3.0);
const RED: (f64, f64, f64) = (54.0, 66.0, 243.0);
const YELLOW: (f64, f64, f64) = (59.0, 234.0, 254.0);
const GREEN: (f64, f64, f64) = (79.0, 174.0, 75.0);
const MAGENTA: (f64, f64, f64) = (255.0, 0.0, 255.0);

#[derive(Parser)]
#[command(name = "track_driver")]
#[command(
    version,
    about = "Steers an RC car towards a calibrated colour",
    long_about = None
)]
struct Cli {
    /// Camera stream (or video file) to read frames from
    #[arg(
        long,
        value_name = "URL",
        default_value = "http://192.168.1.30:8080/video"
    )]
    video: String,

    /// Base URL of the car's HTTP firmware
    #[arg(long, value_name = "URL", default_value = "http://192.168.1.46/")]
    car: String,

    /// Half-width of the calibration square, in pixels
    #[arg(long, value_name = "PX", default_value_t = 10)]
    sample_half_width: u32,

    /// Hold-duration of steering and manual commands
    #[arg(long, value_name = "MS", default_value_t = 40)]
    step: u32,

    /// Initial motor speed (0..=1023)
    #[arg(long, value_name = "N", default_value_t = 1000)]
    speed: u16,

    /// Per-request timeout towards the car
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    timeout: u64,
}

impl Cli {
    fn into_config(self) -> ControlConfig {
        ControlConfig {
            actuator_url: self.car,
            video_url: self.video,
            sample_half_width: self.sample_half_width,
            step_duration_ms: self.step,
            motor_speed: self.speed,
            request_timeout: Duration::from_millis(self.timeout),
            ..ControlConfig::default()
        }
    }
}

fn main() -> Result<()> {
    // --- 1. Logging & Arguments ---
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let config = Cli::parse().into_config();

    // --- 2. Command Dispatch ---
    // The sender task lives on this runtime; the frame loop below stays synchronous.
    let runtime = Runtime::new().context("starting the dispatch runtime")?;
    let actuator = HttpActuator::new(&config.actuator_url, config.request_timeout)?;
    let dispatcher = CommandDispatcher::spawn(actuator, config.dispatch(), runtime.handle());

    // --- 3. Video Input ---
    let mut cap = VideoCapture::from_file(&config.video_url, videoio::CAP_ANY)?;
    if !cap.is_opened()? {
        bail!("could not open video source {}", config.video_url);
    }
    let mut bgr = Mat::default();
    if !cap.read(&mut bgr)? || bgr.empty() {
        bail!("video source {} produced no frames", config.video_url);
    }
    let frame_width = bgr.cols() as u32;
    let frame_height = bgr.rows() as u32;
    let fps = cap.get(videoio::CAP_PROP_FPS)?;

    // --- 4. Control Loop & UI ---
    let paused_cadence = config.paused_cadence;
    let mut control = ControlLoop::new(config, frame_width, frame_height, dispatcher);
    highgui::named_window(WINDOW, highgui::WINDOW_AUTOSIZE)?;
    install_trackbars(&control)?;
    let events = control.events();

    let mut frame = to_rgb_image(&bgr)?;
    let mut display = bgr.clone();

    // --- 5. Main Loop ---
    loop {
        let paused = control.state().modes.paused;
        if !paused {
            match cap.read(&mut bgr) {
                Ok(true) if !bgr.empty() => frame = to_rgb_image(&bgr)?,
                Ok(_) => {
                    info!("video source ended");
                    break;
                }
                Err(error) => {
                    warn!(%error, "frame read failed");
                    break;
                }
            }
        }

        let report = control.tick(&frame);

        if !matches!(report, TickReport::Paused) {
            display = bgr.clone();
            draw_hud(&mut display, &control, &report, fps)?;
        }
        highgui::imshow(WINDOW, &display)?;

        let key = highgui::wait_key(1)?;
        if key >= 0 {
            match (key & 0xFF) as u8 as char {
                'q' => break,
                ' ' => events.send(ControlEvent::CalibrateAtCenter)?,
                'z' => events.send(ControlEvent::ToggleAutomatic)?,
                'x' => events.send(ControlEvent::ToggleDetecting)?,
                'p' => events.send(ControlEvent::TogglePause)?,
                'w' => events.send(ControlEvent::ManualMove(Direction::Forward))?,
                'a' => events.send(ControlEvent::ManualMove(Direction::Left))?,
                's' => events.send(ControlEvent::ManualMove(Direction::Backward))?,
                'd' => events.send(ControlEvent::ManualMove(Direction::Right))?,
                _ => {}
            }
        }

        if paused {
            std::thread::sleep(paused_cadence);
        }
    }

    highgui::destroy_all_windows()?;
    Ok(())
}

/// Sliders for the thresholds, the motor speed and the step duration. Each one
/// feeds the loop through its event channel.
fn install_trackbars(control: &ControlLoop<CommandDispatcher>) -> Result<()> {
    let state = control.state();
    let width = state.frame_width as i32;
    let (left, right) = (state.left_range, state.right_range);
    let (speed, max_speed) = (state.motor_speed as i32, MAX_MOTOR_SPEED as i32);
    let step = state.step_duration_ms as i32;

    let sliders: [(&str, i32, i32, fn(i32) -> ControlEvent); 4] = [
        ("Left", left, width, ControlEvent::SetLeftThreshold),
        ("Right", right, width, ControlEvent::SetRightThreshold),
        ("Speed", speed, max_speed, ControlEvent::SetSpeed),
        ("Duration", step, step * 5, duration_event),
    ];

    for (name, initial, max, to_event) in sliders {
        let events = control.events();
        highgui::create_trackbar(
            name,
            WINDOW,
            None,
            max,
            Some(Box::new(move |pos| {
                let _ = events.send(to_event(pos));
            })),
        )?;
        highgui::set_trackbar_pos(name, WINDOW, initial)?;
    }
    Ok(())
}

fn duration_event(ms: i32) -> ControlEvent {
    ControlEvent::SetDuration(ms.max(0) as u32)
}

fn to_rgb_image(bgr: &Mat) -> Result<RgbImage> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    RgbImage::from_raw(width, height, rgb.data_bytes()?.to_vec())
        .context("frame buffer does not match its dimensions")
}

fn scalar((b, g, r): (f64, f64, f64)) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

fn draw_hud(
    display: &mut Mat,
    control: &ControlLoop<CommandDispatcher>,
    report: &TickReport,
    fps: f64,
) -> Result<()> {
    let state = control.state();
    let (w, h) = (state.frame_width as i32, state.frame_height as i32);
    let center = Point::new(w / 2, h / 2);

    // --- Mask & Contours ---
    if let TickReport::Tracking {
        segmentation: Some(segmentation),
        ..
    } = report
    {
        let gray = segmentation.mask.to_image();
        let mut mask = Mat::new_rows_cols_with_default(h, w, core::CV_8UC1, Scalar::all(0.0))?;
        mask.data_bytes_mut()?.copy_from_slice(gray.as_raw());
        highgui::imshow(MASK_WINDOW, &mask)?;

        let outlines: Vector<Vector<Point>> = segmentation
            .contours
            .iter()
            .map(|c| c.points.iter().map(|&(x, y)| Point::new(x, y)).collect())
            .collect();
        let green = scalar(GREEN);
        imgproc::polylines(display, &outlines, true, green, 2, imgproc::LINE_AA, 0)?;
    }

    // --- Zone ---
    let (mut left_color, mut right_color) = (LIGHT_BLUE, LIGHT_BLUE);
    if let TickReport::Tracking {
        object: Some(object),
        zone,
        ..
    } = report
    {
        draw_object(display, object, center)?;
        let banner = match zone {
            SteeringZone::Right => {
                left_color = RED;
                Some("Turn left!")
            }
            SteeringZone::Left => {
                right_color = RED;
                Some("Turn right!")
            }
            SteeringZone::Straight => {
                (left_color, right_color) = (YELLOW, YELLOW);
                Some("Continue straight!")
            }
            SteeringZone::None => None,
        };
        if let Some(banner) = banner {
            imgproc::put_text(
                display,
                banner,
                Point::new(20, h / 2 - 100),
                imgproc::FONT_HERSHEY_DUPLEX,
                1.5,
                scalar(MAGENTA),
                2,
                imgproc::LINE_AA,
                false,
            )?;
        }
    }
    let half = control.config().sample_half_width as i32;
    draw_triangle(display, state.left_range, h / 2, half, left_color)?;
    draw_triangle(display, state.right_range, h / 2, half, right_color)?;

    // --- Reticle ---
    let blue = scalar(LIGHT_BLUE);
    let horizon = [Point::new(0, h / 2), Point::new(w, h / 2)];
    let vertical = [Point::new(w / 2, 0), Point::new(w / 2, h)];
    for [a, b] in [horizon, vertical] {
        imgproc::line(display, a, b, blue, 1, imgproc::LINE_AA, 0)?;
    }
    imgproc::rectangle(
        display,
        Rect::new(w / 2 - half, h / 2 - half, 2 * half, 2 * half),
        blue,
        1,
        imgproc::LINE_AA,
        0,
    )?;

    // --- Info ---
    let modes = state.modes;
    let mode = if modes.automatic {
        "Automatic"
    } else {
        "Manual"
    };
    let detection = if modes.detecting {
        "Detecting"
    } else {
        "Not detecting"
    };
    let info = format!(
        "{}x{} {:.0}FPS - {} - {} - Step: {} ms - Speed: {}",
        w,
        h,
        fps,
        mode,
        detection,
        state.step_duration_ms,
        state.motor_speed,
    );
    imgproc::put_text(
        display,
        &info,
        Point::new(20, 20),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        blue,
        1,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}

/// The rotated box around the object and a line from the frame centre to it.
fn draw_object(display: &mut Mat, object: &DetectedObject, center: Point) -> Result<()> {
    let corners: Vector<Point> = object
        .rect
        .corners()
        .iter()
        .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32))
        .collect();
    let outline: Vector<Vector<Point>> = std::iter::once(corners).collect();
    let red = scalar(RED);
    imgproc::polylines(display, &outline, true, red, 1, imgproc::LINE_AA, 0)?;

    let target = Point::new(object.centroid_x(), object.centroid_y());
    imgproc::line(display, center, target, red, 1, imgproc::LINE_AA, 0)?;
    Ok(())
}

/// An outlined triangle sitting on the horizon line at a threshold.
fn draw_triangle(
    display: &mut Mat,
    x: i32,
    y: i32,
    size: i32,
    color: (f64, f64, f64),
) -> Result<()> {
    let color = scalar(color);
    let apex = Point::new(x, y - size);
    let left = Point::new(x - size, y);
    let right = Point::new(x + size, y);
    for (a, b) in [(left, right), (apex, right), (left, apex)] {
        imgproc::line(display, a, b, color, 1, imgproc::LINE_AA, 0)?;
    }
    Ok(())
}
