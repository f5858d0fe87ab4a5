pub mod actuator;
pub mod calibrator;
pub mod contour;
pub mod detector;
pub mod dispatcher;
pub mod hsv;
pub mod mask;
pub mod min_area_rect;
pub mod steering;
