//! Linux X11 support module
//!
//! Provides the X11 session, window and monitor enumeration, and window
//! capture for Linux X11 environments.

pub mod capture;
pub mod display;
pub mod session;
pub mod window;

// Re-export commonly used types
pub use capture::{CaptureMode, CaptureTarget, X11Capturer};
pub use display::list_monitors;
pub use session::X11Session;
pub use window::{
    list_client_windows, map_state_name, visual_class_name, window_details, window_tree,
    windows_by_pid,
};
