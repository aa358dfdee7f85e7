//! Frame sources and the ways a capture can fail

use crate::frame::{FrameBuffer, FrameFileError};
use thiserror::Error;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::Window;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("window 0x{0:x} is not viewable")]
    NotViewable(Window),

    #[error("window 0x{0:x} lies outside the screen")]
    OffScreen(Window),

    #[error("failed to get attributes of window 0x{window:x}")]
    Attributes {
        window: Window,
        #[source]
        source: ReplyError,
    },

    #[error("failed to get geometry of window 0x{window:x}")]
    Geometry {
        window: Window,
        #[source]
        source: ReplyError,
    },

    #[error("failed to translate coordinates of window 0x{window:x}")]
    Translate {
        window: Window,
        #[source]
        source: ReplyError,
    },

    #[error("failed to fetch the image of window 0x{window:x}")]
    Image {
        window: Window,
        #[source]
        source: ReplyError,
    },

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("X11 connection error")]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Frame(#[from] FrameFileError),
}

/// Anything that can hand out one frame at a time
pub trait FrameSource {
    /// Grab the next frame; an error means no buffer was produced
    fn capture_frame(&mut self) -> Result<FrameBuffer, CaptureError>;
}
