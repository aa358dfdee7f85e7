//! Linux X11 screen capture using GetImage (ZPixmap)

use crate::capture::{CaptureError, FrameSource};
use crate::frame::{FrameBuffer, BYTES_PER_PIXEL};
use crate::linux::display::MonitorInfo;
use crate::linux::session::X11Session;
use x11rb::protocol::xproto::{ConnectionExt, ImageFormat, MapState, Window};

/// Channel masks of the only pixel layout frames are stored in
const RED_MASK: u32 = 0x00ff_0000;
const GREEN_MASK: u32 = 0x0000_ff00;
const BLUE_MASK: u32 = 0x0000_00ff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// The whole root window
    Root,
    /// One window, located anew on every frame
    Window(Window),
    /// A fixed rectangle of the root window
    Region {
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    },
}

impl CaptureTarget {
    pub fn monitor(monitor: &MonitorInfo) -> Self {
        Self::Region {
            x: monitor.x,
            y: monitor.y,
            width: monitor.width,
            height: monitor.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Grab the window's on-screen area from the root window
    #[default]
    Screen,
    /// Grab the window's own contents
    Direct,
}

pub struct X11Capturer<'a> {
    session: &'a X11Session,
    target: CaptureTarget,
    mode: CaptureMode,
}

impl<'a> X11Capturer<'a> {
    pub fn new(session: &'a X11Session, target: CaptureTarget, mode: CaptureMode) -> Self {
        Self {
            session,
            target,
            mode,
        }
    }

    fn capture_window(&self, window: Window) -> Result<FrameBuffer, CaptureError> {
        let conn = self.session.conn();

        let attrs = conn
            .get_window_attributes(window)?
            .reply()
            .map_err(|source| CaptureError::Attributes { window, source })?;
        if attrs.map_state != MapState::VIEWABLE {
            return Err(CaptureError::NotViewable(window));
        }

        let geom = conn
            .get_geometry(window)?
            .reply()
            .map_err(|source| CaptureError::Geometry { window, source })?;

        match self.mode {
            CaptureMode::Direct => self.fetch(window, 0, 0, geom.width, geom.height),
            CaptureMode::Screen => {
                let root = self.session.root();
                let origin = conn
                    .translate_coordinates(window, root, 0, 0)?
                    .reply()
                    .map_err(|source| CaptureError::Translate { window, source })?;

                let (x, y, width, height) =
                    self.clip_to_screen(origin.dst_x, origin.dst_y, geom.width, geom.height)
                        .ok_or(CaptureError::OffScreen(window))?;
                self.fetch(root, x, y, width, height)
            }
        }
    }

    /// Clip a rectangle to the root window; GetImage on the root fails otherwise
    fn clip_to_screen(&self, x: i16, y: i16, width: u16, height: u16) -> Option<(i16, i16, u16, u16)> {
        let screen = self.session.screen();
        let left = i32::from(x).max(0);
        let top = i32::from(y).max(0);
        let right = (i32::from(x) + i32::from(width)).min(i32::from(screen.width_in_pixels));
        let bottom = (i32::from(y) + i32::from(height)).min(i32::from(screen.height_in_pixels));

        if right <= left || bottom <= top {
            return None;
        }
        Some((
            left as i16,
            top as i16,
            (right - left) as u16,
            (bottom - top) as u16,
        ))
    }

    fn fetch(
        &self,
        drawable: Window,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
    ) -> Result<FrameBuffer, CaptureError> {
        let reply = self
            .session
            .conn()
            .get_image(ImageFormat::Z_PIXMAP, drawable, x, y, width, height, u32::MAX)?
            .reply()
            .map_err(|source| CaptureError::Image {
                window: drawable,
                source,
            })?;

        let bits_per_pixel = self.session.bits_per_pixel(reply.depth).unwrap_or(0);
        if usize::from(bits_per_pixel) != BYTES_PER_PIXEL * 8 {
            return Err(CaptureError::UnsupportedFormat(format!(
                "depth {} uses {} bits per pixel",
                reply.depth, bits_per_pixel
            )));
        }
        if !self.session.is_lsb_first() {
            return Err(CaptureError::UnsupportedFormat(
                "server sends images most significant byte first".to_string(),
            ));
        }
        if let Some(visual) = self.session.visual(reply.visual) {
            if (visual.red_mask, visual.green_mask, visual.blue_mask)
                != (RED_MASK, GREEN_MASK, BLUE_MASK)
            {
                return Err(CaptureError::UnsupportedFormat(format!(
                    "channel masks {:#x}/{:#x}/{:#x}",
                    visual.red_mask, visual.green_mask, visual.blue_mask
                )));
            }
        }

        let stride = if height > 0 {
            reply.data.len() / usize::from(height)
        } else {
            usize::from(width) * BYTES_PER_PIXEL
        };

        Ok(FrameBuffer::new(
            u32::from(width),
            u32::from(height),
            stride as u32,
            reply.data,
        )?)
    }
}

impl FrameSource for X11Capturer<'_> {
    fn capture_frame(&mut self) -> Result<FrameBuffer, CaptureError> {
        match self.target {
            CaptureTarget::Root => {
                let screen = self.session.screen();
                self.fetch(
                    screen.root,
                    0,
                    0,
                    screen.width_in_pixels,
                    screen.height_in_pixels,
                )
            }
            CaptureTarget::Window(window) => self.capture_window(window),
            CaptureTarget::Region {
                x,
                y,
                width,
                height,
            } => self.fetch(self.session.root(), x, y, width, height),
        }
    }
}
