//! Linux X11 monitor enumeration using RandR extension

use crate::linux::session::X11Session;
use anyhow::{Context, Result};
use x11rb::protocol::randr::{self, ConnectionExt as RandrExt};

pub struct MonitorInfo {
    pub index: usize,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub is_primary: bool,
}

pub fn list_monitors(session: &X11Session) -> Result<Vec<MonitorInfo>> {
    let conn = session.conn();
    let screen = session.screen();
    let root = session.root();

    // Query RandR extension
    let resources = conn
        .randr_get_screen_resources(root)
        .context("Failed to query RandR screen resources")?
        .reply()
        .context("Failed to get RandR screen resources reply")?;

    let primary = conn
        .randr_get_output_primary(root)
        .context("Failed to query RandR primary output")?
        .reply()
        .map(|reply| reply.output)
        .unwrap_or(x11rb::NONE);

    let mut monitors = Vec::new();

    // Iterate through CRTCs to find active monitors
    for crtc in &resources.crtcs {
        let crtc_info = conn
            .randr_get_crtc_info(*crtc, resources.config_timestamp)
            .context("Failed to query CRTC info")?
            .reply()
            .context("Failed to get CRTC info reply")?;

        // Skip disabled CRTCs (no outputs connected or zero size)
        if crtc_info.outputs.is_empty() || crtc_info.width == 0 || crtc_info.height == 0 {
            continue;
        }

        let has_connected_output = crtc_info.outputs.iter().any(|output| {
            conn.randr_get_output_info(*output, resources.config_timestamp)
                .map_err(x11rb::errors::ReplyError::from)
                .and_then(|cookie| cookie.reply())
                .map(|info| info.connection == randr::Connection::CONNECTED)
                .unwrap_or(false)
        });

        if !has_connected_output {
            continue;
        }

        monitors.push(MonitorInfo {
            index: monitors.len(),
            x: crtc_info.x,
            y: crtc_info.y,
            width: crtc_info.width,
            height: crtc_info.height,
            is_primary: crtc_info.outputs.contains(&primary),
        });
    }

    // If no CRTCs found, fall back to screen dimensions
    if monitors.is_empty() {
        monitors.push(MonitorInfo {
            index: 0,
            x: 0,
            y: 0,
            width: screen.width_in_pixels,
            height: screen.height_in_pixels,
            is_primary: true,
        });
    }

    Ok(monitors)
}
