//! Scoped X11 connection used for one run
//!
//! The connection is opened once and closed when the session is dropped,
//! on every exit path.

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, ConnectionExt, GetPropertyReply, ImageOrder, Screen, Visualid, Visualtype, Window,
};
use x11rb::rust_connection::RustConnection;

/// Atoms interned once per session
pub struct Atoms {
    pub net_client_list: Atom,
    pub net_wm_pid: Atom,
    pub net_wm_name: Atom,
    pub net_wm_visible_name: Atom,
    pub utf8_string: Atom,
}

/// Get or intern an atom
fn get_atom(conn: &RustConnection, name: &str) -> Result<Atom> {
    let reply = conn
        .intern_atom(false, name.as_bytes())
        .with_context(|| format!("Failed to intern atom {}", name))?
        .reply()
        .with_context(|| format!("Failed to get atom reply for {}", name))?;
    Ok(reply.atom)
}

/// One X11 connection; the socket closes when the session is dropped
pub struct X11Session {
    conn: RustConnection,
    screen_num: usize,
    atoms: Atoms,
}

impl X11Session {
    /// Connect to the display named by `$DISPLAY`
    pub fn open() -> Result<Self> {
        let (conn, screen_num) =
            RustConnection::connect(None).context("Failed to connect to X11 display")?;

        let atoms = Atoms {
            net_client_list: get_atom(&conn, "_NET_CLIENT_LIST")?,
            net_wm_pid: get_atom(&conn, "_NET_WM_PID")?,
            net_wm_name: get_atom(&conn, "_NET_WM_NAME")?,
            net_wm_visible_name: get_atom(&conn, "_NET_WM_VISIBLE_NAME")?,
            utf8_string: get_atom(&conn, "UTF8_STRING")?,
        };

        log::debug!("connected to X11 screen {}", screen_num);

        Ok(Self {
            conn,
            screen_num,
            atoms,
        })
    }

    pub fn conn(&self) -> &RustConnection {
        &self.conn
    }

    pub fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }

    pub fn root(&self) -> Window {
        self.screen().root
    }

    pub fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    /// Bits per pixel the server uses for images of `depth`
    pub fn bits_per_pixel(&self, depth: u8) -> Option<u8> {
        self.conn
            .setup()
            .pixmap_formats
            .iter()
            .find(|format| format.depth == depth)
            .map(|format| format.bits_per_pixel)
    }

    /// Whether image data arrives least significant byte first
    pub fn is_lsb_first(&self) -> bool {
        self.conn.setup().image_byte_order == ImageOrder::LSB_FIRST
    }

    pub fn visual(&self, id: Visualid) -> Option<&Visualtype> {
        self.screen()
            .allowed_depths
            .iter()
            .flat_map(|depth| depth.visuals.iter())
            .find(|visual| visual.visual_id == id)
    }

    /// Fetch a property; `None` when it is unset or empty
    pub fn get_property(
        &self,
        window: Window,
        property: Atom,
        prop_type: Atom,
        long_length: u32,
    ) -> Result<Option<GetPropertyReply>> {
        let reply = self
            .conn
            .get_property(false, window, property, prop_type, 0, long_length)
            .context("Failed to get property")?
            .reply()
            .context("Failed to get property reply")?;

        if reply.value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(reply))
        }
    }
}
