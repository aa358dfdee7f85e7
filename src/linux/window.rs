//! Linux X11 window enumeration using EWMH

use crate::linux::session::X11Session;
use anyhow::{Context, Result};
use serde::Serialize;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt, MapState, VisualClass, Window};

/// Pid reported for windows without `_NET_WM_PID`
pub const UNKNOWN_PID: i32 = -1;

/// Longest title fetched, in 32-bit units
const TITLE_LENGTH: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowInfo {
    pub window: Window,
    pub pid: i32,
    pub title: String,
}

/// Properties a window title can come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSource {
    /// `_NET_WM_VISIBLE_NAME` (UTF-8)
    VisibleName,
    /// `_NET_WM_NAME` (UTF-8)
    NetWmName,
    /// `WM_NAME` (any encoding)
    WmName,
}

impl TitleSource {
    pub const FALLBACK_ORDER: [TitleSource; 3] = [
        TitleSource::VisibleName,
        TitleSource::NetWmName,
        TitleSource::WmName,
    ];
}

/// Property lookups the enumerator needs
///
/// Lookups never fail: an unset property or a failed request is `None`.
pub trait WindowProperties {
    /// Windows listed in `_NET_CLIENT_LIST` on the root
    fn client_list(&self) -> Vec<Window>;

    fn title(&self, window: Window, source: TitleSource) -> Option<String>;

    fn pid(&self, window: Window) -> Option<i32>;
}

/// Title from the first non-empty source, or an empty string
pub fn window_title<P: WindowProperties + ?Sized>(props: &P, window: Window) -> String {
    TitleSource::FALLBACK_ORDER
        .iter()
        .find_map(|source| props.title(window, *source).filter(|t| !t.is_empty()))
        .unwrap_or_default()
}

/// Snapshot of every client window with its title and pid
pub fn list_client_windows<P: WindowProperties + ?Sized>(props: &P) -> Vec<WindowInfo> {
    props
        .client_list()
        .into_iter()
        .map(|window| WindowInfo {
            window,
            pid: props.pid(window).unwrap_or(UNKNOWN_PID),
            title: window_title(props, window),
        })
        .collect()
}

/// Client windows owned by `pid`
pub fn windows_by_pid<P: WindowProperties + ?Sized>(props: &P, pid: i32) -> Vec<WindowInfo> {
    list_client_windows(props)
        .into_iter()
        .filter(|info| info.pid == pid)
        .collect()
}

/// Decode a text property the way Xlib hands it out: up to the first NUL
fn decode_text(value: &[u8]) -> String {
    let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
    String::from_utf8_lossy(&value[..end]).into_owned()
}

impl WindowProperties for X11Session {
    fn client_list(&self) -> Vec<Window> {
        let atoms = self.atoms();
        match self.get_property(
            self.root(),
            atoms.net_client_list,
            AtomEnum::WINDOW.into(),
            u32::MAX,
        ) {
            Ok(Some(reply)) => reply
                .value32()
                .map(|iter| iter.collect())
                .unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::debug!("_NET_CLIENT_LIST unavailable: {:#}", e);
                Vec::new()
            }
        }
    }

    fn title(&self, window: Window, source: TitleSource) -> Option<String> {
        let atoms = self.atoms();
        let (property, prop_type) = match source {
            TitleSource::VisibleName => (atoms.net_wm_visible_name, atoms.utf8_string),
            TitleSource::NetWmName => (atoms.net_wm_name, atoms.utf8_string),
            TitleSource::WmName => (AtomEnum::WM_NAME.into(), AtomEnum::ANY.into()),
        };

        match self.get_property(window, property, prop_type, TITLE_LENGTH) {
            Ok(reply) => reply.map(|reply| decode_text(&reply.value)),
            Err(e) => {
                log::debug!("no {:?} for window 0x{:x}: {:#}", source, window, e);
                None
            }
        }
    }

    fn pid(&self, window: Window) -> Option<i32> {
        match self.get_property(window, self.atoms().net_wm_pid, AtomEnum::CARDINAL.into(), 1) {
            Ok(reply) => reply
                .and_then(|reply| reply.value32().and_then(|mut values| values.next()))
                .map(|pid| pid as i32),
            Err(e) => {
                log::debug!("no _NET_WM_PID for window 0x{:x}: {:#}", window, e);
                None
            }
        }
    }
}

/// A named child of the root window
pub struct TreeEntry {
    pub window: Window,
    pub name: String,
    pub pid: Option<i32>,
}

pub struct WindowTree {
    /// Name of the root's parent, when the root has one
    pub parent_name: Option<String>,
    pub entries: Vec<TreeEntry>,
}

/// Walk the direct children of the root window, keeping those with a name
pub fn window_tree(session: &X11Session) -> Result<WindowTree> {
    let tree = session
        .conn()
        .query_tree(session.root())
        .context("Failed to query the window tree")?
        .reply()
        .context("Failed to query the window tree")?;

    let parent_name = if tree.parent != x11rb::NONE {
        session
            .title(tree.parent, TitleSource::WmName)
            .filter(|name| !name.is_empty())
    } else {
        None
    };

    let entries = tree
        .children
        .iter()
        .filter_map(|&window| {
            let name = session
                .title(window, TitleSource::WmName)
                .filter(|name| !name.is_empty())?;
            Some(TreeEntry {
                window,
                name,
                pid: session.pid(window),
            })
        })
        .collect();

    Ok(WindowTree {
        parent_name,
        entries,
    })
}

pub struct WindowDetails {
    pub window: Window,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border_width: u16,
    pub depth: u8,
    pub map_state: MapState,
    pub visual_class: Option<VisualClass>,
}

pub fn window_details(session: &X11Session, window: Window) -> Result<WindowDetails> {
    let conn = session.conn();
    let attrs = conn
        .get_window_attributes(window)
        .context("Failed to get window attributes")?
        .reply()
        .with_context(|| format!("Failed to get attributes of window 0x{:x}", window))?;
    let geom = conn
        .get_geometry(window)
        .context("Failed to get window geometry")?
        .reply()
        .with_context(|| format!("Failed to get geometry of window 0x{:x}", window))?;

    Ok(WindowDetails {
        window,
        x: geom.x,
        y: geom.y,
        width: geom.width,
        height: geom.height,
        border_width: geom.border_width,
        depth: geom.depth,
        map_state: attrs.map_state,
        visual_class: session.visual(attrs.visual).map(|visual| visual.class),
    })
}

pub fn map_state_name(state: MapState) -> &'static str {
    match state {
        MapState::UNMAPPED => "Unmapped",
        MapState::UNVIEWABLE => "Unviewable",
        MapState::VIEWABLE => "Viewable",
        _ => "Unknown",
    }
}

pub fn visual_class_name(class: VisualClass) -> &'static str {
    match class {
        VisualClass::STATIC_GRAY => "StaticGray",
        VisualClass::GRAY_SCALE => "GrayScale",
        VisualClass::STATIC_COLOR => "StaticColor",
        VisualClass::PSEUDO_COLOR => "PseudoColor",
        VisualClass::TRUE_COLOR => "TrueColor",
        VisualClass::DIRECT_COLOR => "DirectColor",
        _ => "Unknown",
    }
}
