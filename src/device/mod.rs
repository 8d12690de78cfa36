//! Device classification and the desktop/mobile route tree switch.
//!
//! Every desktop path has a mobile twin under [`MOBILE_PREFIX`]. The router watches the
//! viewport, debounces reclassification and reports the path to replace the current
//! one with whenever the active tree does not match the device.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

pub const MOBILE_PREFIX: &str = "/mobile";
const DASHBOARD_PREFIX: &str = "/dashboard/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Desktop => "desktop",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Widths below this are mobile.
    pub mobile_breakpoint: u32,
    /// Widths below this (and at least `mobile_breakpoint`) are tablet.
    pub tablet_breakpoint: u32,
    pub debounce_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mobile_breakpoint: 640,
            tablet_breakpoint: 1024,
            debounce_ms: 100,
        }
    }
}

impl DeviceConfig {
    pub fn classify(&self, width: u32) -> DeviceClass {
        if width < self.mobile_breakpoint {
            DeviceClass::Mobile
        } else if width < self.tablet_breakpoint {
            DeviceClass::Tablet
        } else {
            DeviceClass::Desktop
        }
    }

    pub fn profile(&self, viewport: Viewport) -> DeviceProfile {
        DeviceProfile {
            class: self.classify(viewport.width),
            touch: viewport.touch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub touch: bool,
}

impl Viewport {
    pub fn new(width: u32, touch: bool) -> Self {
        Self { width, touch }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub class: DeviceClass,
    pub touch: bool,
}

impl DeviceProfile {
    pub fn should_show_mobile_site(&self) -> bool {
        match self.class {
            DeviceClass::Mobile => true,
            DeviceClass::Tablet => self.touch,
            DeviceClass::Desktop => false,
        }
    }

    pub fn should_use_desktop_layout(&self) -> bool {
        match self.class {
            DeviceClass::Desktop => true,
            DeviceClass::Tablet => !self.touch,
            DeviceClass::Mobile => false,
        }
    }

    /// Path to replace `path` with, or `None` when `path` already sits in the right tree.
    pub fn redirect_target(&self, path: &str) -> Option<String> {
        let on_mobile = is_mobile_path(path);
        if self.should_show_mobile_site() && !on_mobile {
            Some(to_mobile_path(path))
        } else if self.should_use_desktop_layout() && on_mobile {
            Some(to_desktop_path(path))
        } else {
            None
        }
    }

    /// Translates a desktop path into the tree this device renders.
    pub fn localize(&self, desktop_path: &str) -> String {
        if self.should_show_mobile_site() {
            to_mobile_path(desktop_path)
        } else {
            desktop_path.to_string()
        }
    }
}

/// Coarse server-side hint for requests that carry no viewport width.
pub fn profile_from_user_agent(user_agent: &str) -> DeviceProfile {
    let ua = user_agent.to_lowercase();

    let class = if ua.contains("ipad")
        || ua.contains("tablet")
        || (ua.contains("android") && !ua.contains("mobile"))
    {
        DeviceClass::Tablet
    } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    };

    DeviceProfile {
        class,
        touch: class != DeviceClass::Desktop,
    }
}

fn split_query(path: &str) -> (&str, &str) {
    match path.find(['?', '#']) {
        Some(idx) => path.split_at(idx),
        None => (path, ""),
    }
}

pub fn is_mobile_path(path: &str) -> bool {
    let (path, _) = split_query(path);
    path == MOBILE_PREFIX
        || path
            .strip_prefix(MOBILE_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub fn to_mobile_path(path: &str) -> String {
    let (path, query) = split_query(path);
    if is_mobile_path(path) {
        return format!("{path}{query}");
    }

    let rewritten = match path {
        "" | "/" => MOBILE_PREFIX.to_string(),
        _ => match path.strip_prefix(DASHBOARD_PREFIX) {
            Some(rest) => {
                let variant = rest.split('/').next().unwrap_or_default();
                format!("{MOBILE_PREFIX}{DASHBOARD_PREFIX}{variant}")
            }
            None => format!("{MOBILE_PREFIX}{path}"),
        },
    };
    format!("{rewritten}{query}")
}

pub fn to_desktop_path(path: &str) -> String {
    let (path, query) = split_query(path);
    if !is_mobile_path(path) {
        return format!("{path}{query}");
    }

    let rest = &path[MOBILE_PREFIX.len()..];
    let rewritten = match rest {
        "" | "/" => "/".to_string(),
        _ => match rest.strip_prefix(DASHBOARD_PREFIX) {
            Some(tail) => {
                let variant = tail.split('/').next().unwrap_or_default();
                format!("{DASHBOARD_PREFIX}{variant}")
            }
            None => rest.to_string(),
        },
    };
    format!("{rewritten}{query}")
}

/// Tracks the live viewport and emits tree-switch redirects.
///
/// Resize events are debounced: the newest viewport is applied once no further resize
/// arrives for `debounce_ms`. Callers feed time explicitly so the router stays
/// deterministic.
#[derive(Debug)]
pub struct DeviceRouter {
    config: DeviceConfig,
    profile: DeviceProfile,
    pending: Option<(Viewport, Instant)>,
}

impl DeviceRouter {
    pub fn new(config: DeviceConfig, initial: Viewport) -> Self {
        let profile = config.profile(initial);
        Self {
            config,
            profile,
            pending: None,
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    pub fn on_resize(&mut self, viewport: Viewport, now: Instant) {
        self.pending = Some((viewport, now));
    }

    /// Applies a settled resize. Returns true when the device profile changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some((viewport, at)) = self.pending else {
            return false;
        };
        if now.duration_since(at) < Duration::from_millis(self.config.debounce_ms) {
            return false;
        }

        self.pending = None;
        let profile = self.config.profile(viewport);
        if profile == self.profile {
            return false;
        }

        debug!(
            "Device reclassified {} -> {} at width {}",
            self.profile.class, profile.class, viewport.width
        );
        self.profile = profile;
        true
    }

    pub fn navigate(&self, current_path: &str) -> Option<String> {
        self.profile.redirect_target(current_path)
    }
}
