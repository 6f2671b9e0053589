//! Render state management

use log::warn;

use super::color::Color;
use super::recolor::RecolorConfig;
use super::types::{DeviceFactors, Rotation, ViewParams};

/// Smallest zoom factor accepted
pub const ZOOM_MIN: f64 = 0.1;
/// Largest zoom factor accepted
pub const ZOOM_MAX: f64 = 10.0;

/// Document-wide state every job reads when it runs
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderState {
    pub view: ViewParams,
    pub recolor: RecolorConfig,
}

impl RenderState {
    #[must_use]
    pub fn new(view: ViewParams, recolor: RecolorConfig) -> Self {
        Self { view, recolor }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::Reload => vec![Effect::InvalidateCache, Effect::RefreshPages],

            Command::SetZoom(zoom) => {
                if !zoom.is_finite() {
                    warn!("Ignoring non-finite zoom {zoom}");
                    return vec![];
                }
                changed(&mut self.view.zoom, zoom.clamp(ZOOM_MIN, ZOOM_MAX))
            }

            Command::SetPpi(ppi) => {
                if !ppi.is_finite() {
                    warn!("Ignoring non-finite ppi {ppi}");
                    return vec![];
                }
                changed(&mut self.view.ppi, ppi.max(0.0))
            }

            Command::SetRotation(rotation) => changed(&mut self.view.rotation, rotation),

            Command::SetDeviceFactors(factors) => {
                let valid = |f: f64| if f.is_finite() && f > 0.0 { f } else { 1.0 };
                let factors = DeviceFactors {
                    x: valid(factors.x),
                    y: valid(factors.y),
                };
                changed(&mut self.view.device_factors, factors)
            }

            Command::EnableRecolor(enable) => changed(&mut self.recolor.enabled, enable),

            Command::EnableRecolorHue(enable) => changed(&mut self.recolor.preserve_hue, enable),

            Command::EnableRecolorReverseVideo(enable) => {
                changed(&mut self.recolor.reverse_video, enable)
            }

            Command::SetRecolorColors { light, dark } => {
                let mut effects = light
                    .map(|c| changed(&mut self.recolor.light, c))
                    .unwrap_or_default();
                if let Some(dark) = dark {
                    if effects.is_empty() {
                        effects = changed(&mut self.recolor.dark, dark);
                    } else {
                        self.recolor.dark = dark;
                    }
                }
                effects
            }
        }
    }
}

fn changed<T: PartialEq>(slot: &mut T, value: T) -> Vec<Effect> {
    if *slot == value {
        return vec![];
    }
    *slot = value;
    vec![Effect::InvalidateCache, Effect::RefreshPages]
}

/// Commands that modify render state
#[derive(Clone, Copy, Debug)]
pub enum Command {
    /// The document changed on disk
    Reload,
    /// Set the zoom factor (1.0 = 100%)
    SetZoom(f64),
    /// Set screen pixels per inch (0 when unknown)
    SetPpi(f64),
    SetRotation(Rotation),
    SetDeviceFactors(DeviceFactors),
    EnableRecolor(bool),
    EnableRecolorHue(bool),
    EnableRecolorReverseVideo(bool),
    /// Update palette colors; `None` keeps the current one
    SetRecolorColors {
        light: Option<Color>,
        dark: Option<Color>,
    },
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Drop every cached page
    InvalidateCache,
    /// Ask the UI to re-request its visible pages
    RefreshPages,
}
