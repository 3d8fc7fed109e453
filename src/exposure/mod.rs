//! Exposure value objects.
//!
//! An [`Exposure`] holds the five photographic parameters devcam controls:
//! exposure time, sensitivity (ISO), aperture, focal length and focus
//! distance. Every other property of an output frame is an image property,
//! not a photographic one. Each parameter is independently either a literal
//! value or a variable expression resolved against the scene's
//! auto-convergence result at capture time.

use std::fmt;

use crate::device::{CameraCapabilities, FrameMetadata};
use crate::error::DesignError;

#[cfg(test)]
mod tests;

/// One parameter slot: fully automatic, an explicit literal, or a scale
/// factor applied to whatever the auto routines converge on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue<T> {
    Auto,
    Literal(T),
    ScaledAuto(f64),
}

impl<T: Copy> ParamValue<T> {
    pub fn is_literal(&self) -> bool {
        matches!(self, ParamValue::Literal(_))
    }

    pub fn is_variable(&self) -> bool {
        !self.is_literal()
    }

    pub fn literal(&self) -> Option<T> {
        match self {
            ParamValue::Literal(v) => Some(*v),
            _ => None,
        }
    }

    /// Scale factor against the auto value, if this slot is variable.
    /// `Auto` counts as factor 1.
    fn variable_factor(&self) -> Option<f64> {
        match self {
            ParamValue::Auto => Some(1.0),
            ParamValue::ScaledAuto(factor) => Some(*factor),
            ParamValue::Literal(_) => None,
        }
    }
}

/// Parse a variable parameter expression of the form `<positive-real>*AUTO`.
/// The keyword is case-insensitive and whitespace around `*` is tolerated.
/// Returns `None` for any other form; the caller decides whether that is a
/// hard error (design files) or not.
pub fn parse_scaled_auto(input: &str) -> Option<f64> {
    let (factor, keyword) = input.split_once('*')?;
    if !keyword.trim().eq_ignore_ascii_case("AUTO") {
        return None;
    }
    let factor: f64 = factor.trim().parse().ok()?;
    if factor.is_finite() && factor > 0.0 {
        Some(factor)
    } else {
        None
    }
}

/// A single requested frame's photographic parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    /// Exposure time in nanoseconds.
    pub exposure_time: ParamValue<i64>,
    /// Sensitivity as an ISO value.
    pub sensitivity: ParamValue<i32>,
    /// Aperture as an f-number.
    pub aperture: ParamValue<f32>,
    /// Focal length in millimeters.
    pub focal_length: ParamValue<f32>,
    /// Focus distance in diopters (1/meters).
    pub focus_distance: ParamValue<f32>,
}

impl Default for Exposure {
    fn default() -> Self {
        Self::all_auto()
    }
}

impl Exposure {
    /// An exposure that defers every parameter to the auto routines.
    pub fn all_auto() -> Self {
        Self {
            exposure_time: ParamValue::Auto,
            sensitivity: ParamValue::Auto,
            aperture: ParamValue::Auto,
            focal_length: ParamValue::Auto,
            focus_distance: ParamValue::Auto,
        }
    }

    /// Copy the delivered parameter values of a frame into a fully-literal
    /// exposure. Fields the device did not report stay `Auto`.
    pub fn from_metadata(metadata: &FrameMetadata) -> Self {
        let mut exposure = Self::all_auto();
        if let Some(v) = metadata.exposure_time_ns {
            exposure.exposure_time = ParamValue::Literal(v);
        }
        if let Some(v) = metadata.sensitivity {
            exposure.sensitivity = ParamValue::Literal(v);
        }
        if let Some(v) = metadata.aperture {
            exposure.aperture = ParamValue::Literal(v);
        }
        if let Some(v) = metadata.focal_length {
            exposure.focal_length = ParamValue::Literal(v);
        }
        if let Some(v) = metadata.focus_distance {
            exposure.focus_distance = ParamValue::Literal(v);
        }
        exposure
    }

    pub fn has_variables(&self) -> bool {
        self.exposure_time.is_variable()
            || self.sensitivity.is_variable()
            || self.aperture.is_variable()
            || self.focal_length.is_variable()
            || self.focus_distance.is_variable()
    }

    /// Variable focus distance means the capture needs the auto-focus
    /// routine to converge first.
    pub fn has_variable_focus_distance(&self) -> bool {
        self.focus_distance.is_variable()
    }

    /// Variable time, sensitivity or aperture means the capture needs the
    /// auto-exposure routine to converge first.
    pub fn has_variable_exposure(&self) -> bool {
        self.exposure_time.is_variable()
            || self.sensitivity.is_variable()
            || self.aperture.is_variable()
    }

    /// Replace every variable slot with a literal derived from the
    /// auto-convergence result, clamped against device bounds where the
    /// device exposes them.
    ///
    /// Fails if the auto result lacks a field a variable slot needs; a
    /// silent default here would capture frames the photographer never
    /// asked for.
    pub fn fix_values(
        &mut self,
        caps: &CameraCapabilities,
        auto: &FrameMetadata,
    ) -> Result<(), DesignError> {
        if let Some(factor) = self.exposure_time.variable_factor() {
            let base = auto.exposure_time_ns.ok_or(DesignError::MissingAutoValue {
                parameter: "exposure time",
            })?;
            let mut value = (factor * base as f64) as i64;
            if let Some((lo, hi)) = caps.exposure_time_range {
                value = value.clamp(lo, hi);
            }
            self.exposure_time = ParamValue::Literal(value);
        }

        if let Some(factor) = self.sensitivity.variable_factor() {
            let base = auto.sensitivity.ok_or(DesignError::MissingAutoValue {
                parameter: "sensitivity",
            })?;
            let mut value = (factor * base as f64) as i32;
            if let Some((lo, hi)) = caps.sensitivity_range {
                value = value.clamp(lo, hi);
            }
            self.sensitivity = ParamValue::Literal(value);
        }

        if let Some(factor) = self.aperture.variable_factor() {
            let base = auto.aperture.ok_or(DesignError::MissingAutoValue {
                parameter: "aperture",
            })?;
            self.aperture = ParamValue::Literal((factor * base as f64) as f32);
        }

        if let Some(factor) = self.focal_length.variable_factor() {
            let base = auto.focal_length.ok_or(DesignError::MissingAutoValue {
                parameter: "focal length",
            })?;
            self.focal_length = ParamValue::Literal((factor * base as f64) as f32);
        }

        if let Some(factor) = self.focus_distance.variable_factor() {
            let base = auto.focus_distance.ok_or(DesignError::MissingAutoValue {
                parameter: "focus distance",
            })?;
            let mut value = (factor * base as f64) as f32;
            // The minimum focus distance is the largest meaningful diopter
            // value; anything beyond it focuses closer than the lens can.
            if let Some(max_diopters) = caps.min_focus_distance {
                value = value.clamp(0.0, max_diopters);
            }
            self.focus_distance = ParamValue::Literal(value);
        }

        Ok(())
    }

    /// Extract the all-literal view of this exposure. Any slot still
    /// variable at this point is a contract violation in the capture flow.
    pub fn resolved(&self) -> Result<ResolvedExposure, DesignError> {
        Ok(ResolvedExposure {
            exposure_time_ns: self.exposure_time.literal().ok_or(
                DesignError::UnresolvedParameter {
                    parameter: "exposure time",
                },
            )?,
            sensitivity: self
                .sensitivity
                .literal()
                .ok_or(DesignError::UnresolvedParameter {
                    parameter: "sensitivity",
                })?,
            aperture: self
                .aperture
                .literal()
                .ok_or(DesignError::UnresolvedParameter {
                    parameter: "aperture",
                })?,
            focal_length: self
                .focal_length
                .literal()
                .ok_or(DesignError::UnresolvedParameter {
                    parameter: "focal length",
                })?,
            focus_distance: self.focus_distance.literal().ok_or(
                DesignError::UnresolvedParameter {
                    parameter: "focus distance",
                },
            )?,
        })
    }
}

/// Fully-literal exposure parameters, ready to program into a device
/// capture request. Only [`Exposure::resolved`] produces these.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResolvedExposure {
    pub exposure_time_ns: i64,
    pub sensitivity: i32,
    pub aperture: f32,
    pub focal_length: f32,
    pub focus_distance: f32,
}

/// Render an exposure time in a readable unit.
pub fn format_exposure_time(ns: i64) -> String {
    if ns >= 1_000_000_000 {
        format!("{:.2}s", ns as f64 / 1e9)
    } else if ns >= 1_000_000 {
        format!("{:.1}ms", ns as f64 / 1e6)
    } else {
        format!("{}ns", ns)
    }
}

/// Render a focus distance (diopters) in meters.
pub fn format_focus_distance(diopters: f32) -> String {
    if diopters <= 0.0 {
        "infinity".to_string()
    } else {
        format!("{:.2}m", 1.0 / diopters)
    }
}

impl<T: Copy> ParamValue<T> {
    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, render: impl Fn(T) -> String) -> fmt::Result {
        match self {
            ParamValue::Auto => write!(f, "AUTO"),
            ParamValue::ScaledAuto(factor) => write!(f, "{}*AUTO", factor),
            ParamValue::Literal(v) => write!(f, "{}", render(*v)),
        }
    }
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.aperture.fmt_with(f, |v| format!("f{}", v))?;
        write!(f, ", ")?;
        self.exposure_time.fmt_with(f, format_exposure_time)?;
        write!(f, ", ")?;
        self.sensitivity.fmt_with(f, |v| format!("ISO {}", v))?;
        write!(f, ", ")?;
        self.focal_length.fmt_with(f, |v| format!("{}mm", v))?;
        write!(f, ", focus: ")?;
        self.focus_distance.fmt_with(f, format_focus_distance)
    }
}
