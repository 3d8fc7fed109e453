//! Capture designs.
//!
//! A [`CaptureDesign`] is an ordered sequence of [`Exposure`]s plus one
//! processing-quality choice. The order is the capture order and the output
//! numbering order. Template generators build common designs (bursts,
//! brackets, focus racks) without touching a device.

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::device::{CameraCapabilities, FrameMetadata};
use crate::error::{DesignError, Result};
use crate::exposure::{Exposure, ParamValue};

pub mod io;


/// How much in-device post-processing the captured frames get. `None`
/// disables noise reduction and edge enhancement and forces a linear
/// tonemap curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessingChoice {
    None,
    #[default]
    Fast,
    HighQuality,
}

impl std::fmt::Display for ProcessingChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingChoice::None => write!(f, "NONE"),
            ProcessingChoice::Fast => write!(f, "FAST"),
            ProcessingChoice::HighQuality => write!(f, "HIGH_QUALITY"),
        }
    }
}

/// An ordered sequence of exposures to capture as one burst.
#[derive(Debug, Clone)]
pub struct CaptureDesign {
    name: String,
    exposures: Vec<Exposure>,
    processing: ProcessingChoice,
}

fn generate_name() -> String {
    // Short random tag, enough to keep output files of different runs apart.
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl Default for CaptureDesign {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDesign {
    pub fn new() -> Self {
        Self {
            name: generate_name(),
            exposures: Vec::new(),
            processing: ProcessingChoice::default(),
        }
    }

    pub fn with_name<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            exposures: Vec::new(),
            processing: ProcessingChoice::default(),
        }
    }

    /// Clone this design under a freshly generated name. The clones keep
    /// their variable parameter slots, so the next capture of "the same"
    /// design re-derives its auto values from the scene at that time.
    pub fn deep_copy(&self) -> Self {
        Self {
            name: generate_name(),
            exposures: self.exposures.clone(),
            processing: self.processing,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    pub fn exposures(&self) -> &[Exposure] {
        &self.exposures
    }

    pub fn len(&self) -> usize {
        self.exposures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exposures.is_empty()
    }

    pub fn processing(&self) -> ProcessingChoice {
        self.processing
    }

    pub fn set_processing(&mut self, processing: ProcessingChoice) {
        self.processing = processing;
    }

    pub fn add_exposure(&mut self, exposure: Exposure) {
        self.exposures.push(exposure);
    }

    /// Whether any exposure needs the auto-focus routine.
    pub fn needs_auto_focus(&self) -> bool {
        self.exposures.iter().any(Exposure::has_variable_focus_distance)
    }

    /// Whether any exposure needs the auto-exposure routine.
    pub fn needs_auto_exposure(&self) -> bool {
        self.exposures.iter().any(Exposure::has_variable_exposure)
    }

    /// Resolve every exposure that still has variable parameters against
    /// the auto-convergence result. Fully-literal exposures are untouched.
    pub fn resolve_all(
        &mut self,
        caps: &CameraCapabilities,
        auto: &FrameMetadata,
    ) -> Result<()> {
        for exposure in &mut self.exposures {
            if exposure.has_variables() {
                exposure.fix_values(caps, auto)?;
            }
        }
        Ok(())
    }

    // - - - Template generators - - -

    /// `n` fully-automatic exposures.
    pub fn burst(n: usize) -> Self {
        let mut design = Self::new();
        for _ in 0..n {
            design.add_exposure(Exposure::all_auto());
        }
        design
    }

    /// `n` auto exposures, each with 1/n of the auto exposure time. Useful
    /// for summing frames offline without motion blur.
    pub fn split_exposure_time(n: usize) -> Self {
        let mut design = Self::new();
        for _ in 0..n {
            let mut exposure = Exposure::all_auto();
            exposure.exposure_time = ParamValue::ScaledAuto(1.0 / n as f64);
            design.add_exposure(exposure);
        }
        design
    }

    /// `n` exposures bracketing the auto exposure time across
    /// `[low_stop, high_stop]` stops, linear in stops (exponential in
    /// time). The unscaled auto value is only included if some step lands
    /// on stop 0.
    pub fn exposure_time_bracket_around_auto(
        low_stop: f64,
        high_stop: f64,
        n: usize,
    ) -> Result<Self> {
        let factors = stop_factors(low_stop, high_stop, n)?;
        let mut design = Self::new();
        for factor in factors {
            let mut exposure = Exposure::all_auto();
            exposure.exposure_time = ParamValue::ScaledAuto(factor);
            design.add_exposure(exposure);
        }
        Ok(design)
    }

    /// Like [`Self::exposure_time_bracket_around_auto`], varying ISO
    /// instead.
    pub fn iso_bracket_around_auto(low_stop: f64, high_stop: f64, n: usize) -> Result<Self> {
        let factors = stop_factors(low_stop, high_stop, n)?;
        let mut design = Self::new();
        for factor in factors {
            let mut exposure = Exposure::all_auto();
            exposure.sensitivity = ParamValue::ScaledAuto(factor);
            design.add_exposure(exposure);
        }
        Ok(design)
    }

    /// `n` exposures linearly spaced across an absolute exposure-time range
    /// in nanoseconds. Values outside the device's exposure-time range are
    /// dropped, shrinking the design.
    pub fn exposure_time_bracket_absolute(
        caps: &CameraCapabilities,
        low_ns: i64,
        high_ns: i64,
        n: usize,
    ) -> Result<Self> {
        check_bracket_count(n)?;
        let mut design = Self::new();
        for i in 0..n as i64 {
            // Interpolate per index so the last value lands exactly on
            // high_ns even when the range is not divisible by n-1.
            let time = low_ns + (high_ns - low_ns) * i / (n as i64 - 1);
            if let Some((lo, hi)) = caps.exposure_time_range {
                if time < lo || time > hi {
                    warn!(
                        "dropping bracketed exposure time {}ns, outside device range [{}, {}]",
                        time, lo, hi
                    );
                    continue;
                }
            }
            let mut exposure = Exposure::all_auto();
            exposure.exposure_time = ParamValue::Literal(time);
            design.add_exposure(exposure);
        }
        Ok(design)
    }

    /// `n` exposures linearly spaced across an absolute ISO range. Values
    /// outside the device's sensitivity range are dropped, shrinking the
    /// design.
    pub fn iso_bracket_absolute(
        caps: &CameraCapabilities,
        low_iso: i32,
        high_iso: i32,
        n: usize,
    ) -> Result<Self> {
        check_bracket_count(n)?;
        let step = (high_iso - low_iso) as f64 / (n as f64 - 1.0);
        let mut design = Self::new();
        for i in 0..n {
            let iso = (low_iso as f64 + step * i as f64) as i32;
            if let Some((lo, hi)) = caps.sensitivity_range {
                if iso < lo || iso > hi {
                    warn!(
                        "dropping bracketed ISO {}, outside device range [{}, {}]",
                        iso, lo, hi
                    );
                    continue;
                }
            }
            let mut exposure = Exposure::all_auto();
            exposure.sensitivity = ParamValue::Literal(iso);
            design.add_exposure(exposure);
        }
        Ok(design)
    }

    /// `n` exposures racking focus linearly in meters across
    /// `[near_m, far_m]`. Distances the lens cannot focus to are dropped,
    /// shrinking the design.
    pub fn focus_bracket_absolute(
        caps: &CameraCapabilities,
        near_m: f32,
        far_m: f32,
        n: usize,
    ) -> Result<Self> {
        check_bracket_count(n)?;
        let step = (far_m - near_m) / (n as f32 - 1.0);
        let mut design = Self::new();
        for i in 0..n {
            let meters = near_m + step * i as f32;
            let diopters = 1.0 / meters;
            if let Some(max_diopters) = caps.min_focus_distance {
                if diopters > max_diopters {
                    warn!(
                        "dropping focus distance {}m, closer than the lens minimum",
                        meters
                    );
                    continue;
                }
            }
            let mut exposure = Exposure::all_auto();
            exposure.focus_distance = ParamValue::Literal(diopters);
            design.add_exposure(exposure);
        }
        Ok(design)
    }
}

fn check_bracket_count(n: usize) -> Result<()> {
    if n < 2 {
        return Err(DesignError::InvalidExposureCount { requested: n }.into());
    }
    Ok(())
}

/// Scale factors `2^stop` for `n` stops linearly spaced across
/// `[low_stop, high_stop]`.
fn stop_factors(low_stop: f64, high_stop: f64, n: usize) -> Result<Vec<f64>> {
    check_bracket_count(n)?;
    let step = (high_stop - low_stop) / (n as f64 - 1.0);
    Ok((0..n)
        .map(|i| (low_stop + step * i as f64).exp2())
        .collect())
}
