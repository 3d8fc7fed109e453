//! Design file reading and writing.
//!
//! A design file is a JSON array of objects, one per exposure. Each object
//! carries any of the keys `exposureTime`, `aperture`, `sensitivity` (or
//! `iso`), `focalLength`, `focusDistance`; a value is either a number
//! (literal) or a `"<factor>*AUTO"` string. Missing keys stay automatic,
//! unknown keys are ignored.

use std::path::Path;

use serde_json::{Map, Number, Value};
use tokio::fs;
use tracing::{debug, warn};

use super::CaptureDesign;
use crate::error::{DesignError, Result};
use crate::exposure::{parse_scaled_auto, Exposure, ParamValue};

/// Load a capture design from a JSON file. A missing file yields an empty
/// design named after the file, so a mistyped name degrades gracefully;
/// everything else about the file is strict.
pub async fn load_design(path: &Path) -> Result<CaptureDesign> {
    let name = design_name_for(path);

    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Design file {} not found, using empty design", path.display());
            return Ok(CaptureDesign::with_name(name));
        }
        Err(e) => return Err(e.into()),
    };

    let root: Value = serde_json::from_str(&raw).map_err(DesignError::MalformedFile)?;
    let entries = match root {
        Value::Array(entries) => entries,
        _ => return Err(DesignError::NotAnArray.into()),
    };

    let mut design = CaptureDesign::with_name(name);
    for entry in entries {
        let object = match entry {
            Value::Object(object) => object,
            other => {
                warn!("Skipping non-object design entry: {}", other);
                continue;
            }
        };
        design.add_exposure(exposure_from_object(object)?);
    }

    debug!(
        "Loaded design '{}' with {} exposures from {}",
        design.name(),
        design.len(),
        path.display()
    );
    Ok(design)
}

fn design_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "design".to_string())
}

fn exposure_from_object(object: Map<String, Value>) -> Result<Exposure> {
    let mut exposure = Exposure::all_auto();

    for (key, value) in object {
        match key.to_lowercase().as_str() {
            "exposuretime" => {
                if let Some(slot) = integer_param(&key, &value)? {
                    exposure.exposure_time = slot;
                }
            }
            "sensitivity" | "iso" => {
                if let Some(slot) = integer_param(&key, &value)? {
                    exposure.sensitivity = match slot {
                        ParamValue::Literal(v) => ParamValue::Literal(v as i32),
                        ParamValue::ScaledAuto(f) => ParamValue::ScaledAuto(f),
                        ParamValue::Auto => ParamValue::Auto,
                    };
                }
            }
            "aperture" => {
                if let Some(slot) = real_param(&key, &value)? {
                    exposure.aperture = slot;
                }
            }
            "focallength" => {
                if let Some(slot) = real_param(&key, &value)? {
                    exposure.focal_length = slot;
                }
            }
            "focusdistance" => {
                if let Some(slot) = real_param(&key, &value)? {
                    exposure.focus_distance = slot;
                }
            }
            _ => {} // unknown keys are ignored
        }
    }

    Ok(exposure)
}

/// Parse one field value. `Ok(None)` means "skip this field" (unsupported
/// value shape, warned); a bad variable string is a hard error for the
/// whole file.
fn integer_param(key: &str, value: &Value) -> Result<Option<ParamValue<i64>>> {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(v) => Ok(Some(ParamValue::Literal(v))),
            None => Ok(Some(ParamValue::Literal(number.as_f64().unwrap_or(0.0) as i64))),
        },
        Value::String(s) => match parse_scaled_auto(s) {
            Some(factor) => Ok(Some(ParamValue::ScaledAuto(factor))),
            None => Err(DesignError::Parse {
                field: key.to_string(),
                value: s.clone(),
            }
            .into()),
        },
        other => {
            warn!("Skipping '{}' with unsupported value: {}", key, other);
            Ok(None)
        }
    }
}

fn real_param(key: &str, value: &Value) -> Result<Option<ParamValue<f32>>> {
    match value {
        Value::Number(number) => Ok(Some(ParamValue::Literal(
            number.as_f64().unwrap_or(0.0) as f32,
        ))),
        Value::String(s) => match parse_scaled_auto(s) {
            Some(factor) => Ok(Some(ParamValue::ScaledAuto(factor))),
            None => Err(DesignError::Parse {
                field: key.to_string(),
                value: s.clone(),
            }
            .into()),
        },
        other => {
            warn!("Skipping '{}' with unsupported value: {}", key, other);
            Ok(None)
        }
    }
}

/// Write a design back out in the file format `load_design` reads.
pub async fn save_design(design: &CaptureDesign, path: &Path) -> Result<()> {
    let mut entries = Vec::with_capacity(design.len());
    for exposure in design.exposures() {
        let mut object = Map::new();
        put_integer(&mut object, "exposureTime", &exposure.exposure_time);
        put_i32(&mut object, "sensitivity", &exposure.sensitivity);
        put_real(&mut object, "aperture", &exposure.aperture);
        put_real(&mut object, "focalLength", &exposure.focal_length);
        put_real(&mut object, "focusDistance", &exposure.focus_distance);
        entries.push(Value::Object(object));
    }

    let rendered = serde_json::to_string_pretty(&Value::Array(entries))
        .map_err(DesignError::MalformedFile)?;
    fs::write(path, rendered).await?;
    debug!("Saved design '{}' to {}", design.name(), path.display());
    Ok(())
}

fn put_integer(object: &mut Map<String, Value>, key: &str, slot: &ParamValue<i64>) {
    match slot {
        ParamValue::Auto => {}
        ParamValue::Literal(v) => {
            object.insert(key.to_string(), Value::Number(Number::from(*v)));
        }
        ParamValue::ScaledAuto(factor) => {
            object.insert(key.to_string(), Value::String(format!("{}*AUTO", factor)));
        }
    }
}

fn put_i32(object: &mut Map<String, Value>, key: &str, slot: &ParamValue<i32>) {
    match slot {
        ParamValue::Auto => {}
        ParamValue::Literal(v) => {
            object.insert(key.to_string(), Value::Number(Number::from(*v)));
        }
        ParamValue::ScaledAuto(factor) => {
            object.insert(key.to_string(), Value::String(format!("{}*AUTO", factor)));
        }
    }
}

fn put_real(object: &mut Map<String, Value>, key: &str, slot: &ParamValue<f32>) {
    match slot {
        ParamValue::Auto => {}
        ParamValue::Literal(v) => {
            if let Some(number) = Number::from_f64(*v as f64) {
                object.insert(key.to_string(), Value::Number(number));
            }
        }
        ParamValue::ScaledAuto(factor) => {
            object.insert(key.to_string(), Value::String(format!("{}*AUTO", factor)));
        }
    }
}
