use super::*;
use crate::device::{FrameMetadata, FrameTimestamp, MockBackend};

fn auto_result() -> FrameMetadata {
    FrameMetadata {
        timestamp: FrameTimestamp(1),
        exposure_time_ns: Some(20_000_000),
        sensitivity: Some(400),
        aperture: Some(2.0),
        focal_length: Some(4.5),
        focus_distance: Some(2.5),
        af_state: None,
        ae_state: None,
    }
}

#[test]
fn parses_scaled_auto_expressions() {
    assert_eq!(parse_scaled_auto("2*AUTO"), Some(2.0));
    assert_eq!(parse_scaled_auto("0.5*auto"), Some(0.5));
    assert_eq!(parse_scaled_auto("1.5 * Auto"), Some(1.5));
}

#[test]
fn rejects_malformed_expressions() {
    assert_eq!(parse_scaled_auto("AUTO"), None);
    assert_eq!(parse_scaled_auto("2*MANUAL"), None);
    assert_eq!(parse_scaled_auto("-1*AUTO"), None);
    assert_eq!(parse_scaled_auto("0*AUTO"), None);
    assert_eq!(parse_scaled_auto("x*AUTO"), None);
    assert_eq!(parse_scaled_auto(""), None);
}

#[test]
fn all_auto_resolves_to_the_auto_result() {
    let caps = MockBackend::default_capabilities();
    let auto = auto_result();
    let mut exposure = Exposure::all_auto();

    exposure.fix_values(&caps, &auto).unwrap();

    let resolved = exposure.resolved().unwrap();
    assert_eq!(resolved.exposure_time_ns, 20_000_000);
    assert_eq!(resolved.sensitivity, 400);
    assert_eq!(resolved.aperture, 2.0);
    assert_eq!(resolved.focal_length, 4.5);
    assert_eq!(resolved.focus_distance, 2.5);
}

#[test]
fn scaled_auto_multiplies_the_auto_value() {
    let caps = MockBackend::default_capabilities();
    let auto = auto_result();
    let mut exposure = Exposure::all_auto();
    exposure.exposure_time = ParamValue::ScaledAuto(0.5);
    exposure.sensitivity = ParamValue::ScaledAuto(2.0);
    exposure.focus_distance = ParamValue::ScaledAuto(2.0);

    exposure.fix_values(&caps, &auto).unwrap();

    let resolved = exposure.resolved().unwrap();
    assert_eq!(resolved.exposure_time_ns, 10_000_000);
    assert_eq!(resolved.sensitivity, 800);
    assert_eq!(resolved.focus_distance, 5.0);
}

#[test]
fn resolution_clamps_to_device_bounds() {
    let mut caps = MockBackend::default_capabilities();
    caps.exposure_time_range = Some((1_000, 30_000_000));
    caps.sensitivity_range = Some((100, 800));
    caps.min_focus_distance = Some(4.0);

    let auto = auto_result();
    let mut exposure = Exposure::all_auto();
    exposure.exposure_time = ParamValue::ScaledAuto(10.0); // 200ms, over the cap
    exposure.sensitivity = ParamValue::ScaledAuto(4.0); // ISO 1600, over the cap
    exposure.focus_distance = ParamValue::ScaledAuto(2.0); // 5 diopters, too close

    exposure.fix_values(&caps, &auto).unwrap();

    let resolved = exposure.resolved().unwrap();
    assert_eq!(resolved.exposure_time_ns, 30_000_000);
    assert_eq!(resolved.sensitivity, 800);
    assert_eq!(resolved.focus_distance, 4.0);
}

#[test]
fn literal_slots_are_untouched_by_resolution() {
    let caps = MockBackend::default_capabilities();
    let auto = auto_result();
    let mut exposure = Exposure::all_auto();
    exposure.exposure_time = ParamValue::Literal(123);

    exposure.fix_values(&caps, &auto).unwrap();
    assert_eq!(exposure.exposure_time, ParamValue::Literal(123));
}

#[test]
fn missing_auto_field_fails_loudly() {
    let caps = MockBackend::default_capabilities();
    let mut auto = auto_result();
    auto.aperture = None;

    let mut exposure = Exposure::all_auto();
    let err = exposure.fix_values(&caps, &auto).unwrap_err();
    assert!(matches!(
        err,
        DesignError::MissingAutoValue { parameter: "aperture" }
    ));
}

#[test]
fn unresolved_exposure_cannot_be_extracted() {
    let exposure = Exposure::all_auto();
    let err = exposure.resolved().unwrap_err();
    assert!(matches!(err, DesignError::UnresolvedParameter { .. }));
}

#[test]
fn variable_predicates_track_the_right_slots() {
    let mut exposure = Exposure::all_auto();
    assert!(exposure.has_variables());
    assert!(exposure.has_variable_focus_distance());
    assert!(exposure.has_variable_exposure());

    exposure.focus_distance = ParamValue::Literal(0.0);
    assert!(!exposure.has_variable_focus_distance());
    assert!(exposure.has_variable_exposure());

    exposure.exposure_time = ParamValue::Literal(1_000);
    exposure.sensitivity = ParamValue::Literal(100);
    exposure.aperture = ParamValue::Literal(2.0);
    assert!(!exposure.has_variable_exposure());
    // Focal length is still variable, but drives neither auto routine.
    assert!(exposure.has_variables());
}

#[test]
fn from_metadata_copies_delivered_values() {
    let exposure = Exposure::from_metadata(&auto_result());
    assert_eq!(exposure.exposure_time, ParamValue::Literal(20_000_000));
    assert_eq!(exposure.sensitivity, ParamValue::Literal(400));
    assert!(!exposure.has_variables());
}

#[test]
fn display_shows_variable_and_literal_forms() {
    let mut exposure = Exposure::all_auto();
    exposure.exposure_time = ParamValue::Literal(20_000_000);
    exposure.sensitivity = ParamValue::ScaledAuto(2.0);
    let rendered = exposure.to_string();
    assert!(rendered.contains("20.0ms"));
    assert!(rendered.contains("2*AUTO"));
    assert!(rendered.contains("AUTO"));
}
