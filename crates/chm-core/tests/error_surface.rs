use chm_core::errors::{ChmError, ErrorInfo};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("site", "3")
        .with_context("reason", "example")
}

#[test]
fn config_error_surface() {
    let err = ChmError::Config(sample_info("CF001", "negative factor"));
    assert_eq!(err.info().code, "CF001");
    assert!(err.info().context.contains_key("site"));
    assert!(!err.is_recoverable());
}

#[test]
fn tree_error_surface() {
    let err = ChmError::Tree(sample_info("T001", "missing root"));
    assert_eq!(err.info().code, "T001");
    assert!(err.info().context.contains_key("reason"));
}

#[test]
fn model_error_surface() {
    let err = ChmError::Model(sample_info("M001", "non-binary closed form"));
    assert_eq!(err.info().code, "M001");
}

#[test]
fn sampling_error_is_recoverable() {
    let err = ChmError::Sampling(sample_info("resample-exhausted", "no matching path"));
    assert_eq!(err.info().code, "resample-exhausted");
    assert!(err.is_recoverable());
}

#[test]
fn rng_error_surface() {
    let err = ChmError::Rng(sample_info("RN001", "invalid seed"));
    assert_eq!(err.info().code, "RN001");
}

#[test]
fn serde_error_surface() {
    let err = ChmError::Serde(sample_info("S001", "schema mismatch"));
    assert_eq!(err.info().code, "S001");
}

#[test]
fn display_includes_context_and_hint() {
    let err = ChmError::Config(
        ErrorInfo::new("bad-delta", "delta must be non-negative")
            .with_context("delta", "-1")
            .with_hint("use a value >= 0"),
    );
    let text = err.to_string();
    assert!(text.starts_with("config error: delta must be non-negative (code: bad-delta)"));
    assert!(text.contains("delta=-1"));
    assert!(text.ends_with("hint: use a value >= 0"));
}

#[test]
fn errors_serialize_with_family_tag() {
    let err = ChmError::Sampling(ErrorInfo::new("resample-exhausted", "gave up"));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["family"], "Sampling");
    assert_eq!(json["detail"]["code"], "resample-exhausted");
}
