//! Input validation and rendering of public identifiers.
//!
//! Everything here runs before the counter store is touched, so a rejected
//! request never mutates a counter.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::SequenceError;

pub const MAX_NAMESPACE_LEN: usize = 32;
/// `u64::MAX` has 20 digits; wider padding could never be needed.
pub const MAX_DIGIT_WIDTH: usize = 20;

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]+(?:-[A-Z0-9]+)*$").expect("namespace pattern is valid"));
static DIGIT_GROUP_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-[0-9]+$").expect("digit tail pattern is valid"));

pub fn validate_namespace(namespace: &str) -> Result<(), SequenceError> {
    if namespace.is_empty() {
        return Err(SequenceError::InvalidNamespaceInput(
            "namespace must not be empty".to_string(),
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(SequenceError::InvalidNamespaceInput(format!(
            "namespace '{}' exceeds {} characters",
            namespace, MAX_NAMESPACE_LEN
        )));
    }
    if !NAMESPACE_RE.is_match(namespace) {
        return Err(SequenceError::InvalidNamespaceInput(format!(
            "namespace '{}' must be uppercase letters and digits in '-'-separated groups",
            namespace
        )));
    }
    Ok(())
}

/// Flat namespaces additionally may not end in an all-digit group.
///
/// `DP-SUP-202601` would otherwise render `DP-SUP-202601-000001`, which is
/// a periodic ticket number.
pub fn validate_flat_namespace(namespace: &str) -> Result<(), SequenceError> {
    validate_namespace(namespace)?;
    if DIGIT_GROUP_TAIL_RE.is_match(namespace) {
        return Err(SequenceError::InvalidNamespaceInput(format!(
            "flat namespace '{}' must not end in a numeric group",
            namespace
        )));
    }
    Ok(())
}

pub fn validate_digit_width(digit_width: usize) -> Result<(), SequenceError> {
    if digit_width == 0 || digit_width > MAX_DIGIT_WIDTH {
        return Err(SequenceError::InvalidNamespaceInput(format!(
            "digit width must be between 1 and {}, got {}",
            MAX_DIGIT_WIDTH, digit_width
        )));
    }
    Ok(())
}

pub fn validate_period(year: i32, month: u32) -> Result<(), SequenceError> {
    if !(1..=9999).contains(&year) {
        return Err(SequenceError::InvalidNamespaceInput(format!(
            "year {} is outside 1..=9999",
            year
        )));
    }
    if !(1..=12).contains(&month) {
        return Err(SequenceError::InvalidNamespaceInput(format!(
            "month {} is outside 1..=12",
            month
        )));
    }
    Ok(())
}

/// `CL` + 7 at width 5 renders `CL-00007`. Width is a minimum, never a cap.
pub fn render_identifier(namespace: &str, value: u64, digit_width: usize) -> String {
    format!("{}-{:0width$}", namespace, value, width = digit_width)
}

/// `DP-SUP`, 2026-01, 1 at width 6 renders `DP-SUP-202601-000001`.
pub fn render_periodic_identifier(
    prefix: &str,
    year: i32,
    month: u32,
    value: u64,
    digit_width: usize,
) -> String {
    format!(
        "{}-{:04}{:02}-{:0width$}",
        prefix,
        year,
        month,
        value,
        width = digit_width
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_render_pads_to_minimum_width() {
        assert_eq!(render_identifier("CL", 1, 5), "CL-00001");
        assert_eq!(render_identifier("DOC", 1, 4), "DOC-0001");
        assert_eq!(render_identifier("PAT", 42, 6), "PAT-000042");
    }

    #[test]
    fn test_render_never_truncates() {
        assert_eq!(render_identifier("DOC", 10_000, 4), "DOC-10000");
        assert_eq!(render_identifier("EMP", 123_456, 4), "EMP-123456");
    }

    #[test]
    fn test_render_periodic() {
        assert_eq!(
            render_periodic_identifier("DP-SUP", 2026, 1, 1, 6),
            "DP-SUP-202601-000001"
        );
        assert_eq!(
            render_periodic_identifier("DP-SUP", 2026, 12, 1_234_567, 6),
            "DP-SUP-202612-1234567"
        );
    }

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace("CL").is_ok());
        assert!(validate_namespace("DP-SUP").is_ok());
        assert!(validate_namespace("V2").is_ok());

        for bad in ["", "cl", "-CL", "CL-", "DP--SUP", "C L", "CL_1"] {
            assert_matches!(
                validate_namespace(bad),
                Err(SequenceError::InvalidNamespaceInput(_)),
                "namespace {:?} should be rejected",
                bad
            );
        }
        assert!(validate_namespace(&"A".repeat(MAX_NAMESPACE_LEN + 1)).is_err());
        assert!(validate_namespace(&"A".repeat(MAX_NAMESPACE_LEN)).is_ok());
    }

    #[test]
    fn test_flat_namespace_cannot_mimic_ticket_numbers() {
        assert!(validate_flat_namespace("CL").is_ok());
        assert!(validate_flat_namespace("V2").is_ok());
        assert!(validate_flat_namespace("DP-SUP").is_ok());
        assert!(validate_flat_namespace("A1-B2").is_ok());

        for bad in ["DP-SUP-202601", "CL-1", "X-2026-01"] {
            assert_matches!(
                validate_flat_namespace(bad),
                Err(SequenceError::InvalidNamespaceInput(_)),
                "flat namespace {:?} should be rejected",
                bad
            );
        }
        // Periodic prefixes follow the plain grammar.
        assert!(validate_namespace("DP-SUP-2").is_ok());
    }

    #[test]
    fn test_validate_digit_width() {
        assert!(validate_digit_width(1).is_ok());
        assert!(validate_digit_width(MAX_DIGIT_WIDTH).is_ok());
        assert_matches!(validate_digit_width(0), Err(SequenceError::InvalidNamespaceInput(_)));
        assert!(validate_digit_width(MAX_DIGIT_WIDTH + 1).is_err());
    }

    #[test]
    fn test_validate_period() {
        assert!(validate_period(2026, 1).is_ok());
        assert!(validate_period(2026, 12).is_ok());
        assert!(validate_period(2026, 0).is_err());
        assert!(validate_period(2026, 13).is_err());
        assert!(validate_period(0, 6).is_err());
        assert!(validate_period(10_000, 6).is_err());
    }
}
