//! Common Type Definitions
//!
//! Shared primitive aliases and constants used across the interchange engine.

/// Whole-frame count or frame position
pub type FrameCount = i64;

/// Frames per second as a real number
pub type FrameRate = f64;

/// Frame rate assumed when a timeline exposes no clip rate
pub const DEFAULT_FPS: FrameRate = 24.0;

/// Version tag of the canonical JSON document
pub const DOCUMENT_SCHEMA_VERSION: &str = "1.0";

/// OTIO schema family emitted by the native writer
pub const OTIO_SCHEMA_VERSION: &str = "0.17.0";

/// Metadata field that only exists for the edit-planning consumer
pub const RESERVED_TEXT_KEY: &str = "text";

/// Returns true if the rate is usable for frame arithmetic.
pub fn is_valid_rate(rate: FrameRate) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Converts a rational time value to whole frames, truncating toward zero.
pub fn to_frames(value: f64) -> FrameCount {
    if value.is_finite() {
        value.trunc() as FrameCount
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_validation() {
        assert!(is_valid_rate(23.976));
        assert!(!is_valid_rate(0.0));
        assert!(!is_valid_rate(f64::NAN));
        assert!(!is_valid_rate(-25.0));
    }

    #[test]
    fn test_frames_truncate() {
        assert_eq!(to_frames(99.9), 99);
        assert_eq!(to_frames(-1.5), -1);
        assert_eq!(to_frames(f64::INFINITY), 0);
    }
}
