//! Viewer-facing stream API
//!
//! [`ViewerStream`] is what an HTTP layer holds per connected client: it
//! yields JPEG frames (or ready-made multipart parts) and releases its
//! handler reference when dropped. [`MotionStatusReport`] is the JSON shape
//! of a motion status poll.

pub mod multipart;
pub mod viewer;

use serde::Serialize;

use crate::handler::MotionStatus;
use crate::source::SourceKey;

pub use multipart::{encode_part, BOUNDARY, MULTIPART_CONTENT_TYPE};
pub use viewer::ViewerStream;

/// Motion status of one source key, as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MotionStatusReport {
    pub source_id: String,
    pub quality: &'static str,
    pub motion_enabled: bool,
    pub motion_detected: bool,
    /// Detector state, absent while detection is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
}

impl MotionStatusReport {
    pub fn new(key: &SourceKey, status: MotionStatus) -> Self {
        Self {
            source_id: key.source_id.to_string(),
            quality: key.quality.as_str(),
            motion_enabled: status.enabled,
            motion_detected: status.active,
            state: status.state.map(|s| s.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionState;
    use crate::source::Quality;

    #[test]
    fn test_report_json() {
        let key = SourceKey::new("3", Quality::Secondary);
        let status = MotionStatus {
            enabled: true,
            active: true,
            state: Some(MotionState::Active),
        };

        let json = serde_json::to_value(MotionStatusReport::new(&key, status)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "source_id": "3",
                "quality": "sub",
                "motion_enabled": true,
                "motion_detected": true,
                "state": "active"
            })
        );
    }

    #[test]
    fn test_disabled_report_omits_state() {
        let key = SourceKey::new("3", Quality::Primary);
        let report = MotionStatusReport::new(&key, MotionStatus::DISABLED);
        let json = serde_json::to_string(&report).unwrap();

        assert!(!json.contains("state"));
        assert!(json.contains("\"motion_enabled\":false"));
    }
}
