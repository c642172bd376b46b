//! Codec selection policy
//!
//! Which decoder filters to try, in which order, for a given set of
//! stream capabilities. The policy is a seam: the engine only asks for
//! an ordered chain and tries each entry, falling back to the next on
//! failure.

use crate::settings::PlayerSettings;

// ============================================================================
// Capabilities
// ============================================================================
//
// Bit per stream kind a decoder can handle.

pub const VIDEO_MPEG2: u32 = 1 << 0;
pub const VIDEO_DIVX: u32 = 1 << 1;
pub const VIDEO_H264: u32 = 1 << 2;
pub const VIDEO_HEVC: u32 = 1 << 3;
pub const AUDIO_MPEG: u32 = 1 << 8;
pub const AUDIO_AC3: u32 = 1 << 9;
pub const AUDIO_DTS: u32 = 1 << 10;
pub const AUDIO_AAC: u32 = 1 << 11;

pub const VIDEO_ANY: u32 = VIDEO_MPEG2 | VIDEO_DIVX | VIDEO_H264 | VIDEO_HEVC;
pub const AUDIO_ANY: u32 = AUDIO_MPEG | AUDIO_AC3 | AUDIO_DTS | AUDIO_AAC;

/// A decoder filter known to the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    pub name: String,
    pub capabilities: u32,
}

impl CodecInfo {
    pub fn new(name: &str, capabilities: u32) -> Self {
        Self { name: name.to_string(), capabilities }
    }

    pub fn handles(&self, required: u32) -> bool {
        self.capabilities & required != 0
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Chooses decoder filters for the capabilities a source requires.
pub trait CodecPolicy: Send {
    /// Ordered chain of candidates for `required`, most preferred
    /// first. The builder tries them in order and keeps the first that
    /// the graph accepts per capability class.
    fn preferred_chain(&self, required: u32) -> Vec<CodecInfo>;
}

/// Fixed-table policy, reordered by the user's preferred codec names.
pub struct StaticCodecPolicy {
    table: Vec<CodecInfo>,
}

impl StaticCodecPolicy {
    pub fn new() -> Self {
        Self {
            table: vec![
                CodecInfo::new("LAV Video Decoder", VIDEO_ANY),
                CodecInfo::new("Microsoft DTV-DVD Video Decoder", VIDEO_MPEG2 | VIDEO_H264),
                CodecInfo::new("LAV Audio Decoder", AUDIO_ANY),
                CodecInfo::new("Microsoft DTV-DVD Audio Decoder", AUDIO_MPEG | AUDIO_AC3),
            ],
        }
    }

    pub fn with_table(table: Vec<CodecInfo>) -> Self {
        Self { table }
    }

    /// Reorder the table so the user's preferred names come first,
    /// keeping their relative preference order.
    pub fn with_preferences(settings: &PlayerSettings) -> Self {
        let mut policy = Self::new();
        let mut preferred: Vec<&String> = settings
            .preferred_video_codecs
            .iter()
            .chain(settings.preferred_audio_codecs.iter())
            .collect();
        preferred.reverse();
        for name in preferred {
            if let Some(idx) = policy.table.iter().position(|c| &c.name == name) {
                let codec = policy.table.remove(idx);
                policy.table.insert(0, codec);
            }
        }
        policy
    }
}

impl Default for StaticCodecPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecPolicy for StaticCodecPolicy {
    fn preferred_chain(&self, required: u32) -> Vec<CodecInfo> {
        self.table
            .iter()
            .filter(|c| c.handles(required))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_filters_by_capability() {
        let policy = StaticCodecPolicy::new();
        let chain = policy.preferred_chain(VIDEO_H264);
        assert_eq!(chain.len(), 2);
        assert!(chain.iter().all(|c| c.handles(VIDEO_H264)));

        let chain = policy.preferred_chain(AUDIO_DTS);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name, "LAV Audio Decoder");
    }

    #[test]
    fn test_preferences_reorder_chain() {
        let mut settings = PlayerSettings::default();
        settings.preferred_video_codecs = vec!["Microsoft DTV-DVD Video Decoder".to_string()];

        let policy = StaticCodecPolicy::with_preferences(&settings);
        let chain = policy.preferred_chain(VIDEO_MPEG2);
        assert_eq!(chain[0].name, "Microsoft DTV-DVD Video Decoder");
        assert_eq!(chain[1].name, "LAV Video Decoder");
    }

    #[test]
    fn test_unknown_capability_yields_empty_chain() {
        let policy = StaticCodecPolicy::new();
        assert!(policy.preferred_chain(1 << 30).is_empty());
    }
}
