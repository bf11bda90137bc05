//! Disc summary built when a session is opened.

use bdnav_decrypt::{AacsErrorCode, DecryptCapability};
use bdnav_formats::{DiscIndex, IndexObject, ObjectType};
use serde::Serialize;

/// What the host needs to know about a disc before playing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscInfo {
    pub bluray_detected: bool,
    pub first_play_supported: bool,
    pub top_menu_supported: bool,
    /// Some title needs a BD-J runtime.
    pub bdj_detected: bool,
    /// Playback is possible without an interactive navigation engine.
    pub no_menu_support: bool,
    pub num_titles: u32,
    pub num_hdmv_titles: u32,
    pub num_bdj_titles: u32,
    /// Hidden or prohibited titles.
    pub num_unsupported_titles: u32,

    pub aacs_detected: bool,
    pub libaacs_detected: bool,
    pub aacs_handled: bool,
    pub aacs_error_code: Option<i32>,

    pub initial_output_mode_preference: u8,
    pub content_exist_3d: bool,
    pub initial_dynamic_range_type: u8,
    pub video_format: u8,
    pub frame_rate: u8,
    pub provider_data: Vec<u8>,
}

fn supported(object: &Option<IndexObject>) -> bool {
    object.is_some()
}

impl DiscInfo {
    /// Summarize a parsed index and the decryption outcome.
    pub(crate) fn new(index: &DiscIndex, aacs_detected: bool, capability: &DecryptCapability) -> Self {
        let (hdmv, bdj) = index.title_counts();
        let uses_bdj = |o: &Option<IndexObject>| {
            o.as_ref().is_some_and(|o| o.object_type == ObjectType::Bdj)
        };
        let bdj_detected = bdj > 0 || uses_bdj(&index.first_play) || uses_bdj(&index.top_menu);

        let (libaacs_detected, aacs_handled, aacs_error_code) = match capability {
            DecryptCapability::Absent => (false, false, None),
            DecryptCapability::Present(_) => (true, true, None),
            DecryptCapability::Failed(code) => (true, false, Some(i32::from(*code))),
        };

        DiscInfo {
            bluray_detected: true,
            first_play_supported: supported(&index.first_play),
            top_menu_supported: supported(&index.top_menu),
            bdj_detected,
            no_menu_support: !supported(&index.top_menu),
            num_titles: index.titles.len() as u32,
            num_hdmv_titles: hdmv,
            num_bdj_titles: bdj,
            num_unsupported_titles: index
                .titles
                .iter()
                .filter(|t| !t.accessible() || t.hidden())
                .count() as u32,
            aacs_detected,
            libaacs_detected,
            aacs_handled: aacs_detected && aacs_handled,
            aacs_error_code,
            initial_output_mode_preference: index.app_info.initial_output_mode_preference,
            content_exist_3d: index.app_info.content_exist_3d,
            initial_dynamic_range_type: index.app_info.initial_dynamic_range_type,
            video_format: index.app_info.video_format,
            frame_rate: index.app_info.frame_rate,
            provider_data: index.app_info.user_data.to_vec(),
        }
    }

    pub fn aacs_error(&self) -> Option<AacsErrorCode> {
        self.aacs_error_code.map(AacsErrorCode::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdnav_formats::{index::ACCESS_HIDDEN, IndexTitle};

    fn index() -> DiscIndex {
        DiscIndex {
            first_play: Some(IndexObject::hdmv(0, false)),
            top_menu: None,
            titles: vec![
                IndexTitle { object: IndexObject::hdmv(1, false), access_type: 0 },
                IndexTitle { object: IndexObject::bdj("00002", true), access_type: ACCESS_HIDDEN },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_counts_and_menus() {
        let info = DiscInfo::new(&index(), false, &DecryptCapability::Absent);
        assert!(info.bluray_detected);
        assert!(info.first_play_supported);
        assert!(!info.top_menu_supported);
        assert!(info.no_menu_support);
        assert!(info.bdj_detected);
        assert_eq!(info.num_titles, 2);
        assert_eq!((info.num_hdmv_titles, info.num_bdj_titles), (1, 1));
        assert_eq!(info.num_unsupported_titles, 1);
        assert_eq!(info.provider_data.len(), 32);
    }

    #[test]
    fn test_aacs_failure_reported() {
        let cap = DecryptCapability::Failed(AacsErrorCode::NoConfig);
        let info = DiscInfo::new(&index(), true, &cap);
        assert!(info.aacs_detected);
        assert!(info.libaacs_detected);
        assert!(!info.aacs_handled);
        assert_eq!(info.aacs_error(), Some(AacsErrorCode::NoConfig));
    }
}
