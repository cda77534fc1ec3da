//! Heuristic grouping of input sources
//!
//! Input source IDs are vendor strings, so grouping is substring
//! matching against keyword lists. The lists are data: the defaults
//! cover the built-in macOS Chinese input methods and Apple keyboard
//! layouts, and can be replaced from `classifier.json`.

use serde::{Deserialize, Serialize};

use super::registry::InputSourceDescriptor;

/// Group an input source belongs to for toggling purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceGroup {
    /// Composition-based CJK input methods
    CjkStyle,
    /// Plain Latin keyboard layouts
    LatinStyle,
    /// Neither; never a toggle target
    Unclassified,
}

/// Keyword lists driving classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    /// Substrings of an input source ID marking it CJK-style
    pub cjk_id_markers: Vec<String>,
    /// Substrings of a display name marking it CJK-style
    pub cjk_name_markers: Vec<String>,
    /// Exact IDs of Latin layouts
    pub latin_ids: Vec<String>,
    /// Substrings of an input source ID marking it a Latin layout
    pub latin_id_markers: Vec<String>,
    /// Substrings of a CJK source ID preferred as the toggle target
    pub primary_cjk_markers: Vec<String>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        fn strings(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            cjk_id_markers: strings(&[
                "com.apple.inputmethod",
                "SCIM",
                "TCIM",
                "Pinyin",
                "Wubi",
                "Shuangpin",
            ]),
            cjk_name_markers: strings(&["中文", "拼音", "五笔", "双拼"]),
            latin_ids: strings(&["com.apple.keylayout.ABC", "com.apple.keylayout.US"]),
            latin_id_markers: strings(&["com.apple.keylayout"]),
            primary_cjk_markers: strings(&["ITABC", "Pinyin"]),
        }
    }
}

impl ClassifierRules {
    pub fn classify(&self, source: &InputSourceDescriptor) -> SourceGroup {
        let id = source.id.as_str();
        let name = source.display_name.as_str();

        if contains_any(id, &self.cjk_id_markers) || contains_any(name, &self.cjk_name_markers) {
            SourceGroup::CjkStyle
        } else if self.latin_ids.iter().any(|l| l == id) || contains_any(id, &self.latin_id_markers) {
            SourceGroup::LatinStyle
        } else {
            SourceGroup::Unclassified
        }
    }

    pub fn is_primary_cjk(&self, source: &InputSourceDescriptor) -> bool {
        contains_any(&source.id, &self.primary_cjk_markers)
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|needle| !needle.is_empty() && haystack.contains(needle.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input_source::registry::SourceCategory;

    fn source(id: &str, name: &str) -> InputSourceDescriptor {
        InputSourceDescriptor {
            id: id.to_string(),
            display_name: name.to_string(),
            category: SourceCategory::Keyboard,
            is_enabled: true,
            is_selectable: true,
        }
    }

    #[test]
    fn test_builtin_chinese_methods() {
        let rules = ClassifierRules::default();
        for id in [
            "com.apple.inputmethod.SCIM.ITABC",
            "com.apple.inputmethod.SCIM.WBX",
            "com.apple.inputmethod.TCIM.Zhuyin",
            "com.sogou.inputmethod.sogou.pinyin.Pinyin",
        ] {
            assert_eq!(rules.classify(&source(id, "")), SourceGroup::CjkStyle, "{id}");
        }
    }

    #[test]
    fn test_name_markers() {
        let rules = ClassifierRules::default();
        assert_eq!(
            rules.classify(&source("com.example.ime", "五笔输入法")),
            SourceGroup::CjkStyle
        );
    }

    #[test]
    fn test_latin_layouts() {
        let rules = ClassifierRules::default();
        assert_eq!(
            rules.classify(&source("com.apple.keylayout.ABC", "ABC")),
            SourceGroup::LatinStyle
        );
        assert_eq!(
            rules.classify(&source("com.apple.keylayout.British", "British")),
            SourceGroup::LatinStyle
        );
    }

    #[test]
    fn test_unknown_is_unclassified() {
        let rules = ClassifierRules::default();
        assert_eq!(
            rules.classify(&source("com.apple.CharacterPaletteIM", "Emoji & Symbols")),
            SourceGroup::Unclassified
        );
    }

    #[test]
    fn test_primary_marker() {
        let rules = ClassifierRules::default();
        assert!(rules.is_primary_cjk(&source("com.apple.inputmethod.SCIM.ITABC", "")));
        assert!(!rules.is_primary_cjk(&source("com.apple.inputmethod.SCIM.WBX", "")));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let rules: ClassifierRules =
            serde_json::from_str(r#"{"primary_cjk_markers":["Shuangpin"]}"#).unwrap();
        assert_eq!(rules.primary_cjk_markers, vec!["Shuangpin".to_string()]);
        assert_eq!(rules.latin_ids, ClassifierRules::default().latin_ids);
    }

    #[test]
    fn test_empty_marker_matches_nothing() {
        let rules = ClassifierRules {
            latin_id_markers: vec![String::new()],
            ..ClassifierRules::default()
        };
        assert_eq!(
            rules.classify(&source("com.example.other", "Other")),
            SourceGroup::Unclassified
        );
    }
}
