//! Classifier request/response shapes.
//!
//! The classifier is an opaque capability: given two documents it answers
//! whether the source should link to the target and with which phrase.

use serde::{Deserialize, Deserializer, Serialize};

use super::link::LINK_CONFIDENCE_THRESHOLD;

/// Borrowed inputs for one pairwise comparison.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRequest<'a> {
    pub source_name: &'a str,
    pub source_content: &'a str,
    pub target_name: &'a str,
    pub target_content: &'a str,
}

/// Linking decision for one ordered pair.
///
/// Field names follow the camelCase JSON the classifier is asked to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub should_link: bool,

    #[serde(default)]
    pub link_text: String,

    #[serde(default)]
    pub alt_text: String,

    #[serde(default, deserialize_with = "deserialize_confidence")]
    pub confidence: u8,

    #[serde(default)]
    pub reasoning: String,

    /// Advisory only; the analyzer always re-locates `link_text` itself.
    #[serde(default, rename = "linkPosition", skip_serializing_if = "Option::is_none")]
    pub link_position_hint: Option<i64>,
}

impl Classification {
    pub fn no_link(reasoning: impl Into<String>) -> Self {
        Self {
            should_link: false,
            link_text: String::new(),
            alt_text: String::new(),
            confidence: 0,
            reasoning: reasoning.into(),
            link_position_hint: None,
        }
    }

    pub fn link(link_text: impl Into<String>, alt_text: impl Into<String>, confidence: u8) -> Self {
        Self {
            should_link: true,
            link_text: link_text.into(),
            alt_text: alt_text.into(),
            confidence: confidence.min(100),
            reasoning: String::new(),
            link_position_hint: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// `should_link` AND confidence at or above the creation threshold.
    /// An empty phrase can never be anchored, so it is never accepted.
    pub fn is_acceptable(&self) -> bool {
        self.should_link
            && self.confidence >= LINK_CONFIDENCE_THRESHOLD
            && !self.link_text.trim().is_empty()
    }
}

/// Accepts integer or fractional confidences and clamps them into 0..=100.
fn deserialize_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.clamp(0.0, 100.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::below(69, false)]
    #[case::at(70, true)]
    #[case::above(95, true)]
    fn threshold_is_inclusive(#[case] confidence: u8, #[case] accepted: bool) {
        let c = Classification::link("SBA loan", "SBA loans explained", confidence);
        assert_eq!(c.is_acceptable(), accepted);
    }

    #[test]
    fn should_link_false_is_never_acceptable() {
        let mut c = Classification::link("SBA loan", "", 99);
        c.should_link = false;
        assert!(!c.is_acceptable());
    }

    #[test]
    fn blank_phrase_is_never_acceptable() {
        assert!(!Classification::link("  ", "", 99).is_acceptable());
    }

    #[test]
    fn parses_camel_case_response() {
        let json = r#"{
            "shouldLink": true,
            "linkText": "buy a business",
            "altText": "Guide to buying a business",
            "confidence": 82.6,
            "reasoning": "target explains the process",
            "linkPosition": 120
        }"#;
        let c: Classification = serde_json::from_str(json).unwrap();
        assert!(c.should_link);
        assert_eq!(c.link_text, "buy a business");
        assert_eq!(c.confidence, 83);
        assert_eq!(c.link_position_hint, Some(120));
    }

    #[test]
    fn missing_fields_default_to_no_link() {
        let c: Classification = serde_json::from_str("{}").unwrap();
        assert_eq!(c, Classification::no_link(""));
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let c: Classification = serde_json::from_str(r#"{"confidence": 140}"#).unwrap();
        assert_eq!(c.confidence, 100);
        let c: Classification = serde_json::from_str(r#"{"confidence": -3}"#).unwrap();
        assert_eq!(c.confidence, 0);
    }
}
