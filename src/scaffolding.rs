//! Scaffolding classification of assistant replies.
//!
//! Every committed assistant turn is tagged with exactly one of the five
//! pedagogical scaffolding categories the experiment tracks, or with
//! `Unclassified` when the model's self-classification is missing or
//! unknown. The persisted counter files only ever contain these six keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Closed set of pedagogical scaffolding categories.
///
/// The wire and on-disk labels are the Korean strings used by the
/// experiment's prompt; anything outside the five valid labels coerces
/// to `Unclassified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaffoldingType {
    Conceptual,
    Strategic,
    Metacognitive,
    Motivational,
    General,
    Unclassified,
}

impl ScaffoldingType {
    pub const ALL: [ScaffoldingType; 6] = [
        ScaffoldingType::Conceptual,
        ScaffoldingType::Strategic,
        ScaffoldingType::Metacognitive,
        ScaffoldingType::Motivational,
        ScaffoldingType::General,
        ScaffoldingType::Unclassified,
    ];

    /// Label as it appears in model replies, transcripts, and counter files.
    pub fn as_label(self) -> &'static str {
        match self {
            ScaffoldingType::Conceptual => "개념적 스캐폴딩",
            ScaffoldingType::Strategic => "전략적 스캐폴딩",
            ScaffoldingType::Metacognitive => "메타인지적 스캐폴딩",
            ScaffoldingType::Motivational => "동기적 스캐폴딩",
            ScaffoldingType::General => "일반",
            ScaffoldingType::Unclassified => "분류실패",
        }
    }

    /// Total coercion from a model-supplied label. Unknown or empty input
    /// maps to `Unclassified`; no other value is representable.
    pub fn from_label(raw: &str) -> Self {
        match raw.trim() {
            "개념적 스캐폴딩" => ScaffoldingType::Conceptual,
            "전략적 스캐폴딩" => ScaffoldingType::Strategic,
            "메타인지적 스캐폴딩" => ScaffoldingType::Metacognitive,
            "동기적 스캐폴딩" => ScaffoldingType::Motivational,
            "일반" => ScaffoldingType::General,
            _ => ScaffoldingType::Unclassified,
        }
    }
}

/// Per-user scaffolding counters, persisted as a JSON object keyed by the
/// Korean labels. All six keys are always present; the sum of the values
/// equals the number of committed turns for that user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaffoldingCounters {
    counts: BTreeMap<String, u64>,
}

impl ScaffoldingCounters {
    /// All six categories initialized to zero.
    pub fn zeroed() -> Self {
        let counts = ScaffoldingType::ALL
            .iter()
            .map(|t| (t.as_label().to_string(), 0))
            .collect();
        Self { counts }
    }

    /// Rebuild from a deserialized map, keeping only the closed label set.
    ///
    /// Keys outside the six labels are dropped so a hand-edited or stale
    /// file can never smuggle a foreign key back into the counters.
    pub fn from_map(raw: BTreeMap<String, u64>) -> Self {
        let mut counters = Self::zeroed();
        for (key, value) in raw {
            if counters.counts.contains_key(&key) {
                counters.counts.insert(key, value);
            } else {
                tracing::warn!("Dropping unknown scaffolding counter key '{}'", key);
            }
        }
        counters
    }

    pub fn increment(&mut self, scaffolding: ScaffoldingType) {
        let entry = self
            .counts
            .entry(scaffolding.as_label().to_string())
            .or_insert(0);
        *entry += 1;
    }

    pub fn get(&self, scaffolding: ScaffoldingType) -> u64 {
        self.counts.get(scaffolding.as_label()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Human-readable summary block appended to exported transcripts.
    pub fn format_summary(&self) -> String {
        let mut out = String::from("\n\n========== 스캐폴딩 유형별 횟수 ==========\n");
        for scaffolding in ScaffoldingType::ALL {
            out.push_str(&format!(
                "{}: {}회\n",
                scaffolding.as_label(),
                self.get(scaffolding)
            ));
        }
        out.push_str(&format!("총 횟수: {}회\n", self.total()));
        out
    }
}

impl Default for ScaffoldingCounters {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_labels_round_trip() {
        for scaffolding in ScaffoldingType::ALL {
            if scaffolding == ScaffoldingType::Unclassified {
                continue;
            }
            assert_eq!(
                ScaffoldingType::from_label(scaffolding.as_label()),
                scaffolding
            );
        }
    }

    #[test]
    fn unknown_labels_coerce_to_unclassified() {
        assert_eq!(
            ScaffoldingType::from_label("JSON 파싱 실패"),
            ScaffoldingType::Unclassified
        );
        assert_eq!(ScaffoldingType::from_label(""), ScaffoldingType::Unclassified);
        assert_eq!(
            ScaffoldingType::from_label("  일반  "),
            ScaffoldingType::General
        );
    }

    #[test]
    fn zeroed_counters_have_exactly_six_keys() {
        let counters = ScaffoldingCounters::zeroed();
        assert_eq!(counters.counts.len(), 6);
        assert_eq!(counters.total(), 0);
    }

    #[test]
    fn increment_raises_total_by_one() {
        let mut counters = ScaffoldingCounters::zeroed();
        counters.increment(ScaffoldingType::General);
        counters.increment(ScaffoldingType::General);
        counters.increment(ScaffoldingType::Motivational);
        assert_eq!(counters.get(ScaffoldingType::General), 2);
        assert_eq!(counters.get(ScaffoldingType::Motivational), 1);
        assert_eq!(counters.total(), 3);
    }

    #[test]
    fn from_map_drops_foreign_keys() {
        let mut raw = BTreeMap::new();
        raw.insert("일반".to_string(), 4);
        raw.insert("totally-bogus".to_string(), 9);
        let counters = ScaffoldingCounters::from_map(raw);
        assert_eq!(counters.get(ScaffoldingType::General), 4);
        assert_eq!(counters.total(), 4);
        assert_eq!(counters.counts.len(), 6);
    }

    #[test]
    fn serialized_form_is_a_flat_label_map() {
        let mut counters = ScaffoldingCounters::zeroed();
        counters.increment(ScaffoldingType::Conceptual);
        let json = serde_json::to_value(&counters).unwrap();
        assert_eq!(json["개념적 스캐폴딩"], 1);
        assert_eq!(json["일반"], 0);
        assert_eq!(json.as_object().unwrap().len(), 6);
    }
}
