//! Static reference data served by the lookup tools.
//!
//! The library is a categorized listing of digital tools students can use
//! while designing their learning activity. It is loaded (or defaulted)
//! once at startup and shared read-only; the lookup tools never mutate it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub name: String,
    pub description: String,
}

/// Categorized reference-tool listings, keyed by category label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceLibrary {
    categories: BTreeMap<String, Vec<ReferenceEntry>>,
}

impl ReferenceLibrary {
    /// Load the library from a JSON file, falling back to the built-in
    /// dataset when the file is absent or unreadable.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ReferenceLibrary>(&contents) {
                Ok(library) => {
                    tracing::info!(
                        "Loaded {} reference categories from {:?}",
                        library.categories.len(),
                        path
                    );
                    library
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to parse reference library {:?}, using built-in data: {}",
                        path,
                        e
                    );
                    Self::builtin()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Reference library {:?} unavailable, using built-in data: {}",
                    path,
                    e
                );
                Self::builtin()
            }
        }
    }

    pub fn categories(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }

    pub fn lookup(&self, category: &str) -> Option<&[ReferenceEntry]> {
        self.categories
            .get(category.trim())
            .map(Vec::as_slice)
    }

    /// Built-in dataset used when no external file is configured.
    pub fn builtin() -> Self {
        fn entry(name: &str, description: &str) -> ReferenceEntry {
            ReferenceEntry {
                name: name.to_string(),
                description: description.to_string(),
            }
        }

        let mut categories = BTreeMap::new();
        categories.insert(
            "협업".to_string(),
            vec![
                entry("Padlet", "의견을 카드 형태로 모아 공유하는 협업 게시판"),
                entry("Google Docs", "여러 명이 동시에 작성하는 공동 문서 도구"),
                entry("Miro", "아이디어를 함께 정리하는 온라인 화이트보드"),
            ],
        );
        categories.insert(
            "조사".to_string(),
            vec![
                entry("Google Forms", "설문을 만들어 응답을 수집하는 도구"),
                entry("Naver 지식백과", "개념과 배경지식을 조사할 수 있는 백과 서비스"),
            ],
        );
        categories.insert(
            "시각화".to_string(),
            vec![
                entry("Canva", "포스터와 발표 자료를 만드는 디자인 도구"),
                entry("Google Slides", "조사 결과를 발표 자료로 정리하는 도구"),
            ],
        );
        categories.insert(
            "평가".to_string(),
            vec![
                entry("Kahoot", "퀴즈로 학습 내용을 점검하는 게임형 평가 도구"),
                entry("Mentimeter", "실시간 투표와 소감 수집 도구"),
            ],
        );
        Self { categories }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_library_has_categories_with_entries() {
        let library = ReferenceLibrary::builtin();
        assert!(!library.categories().is_empty());
        let entries = library.lookup("협업").unwrap();
        assert!(!entries.is_empty());
    }

    #[test]
    fn lookup_trims_and_misses_unknown_category() {
        let library = ReferenceLibrary::builtin();
        assert!(library.lookup(" 협업 ").is_some());
        assert!(library.lookup("없는분류").is_none());
    }

    #[test]
    fn loads_library_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"실험": [{{"name": "도구A", "description": "설명A"}}]}}"#
        )
        .unwrap();
        let library = ReferenceLibrary::load(Some(file.path()));
        assert_eq!(library.categories(), vec!["실험"]);
        assert_eq!(library.lookup("실험").unwrap()[0].name, "도구A");
    }

    #[test]
    fn unreadable_file_falls_back_to_builtin() {
        let library = ReferenceLibrary::load(Some(Path::new("/nonexistent/ref.json")));
        assert!(library.lookup("협업").is_some());
    }
}
