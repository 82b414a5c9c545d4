//! System-context assembly.
//!
//! The integrated system prompt is concatenated once at bootstrap from a
//! fixed, ordered set of markdown fragments in the prompts directory and
//! shared read-only by every session afterwards. A missing fragment is
//! substituted with an empty string and logged; it never fails startup.

use std::fs;
use std::path::{Path, PathBuf};

/// Immutable prompt material assembled at bootstrap.
///
/// `system_context` is the full instruction document sent as the `system`
/// message on every model call. The raw situational fragments are kept
/// alongside it because the briefing endpoint serves them verbatim.
#[derive(Debug, Clone)]
pub struct AssembledPrompts {
    pub system_context: String,
    pub situation: String,
    pub rules: String,
    pub task: String,
}

pub struct PromptAssembler {
    prompts_dir: PathBuf,
}

impl PromptAssembler {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
        }
    }

    /// Assemble the integrated system context. Fragment order is fixed:
    /// base instructions, then situation, rules, and task under the task
    /// background template, then any knowledge-base documents.
    pub fn assemble(&self) -> AssembledPrompts {
        let base = self.read_fragment("system_prompt.md");
        let situation = self.read_fragment("situation.md");
        let rules = self.read_fragment("rules.md");
        let task = self.read_fragment("task.md");

        let mut system_context = format!(
            "{base}\n\
             ---\n\
             # [과제 배경지식]\n\
             너는 지금부터 아래에 제시된 문제 상황을 해결하기 위해 사용자와 대화해야 한다. \
             모든 스캐폴딩과 답변은 반드시 이 배경지식을 기반으로 이루어져야 한다.\n\
             ## 1. 현재 상황\n{situation}\n\
             ## 2. 관련 규칙\n{rules}\n\
             ## 3. 해결 과제\n{task}\n\
             ---\n"
        );

        let knowledge = self.read_knowledge_documents();
        if !knowledge.is_empty() {
            system_context.push_str("# [참고 자료]\n");
            for (name, body) in knowledge {
                system_context.push_str(&format!("## {name}\n{body}\n"));
            }
            system_context.push_str("---\n");
        }

        AssembledPrompts {
            system_context,
            situation,
            rules,
            task,
        }
    }

    fn read_fragment(&self, name: &str) -> String {
        let path = self.prompts_dir.join(name);
        match fs::read_to_string(&path) {
            Ok(text) => text.trim_end().to_string(),
            Err(e) => {
                tracing::warn!("Prompt fragment {:?} unavailable, substituting empty: {}", path, e);
                String::new()
            }
        }
    }

    /// Optional knowledge-base documents under `knowledge/`, sorted by
    /// file name so the assembled context is deterministic.
    fn read_knowledge_documents(&self) -> Vec<(String, String)> {
        let dir = self.prompts_dir.join("knowledge");
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut docs: Vec<(String, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("md"))
            .filter_map(|path| {
                let name = path.file_stem()?.to_string_lossy().to_string();
                Some((name, path))
            })
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));

        docs.into_iter()
            .filter_map(|(name, path)| match fs::read_to_string(&path) {
                Ok(body) => Some((name, body.trim_end().to_string())),
                Err(e) => {
                    tracing::warn!("Skipping unreadable knowledge document {:?}: {}", path, e);
                    None
                }
            })
            .collect()
    }
}

/// Convenience used by tests and bootstrap alike.
pub fn assemble_from_dir(prompts_dir: &Path) -> AssembledPrompts {
    PromptAssembler::new(prompts_dir).assemble()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn assembles_fragments_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("system_prompt.md"), "BASE").unwrap();
        fs::write(dir.path().join("situation.md"), "SITUATION").unwrap();
        fs::write(dir.path().join("rules.md"), "RULES").unwrap();
        fs::write(dir.path().join("task.md"), "TASK").unwrap();

        let prompts = assemble_from_dir(dir.path());
        let base_idx = prompts.system_context.find("BASE").unwrap();
        let situation_idx = prompts.system_context.find("SITUATION").unwrap();
        let rules_idx = prompts.system_context.find("RULES").unwrap();
        let task_idx = prompts.system_context.find("TASK").unwrap();
        assert!(base_idx < situation_idx && situation_idx < rules_idx && rules_idx < task_idx);
        assert_eq!(prompts.situation, "SITUATION");
    }

    #[test]
    fn missing_fragment_substitutes_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("system_prompt.md"), "BASE").unwrap();

        let prompts = assemble_from_dir(dir.path());
        assert!(prompts.system_context.contains("BASE"));
        assert!(prompts.rules.is_empty());
        assert!(prompts.system_context.contains("## 2. 관련 규칙"));
    }

    #[test]
    fn knowledge_documents_are_appended_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("system_prompt.md"), "BASE").unwrap();
        let knowledge = dir.path().join("knowledge");
        fs::create_dir(&knowledge).unwrap();
        fs::write(knowledge.join("b_second.md"), "SECOND").unwrap();
        fs::write(knowledge.join("a_first.md"), "FIRST").unwrap();
        fs::write(knowledge.join("ignored.txt"), "NOPE").unwrap();

        let prompts = assemble_from_dir(dir.path());
        let first_idx = prompts.system_context.find("FIRST").unwrap();
        let second_idx = prompts.system_context.find("SECOND").unwrap();
        assert!(first_idx < second_idx);
        assert!(!prompts.system_context.contains("NOPE"));
    }
}
