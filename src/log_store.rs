//! Persistent per-user transcripts and scaffolding counters.
//!
//! The transcript file is the append-only ledger of a user's experiment
//! run; the counters file is the derived aggregate. Appends never truncate
//! or reorder. Writers within one process are serialized with an advisory
//! mutex; cross-user contention does not exist because every user owns
//! their files exclusively.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::scaffolding::{ScaffoldingCounters, ScaffoldingType};
use crate::users::UserIdentity;

const TRANSCRIPT_SEPARATOR: &str = "----------------------------------------";

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Ai,
    System,
    SystemError,
}

impl Speaker {
    fn as_log_str(self) -> &'static str {
        match self {
            Speaker::User => "사용자",
            Speaker::Ai => "AI",
            Speaker::System => "System",
            Speaker::SystemError => "System_Error",
        }
    }
}

/// One immutable transcript record. `Ai` entries carry the scaffolding
/// label they were classified with (including reporting-only labels such
/// as the JSON-parse-failure marker that never reach the counters).
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub speaker: Speaker,
    pub content: String,
    pub scaffolding_label: Option<String>,
}

impl LogEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
            scaffolding_label: None,
        }
    }

    pub fn ai(content: impl Into<String>, scaffolding_label: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Ai,
            content: content.into(),
            scaffolding_label: Some(scaffolding_label.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::System,
            content: content.into(),
            scaffolding_label: None,
        }
    }

    pub fn system_error(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::SystemError,
            content: content.into(),
            scaffolding_label: None,
        }
    }
}

/// Resolved per-user file locations, fixed at session creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLogPaths {
    pub user_dir: PathBuf,
    pub transcript: PathBuf,
    pub counters: PathBuf,
}

/// File-backed store rooted at the configured logs directory.
pub struct LogStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Paths for one user's session: `logs/{name}/{ts}_{student_id}.txt`
    /// for the transcript and `logs/{name}/{student_id}_{name}.json` for
    /// the counters. The counters file is shared across that user's
    /// sessions; the transcript is per session start.
    pub fn user_paths(&self, user: &UserIdentity, session_start: DateTime<Local>) -> UserLogPaths {
        let user_dir = self.root.join(&user.name);
        let transcript = user_dir.join(format!(
            "{}_{}.txt",
            session_start.format("%Y-%m-%d_%H%M%S"),
            user.student_id
        ));
        let counters = user_dir.join(format!("{}.json", user.file_stem()));
        UserLogPaths {
            user_dir,
            transcript,
            counters,
        }
    }

    /// Append one formatted, timestamped block to the transcript,
    /// creating directories as needed. Never truncates.
    pub fn append(&self, paths: &UserLogPaths, entry: &LogEntry) -> Result<()> {
        let _guard = self.write_lock.lock().expect("log store lock poisoned");

        fs::create_dir_all(&paths.user_dir)
            .with_context(|| format!("Failed to create log directory {:?}", paths.user_dir))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&paths.transcript)
            .with_context(|| format!("Failed to open transcript {:?}", paths.transcript))?;

        file.write_all(format_entry(entry, Local::now()).as_bytes())
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to append to transcript {:?}", paths.transcript))?;
        Ok(())
    }

    /// Read the counters file, increment exactly one category, and rewrite
    /// the file in place. An absent or corrupt file re-initializes all six
    /// keys to zero before incrementing.
    pub fn increment_counter(
        &self,
        paths: &UserLogPaths,
        scaffolding: ScaffoldingType,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().expect("log store lock poisoned");

        fs::create_dir_all(&paths.user_dir)
            .with_context(|| format!("Failed to create log directory {:?}", paths.user_dir))?;

        let mut counters = read_counters(&paths.counters);
        counters.increment(scaffolding);

        let json = serde_json::to_string_pretty(&counters)
            .context("Failed to serialize scaffolding counters")?;
        fs::write(&paths.counters, json)
            .with_context(|| format!("Failed to write counters {:?}", paths.counters))?;
        Ok(())
    }

    /// Current counters for a user (zeroed when the file does not exist).
    pub fn load_counters(&self, paths: &UserLogPaths) -> ScaffoldingCounters {
        let _guard = self.write_lock.lock().expect("log store lock poisoned");
        read_counters(&paths.counters)
    }

    pub fn read_transcript(&self, paths: &UserLogPaths) -> Result<String> {
        fs::read_to_string(&paths.transcript)
            .with_context(|| format!("Failed to read transcript {:?}", paths.transcript))
    }

    /// Full export document: the raw transcript followed by the formatted
    /// per-category counter summary.
    pub fn export_document(&self, paths: &UserLogPaths) -> Result<String> {
        let transcript = self.read_transcript(paths)?;
        let counters = self.load_counters(paths);
        Ok(format!("{}{}", transcript, counters.format_summary()))
    }
}

fn read_counters(path: &Path) -> ScaffoldingCounters {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(raw) => ScaffoldingCounters::from_map(raw),
            Err(e) => {
                tracing::error!("Corrupt counters file {:?}, reinitializing: {}", path, e);
                ScaffoldingCounters::zeroed()
            }
        },
        Err(_) => ScaffoldingCounters::zeroed(),
    }
}

fn format_entry(entry: &LogEntry, now: DateTime<Local>) -> String {
    let ts = now.format("%Y-%m-%d %H:%M:%S");
    match entry.speaker {
        Speaker::Ai => {
            let label = entry.scaffolding_label.as_deref().unwrap_or("일반");
            format!(
                "[{}] AI ({}): {}\n{}\n\n",
                ts, label, entry.content, TRANSCRIPT_SEPARATOR
            )
        }
        speaker => format!("[{}] {}: {}\n\n", ts, speaker.as_log_str(), entry.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_and_paths(dir: &Path) -> (LogStore, UserLogPaths) {
        let store = LogStore::new(dir.join("logs"));
        let user = UserIdentity {
            student_id: "20250101".to_string(),
            name: "김철수".to_string(),
        };
        let paths = store.user_paths(&user, Local::now());
        (store, paths)
    }

    #[test]
    fn user_paths_follow_naming_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let (_, paths) = store_and_paths(dir.path());
        assert!(paths.user_dir.ends_with("김철수"));
        assert!(paths
            .transcript
            .to_string_lossy()
            .ends_with("_20250101.txt"));
        assert!(paths
            .counters
            .to_string_lossy()
            .ends_with("20250101_김철수.json"));
    }

    #[test]
    fn append_creates_directories_and_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (store, paths) = store_and_paths(dir.path());

        store.append(&paths, &LogEntry::user("첫 질문")).unwrap();
        store
            .append(&paths, &LogEntry::ai("첫 답변", "일반"))
            .unwrap();

        let transcript = store.read_transcript(&paths).unwrap();
        let user_idx = transcript.find("사용자: 첫 질문").unwrap();
        let ai_idx = transcript.find("AI (일반): 첫 답변").unwrap();
        assert!(user_idx < ai_idx);
        assert!(transcript.contains(TRANSCRIPT_SEPARATOR));
    }

    #[test]
    fn system_error_entries_use_error_channel_label() {
        let entry = LogEntry::system_error("API 호출 오류 발생");
        let block = format_entry(&entry, Local::now());
        assert!(block.contains("System_Error: API 호출 오류 발생"));
    }

    #[test]
    fn increment_initializes_then_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let (store, paths) = store_and_paths(dir.path());

        store
            .increment_counter(&paths, ScaffoldingType::General)
            .unwrap();
        store
            .increment_counter(&paths, ScaffoldingType::Conceptual)
            .unwrap();
        store
            .increment_counter(&paths, ScaffoldingType::General)
            .unwrap();

        let counters = store.load_counters(&paths);
        assert_eq!(counters.get(ScaffoldingType::General), 2);
        assert_eq!(counters.get(ScaffoldingType::Conceptual), 1);
        assert_eq!(counters.total(), 3);
    }

    #[test]
    fn counters_survive_reload_from_disk() {
        // Restart idempotence: a fresh store over the same directory sees
        // the same totals an uninterrupted run would have produced.
        let dir = tempfile::tempdir().unwrap();
        let sequence = [
            ScaffoldingType::General,
            ScaffoldingType::Motivational,
            ScaffoldingType::General,
            ScaffoldingType::Unclassified,
        ];

        {
            let (store, paths) = store_and_paths(dir.path());
            for s in &sequence[..2] {
                store.increment_counter(&paths, *s).unwrap();
            }
        }
        let (store, paths) = store_and_paths(dir.path());
        for s in &sequence[2..] {
            store.increment_counter(&paths, *s).unwrap();
        }

        let counters = store.load_counters(&paths);
        assert_eq!(counters.get(ScaffoldingType::General), 2);
        assert_eq!(counters.get(ScaffoldingType::Motivational), 1);
        assert_eq!(counters.get(ScaffoldingType::Unclassified), 1);
        assert_eq!(counters.total(), sequence.len() as u64);
    }

    #[test]
    fn corrupt_counters_file_reinitializes() {
        let dir = tempfile::tempdir().unwrap();
        let (store, paths) = store_and_paths(dir.path());
        fs::create_dir_all(&paths.user_dir).unwrap();
        fs::write(&paths.counters, "{broken json").unwrap();

        store
            .increment_counter(&paths, ScaffoldingType::Strategic)
            .unwrap();
        let counters = store.load_counters(&paths);
        assert_eq!(counters.get(ScaffoldingType::Strategic), 1);
        assert_eq!(counters.total(), 1);
    }

    #[test]
    fn export_document_combines_transcript_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let (store, paths) = store_and_paths(dir.path());
        store.append(&paths, &LogEntry::user("질문")).unwrap();
        store
            .increment_counter(&paths, ScaffoldingType::General)
            .unwrap();

        let document = store.export_document(&paths).unwrap();
        assert!(document.contains("사용자: 질문"));
        assert!(document.contains("스캐폴딩 유형별 횟수"));
        assert!(document.contains("일반: 1회"));
    }
}
