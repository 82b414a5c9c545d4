//! Static participant registry.
//!
//! Participants are authenticated by a `(student_id, name)` lookup against
//! a JSON file loaded once at startup. There is intentionally no password
//! or token scheme; this mirrors the experiment's closed participant list.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Identity of an authenticated participant. Immutable for the lifetime
/// of a session; determines the per-user log directory and file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub student_id: String,
    pub name: String,
}

impl UserIdentity {
    /// Stem used for the counters file: `{student_id}_{name}`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.student_id, self.name)
    }
}

/// Registry of authorized participants, keyed by student id.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: HashMap<String, String>,
}

impl UserRegistry {
    /// Load the registry from a JSON map of `{student_id: name}`.
    ///
    /// A missing or unreadable file degrades to an empty registry with a
    /// diagnostic rather than failing startup, matching the rest of the
    /// bootstrap path.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<HashMap<String, String>>(&contents) {
                Ok(users) => {
                    tracing::info!("Loaded {} authorized users from {:?}", users.len(), path);
                    Self { users }
                }
                Err(e) => {
                    tracing::error!("Failed to parse user registry {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!("Failed to read user registry {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn from_map(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Authenticate a login attempt. Inputs are trimmed; the registered
    /// name must match exactly.
    pub fn authenticate(&self, student_id: &str, name: &str) -> Option<UserIdentity> {
        let student_id = student_id.trim();
        let name = name.trim();
        match self.users.get(student_id) {
            Some(expected) if expected == name => Some(UserIdentity {
                student_id: student_id.to_string(),
                name: name.to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn registry() -> UserRegistry {
        let mut users = HashMap::new();
        users.insert("20250101".to_string(), "김철수".to_string());
        UserRegistry::from_map(users)
    }

    #[test]
    fn authenticates_registered_user_with_trimmed_input() {
        let registry = registry();
        let identity = registry.authenticate(" 20250101 ", " 김철수 ").unwrap();
        assert_eq!(identity.student_id, "20250101");
        assert_eq!(identity.name, "김철수");
        assert_eq!(identity.file_stem(), "20250101_김철수");
    }

    #[test]
    fn rejects_wrong_name_or_unknown_id() {
        let registry = registry();
        assert!(registry.authenticate("20250101", "영희").is_none());
        assert!(registry.authenticate("99999999", "김철수").is_none());
    }

    #[test]
    fn missing_registry_file_degrades_to_empty() {
        let registry = UserRegistry::load(Path::new("/nonexistent/users.json"));
        assert!(registry.is_empty());
    }

    #[test]
    fn loads_registry_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"20250101": "김철수", "20250102": "이영희"}}"#).unwrap();
        let registry = UserRegistry::load(file.path());
        assert_eq!(registry.len(), 2);
        assert!(registry.authenticate("20250102", "이영희").is_some());
    }
}
