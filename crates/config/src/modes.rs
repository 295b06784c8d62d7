//! Per-mode committee + deadline schema: the YAML shape spec.md §6 names
//! (`modes: {<name>: {committee, soft_deadline_s, hard_deadline_s, grace_s,
//! require_heavy}}`, `conductor: {...}`), loaded from the path a vote
//! request names.
//!
//! Per spec.md Design Notes §9 ("define a typed schema... reject unknown
//! fields"), `serde(deny_unknown_fields)` on the on-disk shape prevents a
//! typo in a deadline field name from silently falling back to a default.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use orchestrator_core::{CommitteeMember, ModeConfig};

use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModeEntry {
    committee: Vec<CommitteeMember>,
    soft_deadline_s: f32,
    hard_deadline_s: f32,
    grace_s: f32,
    require_heavy: bool,
}

/// The on-disk representation of a consensus config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModesFile {
    modes: HashMap<String, ModeEntry>,
    conductor: CommitteeMember,
}

/// Parse `path` and extract the `ModeConfig` for `mode`, failing fast
/// (spec.md §4.7 step 2) if the file is missing, malformed, or the mode is
/// unknown.
pub fn load_mode_config(path: &str, mode: &str) -> Result<ModeConfig, ConfigError> {
    if !Path::new(path).exists() {
        return Err(ConfigError::FileNotFound(path.to_string()));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path, e)))?;
    let file: ModesFile = serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path, e)))?;

    let entry = file
        .modes
        .get(mode)
        .ok_or_else(|| ConfigError::UnknownMode(mode.to_string()))?;

    let cfg = ModeConfig {
        committee: entry.committee.clone(),
        soft_deadline_s: entry.soft_deadline_s,
        grace_s: entry.grace_s,
        hard_deadline_s: entry.hard_deadline_s,
        require_heavy: entry.require_heavy,
        conductor: file.conductor.clone(),
    };
    cfg.validate()
        .map_err(|message| ConfigError::InvalidValue {
            field: format!("modes.{}", mode),
            message,
        })?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const SAMPLE: &str = r#"
modes:
  precision:
    committee:
      - role: analyst
        model_id: qwen32b-instruct
      - role: creative
        model_id: llama3.2:3b-instruct
    soft_deadline_s: 4.0
    grace_s: 3.0
    hard_deadline_s: 12.0
    require_heavy: true
conductor:
  role: conductor
  model_id: llama3.2:3b-instruct
  system_prompt: "You synthesize committee answers."
"#;

    #[test]
    fn loads_known_mode() {
        let f = write_temp(SAMPLE);
        let cfg = load_mode_config(f.path().to_str().unwrap(), "precision").unwrap();
        assert_eq!(cfg.committee.len(), 2);
        assert!(cfg.require_heavy);
        assert_eq!(cfg.conductor.role, "conductor");
    }

    #[test]
    fn unknown_mode_fails_fast() {
        let f = write_temp(SAMPLE);
        let err = load_mode_config(f.path().to_str().unwrap(), "nope").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMode(m) if m == "nope"));
    }

    #[test]
    fn missing_file_fails_fast() {
        let err = load_mode_config("/no/such/path.yaml", "precision").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn rejects_invalid_deadline_ordering() {
        let bad = SAMPLE.replace("hard_deadline_s: 12.0", "hard_deadline_s: 5.0");
        let f = write_temp(&bad);
        let err = load_mode_config(f.path().to_str().unwrap(), "precision").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
