//! Goal list loading with schema and invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::invariants::validate_goal_invariants;
use crate::error::ConfigurationError;
use crate::goal::GoalsFile;

const GOALS_SCHEMA: &str = include_str!("../../schemas/goals.schema.json");

/// Load and validate `goals.yaml` (YAML syntax, schema, id invariants).
///
/// Every failure is a [`ConfigurationError`] naming the file.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_goals(path: &Path) -> Result<GoalsFile> {
    let contents = fs::read_to_string(path)
        .map_err(|err| ConfigurationError::new(path, format!("read failed: {err}")))?;
    let file = parse_goals(path, &contents)?;
    debug!(goals = file.goals.len(), "goal list loaded");
    Ok(file)
}

/// Parse goal-list text. `path` is used for error reporting only.
pub fn parse_goals(path: &Path, contents: &str) -> Result<GoalsFile> {
    let value: Value = serde_yaml::from_str(contents)
        .map_err(|err| ConfigurationError::new(path, format!("invalid YAML: {err}")))?;
    validate_schema(&value).map_err(|err| ConfigurationError::new(path, format!("{err:#}")))?;
    let file: GoalsFile = serde_json::from_value(value)
        .map_err(|err| ConfigurationError::new(path, format!("invalid goal list: {err}")))?;

    let errors = validate_goal_invariants(&file.goals);
    if !errors.is_empty() {
        return Err(ConfigurationError::new(path, errors.join("; ")).into());
    }
    Ok(file)
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(GOALS_SCHEMA)?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    let messages = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect::<Vec<_>>();
    if !messages.is_empty() {
        return Err(anyhow!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::SAMPLE_GOALS_YAML;

    fn config_error(err: &anyhow::Error) -> &ConfigurationError {
        err.downcast_ref::<ConfigurationError>()
            .expect("configuration error")
    }

    #[test]
    fn loads_sample_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("goals.yaml");
        fs::write(&path, SAMPLE_GOALS_YAML).expect("write");
        let file = load_goals(&path).expect("load");
        assert_eq!(file.project_name, "my-project");
        assert_eq!(file.goals.len(), 2);
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("goals.yaml");
        let err = load_goals(&path).expect_err("missing");
        assert_eq!(config_error(&err).path, path);
    }

    #[test]
    fn malformed_yaml_names_the_file() {
        let path = Path::new("goals.yaml");
        let err = parse_goals(path, "goals: [\n  - id: a\n").expect_err("bad yaml");
        let config = config_error(&err);
        assert!(config.reason.contains("invalid YAML"));
        assert!(err.to_string().contains("goals.yaml"));
    }

    #[test]
    fn schema_rejects_wrong_types() {
        let path = Path::new("goals.yaml");
        let err = parse_goals(path, "goals:\n  - id: a\n    max_retries: -1\n")
            .expect_err("negative retries");
        assert!(config_error(&err).reason.contains("schema validation failed"));

        let err = parse_goals(path, "goals: []\n").expect_err("empty");
        assert!(config_error(&err).reason.contains("schema validation failed"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let path = Path::new("goals.yaml");
        let err = parse_goals(path, "goals:\n  - id: a\n  - id: a\n").expect_err("dup");
        assert!(config_error(&err).reason.contains("duplicate goal id 'a'"));
    }

    #[test]
    fn unquoted_numeric_version_is_kept_as_text() {
        let path = Path::new("goals.yaml");
        let file = parse_goals(path, "version: 1.0\ngoals:\n  - id: a\n").expect("float version");
        assert_eq!(file.version, "1.0");

        let file = parse_goals(path, "version: 2\ngoals:\n  - id: a\n").expect("integer version");
        assert_eq!(file.version, "2");

        let file = parse_goals(path, "goals:\n  - id: a\n").expect("default version");
        assert_eq!(file.version, "1.0");
    }
}
