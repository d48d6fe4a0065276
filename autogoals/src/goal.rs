use serde::{Deserialize, Deserializer, Serialize};

/// Default bound on verification retries when a goal does not declare one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Parsed `goals.yaml`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoalsFile {
    /// Accepts `1.0` as well as `"1.0"`; stored as text either way.
    #[serde(default = "default_version", deserialize_with = "version_text")]
    pub version: String,
    #[serde(default)]
    pub project_name: String,
    pub goals: Vec<Goal>,
}

/// A unit of declared work. Immutable for the duration of a run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goal {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub verification_commands: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

impl Goal {
    /// Display name, falling back to the id when `name` is blank.
    pub fn title(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl GoalsFile {
    pub fn find(&self, id: &str) -> Option<&Goal> {
        self.goals.iter().find(|goal| goal.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.goals.iter().map(|goal| goal.id.as_str())
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn version_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Version::deserialize(deserializer)? {
        Version::Text(text) => text,
        Version::Number(number) => number.to_string(),
    })
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Sample goal file written by `autogoals init`.
pub const SAMPLE_GOALS_YAML: &str = r#"version: "1.0"
project_name: my-project
goals:
  - id: setup
    name: Project setup
    description: Create the project skeleton and build tooling.
    dependencies: []
    acceptance_criteria:
      - The project builds from a clean checkout
    verification_commands:
      - "test -f README.md"
    max_retries: 3
  - id: feature
    name: First feature
    description: Implement the first user-facing feature.
    dependencies: [setup]
    acceptance_criteria:
      - The feature is covered by tests
    verification_commands: []
    max_retries: 3
"#;
