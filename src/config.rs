use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub author: AuthorConfig,
    #[serde(default)]
    pub vocabulary: VocabularyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthorConfig {
    #[serde(default = "default_author")]
    pub name: String,
}

impl Default for AuthorConfig {
    fn default() -> Self {
        Self {
            name: default_author(),
        }
    }
}

fn default_author() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct VocabularyConfig {
    #[serde(default = "default_types")]
    pub types: Vec<String>,
    #[serde(default = "default_statuses")]
    pub statuses: Vec<String>,
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            types: default_types(),
            statuses: default_statuses(),
            labels: default_labels(),
            users: Vec::new(),
        }
    }
}

fn default_types() -> Vec<String> {
    ["Information", "Coordination", "Clash", "Request"]
        .map(String::from)
        .to_vec()
}

fn default_statuses() -> Vec<String> {
    ["Active", "In Progress", "Review", "Done"]
        .map(String::from)
        .to_vec()
}

fn default_labels() -> Vec<String> {
    ["Architecture", "Structure", "MEP"].map(String::from).to_vec()
}

/// Vocabulary sets for topic classification, built once from config and
/// passed explicitly into the store and the RDI controller.
///
/// Membership is a soft constraint: out-of-set values are tolerated as
/// free text, they just lose the guarantees of the configured sets.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub types: Vec<String>,
    pub statuses: Vec<String>,
    pub labels: Vec<String>,
    pub users: Vec<String>,
}

impl Vocabulary {
    pub fn from_config(config: &VocabularyConfig) -> Self {
        Self {
            types: config.types.clone(),
            statuses: config.statuses.clone(),
            labels: config.labels.clone(),
            users: config.users.clone(),
        }
    }

    pub fn has_type(&self, value: &str) -> bool {
        self.types.iter().any(|t| t == value)
    }

    pub fn has_status(&self, value: &str) -> bool {
        self.statuses.iter().any(|s| s == value)
    }

    pub fn has_label(&self, value: &str) -> bool {
        self.labels.iter().any(|l| l == value)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.vocabulary.types.is_empty() {
        anyhow::bail!("vocabulary.types must not be empty");
    }

    if config.vocabulary.statuses.is_empty() {
        anyhow::bail!("vocabulary.statuses must not be empty");
    }

    if config.author.name.trim().is_empty() {
        anyhow::bail!("author.name must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: Config = toml::from_str("[db]\npath = \"./data/bcf.sqlite\"\n").unwrap();
        assert_eq!(config.author.name, "anonymous");
        assert!(config.vocabulary.statuses.contains(&"Active".to_string()));
    }

    #[test]
    fn vocabulary_membership_is_exact() {
        let vocab = Vocabulary::from_config(&VocabularyConfig::default());
        assert!(vocab.has_status("Active"));
        assert!(!vocab.has_status("active"));
        assert!(!vocab.has_type("Totally Made Up"));
    }
}
