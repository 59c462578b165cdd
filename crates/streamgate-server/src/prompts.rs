//! Prompt loading and variable substitution.
//!
//! Prompts are `*.txt` files in a configurable folder (default `./prompts`).
//! A first line starting with `#` is the description; the remainder is the
//! prompt body. `{{VAR}}` placeholders are substituted from configuration at
//! read time.

use crate::config::Config;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const PROMPT_EXTENSION: &str = "txt";
const DEFAULT_FOLDER: &str = "prompts";
const DESCRIPTION_PREVIEW_LEN: usize = 50;

/// A loaded prompt.
#[derive(Debug, Clone)]
pub struct LoadedPrompt {
    pub name: String,
    pub description: String,
    pub content: String,
}

/// Loads and serves prompts from folders on disk.
///
/// The directives folder, when configured, is loaded the same way and its
/// entries join the prompt catalog.
#[derive(Debug, Default)]
pub struct PromptManager {
    prompts: HashMap<String, LoadedPrompt>,
    folder: PathBuf,
    directives_folder: Option<PathBuf>,
}

impl PromptManager {
    #[must_use]
    pub fn new(folder: Option<&str>, directives_folder: Option<&str>) -> Self {
        Self {
            prompts: HashMap::new(),
            folder: folder.map_or_else(|| PathBuf::from(DEFAULT_FOLDER), PathBuf::from),
            directives_folder: directives_folder.map(PathBuf::from),
        }
    }

    /// Load all prompt files from the configured folders.
    ///
    /// A missing folder is not an error: the server simply advertises no
    /// prompts.
    ///
    /// # Errors
    ///
    /// Returns an error when a folder exists but a file in it cannot be
    /// read.
    pub fn load(&mut self) -> std::io::Result<()> {
        self.prompts.clear();

        let folder = self.folder.clone();
        self.load_folder(&folder)?;
        if let Some(directives) = self.directives_folder.clone() {
            self.load_folder(&directives)?;
        }

        tracing::info!(count = self.prompts.len(), "loaded prompts");
        Ok(())
    }

    fn load_folder(&mut self, folder: &Path) -> std::io::Result<()> {
        if !folder.exists() {
            tracing::debug!(folder = %folder.display(), "prompts folder not found");
            return Ok(());
        }

        for entry in std::fs::read_dir(folder)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PROMPT_EXTENSION) {
                continue;
            }
            self.load_file(&path)?;
        }

        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> std::io::Result<()> {
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if name.is_empty() {
            return Ok(());
        }

        let (description, body) = parse_prompt_content(&content);
        self.prompts.insert(
            name.clone(),
            LoadedPrompt {
                name,
                description,
                content: body,
            },
        );
        Ok(())
    }

    /// All loaded prompts, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<&LoadedPrompt> {
        let mut prompts: Vec<&LoadedPrompt> = self.prompts.values().collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LoadedPrompt> {
        self.prompts.get(name)
    }

    /// Prompt body with `{{VAR}}` placeholders substituted from config.
    #[must_use]
    pub fn content_with_substitution(&self, name: &str, cfg: &Config) -> Option<String> {
        self.get(name).map(|p| substitute_variables(&p.content, cfg))
    }
}

/// First `#`-prefixed line is the description; everything else is the body.
fn parse_prompt_content(content: &str) -> (String, String) {
    let mut description = String::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut description_found = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if !description_found && trimmed.starts_with('#') {
            description = trimmed.trim_start_matches('#').trim().to_string();
            description_found = true;
        } else if !trimmed.is_empty() || description_found {
            body_lines.push(line);
        }
    }

    let body = body_lines.join("\n").trim().to_string();

    if description.is_empty() {
        let preview: String = body.chars().take(DESCRIPTION_PREVIEW_LEN).collect();
        description = if body.chars().count() > DESCRIPTION_PREVIEW_LEN {
            format!("Prompt: {preview}...")
        } else {
            format!("Prompt: {preview}")
        };
    }

    (description, body)
}

fn substitute_variables(content: &str, cfg: &Config) -> String {
    let replacements = [
        ("{{CLOUD_ENV_ID}}", cfg.cloud_env_id.as_str()),
        ("{{KAFKA_CLUSTER_ID}}", cfg.kafka_cluster_id.as_str()),
        ("{{KAFKA_REST_ENDPOINT}}", cfg.kafka_rest_endpoint.as_str()),
        ("{{BOOTSTRAP_SERVERS}}", cfg.bootstrap_servers.as_str()),
        ("{{FLINK_ORG_ID}}", cfg.flink_org_id.as_str()),
        ("{{FLINK_ENV_NAME}}", cfg.flink_env_name.as_str()),
        ("{{FLINK_DATABASE_NAME}}", cfg.flink_database_name.as_str()),
        ("{{FLINK_COMPUTE_POOL_ID}}", cfg.flink_compute_pool_id.as_str()),
        (
            "{{SCHEMA_REGISTRY_ENDPOINT}}",
            cfg.schema_registry_endpoint.as_str(),
        ),
    ];

    let mut result = content.to_string();
    for (placeholder, value) in replacements {
        if result.contains(placeholder) {
            result = result.replace(placeholder, value);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use std::io::Write as _;

    fn manager_with(files: &[(&str, &str)]) -> PromptManager {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
            file.write_all(content.as_bytes()).unwrap();
        }
        let mut manager = PromptManager::new(dir.path().to_str(), None);
        manager.load().unwrap();
        // Keep the tempdir alive for the duration of the test by leaking it;
        // contents were already read into memory anyway.
        std::mem::forget(dir);
        manager
    }

    #[test]
    fn loads_txt_files_and_parses_descriptions() {
        let manager = manager_with(&[
            (
                "list-topics.txt",
                "# List topics in the default cluster\nList all topics.",
            ),
            ("notes.md", "ignored"),
        ]);

        let prompts = manager.list();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].name, "list-topics");
        assert_eq!(prompts[0].description, "List topics in the default cluster");
        assert_eq!(prompts[0].content, "List all topics.");
    }

    #[test]
    fn missing_description_gets_a_preview() {
        let manager = manager_with(&[("plain.txt", "Do the thing with the cluster.")]);
        let prompt = manager.get("plain").unwrap();
        assert!(prompt.description.starts_with("Prompt: Do the thing"));
    }

    #[test]
    fn missing_folder_is_not_an_error() {
        let mut manager = PromptManager::new(Some("/nonexistent/prompts"), None);
        manager.load().unwrap();
        assert!(manager.list().is_empty());
    }

    #[test]
    fn substitutes_config_variables() {
        let manager = manager_with(&[(
            "cluster.txt",
            "# Cluster context\nUse cluster {{KAFKA_CLUSTER_ID}} in {{CLOUD_ENV_ID}}.",
        )]);

        let cfg = test_config();
        let content = manager.content_with_substitution("cluster", &cfg).unwrap();
        assert_eq!(content, "Use cluster lkc-abc123 in env-abc123.");
    }
}
