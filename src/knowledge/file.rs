//! File-backed knowledge sources
//!
//! Reads JSON data files from a directory, one file per jurisdiction plus
//! an optional `general_*` file merged into every jurisdiction:
//!
//! - `<code>_disclaimers.json` / `general_disclaimers.json`
//! - `<code>_advertising_rules.json` / `general_advertising_rules.json`
//! - `<code>_guidelines.json` / `general_guidelines.json`
//!
//! A missing file contributes nothing; a missing data directory or a parse
//! failure is an error, which the aggregator turns into a fallback bundle.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{AdvertisingRuleSource, DisclaimerSource, GuidelineSource};
use crate::error::{ComplianceError, Result};
use crate::types::{AdvertisingRule, ContentType, Disclaimer, EthicalGuideline, Jurisdiction};

/// File-backed implementation of all three knowledge source traits
pub struct FileKnowledgeSource {
    dir: PathBuf,
}

#[derive(Deserialize)]
struct DisclaimerFile {
    #[serde(default)]
    disclaimers: Vec<Disclaimer>,
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<AdvertisingRule>,
}

#[derive(Deserialize)]
struct GuidelineFile {
    #[serde(default)]
    guidelines: Vec<EthicalGuideline>,
}

impl FileKnowledgeSource {
    /// Create a source reading from the given data directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn check_dir(&self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(ComplianceError::Knowledge {
                provider: "file".into(),
                reason: format!("data directory {} does not exist", self.dir.display()),
            });
        }
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        file_name: &str,
    ) -> Result<Option<T>> {
        let path = self.dir.join(file_name);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            ComplianceError::Knowledge {
                provider: "file".into(),
                reason: format!("failed to read {}: {}", path.display(), e),
            }
        })?;

        let parsed = serde_json::from_slice(&bytes).map_err(|e| {
            ComplianceError::Knowledge {
                provider: "file".into(),
                reason: format!("failed to parse {}: {}", path.display(), e),
            }
        })?;

        tracing::debug!(path = %path.display(), "Knowledge data file loaded");
        Ok(Some(parsed))
    }
}

#[async_trait]
impl DisclaimerSource for FileKnowledgeSource {
    async fn fetch_disclaimers(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> Result<Vec<Disclaimer>> {
        self.check_dir()?;
        let mut disclaimers = Vec::new();

        let jurisdiction_file = format!(
            "{}_disclaimers.json",
            jurisdiction.code().to_lowercase()
        );
        if let Some(file) = self.read_json::<DisclaimerFile>(&jurisdiction_file).await? {
            disclaimers.extend(file.disclaimers);
        }
        if let Some(file) = self
            .read_json::<DisclaimerFile>("general_disclaimers.json")
            .await?
        {
            disclaimers.extend(file.disclaimers);
        }

        disclaimers.retain(|d| d.applies(jurisdiction, content_type));
        Ok(disclaimers)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[async_trait]
impl AdvertisingRuleSource for FileKnowledgeSource {
    async fn fetch_rules(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> Result<Vec<AdvertisingRule>> {
        self.check_dir()?;
        let mut rules = Vec::new();

        let jurisdiction_file = format!(
            "{}_advertising_rules.json",
            jurisdiction.code().to_lowercase()
        );
        if let Some(file) = self.read_json::<RuleFile>(&jurisdiction_file).await? {
            rules.extend(file.rules);
        }
        if let Some(file) = self
            .read_json::<RuleFile>("general_advertising_rules.json")
            .await?
        {
            rules.extend(file.rules);
        }

        rules.retain(|r| r.applies(jurisdiction, content_type));
        Ok(rules)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[async_trait]
impl GuidelineSource for FileKnowledgeSource {
    async fn fetch_guidelines(
        &self,
        jurisdiction: Jurisdiction,
        content_type: ContentType,
    ) -> Result<Vec<EthicalGuideline>> {
        self.check_dir()?;
        let mut guidelines = Vec::new();

        let jurisdiction_file =
            format!("{}_guidelines.json", jurisdiction.code().to_lowercase());
        if let Some(file) = self.read_json::<GuidelineFile>(&jurisdiction_file).await? {
            guidelines.extend(file.guidelines);
        }
        if let Some(file) = self
            .read_json::<GuidelineFile>("general_guidelines.json")
            .await?
        {
            guidelines.extend(file.guidelines);
        }

        guidelines.retain(|g| {
            g.jurisdiction.map_or(true, |j| j == jurisdiction)
                && (g.applies_to.is_empty() || g.applies_to.contains(&content_type))
        });
        Ok(guidelines)
    }

    fn name(&self) -> &str {
        "file"
    }
}
