use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_EXTRACTION_PROMPT: &str = "Extract key labor law concepts, case citations, \
important dates, parties involved, and legal principles from: {legal_documents}. \
Format as structured data with clear categories.";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
}

fn default_headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_extraction_input")]
    pub input_object: String,
    #[serde(default = "default_extraction_output")]
    pub output_object: String,
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            input_object: default_extraction_input(),
            output_object: default_extraction_output(),
            prompt: default_prompt(),
        }
    }
}

fn default_extraction_input() -> String {
    "legal_documents".to_string()
}
fn default_extraction_output() -> String {
    "extracted_info".to_string()
}
fn default_prompt() -> String {
    DEFAULT_EXTRACTION_PROMPT.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_input")]
    pub input_object: String,
    #[serde(default = "default_analysis_output")]
    pub output_object: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input_object: default_analysis_input(),
            output_object: default_analysis_output(),
        }
    }
}

fn default_analysis_input() -> String {
    "uploaded_document".to_string()
}
fn default_analysis_output() -> String {
    "analysis_result".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_file")]
    pub file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_name: default_export_file(),
        }
    }
}

fn default_export_file() -> String {
    "extracted_legal_data.csv".to_string()
}

impl Config {
    /// All-defaults configuration pointing at `base_url`.
    pub fn minimal(base_url: &str) -> Self {
        Self {
            service: ServiceConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                headers: default_headers(),
            },
            extraction: ExtractionConfig::default(),
            analysis: AnalysisConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(config)
}

/// Check invariants and normalize the base URL.
pub fn validate(mut config: Config) -> Result<Config> {
    let base = config
        .service
        .base_url
        .trim()
        .trim_end_matches('/')
        .to_string();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        anyhow::bail!(
            "service.base_url must start with http:// or https:// (got '{}')",
            config.service.base_url
        );
    }
    config.service.base_url = base;

    // Validate extraction
    let ex = &config.extraction;
    if ex.input_object.trim().is_empty() || ex.output_object.trim().is_empty() {
        anyhow::bail!("extraction.input_object and extraction.output_object must not be empty");
    }
    let token = format!("{{{}}}", ex.input_object);
    if !ex.prompt.contains(&token) {
        anyhow::bail!(
            "extraction.prompt must reference its input with the placeholder '{}'",
            token
        );
    }

    // Validate analysis
    if config.analysis.input_object.trim().is_empty()
        || config.analysis.output_object.trim().is_empty()
    {
        anyhow::bail!("analysis.input_object and analysis.output_object must not be empty");
    }

    if config.export.file_name.trim().is_empty() {
        anyhow::bail!("export.file_name must not be empty");
    }

    Ok(config)
}
