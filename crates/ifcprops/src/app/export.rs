//! Export of aggregated property snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::app::store::{Generation, StoreSnapshot};
use crate::domain::errors::DomainError;
use crate::domain::model::{ElementId, PropertyRecord};
use crate::infra::config::Config;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum ExportFormat {
    /// JSON document keyed by element id.
    Json,
    /// Markdown report rendered from a template.
    Markdown,
}

impl ExportFormat {
    /// Return a stable identifier for templates and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "markdown",
        }
    }

    /// Recommended file extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportFormatParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(ExportFormatParseError::UnknownFormat(other.to_string())),
        }
    }
}

/// Error returned when parsing an [`ExportFormat`] fails.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ExportFormatParseError {
    #[error("unknown export format '{0}'")]
    UnknownFormat(String),
}

/// Runtime options controlling export behavior.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub template: String,
    pub pretty: bool,
    pub output_path: Option<PathBuf>,
}

impl ExportOptions {
    /// Build options from configuration defaults without an output file.
    ///
    /// Fails when the configured format is unknown.
    pub fn from_config(config: &Config) -> Result<Self, ExportFormatParseError> {
        Ok(Self {
            format: config.export.format().parse()?,
            template: config.export.template(),
            pretty: config.export.pretty(),
            output_path: None,
        })
    }

    /// Options for exporting the current selection to its fixed file name.
    pub fn for_selection(config: &Config) -> Result<Self, ExportFormatParseError> {
        let mut options = Self::from_config(config)?;
        options.output_path = Some(PathBuf::from(config.export.selection_file()));
        Ok(options)
    }

    /// Options for exporting every element of the model to its fixed file name.
    pub fn for_bulk(config: &Config) -> Result<Self, ExportFormatParseError> {
        let mut options = Self::from_config(config)?;
        options.output_path = Some(PathBuf::from(config.export.bulk_file()));
        Ok(options)
    }
}

/// Result of an export operation.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub rendered: String,
    pub output_path: Option<PathBuf>,
    pub elements: usize,
}

/// Serialized form of a [`StoreSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub generated_at: String,
    pub generation: Generation,
    pub elements: BTreeMap<ElementId, PropertyRecord>,
    pub failed: Vec<ElementId>,
}

impl ExportDocument {
    pub fn from_snapshot(snapshot: &StoreSnapshot) -> Result<Self> {
        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("failed to format export timestamp")?;
        Ok(Self {
            generated_at,
            generation: snapshot.generation,
            elements: snapshot.records.clone(),
            failed: snapshot.failed_ids(),
        })
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).context("failed to serialize export document")
    }
}

/// Responsible for rendering snapshots and writing artifacts.
pub struct Exporter {
    env: Environment<'static>,
}

impl Exporter {
    /// Create a new exporter with built-in templates loaded.
    pub fn new() -> Result<Self> {
        Ok(Self {
            env: default_environment()?,
        })
    }

    /// Render a snapshot into a string using the supplied options.
    pub fn render(&self, snapshot: &StoreSnapshot, options: &ExportOptions) -> Result<String> {
        let document = ExportDocument::from_snapshot(snapshot)?;
        match options.format {
            ExportFormat::Json if options.pretty => {
                serde_json::to_string_pretty(&document).context("failed to serialize export")
            }
            ExportFormat::Json => {
                serde_json::to_string(&document).context("failed to serialize export")
            }
            ExportFormat::Markdown => {
                let context = build_template_context(&document);
                self.render_with_template(&context, &options.template)
            }
        }
    }

    /// Render the snapshot and persist it based on options. Empty snapshots are rejected.
    pub fn export(
        &self,
        snapshot: &StoreSnapshot,
        options: &ExportOptions,
    ) -> Result<ExportResult, DomainError> {
        if snapshot.is_empty() {
            return Err(DomainError::precondition(
                "no element properties to export; select elements first",
            ));
        }

        let rendered = self.render(snapshot, options).map_err(DomainError::Export)?;

        if let Some(path) = &options.output_path {
            write_output(path, &rendered).map_err(DomainError::Export)?;
            tracing::info!(path = %path.display(), elements = snapshot.len(), "export written");
        }

        Ok(ExportResult {
            rendered,
            output_path: options.output_path.clone(),
            elements: snapshot.len(),
        })
    }

    fn render_with_template(
        &self,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<String> {
        if let Ok(template) = self.env.get_template(template_name) {
            return template
                .render(context)
                .map_err(|err| anyhow!("failed to render template '{template_name}': {err}"));
        }

        let template_path = Path::new(template_name);
        if template_path.exists() {
            let source = fs::read_to_string(template_path).with_context(|| {
                format!(
                    "failed to load template from path {}",
                    template_path.display()
                )
            })?;
            let mut env = Environment::new();
            env.set_trim_blocks(true);
            env.set_lstrip_blocks(true);
            env.add_template("external", &source)
                .map_err(|err| anyhow!("invalid template '{}': {err}", template_name))?;
            return env
                .get_template("external")
                .and_then(|template| template.render(context))
                .map_err(|err| anyhow!("failed to render template '{template_name}': {err}"));
        }

        Err(anyhow!(
            "template '{}' not found (built-in or filesystem)",
            template_name
        ))
    }
}

fn write_output(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create export directory: {}", parent.display()))?;
    }
    fs::write(path, rendered)
        .with_context(|| format!("failed to write export output to {}", path.display()))
}

fn default_environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template("element_report", DEFAULT_MARKDOWN_TEMPLATE)
        .map_err(|err| anyhow!("failed to register default markdown template: {err}"))?;
    Ok(env)
}

fn build_template_context(document: &ExportDocument) -> TemplateContext {
    let elements = document
        .elements
        .iter()
        .map(|(id, record)| TemplateElement {
            id: id.0,
            attributes: attributes_of(record.as_value()),
        })
        .collect();

    TemplateContext {
        generated_at: document.generated_at.clone(),
        generation: document.generation.value(),
        elements,
        failed: document.failed.iter().map(|id| id.0).collect(),
    }
}

fn attributes_of(value: &Value) -> Vec<TemplateAttribute> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(name, value)| TemplateAttribute {
                name: name.clone(),
                value: display_value(value),
            })
            .collect(),
        other => vec![TemplateAttribute {
            name: "value".into(),
            value: display_value(other),
        }],
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Serialize)]
struct TemplateContext {
    generated_at: String,
    generation: u64,
    elements: Vec<TemplateElement>,
    failed: Vec<u64>,
}

#[derive(Serialize)]
struct TemplateElement {
    id: u64,
    attributes: Vec<TemplateAttribute>,
}

#[derive(Serialize)]
struct TemplateAttribute {
    name: String,
    value: String,
}

const DEFAULT_MARKDOWN_TEMPLATE: &str = r#"# Selected Elements

Generated at: {{ generated_at }} (selection {{ generation }})

{% for element in elements %}
## Element {{ element.id }}
{% for attribute in element.attributes %}
- {{ attribute.name }}: {{ attribute.value }}
{% endfor %}

{% endfor %}
{% if failed %}
## Unresolved
{% for id in failed %}
- {{ id }}
{% endfor %}
{% endif %}
"#;
