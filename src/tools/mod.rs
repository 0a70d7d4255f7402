//! Tools the agent can call.
//!
//! Every tool is a self-contained [`Tool`]; the [`ToolRegistry`] owns them in
//! the order they are advertised to the model.

mod datetime;
mod files;
mod math;
mod web;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{Config, CrawlerBackend};
use crate::crawler::LocalCrawler;
use crate::llm::{FunctionSchema, ToolSchema};
use crate::sandbox::Sandbox;
use crate::tavily::TavilyClient;

pub use datetime::{ConvertTimestamp, CurrentDatetime, CurrentTimestamp};
pub use files::{EditFile, GlobFiles, GrepFiles, ListDir, ReadFile, WriteFile};
pub use math::{Calculate, Differentiate, Integrate, MatrixOperation, PreprocessMath, SolveEquation};
pub use web::{CrawlUrl, ExtractBackend, InternetSearch};

/// A capability exposed to the model as a function call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Function name the model calls.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. Errors are reported back to the model, not to the user.
    async fn execute(&self, args: Value, sandbox: &Sandbox) -> anyhow::Result<String>;
}

/// Name and description, for prompts and listings.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// The full research tool set: web, time, math and sandbox files.
    pub fn research(config: &Config) -> anyhow::Result<Self> {
        let tavily = Arc::new(TavilyClient::new(
            config.tavily_api_key.clone(),
            config.tavily_base_url.clone(),
        )?);
        let extract = match config.crawler {
            CrawlerBackend::Tavily => ExtractBackend::Tavily(Arc::clone(&tavily)),
            CrawlerBackend::Local => ExtractBackend::Local(LocalCrawler::new()?),
        };

        Ok(Self::from_tools(vec![
            Box::new(InternetSearch::new(tavily)),
            Box::new(CrawlUrl::new(extract)),
            Box::new(CurrentDatetime),
            Box::new(CurrentTimestamp),
            Box::new(ConvertTimestamp),
            Box::new(Differentiate),
            Box::new(Integrate),
            Box::new(SolveEquation),
            Box::new(MatrixOperation),
            Box::new(PreprocessMath),
            Box::new(Calculate),
            Box::new(ListDir),
            Box::new(ReadFile),
            Box::new(WriteFile),
            Box::new(EditFile),
            Box::new(GlobFiles),
            Box::new(GrepFiles),
        ]))
    }

    /// Later tools with a duplicate name are dropped.
    pub fn from_tools(tools: Vec<Box<dyn Tool>>) -> Self {
        let mut kept: Vec<Box<dyn Tool>> = Vec::with_capacity(tools.len());
        let mut index = HashMap::new();
        for tool in tools {
            if index.contains_key(tool.name()) {
                tracing::warn!("Duplicate tool '{}' ignored", tool.name());
                continue;
            }
            index.insert(tool.name().to_string(), kept.len());
            kept.push(tool);
        }
        Self { tools: kept, index }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// OpenAI function schemas for every tool, in registry order.
    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                schema_type: "function".to_string(),
                function: FunctionSchema {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, args: Value, sandbox: &Sandbox) -> anyhow::Result<String> {
        let tool = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;
        tool.execute(args, sandbox).await
    }
}

/// Accept integers sent as JSON numbers or numeric strings.
pub(crate) fn arg_u64(args: &Value, key: &str) -> Option<u64> {
    match &args[key] {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Models sometimes send `null` or `""` for omitted optional strings.
pub(crate) fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args[key].as_str().filter(|s| !s.trim().is_empty())
}

pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    args[key]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}
