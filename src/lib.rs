//! # Research Agent
//!
//! A conversational research assistant driven by an LLM with tools.
//!
//! This library provides:
//! - A tool-calling agent loop with per-thread conversation memory
//! - Tools for web search and page extraction (Tavily), symbolic math,
//!   date/time and sandboxed file access
//! - A terminal chat loop and a browser chat served over HTTP
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Append the user message to the thread history
//! 2. Call the model with the system prompt and available tools
//! 3. Execute any tool calls and feed the results back
//! 4. Repeat until the model answers, streaming each step to the UI
//!
//! ## Example
//!
//! ```rust,ignore
//! use research_agent::{agent::Agent, config::Config};
//!
//! let config = Config::from_env()?;
//! let agent = std::sync::Arc::new(Agent::from_config(&config)?);
//! let answer = agent.invoke(uuid::Uuid::new_v4(), "What is new in Rust 2024?").await?;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod crawler;
pub mod llm;
pub mod repl;
pub mod sandbox;
pub mod symbolic;
pub mod tavily;
pub mod tools;
pub mod ui;

pub use config::Config;
