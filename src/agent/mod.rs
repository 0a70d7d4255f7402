//! Agent module - the research agent and its conversation state.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Load the thread's history and append the user message
//! 2. Call the model with the system prompt and available tools
//! 3. If the model requests tool calls, execute them and feed results back
//! 4. Repeat until the model produces a final answer or max iterations reached

mod agent_loop;
mod checkpoint;
mod prompt;

pub use agent_loop::{Agent, AgentError, AgentStep};
pub use checkpoint::{Checkpointer, InMemoryCheckpointer, ThreadSummary};
pub use prompt::{build_system_prompt, SYSTEM_PROMPT};
