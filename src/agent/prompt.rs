//! System prompt for the research agent.

use crate::tools::ToolRegistry;

pub const SYSTEM_PROMPT: &str = "You are a meticulous research analyst. When given a topic:
1. Break down the query into key components and identify what needs clarification.
2. Use the internet_search tool with precise, well-constructed queries to gather accurate, up-to-date information.
3. Cross-check facts across multiple sources when possible.
4. Synthesize findings into a clear, well-structured report with sections: Overview, Key Features, Use Cases, and Recent Developments.
5. Cite key insights and avoid speculation. If information is unclear, note that as a limitation.
Always aim for depth, accuracy, and readability.";

/// Build the system prompt with tool definitions.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"{SYSTEM_PROMPT}

## Available Tools
{tool_descriptions}

## Files
File tools work inside a private sandbox. Paths are virtual: "/" is the sandbox root, and nothing outside it can be read or written. Use it to keep notes or save reports when the user asks for a file."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Calculate, ListDir};

    #[test]
    fn prompt_lists_tools_after_instructions() {
        let tools = ToolRegistry::from_tools(vec![Box::new(Calculate), Box::new(ListDir)]);
        let prompt = build_system_prompt(&tools);

        assert!(prompt.starts_with("You are a meticulous research analyst."));
        assert!(prompt.contains("Overview, Key Features, Use Cases, and Recent Developments"));
        assert!(prompt.contains("- **calculate**: "));
        assert!(prompt.contains("- **ls**: "));
        assert!(prompt.contains("\"/\" is the sandbox root"));
    }
}
