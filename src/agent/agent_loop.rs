//! Core agent loop implementation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::llm::{ChatMessage, LlmClient, LlmError, OpenAiCompatibleClient, Role, ToolCall};
use crate::sandbox::Sandbox;
use crate::tools::ToolRegistry;

use super::checkpoint::{Checkpointer, InMemoryCheckpointer};
use super::prompt::build_system_prompt;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Max iterations ({0}) reached without a final answer")]
    MaxIterations(usize),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Thread {0} is already running a turn")]
    ThreadBusy(Uuid),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

/// Conversation state after one unit of progress.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStep {
    /// Full thread history, without the system prompt.
    pub messages: Vec<ChatMessage>,

    /// How many trailing messages this step added.
    pub new: usize,
}

impl AgentStep {
    pub fn new_messages(&self) -> &[ChatMessage] {
        &self.messages[self.messages.len().saturating_sub(self.new)..]
    }

    /// Text of the last assistant message, if the step ends with one.
    pub fn final_answer(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == Role::Assistant && !m.requests_tools())
            .map(ChatMessage::text)
    }
}

/// The research agent: model, tools, prompt, checkpointer and sandbox.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    model: String,
    tools: ToolRegistry,
    system_prompt: String,
    checkpointer: Arc<dyn Checkpointer>,
    sandbox: Sandbox,
    max_iterations: usize,
    running: Arc<Mutex<HashSet<Uuid>>>,
}

impl Agent {
    /// Wire the OpenAI-compatible client, the research tools, an in-memory
    /// checkpointer and the sandbox from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let llm = Arc::new(OpenAiCompatibleClient::new(&config.llm)?);
        let tools = ToolRegistry::research(config)?;
        let sandbox = Sandbox::open(&config.sandbox_dir)?;
        tracing::info!(
            model = %config.llm.model,
            tools = tools.len(),
            sandbox = %sandbox.root().display(),
            "Agent ready"
        );

        Ok(Self::with_parts(
            llm,
            config.llm.model.clone(),
            tools,
            Arc::new(InMemoryCheckpointer::new()),
            sandbox,
            config.max_iterations,
        ))
    }

    pub fn with_parts(
        llm: Arc<dyn LlmClient>,
        model: String,
        tools: ToolRegistry,
        checkpointer: Arc<dyn Checkpointer>,
        sandbox: Sandbox,
        max_iterations: usize,
    ) -> Self {
        let system_prompt = build_system_prompt(&tools);
        Self {
            llm,
            model,
            tools,
            system_prompt,
            checkpointer,
            sandbox,
            max_iterations,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn checkpointer(&self) -> &Arc<dyn Checkpointer> {
        &self.checkpointer
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Saved messages of a thread (empty for an unknown thread).
    pub async fn history(&self, thread_id: Uuid) -> Result<Vec<ChatMessage>, AgentError> {
        Ok(self
            .checkpointer
            .load(thread_id)
            .await
            .map_err(AgentError::Checkpoint)?
            .unwrap_or_default())
    }

    /// Run one user turn, yielding a step after the user message, after each
    /// model response and after each batch of tool results. The stream ends
    /// after the final answer or the first error.
    pub fn stream(
        self: Arc<Self>,
        thread_id: Uuid,
        input: String,
    ) -> impl Stream<Item = Result<AgentStep, AgentError>> + Send + 'static {
        async_stream::stream! {
            let _guard = match RunGuard::acquire(&self.running, thread_id) {
                Some(guard) => guard,
                None => {
                    yield Err(AgentError::ThreadBusy(thread_id));
                    return;
                }
            };

            let mut messages = match self.history(thread_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            close_interrupted_tool_calls(&mut messages);
            messages.push(ChatMessage::user(input));
            match self.checkpoint(thread_id, &messages, 1).await {
                Ok(step) => yield Ok(step),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }

            let tool_schemas = self.tools.get_tool_schemas();
            for iteration in 0..self.max_iterations {
                tracing::debug!("Agent iteration {}", iteration + 1);

                let mut request = Vec::with_capacity(messages.len() + 1);
                request.push(ChatMessage::system(self.system_prompt.as_str()));
                request.extend(messages.iter().cloned());

                let response = match self
                    .llm
                    .chat_completion(&self.model, &request, Some(&tool_schemas))
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(thread = %thread_id, error = %e, "Model call failed");
                        yield Err(AgentError::from(e));
                        return;
                    }
                };
                if let Some(usage) = response.usage {
                    tracing::debug!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "Model usage"
                    );
                }

                let assistant = ChatMessage::assistant(response.content, response.tool_calls);
                let tool_calls = assistant.tool_calls.clone().unwrap_or_default();
                if tool_calls.is_empty() && assistant.text().trim().is_empty() {
                    yield Err(AgentError::EmptyResponse);
                    return;
                }
                messages.push(assistant);
                if tool_calls.is_empty() {
                    match self.checkpoint(thread_id, &messages, 1).await {
                        Ok(step) => yield Ok(step),
                        Err(e) => yield Err(e),
                    }
                    return;
                }

                // A tool-call request is only saved together with its results.
                yield Ok(AgentStep {
                    messages: messages.clone(),
                    new: 1,
                });

                for tool_call in &tool_calls {
                    let output = self.execute_tool_call(tool_call).await;
                    messages.push(ChatMessage::tool_result(tool_call, output));
                }
                match self.checkpoint(thread_id, &messages, tool_calls.len()).await {
                    Ok(step) => yield Ok(step),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            yield Err(AgentError::MaxIterations(self.max_iterations));
        }
    }

    /// Run a turn to completion and return the final answer.
    pub async fn invoke(self: &Arc<Self>, thread_id: Uuid, input: impl Into<String>) -> Result<String, AgentError> {
        let stream = Arc::clone(self).stream(thread_id, input.into());
        futures::pin_mut!(stream);

        let mut answer = None;
        while let Some(step) = stream.next().await {
            let step = step?;
            if let Some(text) = step.final_answer() {
                answer = Some(text.to_string());
            }
        }
        answer.ok_or(AgentError::EmptyResponse)
    }

    async fn checkpoint(
        &self,
        thread_id: Uuid,
        messages: &[ChatMessage],
        new: usize,
    ) -> Result<AgentStep, AgentError> {
        self.checkpointer
            .save(thread_id, messages)
            .await
            .map_err(AgentError::Checkpoint)?;
        Ok(AgentStep {
            messages: messages.to_vec(),
            new,
        })
    }

    /// Tool failures become `Error: ...` results for the model to react to.
    async fn execute_tool_call(&self, tool_call: &ToolCall) -> String {
        let name = &tool_call.function.name;
        let raw = tool_call.function.arguments.trim();
        let args: Value = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(raw) {
                Ok(args) => args,
                Err(e) => return format!("Error: invalid JSON arguments for {}: {}", name, e),
            }
        };

        tracing::info!(tool = %name, "Calling tool");
        match self.tools.execute(name, args, &self.sandbox).await {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!(tool = %name, error = %e, "Tool failed");
                format!("Error: {}", e)
            }
        }
    }
}

/// Answer every tool call that has no `tool` reply, so the history is a
/// valid request again.
fn close_interrupted_tool_calls(messages: &mut Vec<ChatMessage>) {
    let mut i = 0;
    while i < messages.len() {
        let calls = match &messages[i].tool_calls {
            Some(calls) if messages[i].role == Role::Assistant => calls.clone(),
            _ => {
                i += 1;
                continue;
            }
        };

        let mut end = i + 1;
        while end < messages.len() && messages[end].role == Role::Tool {
            end += 1;
        }
        let missing: Vec<ChatMessage> = calls
            .iter()
            .filter(|call| {
                !messages[i + 1..end]
                    .iter()
                    .any(|m| m.tool_call_id.as_deref() == Some(call.id.as_str()))
            })
            .map(|call| ChatMessage::tool_result(call, "Error: tool call interrupted"))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(count = missing.len(), "Closing interrupted tool calls");
        }
        let added = missing.len();
        messages.splice(end..end, missing);
        i = end + added;
    }
}

/// Marks a thread as running for the lifetime of a turn.
struct RunGuard {
    running: Arc<Mutex<HashSet<Uuid>>>,
    thread_id: Uuid,
}

impl RunGuard {
    fn acquire(running: &Arc<Mutex<HashSet<Uuid>>>, thread_id: Uuid) -> Option<Self> {
        let mut set = running.lock().ok()?;
        if !set.insert(thread_id) {
            return None;
        }
        Some(Self {
            running: Arc::clone(running),
            thread_id,
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.running.lock() {
            set.remove(&self.thread_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, FunctionCall, ToolSchema};
    use crate::tools::Calculate;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use tokio::sync::Mutex as AsyncMutex;

    /// Replays canned responses and records what it was sent.
    struct ScriptedLlm {
        responses: AsyncMutex<Vec<ChatResponse>>,
        seen: AsyncMutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn new(mut responses: Vec<ChatResponse>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: AsyncMutex::new(responses),
                seen: AsyncMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _tools: Option<&[ToolSchema]>,
        ) -> Result<ChatResponse, LlmError> {
            self.seen.lock().await.push(messages.to_vec());
            self.responses
                .lock()
                .await
                .pop()
                .ok_or(LlmError::EmptyResponse)
        }
    }

    fn text(content: &str) -> ChatResponse {
        ChatResponse {
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> ChatResponse {
        ChatResponse {
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: id.to_string(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            }]),
            usage: None,
        }
    }

    fn agent(llm: Arc<ScriptedLlm>, max_iterations: usize) -> (tempfile::TempDir, Arc<Agent>) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::open(dir.path()).unwrap();
        let agent = Agent::with_parts(
            llm,
            "test-model".to_string(),
            ToolRegistry::from_tools(vec![Box::new(Calculate)]),
            Arc::new(InMemoryCheckpointer::new()),
            sandbox,
            max_iterations,
        );
        (dir, Arc::new(agent))
    }

    #[tokio::test]
    async fn streams_user_model_and_tool_steps() {
        let llm = ScriptedLlm::new(vec![
            call("c1", "calculate", r#"{"expression": "15% of 200"}"#),
            text("The answer is 30."),
        ]);
        let (_dir, agent) = agent(Arc::clone(&llm), 5);
        let thread = Uuid::new_v4();

        let steps: Vec<AgentStep> = Arc::clone(&agent)
            .stream(thread, "What is 15% of 200?".into())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].new_messages()[0].role, Role::User);
        assert!(steps[1].new_messages()[0].requests_tools());
        let tool_msg = &steps[2].new_messages()[0];
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.text(), "30");
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(steps[3].final_answer(), Some("The answer is 30."));

        let seen = llm.seen.lock().await;
        assert_eq!(seen[0][0].role, Role::System);
        assert_eq!(seen[1].len(), 4);

        assert_eq!(agent.history(thread).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn history_carries_across_turns() {
        let llm = ScriptedLlm::new(vec![text("first"), text("second")]);
        let (_dir, agent) = agent(Arc::clone(&llm), 5);
        let thread = Uuid::new_v4();

        assert_eq!(agent.invoke(thread, "one").await.unwrap(), "first");
        assert_eq!(agent.invoke(thread, "two").await.unwrap(), "second");

        let seen = llm.seen.lock().await;
        let second_call: Vec<&str> = seen[1].iter().map(ChatMessage::text).collect();
        assert_eq!(&second_call[1..], ["one", "first", "two"]);
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back() {
        let llm = ScriptedLlm::new(vec![
            call("c1", "calculate", "{not json"),
            call("c2", "nope", "{}"),
            text("done"),
        ]);
        let (_dir, agent) = agent(llm, 5);
        let thread = Uuid::new_v4();

        assert_eq!(agent.invoke(thread, "go").await.unwrap(), "done");
        let history = agent.history(thread).await.unwrap();
        let tool_outputs: Vec<&str> = history
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(ChatMessage::text)
            .collect();
        assert!(tool_outputs[0].starts_with("Error: invalid JSON arguments for calculate"));
        assert_eq!(tool_outputs[1], "Error: Unknown tool: nope");
    }

    #[tokio::test]
    async fn stops_at_max_iterations() {
        let llm = ScriptedLlm::new(vec![
            call("c1", "calculate", r#"{"expression": "1"}"#),
            call("c2", "calculate", r#"{"expression": "2"}"#),
        ]);
        let (_dir, agent) = agent(llm, 2);

        let err = agent.invoke(Uuid::new_v4(), "loop").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(2)));
    }

    #[tokio::test]
    async fn model_errors_end_the_stream() {
        let llm = ScriptedLlm::new(vec![]);
        let (_dir, agent) = agent(llm, 3);
        let thread = Uuid::new_v4();

        let results: Vec<_> = Arc::clone(&agent).stream(thread, "hi".into()).collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(AgentError::Llm(LlmError::EmptyResponse))));
        // The user message is still checkpointed.
        assert_eq!(agent.history(thread).await.unwrap().len(), 1);
    }

    fn assert_tool_calls_answered(request: &[ChatMessage]) {
        for (i, msg) in request.iter().enumerate() {
            if let Some(calls) = &msg.tool_calls {
                let replies: Vec<_> = request[i + 1..]
                    .iter()
                    .take_while(|m| m.role == Role::Tool)
                    .filter_map(|m| m.tool_call_id.as_deref())
                    .collect();
                for call in calls {
                    assert!(replies.contains(&call.id.as_str()), "unanswered tool call {}", call.id);
                }
            }
        }
    }

    #[tokio::test]
    async fn dropped_turn_does_not_leave_unanswered_tool_calls() {
        let llm = ScriptedLlm::new(vec![
            call("c1", "calculate", r#"{"expression": "2+2"}"#),
            text("unused"),
        ]);
        let (_dir, agent) = agent(Arc::clone(&llm), 5);
        let thread = Uuid::new_v4();

        {
            let stream = Arc::clone(&agent).stream(thread, "add".into());
            futures::pin_mut!(stream);
            assert!(stream.next().await.unwrap().is_ok());
            let step = stream.next().await.unwrap().unwrap();
            assert!(step.new_messages()[0].requests_tools());
        }

        let history = agent.history(thread).await.unwrap();
        assert!(history.iter().all(|m| !m.requests_tools()));

        assert_eq!(agent.invoke(thread, "again").await.unwrap(), "unused");
        let seen = llm.seen.lock().await;
        let request = seen.last().unwrap();
        assert_tool_calls_answered(request);
        let texts: Vec<&str> = request[1..].iter().map(ChatMessage::text).collect();
        assert_eq!(texts, ["add", "again"]);
    }

    #[tokio::test]
    async fn saved_unanswered_tool_calls_are_closed_on_the_next_turn() {
        let llm = ScriptedLlm::new(vec![text("recovered")]);
        let (_dir, agent) = agent(Arc::clone(&llm), 5);
        let thread = Uuid::new_v4();

        let request = call("c1", "calculate", "{}").tool_calls.unwrap();
        let saved = vec![
            ChatMessage::user("add"),
            ChatMessage::assistant(None, Some(request)),
        ];
        agent.checkpointer().save(thread, &saved).await.unwrap();

        assert_eq!(agent.invoke(thread, "again").await.unwrap(), "recovered");
        let seen = llm.seen.lock().await;
        let request = &seen[0];
        assert_tool_calls_answered(request);
        assert_eq!(request[3].role, Role::Tool);
        assert_eq!(request[3].text(), "Error: tool call interrupted");
        assert_eq!(request[4].text(), "again");
        assert_eq!(agent.history(thread).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_thread_are_rejected() {
        let llm = ScriptedLlm::new(vec![text("ok")]);
        let (_dir, agent) = agent(llm, 3);
        let thread = Uuid::new_v4();

        let first = Arc::clone(&agent).stream(thread, "a".into());
        futures::pin_mut!(first);
        assert!(first.next().await.unwrap().is_ok());

        let second: Vec<_> = Arc::clone(&agent).stream(thread, "b".into()).collect().await;
        assert!(matches!(second.as_slice(), [Err(AgentError::ThreadBusy(id))] if *id == thread));

        while first.next().await.is_some() {}
        assert_eq!(
            agent.invoke(thread, "c").await.unwrap_err().to_string(),
            "Model request failed: Model returned no choices"
        );
    }
}
