use anyhow::{Error, Result, anyhow};

use crate::openai::{BoxedToolCall, CompletionClient, FunctionCall, Message, Role};
use crate::tools::ToolResult;

async fn handle_tool_call(
    tools: &[BoxedToolCall],
    tool_call: &FunctionCall,
) -> Result<Message, Error> {
    let FunctionCall { id, function, .. } = tool_call;

    tracing::debug!(
        "\nTool call: {}\nargs: {}",
        &function.name,
        &function.arguments
    );

    let result = match tools.iter().find(|i| i.function_name() == function.name) {
        Some(tool) => tool.call(&function.arguments).await?,
        None => {
            tracing::warn!("Received tool call that doesn't exist: {}", function.name);
            ToolResult::error(&format!("Unknown tool: {}", function.name)).to_string()
        }
    };

    Ok(Message::new_tool_call_response(&result, id))
}

/// Runs the next turn in chat for a transcript that already ends with
/// the user's message. Returns the messages to append to the history
/// with the assistant's reply last.
///
/// When the model asks for a tool the request and one result per tool
/// call are recorded, then a second completion without tools turns
/// those results into a reply. The model only ever describes actions
/// that actually ran.
pub async fn chat(
    client: &dyn CompletionClient,
    tools: &[BoxedToolCall],
    system_prompt: &str,
    history: &[Message],
) -> Result<Vec<Message>, Error> {
    let mut messages = Vec::new();

    let mut prompt = Vec::with_capacity(history.len() + 1);
    prompt.push(Message::new(Role::System, system_prompt));
    prompt.extend_from_slice(history);

    let mut resp = client.completion(&prompt, Some(tools)).await?;

    if let Some(tool_calls) = resp.requested_tool_calls() {
        // The API rejects transcripts with unanswered tool calls so
        // every call gets a result, in order.
        let mut results = Vec::with_capacity(tool_calls.len());
        for tool_call in tool_calls {
            results.push(handle_tool_call(tools, tool_call).await?);
        }
        messages.push(resp.clone());
        messages.extend(results);

        let mut updated_history = history.to_vec();
        updated_history.extend_from_slice(&messages);

        // Provide the results of the tool calls back to the chat
        resp = client.completion(&updated_history, None).await?;
    }

    let reply = resp
        .content
        .ok_or(anyhow!("No message content received"))?;
    messages.push(Message::new(Role::Assistant, &reply));

    Ok(messages)
}
