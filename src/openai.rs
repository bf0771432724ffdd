use std::time::Duration;

use anyhow::{Error, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "tool")]
    Tool,
}

// Object {
//     "content": Null,
//     "role": String("assistant"),
//     "tool_calls": Array [
//         Object {
//             "function": Object {
//                 "arguments": String("{\"email\":\"jane@example.com\",...}"),
//                 "name": String("send_email_to_client")
//             },
//             "id": String("call_d5wg"),
//             "type": String("function")
//         }
//     ]
// }
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FunctionCallFn {
    pub arguments: String,
    pub name: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FunctionCall {
    pub function: FunctionCallFn,
    pub id: String,
    pub r#type: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<FunctionCall>>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: Some(content.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
    pub fn new_tool_call_request(tool_calls: Vec<FunctionCall>) -> Self {
        Message {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }
    pub fn new_tool_call_response(content: &str, tool_call_id: &str) -> Self {
        Message {
            role: Role::Tool,
            content: Some(content.to_string()),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: None,
        }
    }

    /// The tool calls requested by the model, if any. An empty list
    /// is treated the same as no tool calls.
    pub fn requested_tool_calls(&self) -> Option<&[FunctionCall]> {
        self.tool_calls
            .as_deref()
            .filter(|calls| !calls.is_empty())
    }
}

#[derive(Serialize)]
pub struct Property {
    pub r#type: String,
    pub description: String,
}

#[derive(Serialize)]
pub struct Parameters<Props: Serialize> {
    pub r#type: String,
    pub properties: Props,
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

#[derive(Serialize)]
pub struct Function<Props: Serialize> {
    pub name: String,
    pub description: String,
    pub parameters: Parameters<Props>,
}

#[derive(Serialize)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

// `serde::Serialize` is not object safe so tools are serialized
// through `erased_serde`, which lets a `Vec<BoxedToolCall>` be passed
// straight to `json!` as the request's tool schema.
#[async_trait]
pub trait ToolCall: erased_serde::Serialize {
    async fn call(&self, args: &str) -> Result<String, Error>;
    fn function_name(&self) -> String;
}
erased_serde::serialize_trait_object!(ToolCall);

pub type BoxedToolCall = Box<dyn ToolCall + Send + Sync + 'static>;

/// A chat completion backend. Returns the first choice's message,
/// which is either a plain assistant reply or a tool call request.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn completion(
        &self,
        messages: &[Message],
        tools: Option<&[BoxedToolCall]>,
    ) -> Result<Message, Error>;
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Message,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

/// Client for any OpenAI compatible chat completions API (Groq,
/// OpenAI, a local server, ...).
pub struct OpenAiClient {
    client: reqwest::Client,
    api_hostname: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        api_hostname: &str,
        api_key: &str,
        model: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            api_hostname: api_hostname.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn completion(
        &self,
        messages: &[Message],
        tools: Option<&[BoxedToolCall]>,
    ) -> Result<Message, Error> {
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(tools) = tools {
            payload["tools"] = json!(tools);
            // Let the model decide whether a tool is needed
            payload["tool_choice"] = json!("auto");
        }

        let url = format!("{}/v1/chat/completions", self.api_hostname);
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("Completion request failed: {} ({})", status, text);
        }

        let resp: CompletionResponse = serde_json::from_str(&text)
            .inspect_err(|e| tracing::error!("Parsing completion failed for {}\nError: {}", text, e))?;
        resp.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or(anyhow!("Completion response had no choices: {}", text))
    }
}
