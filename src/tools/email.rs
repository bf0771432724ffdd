use std::sync::{Arc, LazyLock};

use anyhow::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ToolResult;
use crate::email::{EmailTransport, client_reply, lead_notification};
use crate::openai::{Function, Parameters, Property, ToolCall, ToolType};

pub const SEND_EMAIL_TOOL_NAME: &str = "send_email_to_client";

pub const INVALID_EMAIL_ERROR: &str = "Invalid or missing email address provided.";
pub const MISSING_CONTENT_ERROR: &str = "Missing email subject or message.";
pub const SEND_FAILED_ERROR: &str = "An internal error occurred while sending the email.";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[derive(Serialize)]
pub struct SendEmailProps {
    pub email: Property,
    pub subject: Property,
    pub message: Property,
}

// Every field is optional here because the arguments come from the
// model and are validated before anything is sent.
#[derive(Deserialize, Default, Debug)]
pub struct SendEmailArgs {
    pub email: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct SendEmailTool {
    pub r#type: ToolType,
    pub function: Function<SendEmailProps>,
    #[serde(skip)]
    operator_email: String,
    #[serde(skip)]
    transport: Arc<dyn EmailTransport>,
}

#[async_trait]
impl ToolCall for SendEmailTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let fn_args: SendEmailArgs = serde_json::from_str(args).unwrap_or_else(|e| {
            tracing::warn!("Unparseable {} arguments {}: {}", SEND_EMAIL_TOOL_NAME, args, e);
            SendEmailArgs::default()
        });
        Ok(self.send(fn_args).await.to_string())
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl SendEmailTool {
    pub fn new(operator_email: &str, transport: Arc<dyn EmailTransport>) -> Self {
        let function = Function {
            name: String::from(SEND_EMAIL_TOOL_NAME),
            description: String::from(
                "Sends a follow-up email to a potential client who has provided their email and explicitly asked to be contacted.",
            ),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: SendEmailProps {
                    email: Property {
                        r#type: String::from("string"),
                        description: String::from("The client's email address."),
                    },
                    subject: Property {
                        r#type: String::from("string"),
                        description: String::from("A compelling subject line for the email."),
                    },
                    message: Property {
                        r#type: String::from("string"),
                        description: String::from("A personalized message for the body of the email."),
                    },
                },
                required: vec![
                    String::from("email"),
                    String::from("subject"),
                    String::from("message"),
                ],
                additional_properties: false,
            },
        };
        Self {
            r#type: ToolType::Function,
            function,
            operator_email: operator_email.to_string(),
            transport,
        }
    }

    async fn send(&self, args: SendEmailArgs) -> ToolResult {
        // Checked exactly as given, no trimming or other cleanup
        let email = match args.email {
            Some(email) if is_valid_email(&email) => email,
            _ => return ToolResult::error(INVALID_EMAIL_ERROR),
        };
        let (subject, message) = match (args.subject, args.message) {
            (Some(subject), Some(message))
                if !subject.trim().is_empty() && !message.trim().is_empty() =>
            {
                (subject, message)
            }
            _ => return ToolResult::error(MISSING_CONTENT_ERROR),
        };

        // Both sends are attempted even if the first one fails so a
        // provider hiccup on the notification doesn't leave the client
        // without a reply.
        let notification = lead_notification(&self.operator_email, &email, &message);
        let notified = self.transport.send(&notification).await;
        if let Err(e) = &notified {
            tracing::error!("Lead notification for {} failed: {}", email, e);
        }

        let reply = client_reply(&self.operator_email, &email, &subject, &message);
        let replied = self.transport.send(&reply).await;
        if let Err(e) = &replied {
            tracing::error!("Reply to {} failed: {}", email, e);
        }

        if notified.is_ok() && replied.is_ok() {
            ToolResult::success(&format!("Email successfully sent to {}", email))
        } else {
            ToolResult::error(SEND_FAILED_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::bail;
    use serde_json::{Value, json};

    use super::*;
    use crate::email::OutgoingEmail;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingEmail>>,
        fail_to: Option<String>,
    }

    #[async_trait]
    impl EmailTransport for RecordingTransport {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), Error> {
            self.sent.lock().unwrap().push(email.clone());
            if self.fail_to.as_deref() == Some(email.to.as_str()) {
                bail!("SMTP said no");
            }
            Ok(())
        }
    }

    fn tool(transport: Arc<RecordingTransport>) -> SendEmailTool {
        SendEmailTool::new("ops@indocs.media", transport)
    }

    async fn call(tool: &SendEmailTool, args: Value) -> Value {
        let out = tool.call(&args.to_string()).await.unwrap();
        serde_json::from_str(&out).unwrap()
    }

    #[test]
    fn it_validates_email_shape() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("j.doe+leads@mail.example.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane doe@example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn it_serializes_only_the_schema() {
        let tool = tool(Arc::new(RecordingTransport::default()));
        let value = serde_json::to_value(&tool).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], SEND_EMAIL_TOOL_NAME);
        assert_eq!(
            value["function"]["parameters"]["required"],
            json!(["email", "subject", "message"])
        );
        assert!(value.get("operator_email").is_none());
    }

    #[tokio::test]
    async fn it_rejects_a_malformed_email_without_sending() {
        let transport = Arc::new(RecordingTransport::default());
        let tool = tool(transport.clone());

        let result = call(
            &tool,
            json!({"email": "not-an-email", "subject": "Hi", "message": "Hello"}),
        )
        .await;

        assert_eq!(result, json!({"success": false, "error": INVALID_EMAIL_ERROR}));

        // Surrounding whitespace makes the address invalid too
        for padded in [" jane@example.com", "jane@example.com\n"] {
            let result = call(
                &tool,
                json!({"email": padded, "subject": "Hi", "message": "Hello"}),
            )
            .await;
            assert_eq!(result, json!({"success": false, "error": INVALID_EMAIL_ERROR}));
        }
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn it_rejects_unparseable_arguments_without_sending() {
        let transport = Arc::new(RecordingTransport::default());
        let tool = tool(transport.clone());

        let out = tool.call("{\"email\": ").await.unwrap();
        let result: Value = serde_json::from_str(&out).unwrap();

        assert_eq!(result["error"], INVALID_EMAIL_ERROR);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn it_rejects_an_empty_message() {
        let transport = Arc::new(RecordingTransport::default());
        let tool = tool(transport.clone());

        let result = call(
            &tool,
            json!({"email": "jane@example.com", "subject": "Hi", "message": "  "}),
        )
        .await;

        assert_eq!(result["error"], MISSING_CONTENT_ERROR);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn it_sends_the_notification_and_the_reply() {
        let transport = Arc::new(RecordingTransport::default());
        let tool = tool(transport.clone());

        let result = call(
            &tool,
            json!({"email": "jane@example.com", "subject": "Your reel", "message": "Hi Jane"}),
        )
        .await;

        assert_eq!(
            result,
            json!({"success": true, "message": "Email successfully sent to jane@example.com"})
        );
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "ops@indocs.media");
        assert_eq!(sent[0].subject, "New Lead from Macda: jane@example.com");
        assert_eq!(sent[1].to, "jane@example.com");
        assert_eq!(sent[1].subject, "Your reel");
    }

    #[tokio::test]
    async fn it_still_replies_when_the_notification_fails() {
        let transport = Arc::new(RecordingTransport {
            fail_to: Some(String::from("ops@indocs.media")),
            ..Default::default()
        });
        let tool = tool(transport.clone());

        let result = call(
            &tool,
            json!({"email": "jane@example.com", "subject": "Your reel", "message": "Hi Jane"}),
        )
        .await;

        assert_eq!(result, json!({"success": false, "error": SEND_FAILED_ERROR}));
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }
}
