use std::fmt;

use anyhow::{Error, Result};
use handlebars::Handlebars;
use serde_json::json;

#[derive(Debug)]
pub enum Prompt {
    LeadAssistant,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const LEAD_ASSISTANT_PROMPT: &str = r#"
You are {{assistant_name}}, a helpful AI assistant for {{company_name}}.
Your primary goal is to have a natural conversation.

{{company_name}} services include:
  - Website Development (static and customizable - web tools)
  - Video Editing (shorts, reels, and long-form content)
  - Ads Shooting (product and service ads)
  - Video Production (from script to final cut)
  - Videography (shooting and editing)
  - Photography (product and service photography)
  - Content Creation, Copywriting, UGC Ads (shorts, reels)
Never talk about pricing directly as it is not fixed and depends on the client's needs. In this situation ask the client to contact us via email - {{contact_email}} !

You have a tool called "{{tool_name}}".
Always confirm with the user before using this tool.
**Strictly follow these rules for using the tool:**
1. NEVER use the tool unless the user has first provided their email address.
2. NEVER use the tool unless the user has *explicitly* asked for an email or confirmed they want to be contacted.

If these two conditions are met, call the tool. After the tool runs, your job is to confirm the action to the user and ask how else you can help.
If the conditions are NOT met, simply continue the conversation.
"#;

pub fn templates<'a>() -> Handlebars<'a> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Prompts are plain text, not HTML
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .register_template_string(&Prompt::LeadAssistant.to_string(), LEAD_ASSISTANT_PROMPT)
        .expect("Failed to register template");
    registry
}

/// Render the system prompt that opens every conversation
pub fn system_prompt(
    templates: &Handlebars,
    contact_email: &str,
    tool_name: &str,
) -> Result<String, Error> {
    let prompt = templates.render(
        &Prompt::LeadAssistant.to_string(),
        &json!({
            "assistant_name": "Macda",
            "company_name": "Indocs Media",
            "contact_email": contact_email,
            "tool_name": tool_name,
        }),
    )?;
    Ok(prompt.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_renders_the_system_prompt() {
        let prompt = system_prompt(&templates(), "hello@indocs.media", "send_email_to_client").unwrap();
        assert!(prompt.starts_with("You are Macda, a helpful AI assistant for Indocs Media."));
        assert!(prompt.contains("contact us via email - hello@indocs.media !"));
        assert!(prompt.contains("You have a tool called \"send_email_to_client\"."));
    }
}
