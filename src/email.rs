//! Outbound email sent when a prospective client asks to be contacted

use anyhow::{Error, Result};
use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Transport for a single email. Implementations return once the
/// provider has accepted (or rejected) the message.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), Error>;
}

/// Notification to the operator that a new lead came in
pub fn lead_notification(operator: &str, client_email: &str, message: &str) -> OutgoingEmail {
    OutgoingEmail {
        from: format!("\"Macda AI\" <{}>", operator),
        to: operator.to_string(),
        subject: format!("New Lead from Macda: {}", client_email),
        body: format!(
            "Client is interested!\nEmail: {}\n\nAI's suggested message:\n{}",
            client_email, message
        ),
    }
}

/// The follow up email the prospective client receives
pub fn client_reply(operator: &str, client_email: &str, subject: &str, message: &str) -> OutgoingEmail {
    OutgoingEmail {
        from: format!("\"Macda - Indocs Media\" <{}>", operator),
        to: client_email.to_string(),
        subject: subject.to_string(),
        body: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_addresses_the_lead_notification_to_the_operator() {
        let email = lead_notification("ops@indocs.media", "jane@example.com", "Hi Jane");
        assert_eq!(email.to, "ops@indocs.media");
        assert_eq!(email.from, "\"Macda AI\" <ops@indocs.media>");
        assert_eq!(email.subject, "New Lead from Macda: jane@example.com");
        assert!(email.body.contains("Email: jane@example.com"));
        assert!(email.body.ends_with("AI's suggested message:\nHi Jane"));
    }

    #[test]
    fn it_addresses_the_reply_to_the_client() {
        let email = client_reply("ops@indocs.media", "jane@example.com", "Your video", "Hi Jane");
        assert_eq!(email.to, "jane@example.com");
        assert_eq!(email.from, "\"Macda - Indocs Media\" <ops@indocs.media>");
        assert_eq!(email.subject, "Your video");
        assert_eq!(email.body, "Hi Jane");
    }
}
