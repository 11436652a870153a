//! WhatsApp Cloud API payload types.
//!
//! A subset of the Cloud API message schema: template messages with body
//! parameters, quick-reply buttons, and an optional URL button, plus the
//! inbound webhook envelope.
//!
//! See: <https://developers.facebook.com/docs/whatsapp/cloud-api>

use serde::{Deserialize, Serialize};

// =============================================================================
// Outbound
// =============================================================================

/// A logical template send, before it is lowered to the wire shape.
///
/// This is what the lifecycle engine produces and what test fakes record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSpec {
    /// Template name as registered with the provider.
    pub name: &'static str,
    /// Positional body parameters.
    pub body_params: Vec<String>,
    /// Quick-reply buttons, in order.
    pub buttons: Vec<QuickReply>,
    /// Optional URL button appended after the quick replies.
    pub link_url: Option<String>,
}

/// A quick-reply button with its round-tripped payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickReply {
    pub payload: String,
}

/// Wire shape of an outbound template message.
#[derive(Debug, Serialize)]
pub struct TemplateMessage {
    pub messaging_product: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub template: Template,
}

#[derive(Debug, Serialize)]
pub struct Template {
    pub name: String,
    pub language: Language,
    pub components: Vec<Component>,
}

#[derive(Debug, Serialize)]
pub struct Language {
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Component {
    Body {
        parameters: Vec<Parameter>,
    },
    Button {
        sub_type: &'static str,
        index: String,
        parameters: Vec<Parameter>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Parameter {
    Text { text: String },
    Payload { payload: String },
}

impl TemplateMessage {
    /// Lower a [`TemplateSpec`] to the wire shape for a recipient.
    #[must_use]
    pub fn from_spec(to: &str, spec: &TemplateSpec) -> Self {
        let mut components = Vec::with_capacity(1 + spec.buttons.len());

        if !spec.body_params.is_empty() {
            components.push(Component::Body {
                parameters: spec
                    .body_params
                    .iter()
                    .map(|p| Parameter::Text { text: p.clone() })
                    .collect(),
            });
        }

        for (index, button) in spec.buttons.iter().enumerate() {
            components.push(Component::Button {
                sub_type: "quick_reply",
                index: index.to_string(),
                parameters: vec![Parameter::Payload {
                    payload: button.payload.clone(),
                }],
            });
        }

        if let Some(url) = &spec.link_url {
            components.push(Component::Button {
                sub_type: "url",
                index: spec.buttons.len().to_string(),
                parameters: vec![Parameter::Text { text: url.clone() }],
            });
        }

        Self {
            messaging_product: "whatsapp",
            to: to.to_owned(),
            message_type: "template",
            template: Template {
                name: spec.name.to_owned(),
                language: Language { code: "en" },
                components,
            },
        }
    }
}

/// Wire shape of an outbound plain text message.
#[derive(Debug, Serialize)]
pub struct TextMessage {
    pub messaging_product: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub text: TextBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextBody {
    pub body: String,
}

impl TextMessage {
    #[must_use]
    pub fn new(to: &str, body: &str) -> Self {
        Self {
            messaging_product: "whatsapp",
            to: to.to_owned(),
            message_type: "text",
            text: TextBody {
                body: body.to_owned(),
            },
        }
    }
}

/// Cloud API send response.
#[derive(Debug, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub messages: Vec<MessageId>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub struct MessageId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

// =============================================================================
// Inbound webhook envelope
// =============================================================================

/// Top-level webhook envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

/// One inbound customer message.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    /// Sender phone in international digits.
    pub from: String,
    #[serde(rename = "type")]
    pub message_type: String,
    /// Template quick-reply tap.
    #[serde(default)]
    pub button: Option<ButtonReply>,
    /// Interactive-message button tap.
    #[serde(default)]
    pub interactive: Option<Interactive>,
    /// Free text.
    #[serde(default)]
    pub text: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
pub struct ButtonReply {
    pub payload: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Interactive {
    #[serde(default)]
    pub button_reply: Option<InteractiveButtonReply>,
}

#[derive(Debug, Deserialize)]
pub struct InteractiveButtonReply {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl WebhookEnvelope {
    /// Flatten the envelope to its messages.
    pub fn messages(&self) -> impl Iterator<Item = &InboundMessage> {
        self.entry
            .iter()
            .flat_map(|e| e.changes.iter())
            .flat_map(|c| c.value.messages.iter())
    }
}

impl InboundMessage {
    /// The structured action payload, whichever button surface carried it.
    #[must_use]
    pub fn action_payload(&self) -> Option<&str> {
        if let Some(button) = &self.button {
            return Some(&button.payload);
        }
        self.interactive
            .as_ref()
            .and_then(|i| i.button_reply.as_ref())
            .map(|b| b.id.as_str())
    }

    /// Free text body, if this was a text message.
    #[must_use]
    pub fn text_body(&self) -> Option<&str> {
        self.text.as_ref().map(|t| t.body.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_flattens_button_reply() {
        let raw = r#"{
            "entry": [{"changes": [{"value": {"messages": [{
                "from": "923001234567",
                "type": "button",
                "button": {"payload": "CONFIRM_ORDER:acme:1001", "text": "Confirm"}
            }]}}]}]
        }"#;

        let envelope: WebhookEnvelope = serde_json::from_str(raw).expect("parses");
        let msg = envelope.messages().next().expect("one message");
        assert_eq!(msg.from, "923001234567");
        assert_eq!(msg.action_payload(), Some("CONFIRM_ORDER:acme:1001"));
        assert!(msg.text_body().is_none());
    }

    #[test]
    fn test_envelope_interactive_reply() {
        let raw = r#"{
            "entry": [{"changes": [{"value": {"messages": [{
                "from": "923001234567",
                "type": "interactive",
                "interactive": {"button_reply": {"id": "CANCEL_ORDER:acme:1001", "title": "Cancel"}}
            }]}}]}]
        }"#;

        let envelope: WebhookEnvelope = serde_json::from_str(raw).expect("parses");
        let msg = envelope.messages().next().expect("one message");
        assert_eq!(msg.action_payload(), Some("CANCEL_ORDER:acme:1001"));
    }

    #[test]
    fn test_envelope_free_text() {
        let raw = r#"{
            "entry": [{"changes": [{"value": {"messages": [{
                "from": "923001234567",
                "type": "text",
                "text": {"body": "is my order coming?"}
            }]}}]}]
        }"#;

        let envelope: WebhookEnvelope = serde_json::from_str(raw).expect("parses");
        let msg = envelope.messages().next().expect("one message");
        assert!(msg.action_payload().is_none());
        assert_eq!(msg.text_body(), Some("is my order coming?"));
    }

    #[test]
    fn test_status_notification_envelope_has_no_messages() {
        // Delivery receipts come through the same webhook with no messages.
        let raw = r#"{"entry": [{"changes": [{"value": {}}]}]}"#;
        let envelope: WebhookEnvelope = serde_json::from_str(raw).expect("parses");
        assert_eq!(envelope.messages().count(), 0);
    }

    #[test]
    fn test_template_message_wire_shape() {
        let spec = TemplateSpec {
            name: "order_confirmation",
            body_params: vec!["Ali".into(), "#1001".into()],
            buttons: vec![
                QuickReply { payload: "CONFIRM_ORDER:acme:1001".into() },
                QuickReply { payload: "CANCEL_ORDER:acme:1001".into() },
            ],
            link_url: None,
        };

        let wire = TemplateMessage::from_spec("923001234567", &spec);
        let json = serde_json::to_value(&wire).expect("serializes");

        assert_eq!(json["messaging_product"], "whatsapp");
        assert_eq!(json["type"], "template");
        assert_eq!(json["template"]["name"], "order_confirmation");
        assert_eq!(json["template"]["components"][0]["type"], "body");
        assert_eq!(json["template"]["components"][1]["sub_type"], "quick_reply");
        assert_eq!(json["template"]["components"][2]["index"], "1");
    }
}
