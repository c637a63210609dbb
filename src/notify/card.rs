//! Adaptive card payloads for the chat webhook.

use serde_json::{json, Value};

use super::Severity;

pub const CARD_TITLE: &str = "🚨 Nessus Scan Report Notification";

fn text_block(text: &str, color: &str, separator: bool) -> Value {
    json!({
        "type": "TextBlock",
        "text": text,
        "wrap": true,
        "weight": "Bolder",
        "size": "medium",
        "color": color,
        "separator": separator,
    })
}

/// Build the webhook message: title, timestamp line, then `message` in the
/// severity's color.
pub fn build(message: &str, severity: Severity, timestamp: &str) -> Value {
    json!({
        "type": "message",
        "attachments": [
            {
                "contentType": "application/vnd.microsoft.card.adaptive",
                "contentUrl": null,
                "content": {
                    "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                    "type": "AdaptiveCard",
                    "version": "1.4",
                    "body": [
                        text_block(CARD_TITLE, "accent", false),
                        text_block(&format!("📅 {timestamp}"), "accent", false),
                        text_block(message, severity.card_color(), true),
                    ],
                },
            }
        ],
    })
}
