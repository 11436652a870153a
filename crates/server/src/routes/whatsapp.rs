//! Messaging webhook handlers: verification handshake and customer replies.

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tracing::{instrument, warn};

use orderloop_core::{CustomerReply, Event, Phone, ReplyAction};

use crate::error::AppError;
use crate::state::AppState;
use crate::whatsapp::WebhookEnvelope;

/// Create messaging webhook routes.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/webhooks/whatsapp",
        get(verify_handshake).post(handle_message),
    )
}

/// Verification handshake query parameters (Meta webhook subscription).
#[derive(Debug, Deserialize)]
pub struct HandshakeParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /webhooks/whatsapp - echo the challenge when the token matches.
#[instrument(skip(state, params))]
async fn verify_handshake(
    State(state): State<AppState>,
    Query(params): Query<HandshakeParams>,
) -> Result<String, AppError> {
    let (Some(mode), Some(token), Some(challenge)) =
        (params.mode, params.verify_token, params.challenge)
    else {
        return Err(AppError::BadRequest("missing hub.* parameters".into()));
    };

    match state.whatsapp().verify_handshake(&mode, &token, &challenge) {
        Some(challenge) => Ok(challenge.to_owned()),
        None => {
            warn!(security = true, "Webhook verification handshake rejected");
            Err(AppError::Unauthorized("verification token mismatch".into()))
        }
    }
}

/// POST /webhooks/whatsapp - inbound message envelope.
///
/// Acks immediately; each message in the envelope is normalized into a
/// `CustomerReplied` event and processed in a spawned task.
#[instrument(skip(state, body))]
async fn handle_message(State(state): State<AppState>, body: String) -> impl IntoResponse {
    tokio::spawn(async move {
        let envelope: WebhookEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message envelope");
                return;
            }
        };

        let country_code = state.config().default_country_code.clone();

        for message in envelope.messages() {
            // A structured button tap carries ACTION:tenant:order; free text
            // carries nothing and relies on the phone fallback.
            let (action, order_ref) = message
                .action_payload()
                .and_then(CustomerReply::parse_button_payload)
                .map_or((ReplyAction::Unknown, None), |(action, order_ref)| {
                    (action, Some(order_ref))
                });

            let reply = CustomerReply {
                phone: Phone::normalize(&message.from, &country_code),
                action,
                order_ref,
            };

            if let Err(e) = state.lifecycle().handle(Event::CustomerReplied(reply)).await {
                warn!(error = %e, "Reply processing failed");
            }
        }
    });

    StatusCode::OK
}
