//! Outbound signer notifications
//!
//! Fire-and-forget invitation email via a Resend-compatible HTTP API.
//! Delivery runs on spawned tasks after a document is created; failures
//! are logged and never reach the upload response. Not a dependency of
//! the compositing path.

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{DbDocument, DbSigner};

const EMAIL_API_URL: &str = "https://api.resend.com/emails";

#[derive(Clone)]
pub struct EmailNotifier {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
    frontend_origin: String,
    api_url: String,
}

#[derive(Debug, Serialize)]
struct InvitePayload<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
}

impl EmailNotifier {
    pub fn new(api_key: Option<String>, from: String, frontend_origin: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
            frontend_origin,
            api_url: EMAIL_API_URL.to_string(),
        }
    }

    /// Queue one invitation per signer that has an email address.
    /// Returns immediately.
    pub fn notify_signers(&self, document: &DbDocument, signers: &[DbSigner]) {
        if self.api_key.is_none() {
            debug!("Email delivery unconfigured; skipping signer invitations");
            return;
        }

        let signing_url = format!("{}/{}", self.frontend_origin, document.stored_filename);
        for signer in signers {
            let Some(email) = signer.email.clone() else {
                continue;
            };
            let notifier = self.clone();
            let signer_name = signer.name.clone();
            let document_name = document.original_filename.clone();
            let signing_url = signing_url.clone();
            tokio::spawn(async move {
                notifier
                    .send_invite(email, &signer_name, &document_name, &signing_url)
                    .await;
            });
        }
    }

    async fn send_invite(&self, to: String, signer_name: &str, document_name: &str, url: &str) {
        let Some(api_key) = &self.api_key else {
            return;
        };

        let subject = format!("You are invited to sign \"{}\"", document_name);
        let html = invite_html(signer_name, document_name, url);
        let recipients = [to];
        let payload = InvitePayload {
            from: &self.from,
            to: &recipients,
            subject: &subject,
            html: &html,
        };

        match self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("Invitation sent to {}", recipients[0]);
            }
            Ok(response) => {
                warn!(
                    "Invitation to {} rejected by email API: {}",
                    recipients[0],
                    response.status()
                );
            }
            Err(e) => {
                warn!("Invitation to {} failed: {}", recipients[0], e);
            }
        }
    }
}

fn invite_html(signer_name: &str, document_name: &str, url: &str) -> String {
    format!(
        "<p>Hello {},</p>\
         <p>You have been invited to sign <strong>{}</strong>.</p>\
         <p><a href=\"{}\">Review and sign the document</a></p>",
        signer_name, document_name, url
    )
}
