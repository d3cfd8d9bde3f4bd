use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::dispatch::Transport;
use crate::domain::{InlineAttachment, OutgoingMessage, RecipientEmail};

#[derive(Clone)]
pub struct EmailClient {
    http_client: Client,
    endpoint: Url,
    sender: String,
    auth_token: SecretString,
}

#[derive(Serialize)]
struct AttachmentUnit<'a> {
    filename: String,
    content: String,
    content_type: &'a str,
    content_id: &'a str,
}

impl<'a> From<&'a InlineAttachment> for AttachmentUnit<'a> {
    fn from(attachment: &'a InlineAttachment) -> Self {
        Self {
            filename: attachment.filename(),
            content: STANDARD.encode(attachment.content()),
            content_type: attachment.content_type(),
            content_id: attachment.content_id(),
        }
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentUnit<'a>>,
}

impl EmailClient {
    pub fn new(
        base_url: &str,
        sender_name: &str,
        sender: RecipientEmail,
        auth_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let endpoint = Url::parse(base_url)
            .and_then(|url| url.join("emails"))
            .context("Failed parsing base email api url.")?;
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed building the email http client.")?;

        Ok(Self {
            http_client,
            endpoint,
            sender: format!("{sender_name} <{sender}>"),
            auth_token,
        })
    }

    pub async fn send_email(
        &self,
        recipient: &RecipientEmail,
        subject: &str,
        html_content: &str,
        attachment: Option<&InlineAttachment>,
    ) -> Result<(), reqwest::Error> {
        let body = SendEmailRequest {
            from: &self.sender,
            to: vec![recipient.as_ref()],
            subject,
            html: html_content,
            attachments: attachment.into_iter().map(AttachmentUnit::from).collect(),
        };

        self.http_client
            .post(self.endpoint.clone())
            .bearer_auth(self.auth_token.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[async_trait]
impl Transport for EmailClient {
    async fn send(
        &self,
        recipient: &RecipientEmail,
        message: &OutgoingMessage,
    ) -> Result<(), anyhow::Error> {
        self.send_email(
            recipient,
            message.subject.as_ref(),
            &message.html_body,
            message.attachment.as_ref(),
        )
        .await
        .with_context(|| format!("The email provider rejected the message to {recipient}."))
    }
}
