use actix_web::{HttpResponse, ResponseError, http::StatusCode, web};
use anyhow::Context;

use super::helpers::e500;
use crate::domain::RecipientView;
use crate::helpers::{ErrorBody, error_chain_fmt};
use crate::ingestion::{decode_upload, normalize_rows};
use crate::store::RecipientStore;

#[derive(serde::Deserialize)]
pub struct UploadBody {
    spreadsheet_base64: String,
}

#[derive(serde::Serialize)]
struct UploadResponse {
    accepted: u64,
    skipped_duplicates: u64,
}

#[derive(thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    ValidationError(String),
    #[error("No valid email addresses were found in the spreadsheet.")]
    NoValidRecipients,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            UploadError::ValidationError(_) | UploadError::NoValidRecipients => {
                StatusCode::BAD_REQUEST
            }
            UploadError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            UploadError::UnexpectedError(_) => "Failed to store the uploaded recipients.".into(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody::new(message))
    }
}

#[tracing::instrument(name = "Uploading recipients spreadsheet", skip(body, store))]
pub async fn upload_recipients(
    body: web::Json<UploadBody>,
    store: web::Data<dyn RecipientStore>,
) -> Result<HttpResponse, UploadError> {
    let rows = decode_upload(&body.spreadsheet_base64)
        .map_err(|e| UploadError::ValidationError(e.to_string()))?;

    let recipients = normalize_rows(rows);
    if recipients.is_empty() {
        return Err(UploadError::NoValidRecipients);
    }
    let valid = recipients.len() as u64;

    let accepted = store
        .insert_many(recipients)
        .await
        .context("Failed to store the uploaded recipients.")?;

    Ok(HttpResponse::Ok().json(UploadResponse {
        accepted,
        skipped_duplicates: valid.saturating_sub(accepted),
    }))
}

#[derive(serde::Serialize)]
struct RecipientList {
    recipients: Vec<RecipientView>,
}

#[tracing::instrument(name = "Listing recipients", skip(store))]
pub async fn list_recipients(
    store: web::Data<dyn RecipientStore>,
) -> Result<HttpResponse, actix_web::Error> {
    let recipients = store.list_all().await.map_err(e500)?;

    Ok(HttpResponse::Ok().json(RecipientList {
        recipients: recipients.into_iter().map(RecipientView::from).collect(),
    }))
}
