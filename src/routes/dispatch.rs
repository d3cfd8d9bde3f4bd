use actix_web::{HttpResponse, ResponseError, http::StatusCode, web};

use crate::configuration::DispatchSettings;
use crate::dispatch::{DispatchEngine, DispatchError};
use crate::domain::{InlineAttachment, OutgoingMessage};
use crate::helpers::error_chain_fmt;

#[derive(serde::Deserialize)]
pub struct DispatchBody {
    subject: String,
    body_html: String,
    attachment: Option<AttachmentBody>,
}

#[derive(serde::Deserialize)]
pub struct AttachmentBody {
    content_base64: String,
    content_type: Option<String>,
}

impl TryFrom<DispatchBody> for OutgoingMessage {
    type Error = String;

    fn try_from(body: DispatchBody) -> Result<Self, Self::Error> {
        let attachment = body
            .attachment
            .map(|a| InlineAttachment::parse(&a.content_base64, a.content_type))
            .transpose()?;
        OutgoingMessage::parse(body.subject, body.body_html, attachment)
    }
}

#[derive(thiserror::Error)]
pub enum DispatchRequestError {
    #[error("{0}")]
    ValidationError(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl std::fmt::Debug for DispatchRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[derive(serde::Serialize)]
struct DispatchFailureBody {
    error: String,
    sent_this_cycle: u32,
}

impl ResponseError for DispatchRequestError {
    fn status_code(&self) -> StatusCode {
        match self {
            DispatchRequestError::ValidationError(_) => StatusCode::BAD_REQUEST,
            DispatchRequestError::Dispatch(DispatchError::CycleInProgress) => StatusCode::CONFLICT,
            DispatchRequestError::Dispatch(DispatchError::Storage { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let sent_this_cycle = match self {
            DispatchRequestError::Dispatch(e) => e.sent_this_cycle(),
            DispatchRequestError::ValidationError(_) => 0,
        };
        HttpResponse::build(self.status_code()).json(DispatchFailureBody {
            error: self.to_string(),
            sent_this_cycle,
        })
    }
}

#[tracing::instrument(
    name = "Dispatching a batch",
    skip(body, engine, settings),
    fields(subject = %body.subject)
)]
pub async fn dispatch_batch(
    body: web::Json<DispatchBody>,
    engine: web::Data<DispatchEngine>,
    settings: web::Data<DispatchSettings>,
) -> Result<HttpResponse, DispatchRequestError> {
    let message: OutgoingMessage = body
        .into_inner()
        .try_into()
        .map_err(DispatchRequestError::ValidationError)?;

    let report = engine.run_cycle(settings.daily_limit, &message).await?;

    Ok(HttpResponse::Ok().json(report))
}
