use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::error::InternalError;
use actix_web::middleware::Next;
use actix_web::{HttpResponse, web};
use secrecy::{ExposeSecret, SecretString};

use crate::helpers::ErrorBody;

pub const BACKEND_SECRET_HEADER: &str = "X-Backend-Secret";

#[derive(Clone)]
pub struct BackendSecret(pub SecretString);

impl BackendSecret {
    fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.expose_secret().as_bytes();
        let candidate = candidate.as_bytes();
        // Constant time over the candidate.
        expected.len() == candidate.len()
            && expected
                .iter()
                .zip(candidate)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

pub async fn reject_unauthorized_callers(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let secret = req
        .app_data::<web::Data<BackendSecret>>()
        .ok_or_else(|| anyhow::anyhow!("The backend secret is not configured."))
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let authorized = req
        .headers()
        .get(BACKEND_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|candidate| secret.matches(candidate));

    if authorized {
        return next.call(req).await;
    }

    tracing::warn!(
        path = %req.path(),
        "Rejected a request with a missing or wrong backend secret."
    );
    let response = HttpResponse::Unauthorized().json(ErrorBody::new("Unauthorized"));
    let e = anyhow::anyhow!("Missing or invalid backend secret.");
    Err(InternalError::from_response(e, response).into())
}
