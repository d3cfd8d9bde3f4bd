use actix_web::{HttpResponse, web};

use super::helpers::e500;
use crate::configuration::DispatchSettings;
use crate::dispatch::Clock;
use crate::domain::RecipientState;
use crate::store::{QuotaLedger, RecipientStore};

#[derive(serde::Serialize)]
struct StatusResponse {
    total: u64,
    sent: u64,
    pending: u64,
    sent_today: u32,
    daily_limit: u32,
}

#[tracing::instrument(name = "Reporting dispatch status", skip_all)]
pub async fn dispatch_status(
    store: web::Data<dyn RecipientStore>,
    ledger: web::Data<dyn QuotaLedger>,
    clock: web::Data<dyn Clock>,
    settings: web::Data<DispatchSettings>,
) -> Result<HttpResponse, actix_web::Error> {
    let sent = store
        .count_by_state(RecipientState::Sent)
        .await
        .map_err(e500)?;
    let pending = store
        .count_by_state(RecipientState::Pending)
        .await
        .map_err(e500)?;
    let sent_today = ledger.current_count(clock.today()).await.map_err(e500)?;

    Ok(HttpResponse::Ok().json(StatusResponse {
        total: sent + pending,
        sent,
        pending,
        sent_today,
        daily_limit: settings.daily_limit,
    }))
}
