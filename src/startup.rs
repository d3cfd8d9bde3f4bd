use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::Server;
use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::middleware::from_fn;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, ResponseError, web};
use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_actix_web::TracingLogger;

use crate::authentication::{BackendSecret, reject_unauthorized_callers};
use crate::configuration::{DatabaseSettings, DispatchSettings, Settings};
use crate::dispatch::{Clock, DispatchEngine, SystemClock, Transport};
use crate::helpers::ErrorBody;
use crate::routes::{
    dispatch_batch, dispatch_status, health_check, list_recipients, upload_recipients,
};
use crate::store::{PostgresQuotaLedger, PostgresRecipientStore, QuotaLedger, RecipientStore};

pub struct Application {
    port: u16,
    server: Server,
}

/// Everything the HTTP layer needs, independent of where it is stored.
pub struct AppState {
    pub store: Arc<dyn RecipientStore>,
    pub ledger: Arc<dyn QuotaLedger>,
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub dispatch: DispatchSettings,
    pub backend_secret: BackendSecret,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let email_client = config.email_client.client()?;
        let connection_pool = get_connection_pool(&config.database);

        sqlx::migrate!("./migrations")
            .run(&connection_pool)
            .await
            .context("Failed to migrate the database.")?;

        let state = AppState {
            store: Arc::new(PostgresRecipientStore::new(connection_pool.clone())),
            ledger: Arc::new(PostgresQuotaLedger::new(connection_pool)),
            transport: Arc::new(email_client),
            clock: Arc::new(SystemClock),
            dispatch: config.dispatch,
            backend_secret: BackendSecret(config.app.backend_secret),
        };

        let address = format!("{}:{}", config.app.host, config.app.port);
        let listener = TcpListener::bind(&address)
            .with_context(|| format!("Failed to bind {address}."))?;
        let port = listener.local_addr()?.port();
        let server = run(listener, state)?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, anyhow::Error> {
    let engine = web::Data::new(
        DispatchEngine::new(
            state.store.clone(),
            state.ledger.clone(),
            state.transport,
            state.dispatch.send_delay(),
        )
        .with_clock(state.clock.clone()),
    );
    let store: web::Data<dyn RecipientStore> = web::Data::from(state.store);
    let ledger: web::Data<dyn QuotaLedger> = web::Data::from(state.ledger);
    let clock: web::Data<dyn Clock> = web::Data::from(state.clock);
    let dispatch_settings = web::Data::new(state.dispatch);
    let backend_secret = web::Data::new(state.backend_secret);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("")
                    .wrap(from_fn(reject_unauthorized_callers))
                    .route("/recipients", web::get().to(list_recipients))
                    .route("/recipients/upload", web::post().to(upload_recipients))
                    .route("/status", web::get().to(dispatch_status))
                    .route("/dispatch", web::post().to(dispatch_batch)),
            )
            .app_data(
                web::JsonConfig::default()
                    .limit(10 * 1024 * 1024)
                    .error_handler(reject_malformed_json),
            )
            .app_data(engine.clone())
            .app_data(store.clone())
            .app_data(ledger.clone())
            .app_data(clock.clone())
            .app_data(dispatch_settings.clone())
            .app_data(backend_secret.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

fn reject_malformed_json(e: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::warn!(error.message = %e, "Rejected a malformed JSON payload.");
    let response = HttpResponse::build(e.status_code()).json(ErrorBody::new(e.to_string()));
    InternalError::from_response(e, response).into()
}

pub fn get_connection_pool(db_config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(db_config.with_db())
}
