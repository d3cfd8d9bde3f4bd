use std::net::TcpListener;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use quota_mailer::{
    authentication::{BACKEND_SECRET_HEADER, BackendSecret},
    configuration::{DatabaseSettings, get_configuration},
    dispatch::SystemClock,
    domain::NewRecipient,
    startup::{AppState, run},
    store::{InMemoryQuotaLedger, InMemoryRecipientStore, RecipientStore},
    telemetry::{get_subscriber, init_subscriber},
};
use secrecy::SecretString;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;
use wiremock::MockServer;

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub struct TestApp {
    pub address: String,
    pub email_server: MockServer,
    pub store: Arc<InMemoryRecipientStore>,
    pub ledger: Arc<InMemoryQuotaLedger>,
    pub backend_secret: String,
    pub api_client: reqwest::Client,
}

impl TestApp {
    pub async fn post_upload(&self, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/recipients/upload", &self.address))
            .header(BACKEND_SECRET_HEADER, &self.backend_secret)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_recipients(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/recipients", &self.address))
            .header(BACKEND_SECRET_HEADER, &self.backend_secret)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_status(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/status", &self.address))
            .header(BACKEND_SECRET_HEADER, &self.backend_secret)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_dispatch(&self, body: &serde_json::Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/dispatch", &self.address))
            .header(BACKEND_SECRET_HEADER, &self.backend_secret)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn seed_recipients(&self, count: usize) -> Vec<String> {
        let emails: Vec<String> = (0..count)
            .map(|i| format!("reader{i}@example.com"))
            .collect();
        let recipients = emails
            .iter()
            .map(|e| NewRecipient::try_from(e.clone()).unwrap())
            .collect();
        self.store.insert_many(recipients).await.unwrap();
        emails
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Base64 of an xlsx workbook whose first sheet has an `email` column.
pub fn spreadsheet_base64(emails: &[&str]) -> String {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.write_string(0, 0, "email").unwrap();
    for (i, email) in emails.iter().enumerate() {
        worksheet.write_string(i as u32 + 1, 0, *email).unwrap();
    }
    STANDARD.encode(workbook.save_to_buffer().unwrap())
}

pub fn dispatch_body() -> serde_json::Value {
    serde_json::json!({
        "subject": "Weekly news",
        "body_html": "<p>Hello <img src=\"cid:image1\"></p>"
    })
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_limit(80).await
}

pub async fn spawn_app_with_limit(daily_limit: u32) -> TestApp {
    Lazy::force(&TRACING);

    let email_server = MockServer::start().await;

    let mut config = get_configuration().expect("Failed to read configuration");
    config.email_client.base_url = email_server.uri();
    config.email_client.timeout_ms = 2_000;
    config.dispatch.daily_limit = daily_limit;
    config.dispatch.send_delay_ms = 0;
    let backend_secret = Uuid::new_v4().to_string();

    let store = Arc::new(InMemoryRecipientStore::new());
    let ledger = Arc::new(InMemoryQuotaLedger::new());
    let email_client = config
        .email_client
        .client()
        .expect("Failed to build the email client.");

    let state = AppState {
        store: store.clone(),
        ledger: ledger.clone(),
        transport: Arc::new(email_client),
        clock: Arc::new(SystemClock),
        dispatch: config.dispatch,
        backend_secret: BackendSecret(SecretString::from(backend_secret.clone())),
    };

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port.");
    let port = listener.local_addr().unwrap().port();
    let server = run(listener, state).expect("Failed to bind address.");

    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{port}"),
        email_server,
        store,
        ledger,
        backend_secret,
        api_client: reqwest::Client::new(),
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to Postgres");

    connection
        .execute(format!(r#"CREATE DATABASE "{}";"#, config.database_name).as_str())
        .await
        .expect("Failed to create database");

    let connection_pool = PgPool::connect_with(config.with_db())
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate database");

    connection_pool
}

/// A fresh, migrated database for exercising the Postgres adapters.
pub async fn spawn_database() -> PgPool {
    Lazy::force(&TRACING);

    let mut config = get_configuration().expect("Failed to read configuration");
    config.database.database_name = Uuid::new_v4().to_string();
    configure_database(&config.database).await
}
