use chrono::{Duration, NaiveDate, Utc};
use claims::{assert_matches, assert_ok};
use quota_mailer::domain::{NewRecipient, RecipientState};
use quota_mailer::store::{
    PostgresQuotaLedger, PostgresRecipientStore, QuotaLedger, RecipientStore, StoreError,
};
use uuid::Uuid;

use crate::helpers::spawn_database;

fn new_recipients(emails: &[&str]) -> Vec<NewRecipient> {
    emails
        .iter()
        .map(|e| NewRecipient::try_from(e.to_string()).unwrap())
        .collect()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

#[tokio::test]
async fn insert_many_skips_addresses_already_stored_in_any_case() {
    let store = PostgresRecipientStore::new(spawn_database().await);

    let first = store
        .insert_many(new_recipients(&["a@x.com", "b@x.com"]))
        .await;
    let second = store
        .insert_many(new_recipients(&["B@X.com", "c@x.com"]))
        .await;

    assert_eq!(assert_ok!(first), 2);
    assert_eq!(assert_ok!(second), 1);
    assert_eq!(
        store.count_by_state(RecipientState::Pending).await.unwrap(),
        3
    );
    assert_eq!(store.count_by_state(RecipientState::Sent).await.unwrap(), 0);
}

#[tokio::test]
async fn select_pending_returns_the_oldest_recipients_up_to_the_bound() {
    let store = PostgresRecipientStore::new(spawn_database().await);
    store
        .insert_many(new_recipients(&["a@x.com", "b@x.com", "c@x.com"]))
        .await
        .unwrap();
    store
        .insert_many(new_recipients(&["d@x.com", "e@x.com"]))
        .await
        .unwrap();

    let batch = store.select_pending(4).await.unwrap();
    let emails: Vec<&str> = batch.iter().map(|r| r.email().as_ref()).collect();
    assert_eq!(emails, vec!["a@x.com", "b@x.com", "c@x.com", "d@x.com"]);

    store.mark_sent(batch[0].id(), Utc::now()).await.unwrap();
    let batch = store.select_pending(2).await.unwrap();
    let emails: Vec<&str> = batch.iter().map(|r| r.email().as_ref()).collect();
    assert_eq!(emails, vec!["b@x.com", "c@x.com"]);

    assert!(store.select_pending(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn mark_sent_keeps_the_first_timestamp() {
    let store = PostgresRecipientStore::new(spawn_database().await);
    store
        .insert_many(new_recipients(&["a@x.com"]))
        .await
        .unwrap();
    let id = store.select_pending(1).await.unwrap()[0].id();

    assert_ok!(store.mark_sent(id, Utc::now()).await);
    let first = store.list_all().await.unwrap()[0].sent_at();
    assert_ok!(store.mark_sent(id, Utc::now() + Duration::hours(1)).await);

    let recipients = store.list_all().await.unwrap();
    assert_eq!(recipients[0].state(), RecipientState::Sent);
    assert!(first.is_some());
    assert_eq!(recipients[0].sent_at(), first);
    assert_eq!(store.count_by_state(RecipientState::Sent).await.unwrap(), 1);
    assert_eq!(
        store.count_by_state(RecipientState::Pending).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn mark_sent_reports_unknown_recipients() {
    let store = PostgresRecipientStore::new(spawn_database().await);
    let unknown = Uuid::new_v4();

    let result = store.mark_sent(unknown, Utc::now()).await;

    assert_matches!(result, Err(StoreError::NotFound(id)) if id == unknown);
}

#[tokio::test]
async fn ledger_counts_start_at_zero_and_accumulate_per_day() {
    let ledger = PostgresQuotaLedger::new(spawn_database().await);

    assert_eq!(ledger.current_count(day(2)).await.unwrap(), 0);

    ledger.increment(day(2), 3).await.unwrap();
    ledger.increment(day(2), 2).await.unwrap();
    ledger.increment(day(3), 0).await.unwrap();

    assert_eq!(ledger.current_count(day(2)).await.unwrap(), 5);
    assert_eq!(ledger.current_count(day(3)).await.unwrap(), 0);
    assert_eq!(ledger.current_count(day(4)).await.unwrap(), 0);
}
