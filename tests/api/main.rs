mod helpers;
mod postgres_store;
mod recipients;
