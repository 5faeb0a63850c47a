pub mod aggregate;
pub mod anomaly;
pub mod budget;
pub mod catalog;
pub mod config;
pub mod error;
pub mod forecast;
pub mod logging;
pub mod models;
pub mod notify;
pub mod rightsizing;
pub mod sources;
pub mod storage;
pub mod store;
