//! leadscout - prospect discovery from CRM search submissions.
//!
//! Watches a browser session for "new search" submissions, runs each search
//! once against the paginated people/company endpoints, stores new prospects
//! and leaves a report plus a history entry behind.

#![allow(clippy::should_implement_trait)]

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod fetcher;
pub mod history;
pub mod models;
pub mod rate_limit;
pub mod report;
pub mod repository;
pub mod search;
pub mod trigger;
