pub mod config;
pub mod credential_store;
pub mod error;
pub mod event_mapper;
pub mod event_time_repository;
pub mod google_calendar_client;
pub mod oauth_client;
pub mod storage;
pub mod task_repository;
pub mod user_repository;
