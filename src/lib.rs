pub mod api;
pub mod app;
pub mod auth;
pub mod charts;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fetch;
pub mod images;
pub mod index;
pub mod integrations;
pub mod jobs;
pub mod model;
pub mod state;
pub mod storage;
