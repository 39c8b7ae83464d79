pub mod archive;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod humanize;
pub mod ledger;
pub mod mapper;
pub mod mint;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod rpc;
pub mod server;
pub mod store;
pub mod validator;
