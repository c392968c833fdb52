pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod comments;
pub mod config;
pub mod database;
pub mod error;
pub mod items;
pub mod node;
pub mod profiles;
pub mod rate_limit;
pub mod ratings;
pub mod search;
pub mod telemetry;
pub mod utils;
pub mod votes;
