pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod query;
pub mod server;
