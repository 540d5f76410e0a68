pub mod config;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod modules;
pub mod schema;
pub mod server;
