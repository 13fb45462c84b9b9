pub mod auth;
pub mod bonus;
pub mod core;
pub mod game;
pub mod handlers;
pub mod models;
pub mod stores;
pub mod utils;
pub mod wal;
