pub mod auth;
pub mod fallback;
pub mod game;
pub mod health;
