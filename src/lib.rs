pub mod achievements;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod progression;
