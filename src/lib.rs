pub mod assets;
pub mod config;
pub mod database;
pub mod epg;
pub mod errors;
pub mod ingestor;
pub mod models;
pub mod proxy;
pub mod services;
pub mod tagging;
pub mod utils;
