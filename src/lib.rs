pub mod cli;
pub mod config;
pub mod error;
pub mod report;

pub mod database;
pub mod models;
pub mod services;
pub mod storage;
