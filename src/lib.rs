pub mod aggregate;
pub mod backup;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod exit;
pub mod loader;
pub mod logs;
pub mod pending;
pub mod platform;
pub mod process;
pub mod reporting;
pub mod retention;
pub mod ui;
