pub mod commands;
pub mod config;
pub mod logging;
pub mod performance;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod ui;
pub mod utils;
