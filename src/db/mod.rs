// Database module
// This module handles SQLite storage of played episodes

pub mod connection;
pub mod migrations;
pub mod models;
pub mod operations;
