// src/lib.rs

//! keyword-relay library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
