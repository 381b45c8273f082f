// src/services/mod.rs

pub mod parser;
pub mod session;
pub mod sync;
pub mod versioning;
