// src/models/mod.rs

pub mod page;
pub mod quiz;
pub mod session;
pub mod sync;
pub mod user;
