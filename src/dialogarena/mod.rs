// src/dialogarena/mod.rs

pub mod actor;
pub mod arena;
pub mod backend;
pub mod clients;
pub mod config;
pub mod event;
pub mod framing;
pub mod message;
pub mod prompt;
pub mod retry;
pub mod scheduler;
pub mod sentinel;

pub use actor::Actor;
pub use arena::Arena;
