//! Concrete [`Backend`](crate::backend::Backend) implementations.
//!
//! Each submodule speaks one vendor's API while conforming to the uniform backend contract.

pub mod common;

pub mod openai;
