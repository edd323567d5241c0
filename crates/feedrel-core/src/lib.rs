//! Core types and trait definitions for the feedrel relational output.
//!
//! This crate is deliberately free of database drivers. Backends implement
//! [`store::Session`]; the output bot drives sessions through the traits
//! defined here.

pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod store;

pub use error::{Error, ErrorKind, Result};
