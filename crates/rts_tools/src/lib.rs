//! # RTS Development Tools
//!
//! Command-line tools for working with kernel data:
//! - Map encoder and decoder (RON record lists to and from binary maps)
//! - Map validator
//! - Headless frame runner and replay verifier

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod data;
pub mod encode;
pub mod error;
pub mod runner;
pub mod validate;
