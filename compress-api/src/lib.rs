#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

pub mod api;
pub mod archive;
pub mod batch;
pub mod common;
pub mod compression;
pub mod config;
pub mod context;
pub mod intake;
pub mod janitor;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
