#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod app;
pub mod clients;
pub mod config;
pub mod deadletter;
pub mod domain;
pub mod error;
pub mod mapper;
pub mod observability;
pub mod publish;
pub mod service;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub(crate) mod util;
