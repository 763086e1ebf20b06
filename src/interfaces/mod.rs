//! Inbound adapters. The HTTP surface is gated behind `http-server`.

#[cfg(feature = "http-server")]
pub mod http;
