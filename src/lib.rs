//! Core of a local HTTP/HTTPS forward proxy that defeats SNI-based DPI by
//! fragmenting the TLS ClientHello across multiple short TLS records.

pub mod blacklist;
pub mod config;
pub mod error;
pub mod fragment;
pub mod handler;
pub mod logging;
pub mod pipe;
pub mod registry;
pub mod server;
pub mod stats;
