//! Network services: the HTTP control surface.
//!
//! The handlers share one [`OvenBridge`](crate::bridge::OvenBridge) through an
//! `Arc`. They read state through the store snapshot and issue commands only
//! through the gateway:
//!
//! ```ignore
//! use std::sync::Arc;
//! use reflow_bridge::services::{build_router, WebServerConfig};
//!
//! let bridge = Arc::new(OvenBridge::new(&config));
//! let link_task = bridge.spawn_link(device, token.clone());
//! let router = build_router(Arc::clone(&bridge), &WebServerConfig::default());
//! ```

pub mod api;
pub mod web;

pub use api::*;
pub use web::*;
