//! Connectors
//!
//! Thin, swappable clients for the external e-commerce platform. The engine
//! and webhook processor depend on the [`PlatformSource`] trait only, so
//! tests can substitute an in-memory source.

pub mod platform;

pub use platform::{
    FieldDescriptor, HttpPlatformConnector, PlatformPage, PlatformRecord, PlatformSource,
};
