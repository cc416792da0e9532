//! # API Route Modules
//!
//! Each module exposes a `router()` mounted by [`crate::app`].

pub mod publishes;
pub mod versions;
