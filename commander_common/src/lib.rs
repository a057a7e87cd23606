//! Commander Common Library
//!
//! This crate provides the shared building blocks used by every crate of
//! the commander workspace.
//!
//! # Module Structure
//!
//! - [`envelope`] - Addressed, immutable message units and subscriber ids
//! - [`bus`] - In-process register/post message bus
//! - [`catalog`] - Public and private command catalogs
//! - [`component`] - Component keywords and the read-only component directory
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Fixed link parameters and well-known subscriber ids
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use commander_common::prelude::*;
//! ```

pub mod bus;
pub mod catalog;
pub mod component;
pub mod config;
pub mod consts;
pub mod envelope;
pub mod prelude;
