//! # slipway-id
//!
//! Stable ID and reference types, parsing, and validation for the slipway
//! control plane.
//!
//! ## Design Principles
//!
//! - IDs are system-generated and opaque; references (`ServiceId`,
//!   `ImageId`) are parsed from user input with a lenient, documented
//!   grammar
//! - All types have a canonical string representation that roundtrips
//!   (parse → format → parse)
//! - Types are distinct to prevent mixing a service reference with an
//!   image reference or a job id
//!
//! ## Formats
//!
//! - Release job ids: `rel_{ulid}` (e.g. `rel_01HV4Z2WQXKJNM8GPQY6VBKC3D`)
//! - Service references: `{namespace}/{name}` (e.g. `default/web`)
//! - Image references: `[host/]repository[:tag]` (e.g. `acme/web:v2`)

mod error;
mod image;
mod macros;
mod service;
mod types;

pub use error::IdError;
pub use image::{ImageId, ImageSpec};
pub use service::{ServiceId, ServiceSpec};
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
