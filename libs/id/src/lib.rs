//! # minik8s-id
//!
//! Opaque identifier types, parsing, and validation for minik8s.
//!
//! ## Design Principles
//!
//! - Identifiers are opaque strings; nothing downstream inspects their structure
//! - All identifiers are validated on construction with strict parsing
//! - Identifiers support roundtrip serialization (parse → format → parse)
//! - Identifiers are typed to prevent mixing pods, nodes, and other resources
//!
//! ## Format
//!
//! An identifier is a non-empty string of at most [`MAX_ID_LEN`] bytes that
//! contains no whitespace or control characters. Generated identifiers are
//! lowercase hyphenated UUIDv4 strings, matching what the control plane hands
//! out when it stores a new pod:
//!
//! - `6f1c8f0e-2b5d-4a51-9a43-55f1d7c0e9b2`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Maximum accepted identifier length in bytes.
pub const MAX_ID_LEN: usize = 253;

/// Re-export uuid for consumers that need to mint identifiers themselves.
pub use uuid::Uuid;
