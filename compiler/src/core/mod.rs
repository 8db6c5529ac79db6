//! Pure compilation logic. No filesystem access.

pub mod compiler;
pub mod env_manifest;
pub mod error;
pub mod expression;
pub mod handlers;
pub mod needs_scan;
pub mod permission_validator;
pub mod permissions;
pub mod threat_detection;
pub mod types;
