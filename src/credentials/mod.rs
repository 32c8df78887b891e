//! Credential management
//!
//! - [`pool`] - quota tracking, leasing and rotation
//! - [`source`] - loading keys from configuration and the environment

pub mod pool;
pub mod source;

pub use pool::{
    CredentialHealth, CredentialMetrics, CredentialPool, CredentialStatus, Lease, PoolSettings,
    SharedCredentialPool,
};
pub use source::{
    ChainedCredentialSource, CredentialSource, CredentialSpec, EnvCredentialSource,
    StaticCredentialSource,
};
