//! Client gateway for the metal cluster.
//!
//! Every store access of the provider goes through this crate:
//! - `MetalClient` - the typed store operations the provider needs
//! - `KubeMetalClient` - the kube-backed implementation
//! - `MockMetalClient` - in-memory implementation for tests
//! - `ClientProvider` - scoped access to a hot-swappable client

pub mod client;
pub mod error;
pub mod mock;
pub mod provider;
pub mod traits;

pub use client::KubeMetalClient;
pub use error::ClientError;
pub use mock::MockMetalClient;
pub use provider::ClientProvider;
pub use traits::MetalClient;
