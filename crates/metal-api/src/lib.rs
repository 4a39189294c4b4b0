//! Resource model for the metal machine provider.
//!
//! Typed definitions of the cluster resources the provider coordinates:
//! - `ServerClaim` / `Server` - bare-metal reservation and inventory
//! - `IPAddressClaim` / `IPAddress` - cluster-api IPAM resources
//!
//! plus the `ProviderSpec` payload embedded in machine classes, shared
//! label/annotation constants, and the request validator.

pub mod constants;
pub mod ip_address;
pub mod ip_claim;
pub mod provider_spec;
pub mod server;
pub mod server_claim;
pub mod validation;

pub use constants::*;
pub use ip_address::*;
pub use ip_claim::*;
pub use provider_spec::*;
pub use server::*;
pub use server_claim::*;
