//! Shared constants of the provider.

/// Provider tag identifying this provider to the machine-controller fleet
/// manager. Requests carrying a different tag are rejected.
pub const PROVIDER_NAME: &str = "ironcore-metal";

/// Field owner recorded by the API server for server-side apply, so
/// repeated applies are idempotent.
pub const FIELD_OWNER: &str = "mcm.ironcore.dev/field-owner";

/// Label carrying the owning ServerClaim's name on IPAddressClaims.
pub const LABEL_KEY_SERVER_CLAIM_NAME: &str = "metal.ironcore.dev/server-claim-name";

/// Label carrying the owning ServerClaim's namespace on IPAddressClaims.
pub const LABEL_KEY_SERVER_CLAIM_NAMESPACE: &str = "metal.ironcore.dev/server-claim-namespace";

/// Annotation marking a ServerClaim for re-creation because it did not bind
/// a server during the current create attempt.
pub const ANNOTATION_KEY_MACHINE_RECREATE: &str = "metal.ironcore.dev/mcm-machine-recreate";

/// Annotation on a Server carrying its loopback address.
pub const ANNOTATION_KEY_LOOPBACK_ADDRESS: &str = "metal.ironcore.dev/loopbackAddress";

/// Key under which the rendered ignition is stored when the provider spec
/// does not pick one.
pub const DEFAULT_IGNITION_KEY: &str = "ignition";

/// Maximum length of a DNS-1123 subdomain, the limit for resource names.
pub const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
