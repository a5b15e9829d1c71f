//! Topology vocabulary shared by collaborators: relation types, link
//! helpers, and the user-metadata overlay.

/// Relation types and idempotent link helpers.
pub mod links;
mod user_metadata;

pub use links::{
    add_layer2_link, add_link, add_ownership_link, ensure_host, find_link, has_owner, owner,
    HOST_TYPE, LAYER2, OWNERSHIP,
};
pub use user_metadata::{UserMetadataManager, UserMetadataRule, USER_METADATA_KEY};
