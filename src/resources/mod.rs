//! Declarative resource-shape factories
//!
//! Thin functions that turn typed inputs into graph nodes. They add no
//! edges beyond those intrinsic to a single resource.

pub mod access;
pub mod compute;
pub mod events;
pub mod governance;
pub mod identity;
pub mod storage;

pub use governance::{BlueprintHandle, DomainHandle, MemberPrincipal};
pub use identity::{RoleHandle, RoleTable, UserHandle, UserTable};
pub use storage::{BucketHandle, BucketTable};
