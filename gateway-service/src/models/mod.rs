pub mod account;
pub mod identity;
pub mod invite;
pub mod organization;
pub mod permission;
pub mod role;

pub use account::{Account, AccountKind, AccountPatch, AccountResponse, AccountStatus};
pub use identity::Identity;
pub use invite::{Invite, InvitePatch};
pub use organization::Organization;
pub use permission::{Permission, PermissionModel, PermissionSet};
pub use role::Role;
