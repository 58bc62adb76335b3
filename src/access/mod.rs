//! Access control core.
//!
//! - [`role`] and [`guard`] decide what a page request may see.
//! - [`token`] verifies attempt-limited result tokens.
//! - [`request`] queues requests for fresh tokens.
//!
//! Identity and the student directory are external collaborators behind traits.

pub mod config;
pub mod directory;
pub mod error;
pub mod guard;
pub mod identity;
pub mod request;
pub mod role;
pub mod token;
pub(crate) mod utils;

pub use config::AccessConfig;
pub use directory::{MemoryStudentDirectory, PgStudentDirectory, Student, StudentDirectory};
pub use error::AccessError;
pub use guard::{Decision, GuardInput, GuardMachine, GuardState, IdentityState, ProfileState};
pub use identity::{
    Identity, IdentityResolver, Profile, ProfileStatus, SessionIdentityResolver,
    StaticIdentityResolver,
};
pub use request::{
    MemoryRequestStore, PgRequestStore, RequestQueue, RequestStatus, RequestStore, RequestType,
    TokenRequest,
};
pub use role::{Role, RouteTable};
pub use token::{MemoryTokenStore, PgTokenStore, TokenRecord, TokenStore, TokenVerifier};
