//! # adminfs-authorization
//!
//! Everything that decides whether a caller may use the privileged helper.
//!
//! - [`PolicyAuthority`]: the external oracle (a policy daemon in production,
//!   [`StaticAuthority`] for configured deployments)
//! - [`AuthorizationGate`]: fail-closed wrapper used on every entry point of
//!   the helper
//! - [`AuthorizationDebounce`]: worker-side memory of the most recent read
//!   decision, so enumerating a tree does not prompt once per call

pub mod authority;
pub mod debounce;
pub mod gate;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use authority::{AuthorityAnswer, AuthorityError, Interaction, PolicyAuthority, StaticAuthority};
pub use debounce::{AuthorizationDebounce, DecisionSlot, Outcome, ReadAuthorization};
pub use gate::{AuthorizationGate, Decision};
