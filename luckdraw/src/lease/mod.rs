//! Per-round mutual exclusion across replicas.

mod exclusivity;
mod guard;
#[allow(clippy::module_inception)] mod lease;

pub use exclusivity::ExclusivityLease;
pub use guard::LeaseGuard;
pub use lease::Lease;
