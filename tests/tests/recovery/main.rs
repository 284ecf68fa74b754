#[macro_use]
#[path = "../fixtures/mod.rs"]
mod fixtures;

// The number indicate the preferred running order for these case.

mod t10_resume_closed_round;
mod t20_lease_exclusion;
mod t21_lease_keep_alive;
mod t30_store_failure;
mod t40_random_source_failure;
