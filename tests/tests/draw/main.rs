#[macro_use]
#[path = "../fixtures/mod.rs"]
mod fixtures;

// The number indicate the preferred running order for these case.

mod t10_draw_due_round;
mod t20_concurrent_executors;
mod t40_cadence_successor;
mod t50_notifier_failure;
mod t70_announcements;
