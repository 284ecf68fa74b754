//! The round lifecycle data model.

mod cadence;
mod draw_result;
#[allow(clippy::module_inception)] mod round;
mod status;


pub use cadence::utc_date;
pub use cadence::Cadence;
pub use draw_result::DrawResult;
pub use draw_result::Seed;
pub use draw_result::SEED_LEN;
pub use round::Entry;
pub use round::Round;
pub use round::RoundSpec;
pub use status::RoundStatus;
