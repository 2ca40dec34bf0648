//! Economy: player balances and supply, production jobs and lines.

pub mod player;
pub mod production;
pub mod production_line;
pub mod ring_buffer;

pub use player::{Player, SupplyContribution};
pub use production::{JobOutcome, JobState, Product, ProductionJob};
pub use production_line::ProductionLine;
pub use ring_buffer::FixedRing;
