pub mod activity;
pub mod conversions;

pub use activity::{
    AddressEventStats, ArgValue, BlockWindow, Chunk, EventSpec, LogRecord, StatsResult,
};
