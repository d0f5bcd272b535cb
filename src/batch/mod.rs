//! Streaming batch processing over entity-sorted CSV tables.

mod group;
pub mod io;
mod runner;

pub use group::{group_contiguous, try_group_contiguous, GroupContiguous, TryGroupContiguous};
pub use io::{
    open_input, point_inputs, point_records, read_entity_ids, CsvSink, ENTITY_COLUMN,
    MEDIAN_COLUMN,
};
pub use runner::{BatchRunner, BatchSummary, EmitMode};
