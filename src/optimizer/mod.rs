mod histogram;
mod join_optimizer;
mod table_stats;

pub use histogram::IntHistogram;
pub use join_optimizer::{JoinOptimizer, LogicalJoinNode};
pub use table_stats::{compute_statistics, TableStats, TableStatsMap, IO_COST_PER_PAGE, NUM_HIST_BINS};
