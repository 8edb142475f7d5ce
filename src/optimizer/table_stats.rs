use std::collections::HashMap;

use log::info;

use crate::{
    common::Database,
    execution::Op,
    optimizer::histogram::IntHistogram,
    storage::{schema::Type, tuple::Cell},
    transaction::Transaction,
    utils::HandyRwLock,
};

pub const NUM_HIST_BINS: usize = 100;
pub const IO_COST_PER_PAGE: usize = 1000;

/// Statistics over one base table: a histogram per int column plus
/// tuple and page counts. Built by scanning the table; never
/// refreshed.
pub struct TableStats {
    histograms: HashMap<usize, IntHistogram>,
    io_cost_per_page: usize,
    num_tuples: usize,
    num_pages: usize,
}

impl TableStats {
    /// Scan the table once for the min/max of every int column, then
    /// once more to fill the histograms.
    pub fn new(table_id: u32, io_cost_per_page: usize) -> Self {
        let table_pod = Database::catalog().get_table(&table_id).unwrap();
        let table = table_pod.rl();
        let heap = table.as_heap();
        let schema = table.get_schema();

        let mut mins: HashMap<usize, i64> = HashMap::new();
        let mut maxs: HashMap<usize, i64> = HashMap::new();

        let tx = Transaction::new();
        tx.start().unwrap();

        let mut num_tuples = 0;
        for t in heap.iter(&tx) {
            num_tuples += 1;
            for (i, field) in schema.fields.iter().enumerate() {
                if field.t != Type::Int64 {
                    continue;
                }
                let v = t.get_cell(i).get_int64();
                mins.entry(i)
                    .and_modify(|m| *m = (*m).min(v))
                    .or_insert(v);
                maxs.entry(i)
                    .and_modify(|m| *m = (*m).max(v))
                    .or_insert(v);
            }
        }

        let mut histograms: HashMap<usize, IntHistogram> = mins
            .iter()
            .map(|(i, min)| (*i, IntHistogram::new(NUM_HIST_BINS, *min, maxs[i])))
            .collect();

        for t in heap.iter(&tx) {
            for (i, hist) in histograms.iter_mut() {
                hist.add_value(t.get_cell(*i).get_int64());
            }
        }

        let num_pages = heap.num_pages();
        tx.commit().unwrap();

        Self {
            histograms,
            io_cost_per_page,
            num_tuples,
            num_pages,
        }
    }

    /// Cost of one full scan: every page is read once, partial last
    /// page included.
    pub fn estimate_scan_cost(&self) -> f64 {
        (self.num_pages * self.io_cost_per_page) as f64
    }

    /// Tuple count surviving a predicate of the given selectivity.
    pub fn estimate_table_cardinality(&self, selectivity: f64) -> usize {
        (self.num_tuples as f64 * selectivity) as usize
    }

    pub fn estimate_selectivity(&self, field: usize, op: Op, constant: &Cell) -> f64 {
        match self.histograms.get(&field) {
            Some(hist) => hist.estimate_selectivity(op, constant.get_int64()),
            None => 1.0,
        }
    }

    pub fn avg_selectivity(&self, field: usize) -> f64 {
        match self.histograms.get(&field) {
            Some(hist) => hist.avg_selectivity(),
            None => 1.0,
        }
    }

    pub fn total_tuples(&self) -> usize {
        self.num_tuples
    }
}

/// The name-keyed stats registry consulted by the join optimizer.
pub struct TableStatsMap {
    map: HashMap<String, TableStats>,
}

impl TableStatsMap {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn get(&self, table_name: &str) -> Option<&TableStats> {
        self.map.get(table_name)
    }

    pub fn set(&mut self, table_name: &str, stats: TableStats) {
        self.map.insert(table_name.to_string(), stats);
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Build statistics for every registered table. Runs once at startup.
pub fn compute_statistics() {
    info!("computing table statistics");

    let table_ids = Database::catalog().table_ids();
    for table_id in table_ids {
        let name = match Database::catalog().get_table_name(&table_id) {
            Some(name) => name,
            None => continue,
        };

        // histograms cover the heap tables; index files have none
        let is_heap = Database::catalog()
            .get_table(&table_id)
            .map_or(false, |t| t.rl().is_heap());
        if !is_heap {
            continue;
        }

        let stats = TableStats::new(table_id, IO_COST_PER_PAGE);
        Database::mut_table_stats().set(&name, stats);
    }

    info!("table statistics done");
}
