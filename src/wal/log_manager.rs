use std::{
    collections::{HashMap, HashSet},
    io::SeekFrom,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    common::Database,
    error::DbError,
    io::{read_exact, Decode, Encode, SharedFile},
    storage::page::PageId,
    transaction::Transaction,
    types::DbResult,
};

/// Value of the file header when no checkpoint has been taken.
const NO_CHECKPOINT: u64 = 0;

#[derive(Debug, PartialEq, Clone, Copy)]
enum RecordType {
    Abort,
    Commit,
    Update,
    Start,
    Checkpoint,
}

impl RecordType {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RecordType::Abort,
            1 => RecordType::Commit,
            2 => RecordType::Update,
            3 => RecordType::Start,
            4 => RecordType::Checkpoint,
            _ => panic!("invalid log record type: {}", value),
        }
    }
}

impl Encode for RecordType {
    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Decode for RecordType {
    fn decode<R: std::io::Read>(reader: &mut R) -> Self {
        let value = read_exact(reader, 1);
        RecordType::from_u8(value[0])
    }
}

/// One parsed UPDATE record, kept around by recovery.
struct UpdateRecord {
    tid: u64,
    pid: PageId,
    before: Vec<u8>,
    after: Vec<u8>,
}

/// The append-only write-ahead log.
///
/// # File Layout
///
/// - 8 bytes: offset of the last CHECKPOINT record (0 = none)
/// - a sequence of records, each ending with the offset of its own
///   first byte, so scans can also walk backward
///
/// # Record Layouts
///
/// - START/COMMIT/ABORT: type u8, tid u64, self-offset u64
/// - UPDATE: type u8, tid u64, pid (9 bytes), before image
///   (u32 length + bytes), after image (u32 length + bytes),
///   self-offset u64
/// - CHECKPOINT: type u8, placeholder i64, live tx count u64, per tx
///   (tid u64, first-record offset u64), self-offset u64
pub struct LogManager {
    /// First-record offset of every live transaction.
    tx_start_position: HashMap<u64, u64>,

    file: SharedFile,

    /// The absolute position of the append cursor.
    current_offset: u64,

    total_records: usize,

    file_path: PathBuf,
}

impl LogManager {
    /// Open (or create) the log. The file is kept as found: whether it
    /// holds a crashed run's records is for `recover` to decide.
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let path = file_path.as_ref().to_path_buf();
        let file = SharedFile::open(&path).unwrap();

        let size = file.get_size().unwrap();
        file.seek(SeekFrom::End(0)).unwrap();

        Self {
            tx_start_position: HashMap::new(),
            file,
            current_offset: size,
            total_records: 0,
            file_path: path,
        }
    }

    /// Drop every record and start the file over.
    pub fn reset(&mut self) -> DbResult {
        self.reset_file()?;
        self.tx_start_position.clear();
        self.total_records = 0;
        Ok(())
    }

    fn reset_file(&mut self) -> DbResult {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write(&NO_CHECKPOINT)?;
        self.current_offset = self.file.get_current_position()?;
        Ok(())
    }

    pub fn records_count(&self) -> usize {
        self.total_records
    }

    pub fn file_path(&self) -> PathBuf {
        self.file_path.clone()
    }

    // About to append. A brand-new file first gets its checkpoint
    // header slot.
    fn pre_append(&mut self) -> DbResult {
        self.total_records += 1;

        if self.file.get_size()? == 0 {
            self.reset_file()?;
        }
        Ok(())
    }

    pub fn log_start(&mut self, tx: &Transaction) -> DbResult {
        self.pre_append()?;

        self.file.write(&RecordType::Start)?;
        self.file.write(&tx.get_id())?;
        self.file.write(&self.current_offset)?;

        self.tx_start_position.insert(tx.get_id(), self.current_offset);
        self.current_offset = self.file.get_current_position()?;
        Ok(())
    }

    /// Write an UPDATE record carrying both images of the page. Must
    /// reach the file before the page itself does (the caller's
    /// responsibility, and the only ordering the engine needs).
    pub fn log_update(
        &mut self,
        tid: u64,
        pid: &PageId,
        before: &[u8],
        after: &[u8],
    ) -> DbResult {
        self.pre_append()?;

        self.file.write(&RecordType::Update)?;
        self.file.write(&tid)?;
        self.file.write(pid)?;
        self.file.write(&before.to_vec())?;
        self.file.write(&after.to_vec())?;
        self.file.write(&self.current_offset)?;

        self.current_offset = self.file.get_current_position()?;
        Ok(())
    }

    pub fn log_commit(&mut self, tx: &Transaction) -> DbResult {
        self.pre_append()?;

        self.file.write(&RecordType::Commit)?;
        self.file.write(&tx.get_id())?;
        self.file.write(&self.current_offset)?;

        self.file.flush()?;
        self.current_offset = self.file.get_current_position()?;
        self.tx_start_position.remove(&tx.get_id());
        Ok(())
    }

    /// Roll the transaction back, then append its ABORT record.
    pub fn log_abort(&mut self, tx: &Transaction) -> DbResult {
        let original_offset = self.current_offset;
        self.rollback(tx)?;
        self.file.seek(SeekFrom::Start(original_offset))?;

        self.pre_append()?;
        self.file.write(&RecordType::Abort)?;
        self.file.write(&tx.get_id())?;
        self.file.write(&self.current_offset)?;

        self.current_offset = self.file.get_current_position()?;
        self.tx_start_position.remove(&tx.get_id());
        Ok(())
    }

    /// Restore every page the transaction touched to the state it had
    /// immediately before the transaction first touched it.
    ///
    /// The scan runs backward from the log tail to the transaction's
    /// first record, so with multi-touch traffic the before-image
    /// written last (and therefore the one that sticks) is the
    /// first-touch image.
    fn rollback(&mut self, tx: &Transaction) -> DbResult {
        let tid = tx.get_id();
        let start = match self.tx_start_position.get(&tid) {
            Some(start) => *start,
            // the transaction never logged anything
            None => return Ok(()),
        };

        let mut pos = self.current_offset;
        while pos > start {
            self.file.seek(SeekFrom::Start(pos - 8))?;
            let record_start: u64 = self.file.read()?;

            self.file.seek(SeekFrom::Start(record_start))?;
            if let Some(update) = self.parse_record()? {
                if update.tid == tid {
                    debug!("rollback: restoring page {} for tx_{}", update.pid, tid);
                    Self::write_page_image(&update.pid, &update.before)?;
                    Database::buffer_pool().discard_page(&update.pid);
                }
            }

            pos = record_start;
        }

        Ok(())
    }

    /// Read the record under the cursor; return its payload when it is
    /// an UPDATE.
    fn parse_record(&mut self) -> Result<Option<UpdateRecord>, DbError> {
        let record_type: RecordType = self.file.read()?;

        match record_type {
            RecordType::Start | RecordType::Commit | RecordType::Abort => {
                let _tid: u64 = self.file.read()?;
                let _offset: u64 = self.file.read()?;
                Ok(None)
            }
            RecordType::Update => {
                let tid: u64 = self.file.read()?;
                let pid: PageId = self.file.read()?;
                let before: Vec<u8> = self.file.read()?;
                let after: Vec<u8> = self.file.read()?;
                let _offset: u64 = self.file.read()?;
                Ok(Some(UpdateRecord {
                    tid,
                    pid,
                    before,
                    after,
                }))
            }
            RecordType::Checkpoint => {
                let _placeholder: i64 = self.file.read()?;
                let tx_count: u64 = self.file.read()?;
                for _ in 0..tx_count {
                    let _tid: u64 = self.file.read()?;
                    let _start: u64 = self.file.read()?;
                }
                let _offset: u64 = self.file.read()?;
                Ok(None)
            }
        }
    }

    fn write_page_image(pid: &PageId, image: &[u8]) -> DbResult {
        let table_pod = Database::catalog()
            .get_table(&pid.get_table_id())
            .ok_or_else(|| DbError::illegal(&format!("table {} not found", pid.table_id)))?;
        let table = {
            use crate::utils::HandyRwLock;
            table_pod.rl()
        };
        table.write_page_to_disk(pid, image)
    }

    /// Quiesce, flush, and snapshot the live-transaction table so
    /// recovery has a place to start from.
    pub fn log_checkpoint(&mut self) -> DbResult {
        self.pre_append()?;
        self.file.flush()?;

        // push every dirty page out; their UPDATE records go first
        Database::buffer_pool().flush_all_pages(self)?;

        let checkpoint_start = self.file.get_current_position()?;

        self.file.write(&RecordType::Checkpoint)?;

        // no tid, but leave the slot for a uniform record head
        self.file.write(&(-1 as i64))?;

        self.file.write(&(self.tx_start_position.len() as u64))?;
        for (tid, start_position) in &self.tx_start_position {
            self.file.write(tid)?;
            self.file.write(start_position)?;
        }

        self.file.write(&checkpoint_start)?;
        let checkpoint_end = self.file.get_current_position()?;

        // point the header slot at the fresh checkpoint
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write(&checkpoint_start)?;
        self.file.seek(SeekFrom::Start(checkpoint_end))?;

        self.current_offset = checkpoint_end;
        Ok(())
    }

    /// Bring the tables back to a consistent state after a crash:
    /// redo the updates of transactions that committed, undo the
    /// updates of transactions that did not finish.
    pub fn recover(&mut self) -> DbResult {
        let size = self.file.get_size()?;
        if size < 8 {
            // an empty log has nothing to say
            return Ok(());
        }
        self.current_offset = size;

        // analysis: find the scan start and replay record statuses
        self.file.seek(SeekFrom::Start(0))?;
        let last_checkpoint: u64 = self.file.read()?;

        let mut live: HashMap<u64, u64> = HashMap::new();

        let scan_start = if last_checkpoint != NO_CHECKPOINT {
            self.file.seek(SeekFrom::Start(last_checkpoint))?;

            let record_type: RecordType = self.file.read()?;
            if record_type != RecordType::Checkpoint {
                return Err(DbError::new("corrupted checkpoint record"));
            }
            let _placeholder: i64 = self.file.read()?;
            let tx_count: u64 = self.file.read()?;
            for _ in 0..tx_count {
                let tid: u64 = self.file.read()?;
                let start: u64 = self.file.read()?;
                live.insert(tid, start);
            }
            let _offset: u64 = self.file.read()?;
            let checkpoint_end = self.file.get_current_position()?;

            live.values().cloned().min().unwrap_or(checkpoint_end)
        } else {
            8
        };

        let mut committed: HashSet<u64> = HashSet::new();
        let mut updates: Vec<UpdateRecord> = Vec::new();

        self.file.seek(SeekFrom::Start(scan_start))?;
        while self.file.get_current_position()? < size {
            let record_start = self.file.get_current_position()?;
            let record_type = {
                let t: RecordType = self.file.read()?;
                self.file.seek(SeekFrom::Start(record_start))?;
                t
            };

            match record_type {
                RecordType::Start => {
                    self.file.seek(SeekFrom::Start(record_start + 1))?;
                    let tid: u64 = self.file.read()?;
                    let _offset: u64 = self.file.read()?;
                    live.insert(tid, record_start);
                }
                RecordType::Commit => {
                    self.file.seek(SeekFrom::Start(record_start + 1))?;
                    let tid: u64 = self.file.read()?;
                    let _offset: u64 = self.file.read()?;
                    live.remove(&tid);
                    committed.insert(tid);
                }
                RecordType::Abort => {
                    self.file.seek(SeekFrom::Start(record_start + 1))?;
                    let tid: u64 = self.file.read()?;
                    let _offset: u64 = self.file.read()?;
                    // the abort already restored the disk state
                    live.remove(&tid);
                }
                RecordType::Update | RecordType::Checkpoint => {
                    if let Some(update) = self.parse_record()? {
                        updates.push(update);
                    }
                }
            }
        }

        // redo: reapply the winners' after-images, oldest first
        for update in &updates {
            if committed.contains(&update.tid) {
                debug!(
                    "recover: redo page {} of tx_{}",
                    update.pid, update.tid
                );
                Self::write_page_image(&update.pid, &update.after)?;
                Database::buffer_pool().discard_page(&update.pid);
            }
        }

        // undo: take the losers back out, newest first
        for update in updates.iter().rev() {
            if live.contains_key(&update.tid) {
                debug!(
                    "recover: undo page {} of tx_{}",
                    update.pid, update.tid
                );
                Self::write_page_image(&update.pid, &update.before)?;
                Database::buffer_pool().discard_page(&update.pid);
            }
        }

        // the tables are consistent again; the history is spent
        self.reset()?;
        Ok(())
    }

    /// Dump the log structure through the `log` facade. Debug aid.
    pub fn show_log_contents(&mut self) {
        let original_offset = self.file.get_current_position().unwrap_or(0);
        let mut depiction = String::new();

        if self.file.seek(SeekFrom::Start(0)).is_err() {
            return;
        }
        let last_checkpoint: u64 = match self.file.read() {
            Ok(v) => v,
            Err(_) => return,
        };

        if last_checkpoint != NO_CHECKPOINT {
            depiction.push_str(&format!(
                "├── [8 bytes] last checkpoint: {}\n",
                last_checkpoint
            ));
        } else {
            depiction.push_str("├── [8 bytes] no checkpoint\n");
        }

        let mut record_id = 0;
        while self.file.get_current_position().unwrap_or(u64::MAX) < self.current_offset {
            let pos = self.file.get_current_position().unwrap();
            let record_type: RecordType = match self.file.read() {
                Ok(t) => t,
                Err(_) => break,
            };

            match record_type {
                RecordType::Start | RecordType::Commit | RecordType::Abort => {
                    let tid: u64 = self.file.read().unwrap();
                    let start_offset: u64 = self.file.read().unwrap();
                    depiction.push_str(&format!(
                        "├── [record {}] {:?} at {}: tid {}, self-offset {}\n",
                        record_id, record_type, pos, tid, start_offset
                    ));
                }
                RecordType::Update => {
                    let tid: u64 = self.file.read().unwrap();
                    let pid: PageId = self.file.read().unwrap();
                    let before: Vec<u8> = self.file.read().unwrap();
                    let after: Vec<u8> = self.file.read().unwrap();
                    let start_offset: u64 = self.file.read().unwrap();
                    depiction.push_str(&format!(
                        "├── [record {}] UPDATE at {}: tid {}, pid {}, images {}/{} bytes, self-offset {}\n",
                        record_id,
                        pos,
                        tid,
                        pid,
                        before.len(),
                        after.len(),
                        start_offset
                    ));
                }
                RecordType::Checkpoint => {
                    let _placeholder: i64 = self.file.read().unwrap();
                    let tx_count: u64 = self.file.read().unwrap();
                    depiction.push_str(&format!(
                        "├── [record {}] CHECKPOINT at {}: {} live transactions\n",
                        record_id, pos, tx_count
                    ));
                    for _ in 0..tx_count {
                        let tid: u64 = self.file.read().unwrap();
                        let tx_start: u64 = self.file.read().unwrap();
                        depiction.push_str(&format!(
                            "│   ├── tid {} started at {}\n",
                            tid, tx_start
                        ));
                    }
                    let _offset: u64 = self.file.read().unwrap();
                }
            }

            record_id += 1;
        }

        debug!("log contents:\n{}", depiction);
        let _ = self.file.seek(SeekFrom::Start(original_offset));
    }
}
