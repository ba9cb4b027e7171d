//! Result-set / data-block cache.

use crate::constant::{ADAPTIVE_GROWTH_CAP_FACTOR, ADAPTIVE_GROWTH_FACTOR};
use crate::error::{Error, Result};
use crate::protocol::{ColumnMeta, Row};

/// A contiguous run of rows delivered in a single server reply.
#[derive(Debug, Default)]
pub struct DataBlock {
    rows: Vec<Option<Row>>,
    /// Forward-only cursors destructively clear a slot once read.
    forward_only: bool,
    write_cursor: usize,
}

impl DataBlock {
    pub fn new(capacity: usize, forward_only: bool) -> Self {
        let mut rows = Vec::with_capacity(capacity);
        rows.resize_with(capacity, || None);
        Self {
            rows,
            forward_only,
            write_cursor: 0,
        }
    }

    /// `wantsMore` is true until the array is full.
    pub fn wants_more(&self) -> bool {
        self.write_cursor < self.rows.len()
    }

    /// Receives only lines of type result-row.
    pub fn add_row(&mut self, row: Row) {
        if self.write_cursor < self.rows.len() {
            self.rows[self.write_cursor] = Some(row);
            self.write_cursor += 1;
        }
    }

    pub fn get(&mut self, index: usize) -> Option<&Row> {
        if self.forward_only {
            let taken = self.rows.get_mut(index)?.take();
            // A forward-only reader that revisits a cleared slot gets nothing
            // back; store it into a scratch cell so callers can hand out a
            // reference without re-borrowing the option as a whole.
            self.rows[index] = taken;
            self.rows[index].as_ref()
        } else {
            self.rows.get(index)?.as_ref()
        }
    }

    /// Destructively clears a slot on forward-only retrieval. Callers should call this after the returned reference
    /// from `get` is no longer needed.
    pub fn consume(&mut self, index: usize) {
        if self.forward_only {
            if let Some(slot) = self.rows.get_mut(index) {
                *slot = None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Callback the result set uses to fetch a missing block from the server,
/// implemented by the session (kept as a trait to avoid `resultset` knowing
/// about sockets or the dispatcher).
pub trait BlockSource {
    fn fetch_block(&mut self, id: i64, offset: i64, size: i64) -> Result<Vec<Row>>;
    /// The session's monotonic statement-sequence counter, used to decide
    /// whether a new query has been issued since this result was created.
    fn sequence(&self) -> u64;
}

/// A paged tabular result.
pub struct ResultSet {
    pub id: i64,
    pub tuples: i64,
    pub columns: Vec<ColumnMeta>,
    cache_size: i64,
    /// `true` once the caller has explicitly requested a cache size, which
    /// disables the adaptive-growth heuristic.
    cache_size_explicit: bool,
    block_offset: i64,
    blocks: Vec<Option<DataBlock>>,
    forward_only: bool,
    sequence_at_creation: u64,
    /// The rowcount reported in the very first block's start-of-header,
    /// used by `close` to decide whether the server holds state to release.
    first_block_rowcount: i64,
}

impl ResultSet {
    pub fn new(
        id: i64,
        tuples: i64,
        columns: Vec<ColumnMeta>,
        cache_size: i64,
        forward_only: bool,
        sequence_at_creation: u64,
    ) -> Self {
        let cache_size = cache_size.max(1);
        let block_count = tuples.div_ceil(cache_size).max(1) as usize;
        let mut blocks = Vec::with_capacity(block_count);
        blocks.resize_with(block_count, || None);
        Self {
            id,
            tuples,
            columns,
            cache_size,
            cache_size_explicit: false,
            block_offset: 0,
            blocks,
            forward_only,
            sequence_at_creation,
            first_block_rowcount: 0,
        }
    }

    /// Installs the inline first block, filled directly from the same turn
    /// that opened this result set.
    pub fn install_first_block(&mut self, block: DataBlock) {
        self.first_block_rowcount = block.len() as i64;
        if let Some(slot) = self.blocks.first_mut() {
            *slot = Some(block);
        }
    }

    pub fn set_cache_size_explicit(&mut self, explicit: bool) {
        self.cache_size_explicit = explicit;
    }

    /// The result's column descriptors, in wire order.
    pub fn column_metadata(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn block_index(&self, r: i64) -> (usize, usize) {
        let rel = r - self.block_offset;
        (
            (rel / self.cache_size) as usize,
            (rel % self.cache_size) as usize,
        )
    }

    /// Returns the row at absolute index `r`, fetching and growing the
    /// cache adaptively as needed.
    pub fn get_row(&mut self, r: i64, source: &mut impl BlockSource) -> Result<Option<Row>> {
        if r < 0 || r >= self.tuples {
            return Ok(None);
        }

        let (mut block, mut line) = self.block_index(r);

        if self.blocks.get(block).map(Option::is_none).unwrap_or(true) {
            if self.forward_only {
                for prior in &mut self.blocks[..block.min(self.blocks.len())] {
                    *prior = None;
                }
            }

            let no_new_query_since_creation = source.sequence() == self.sequence_at_creation + 1;
            let remaining = self.tuples - self.block_offset - self.cache_size;
            let default_fetch = crate::constant::DEFAULT_REPLY_SIZE;
            if no_new_query_since_creation
                && !self.cache_size_explicit
                && remaining > self.cache_size
                && self.cache_size < default_fetch * ADAPTIVE_GROWTH_CAP_FACTOR as i64
            {
                log::debug!(
                    "growing result {} cache size {} -> {}",
                    self.id,
                    self.cache_size,
                    self.cache_size * ADAPTIVE_GROWTH_FACTOR as i64
                );
                self.block_offset += self.cache_size;
                self.cache_size *= ADAPTIVE_GROWTH_FACTOR as i64;
                let new_block_count = ((self.tuples - self.block_offset)
                    .div_ceil(self.cache_size)
                    .max(0)
                    + 1) as usize;
                self.blocks.resize_with(new_block_count, || None);
                let idx = self.block_index(r);
                block = idx.0;
                line = idx.1;
            }

            let size = self.cache_size.min(self.tuples - self.block_offset);
            let rows = source.fetch_block(self.id, self.block_offset, size)?;
            let mut fetched = DataBlock::new(rows.len(), self.forward_only);
            for row in rows {
                fetched.add_row(row);
            }
            if block >= self.blocks.len() {
                self.blocks.resize_with(block + 1, || None);
            }
            self.blocks[block] = Some(fetched);
        }

        let data = self
            .blocks
            .get_mut(block)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::api_misuse("block was just fetched or already present"))?;
        let row = data.get(line).cloned();
        data.consume(line);
        Ok(row)
    }

    /// `true` iff the server holds state for this result that must be
    /// released with `Xclose id`.
    pub fn needs_server_close(&self) -> bool {
        self.id > 0 && self.tuples > self.first_block_rowcount
    }

    pub fn close_locally(&mut self) {
        for block in &mut self.blocks {
            *block = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeSource {
        sequence: u64,
        fetch_log: RefCell<Vec<(i64, i64)>>,
        total_rows: i64,
    }

    impl BlockSource for FakeSource {
        fn fetch_block(&mut self, _id: i64, offset: i64, size: i64) -> Result<Vec<Row>> {
            self.fetch_log.borrow_mut().push((offset, size));
            let end = (offset + size).min(self.total_rows);
            Ok((offset..end).map(|i| vec![Some(i.to_string())]).collect())
        }

        fn sequence(&self) -> u64 {
            self.sequence
        }
    }

    fn make_result(tuples: i64, cache_size: i64, first_block_len: usize) -> ResultSet {
        let mut rs = ResultSet::new(7, tuples, vec![], cache_size, true, 1);
        let mut block = DataBlock::new(first_block_len, true);
        for i in 0..first_block_len {
            block.add_row(vec![Some(i.to_string())]);
        }
        rs.install_first_block(block);
        rs
    }

    #[test]
    fn out_of_range_rows_return_none() {
        let mut rs = make_result(10, 5, 5);
        let mut source = FakeSource {
            sequence: 2,
            fetch_log: RefCell::new(vec![]),
            total_rows: 10,
        };
        assert!(rs.get_row(-1, &mut source).unwrap().is_none());
        assert!(rs.get_row(10, &mut source).unwrap().is_none());
    }

    #[test]
    fn reads_from_inline_first_block_without_fetch() {
        let mut rs = make_result(10, 5, 5);
        let mut source = FakeSource {
            sequence: 2,
            fetch_log: RefCell::new(vec![]),
            total_rows: 10,
        };
        let row = rs.get_row(0, &mut source).unwrap().unwrap();
        assert_eq!(row, vec![Some("0".to_string())]);
        assert!(source.fetch_log.borrow().is_empty());
    }

    #[test]
    fn misses_cache_and_fetches_next_block() {
        let mut rs = make_result(10000, 250, 250);
        let mut source = FakeSource {
            sequence: 2,
            fetch_log: RefCell::new(vec![]),
            total_rows: 10000,
        };
        let row = rs.get_row(300, &mut source).unwrap().unwrap();
        assert_eq!(row, vec![Some("300".to_string())]);
        assert_eq!(source.fetch_log.borrow().len(), 1);
    }

    #[test]
    fn adaptive_growth_fires_on_long_sequential_scan() {
        let mut rs = make_result(10000, 250, 250);
        let mut source = FakeSource {
            sequence: 2, // == sequence_at_creation(1) + 1: no new query issued since
            fetch_log: RefCell::new(vec![]),
            total_rows: 10000,
        };
        rs.get_row(300, &mut source).unwrap();
        let (offset, size) = source.fetch_log.borrow()[0];
        assert_eq!(offset, 250);
        assert_eq!(size, 2500);
    }

    #[test]
    fn adaptive_growth_does_not_fire_after_new_query() {
        let mut rs = make_result(10000, 250, 250);
        let mut source = FakeSource {
            sequence: 5, // a new query was issued on the session meanwhile
            fetch_log: RefCell::new(vec![]),
            total_rows: 10000,
        };
        rs.get_row(300, &mut source).unwrap();
        let (_offset, size) = source.fetch_log.borrow()[0];
        assert_eq!(size, 250);
    }

    #[test]
    fn explicit_cache_size_disables_adaptive_growth() {
        let mut rs = make_result(10000, 250, 250);
        rs.set_cache_size_explicit(true);
        let mut source = FakeSource {
            sequence: 2,
            fetch_log: RefCell::new(vec![]),
            total_rows: 10000,
        };
        rs.get_row(300, &mut source).unwrap();
        let (_offset, size) = source.fetch_log.borrow()[0];
        assert_eq!(size, 250);
    }

    #[test]
    fn forward_only_read_is_destructive() {
        let mut rs = make_result(5, 5, 5);
        let mut source = FakeSource {
            sequence: 2,
            fetch_log: RefCell::new(vec![]),
            total_rows: 5,
        };
        assert!(rs.get_row(0, &mut source).unwrap().is_some());
        assert!(rs.get_row(0, &mut source).unwrap().is_none());
    }

    #[test]
    fn needs_server_close_iff_id_positive_and_more_rows_than_first_block() {
        let rs = make_result(10000, 250, 250);
        assert!(rs.needs_server_close());

        let fully_fetched = make_result(250, 250, 250);
        assert!(!fully_fetched.needs_server_close());
    }
}
