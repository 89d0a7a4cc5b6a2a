use std::cmp::Ordering;
use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::index::BPTreeIndex;
use crate::table::TableHandle;
use crate::tuple::{DataType, Record, Value};

/// Comparison operators an index scan can push into its range keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

/// One conjunct of the scan predicate: `column op value`.
#[derive(Debug, Clone)]
pub struct Condition {
    pub column: String,
    pub op: CmpOp,
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, op: CmpOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }
}

fn cmp_values(data_type: DataType, a: &Value, b: &Value) -> Result<Ordering> {
    let mut a_bytes = vec![0u8; data_type.size()];
    let mut b_bytes = vec![0u8; data_type.size()];
    a.encode_into(data_type, &mut a_bytes)?;
    b.encode_into(data_type, &mut b_bytes)?;
    Ok(Value::compare_encoded(data_type, &a_bytes, &b_bytes))
}

/// Range-bounded ordered walk over an index, resolving each RID to its
/// record through the table handle.
///
/// The conjunction is compiled into one `[low, high]` key range: equalities
/// pin a column on both sides, a trailing one-sided bound raises `low` or
/// lowers `high`, and strict bounds are honored by trimming the matching
/// endpoint after materialization. Prefix compilation stops at the first
/// column without an equality.
pub struct IndexScanCursor {
    table: Arc<TableHandle>,
    index: Arc<BPTreeIndex>,
    conds: Vec<Condition>,
    ascending: bool,
    rids: Vec<RecordId>,
    position: usize,
    end: usize,
}

impl IndexScanCursor {
    pub fn new(
        table: Arc<TableHandle>,
        index: Arc<BPTreeIndex>,
        conds: Vec<Condition>,
        ascending: bool,
    ) -> Self {
        Self {
            table,
            index,
            conds,
            ascending,
            rids: Vec::new(),
            position: 0,
            end: 0,
        }
    }

    /// Builds the range keys, materializes the RID slice and trims strict
    /// endpoints. Must run before `next`/`record`.
    pub fn init(&mut self) -> Result<()> {
        let (low, high, low_exclusive, high_exclusive) = self.generate_range_keys()?;

        let key_schema = self.index.key_schema();
        if key_schema.compare_encoded(&low, &high) == Ordering::Greater {
            // Contradictory bounds select nothing
            self.rids.clear();
            self.position = 0;
            self.end = 0;
            return Ok(());
        }

        self.rids = self.index.search_range(&low, &high)?;

        let mut start = 0;
        let mut end = self.rids.len();

        if low_exclusive && !self.rids.is_empty() {
            let key = self.key_of(self.rids[0])?;
            if key_schema.compare_encoded(&key, &low) == Ordering::Equal {
                start += 1;
            }
        }
        if high_exclusive && end > start {
            let key = self.key_of(self.rids[end - 1])?;
            if key_schema.compare_encoded(&key, &high) == Ordering::Equal {
                end -= 1;
            }
        }

        if !self.ascending {
            self.rids[start..end].reverse();
        }

        self.position = start;
        self.end = end;
        Ok(())
    }

    pub fn is_end(&self) -> bool {
        self.position >= self.end
    }

    pub fn next(&mut self) {
        self.position += 1;
    }

    /// RID under the cursor.
    pub fn rid(&self) -> RecordId {
        self.rids[self.position]
    }

    /// Record under the cursor, fetched through the table handle.
    pub fn record(&self) -> Result<Record> {
        self.table.get_record(self.rid())
    }

    fn key_of(&self, rid: RecordId) -> Result<Vec<u8>> {
        let record = self.table.get_record(rid)?;
        self.index
            .key_schema()
            .project_key(self.table.schema(), &record)
    }

    /// Compiles the condition conjunction into encoded low/high keys plus
    /// endpoint exclusivity flags.
    fn generate_range_keys(&self) -> Result<(Vec<u8>, Vec<u8>, bool, bool)> {
        let key_schema = self.index.key_schema();

        let mut low_vals: Vec<Value> = key_schema
            .columns()
            .iter()
            .map(|c| Value::min_of(c.data_type()))
            .collect();
        let mut high_vals: Vec<Value> = key_schema
            .columns()
            .iter()
            .map(|c| Value::max_of(c.data_type()))
            .collect();
        let mut low_exclusive = false;
        let mut high_exclusive = false;

        for (i, column) in key_schema.columns().iter().enumerate() {
            let data_type = column.data_type();
            let mut has_eq = false;

            for cond in self.conds.iter().filter(|c| c.column == column.name()) {
                match cond.op {
                    CmpOp::Eq => {
                        low_vals[i] = cond.value.clone();
                        high_vals[i] = cond.value.clone();
                        has_eq = true;
                    }
                    CmpOp::Gt | CmpOp::Ge => {
                        let ord = cmp_values(data_type, &cond.value, &low_vals[i])?;
                        if ord == Ordering::Greater {
                            low_vals[i] = cond.value.clone();
                            low_exclusive = cond.op == CmpOp::Gt;
                        } else if ord == Ordering::Equal && cond.op == CmpOp::Gt {
                            low_exclusive = true;
                        }
                    }
                    CmpOp::Lt | CmpOp::Le => {
                        let ord = cmp_values(data_type, &cond.value, &high_vals[i])?;
                        if ord == Ordering::Less {
                            high_vals[i] = cond.value.clone();
                            high_exclusive = cond.op == CmpOp::Lt;
                        } else if ord == Ordering::Equal && cond.op == CmpOp::Lt {
                            high_exclusive = true;
                        }
                    }
                }
            }

            // A column without an equality ends the usable prefix; its
            // one-sided bounds (if any) are already in place.
            if !has_eq {
                break;
            }
        }

        Ok((
            key_schema.encode_values(&low_vals)?,
            key_schema.encode_values(&high_vals)?,
            low_exclusive,
            high_exclusive,
        ))
    }
}
