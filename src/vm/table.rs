//! Script tables.
//!
//! One associative container plays both the array and the dictionary
//! role, the way the scripting runtime's tables do. Sequence behavior
//! is a view: a table "is" a sequence when its keys are exactly the
//! contiguous integers `1..=n`.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::vm::value::{ScriptValue, TableKey};

/// Shared table storage, aliased the way the interpreter aliases it.
pub type TableRef = Rc<RefCell<Table>>;

pub fn new_table() -> TableRef {
    Rc::new(RefCell::new(Table::default()))
}

/// Pointer identity of a table, for cycle tracking.
pub fn table_identity(table: &TableRef) -> usize {
    Rc::as_ptr(table) as usize
}

#[derive(Debug, Default)]
pub struct Table {
    map: FxHashMap<TableKey, ScriptValue>,
}

impl Table {
    /// Missing keys read as nil.
    pub fn get(&self, key: &TableKey) -> ScriptValue {
        self.map.get(key).cloned().unwrap_or(ScriptValue::Nil)
    }

    /// Assigning nil removes the entry, so storage never holds nils.
    pub fn set(&mut self, key: TableKey, value: ScriptValue) {
        if value.is_nil() {
            self.map.remove(&key);
        } else {
            self.map.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The sequence border: largest `n` with every key `1..=n` present.
    pub fn seq_len(&self) -> usize {
        let mut n = 0usize;
        while self.map.contains_key(&TableKey::number((n + 1) as f64)) {
            n += 1;
        }
        n
    }

    /// Whether the keys are exactly the contiguous integers `1..=n`.
    /// The empty table does not count as a sequence.
    pub fn is_sequence(&self) -> bool {
        !self.map.is_empty() && self.seq_len() == self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableKey, &ScriptValue)> {
        self.map.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TableKey> {
        self.map.keys()
    }
}
