//! Records: host struct-like values with declared, typed fields.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::host::value::HostValue;

/// Shared record storage; handles onto a record alias this cell.
pub type RecordRef = Rc<RefCell<Record>>;

/// A record instance: field values in the descriptor's storage order.
#[derive(Debug, Clone)]
pub struct Record {
    descriptor: Arc<TypeDescriptor>,
    values: Vec<HostValue>,
}

impl Record {
    /// Build an instance with explicit field values.
    ///
    /// The caller supplies one value per declared field, in order;
    /// missing trailing values are filled with the field's zero value.
    pub fn new(descriptor: Arc<TypeDescriptor>, mut values: Vec<HostValue>) -> Record {
        while values.len() < descriptor.fields.len() {
            let ty = &descriptor.fields[values.len()].ty;
            values.push(TypeDescriptor::zero_value(ty));
        }
        values.truncate(descriptor.fields.len());
        Record { descriptor, values }
    }

    /// Build the zero instance: every field at its zero value.
    pub fn zeroed(descriptor: &Arc<TypeDescriptor>) -> Record {
        let values = descriptor
            .fields
            .iter()
            .map(|f| TypeDescriptor::zero_value(&f.ty))
            .collect();
        Record {
            descriptor: descriptor.clone(),
            values,
        }
    }

    pub fn into_ref(self) -> RecordRef {
        Rc::new(RefCell::new(self))
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn field_count(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, index: usize) -> Option<&HostValue> {
        self.values.get(index)
    }

    pub fn set(&mut self, index: usize, value: HostValue) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Whether two records are instances of the same declared type.
    pub fn same_type(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.descriptor, &other.descriptor)
            || self.descriptor.name == other.descriptor.name
    }

    pub fn fields_eq(&self, other: &Record) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a.host_eq(b))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "}}")
    }
}
