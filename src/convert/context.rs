//! Call-scoped conversion state.
//!
//! A [`ConversionContext`] lives for exactly one top-level conversion
//! call. It tracks already-visited composites by memory identity in
//! both directions, so shared substructure converts once and cycles
//! terminate, and it accumulates per-element issues so one bad element
//! does not abort a composite conversion.

use rustc_hash::FxHashMap;

use crate::error::{ConversionStatus, ConvertError};
use crate::host::value::HostValue;
use crate::vm::value::ScriptValue;

#[derive(Default)]
pub struct ConversionContext {
    /// host identity -> already-produced script value
    to_script: FxHashMap<usize, ScriptValue>,
    /// table identity -> already-produced host value
    to_host: FxHashMap<usize, HostValue>,
    issues: Vec<ConvertError>,
}

impl ConversionContext {
    pub fn new() -> Self {
        ConversionContext::default()
    }

    /// Record a host composite's translation. Must happen before
    /// recursing into its children or cycles will not terminate.
    pub fn mark_to_script(&mut self, identity: usize, value: ScriptValue) {
        self.to_script.insert(identity, value);
    }

    pub fn lookup_to_script(&self, identity: usize) -> Option<ScriptValue> {
        self.to_script.get(&identity).cloned()
    }

    /// Record a script table's translation, same ordering rule.
    pub fn mark_to_host(&mut self, identity: usize, value: HostValue) {
        self.to_host.insert(identity, value);
    }

    pub fn lookup_to_host(&self, identity: usize) -> Option<HostValue> {
        self.to_host.get(&identity).cloned()
    }

    /// Note a per-element failure without aborting the conversion.
    pub fn record_issue(&mut self, issue: ConvertError) {
        self.issues.push(issue);
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn into_status(self) -> ConversionStatus {
        if self.issues.is_empty() {
            ConversionStatus::Complete
        } else {
            ConversionStatus::Partial(self.issues)
        }
    }
}

/// A script-to-host conversion result with its completion status.
#[derive(Debug)]
pub struct Converted {
    pub value: HostValue,
    pub status: ConversionStatus,
}
