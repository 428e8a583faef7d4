//! Merge layer: defaults and source ordering.

pub(crate) mod merge_policy;
pub(crate) mod service;
