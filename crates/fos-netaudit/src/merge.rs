//! Record Merger
//!
//! Joins protocol records with payload sizes on URL at analysis time.

use crate::payload::SizeMap;
use crate::record::{ContextData, ResourceRecord};

/// Merged records of a context, in order of first observation.
///
/// Each record takes its decoded length from the navigation's size map; a
/// URL without a measurement keeps it unset. Inputs are not modified.
pub fn merge(context: &ContextData, sizes: &SizeMap) -> Vec<ResourceRecord> {
    context.records()
        .map(|record| ResourceRecord {
            decoded_data_length: sizes.get(&record.url),
            ..record.clone()
        })
        .collect()
}
