use tracing::debug;

use crate::cdm::CdmStore;
use crate::model::{FillSet, Mapping};

pub fn resolve_fill_values(mapping: &Mapping, cdm: &CdmStore) -> FillSet {
    let mut fill_set = FillSet::new();

    for (full_id, key) in mapping {
        match cdm.get(key) {
            Some(value) if !value.trim().is_empty() => {
                fill_set.insert(full_id.clone(), value.to_string());
            }
            _ => {
                debug!(region = %full_id, key = %key, "no value to fill");
            }
        }
    }

    fill_set
}
