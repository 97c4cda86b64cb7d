//! Grid search parameter generation
//!
//! Expands a grid of candidate values into concrete parameter sets for fine-tuning.

use anyhow::{Context, Result};
use itertools::Itertools;
use std::collections::BTreeMap;

use crate::pattern::{PatternParams, PARAM_NAMES};

/// Generate every parameter set in the grid
///
/// Takes the cartesian product of all grid values (keys in sorted order, last
/// key varying fastest) and applies each combination over `base`. Parameters
/// not named in the grid keep their base value.
pub fn expand(
    base: &PatternParams,
    grid: &BTreeMap<String, Vec<serde_json::Value>>,
) -> Result<Vec<PatternParams>> {
    if let Some(unknown) = grid.keys().find(|k| !PARAM_NAMES.contains(&k.as_str())) {
        anyhow::bail!(
            "Unknown grid parameter '{}'. Valid names: {}",
            unknown,
            PARAM_NAMES.join(", ")
        );
    }
    if let Some((key, _)) = grid.iter().find(|(_, values)| values.is_empty()) {
        anyhow::bail!("Grid parameter '{}' has no values", key);
    }
    if grid.is_empty() {
        return Ok(vec![*base]);
    }

    let base_json = serde_json::to_value(base).context("Failed to serialize base params")?;

    grid.iter()
        .map(|(key, values)| values.iter().map(move |v| (key, v)))
        .multi_cartesian_product()
        .map(|combo| {
            let mut params = base_json.clone();
            if let Some(obj) = params.as_object_mut() {
                for (key, value) in &combo {
                    obj.insert((*key).clone(), (*value).clone());
                }
            }
            serde_json::from_value(params)
                .with_context(|| format!("Invalid grid combination: {:?}", combo))
        })
        .collect()
}

/// Get total number of grid combinations
pub fn total_combinations(grid: &BTreeMap<String, Vec<serde_json::Value>>) -> usize {
    if grid.is_empty() {
        return 1;
    }
    grid.values().map(|v| v.len()).product()
}
