//! Expected per-model performance, supplied by configuration.
//!
//! Baselines are reference numbers a run is compared against. They are
//! never computed here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scenario::Category;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelBaseline {
    /// Overall fix success rate in [0, 1].
    pub success_rate: f64,
    /// Per-category success rates keyed by category name. Categories
    /// missing here fall back to `success_rate`.
    pub categories: BTreeMap<String, f64>,
    pub precision: f64,
    pub recall: f64,
    pub mean_iterations: f64,
}

impl ModelBaseline {
    pub fn success_for(&self, category: Category) -> f64 {
        self.categories
            .iter()
            .find(|(name, _)| name.parse::<Category>().ok() == Some(category))
            .map_or(self.success_rate, |(_, rate)| *rate)
    }

    /// Names under `categories` that are not valid categories.
    pub fn unknown_categories(&self) -> Vec<&str> {
        self.categories
            .keys()
            .filter(|name| name.parse::<Category>().is_err())
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaselineTable {
    pub models: BTreeMap<String, ModelBaseline>,
}

impl BaselineTable {
    pub fn get(&self, model: &str) -> Option<&ModelBaseline> {
        self.models
            .get(model)
            .or_else(|| {
                self.models
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(model))
                    .map(|(_, b)| b)
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}
