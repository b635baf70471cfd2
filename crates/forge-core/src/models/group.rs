use serde::{Deserialize, Serialize};

/// Step indices scheduled together.
///
/// A group of one step runs inline; larger groups only ever hold file
/// writes with disjoint paths and run through the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionGroup {
    pub indices: Vec<usize>,
}

impl ExecutionGroup {
    pub fn singleton(index: usize) -> Self {
        Self {
            indices: vec![index],
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.indices.len() > 1
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
