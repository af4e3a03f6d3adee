//! Partitions and the binary partition tree.
//!
//! Partitions are created by the splitter and never deleted, so the tree
//! only ever grows: a leaf splits into two children and becomes internal.
//! The tree type here is a read-side view with structural validation; the
//! state store holds the authoritative partition list.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::key::{Key, KeyValue};
use crate::region::Region;

/// One partition: a contiguous key-range region of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    /// Unique partition id.
    pub id: String,
    /// Parent partition id; `None` for the root.
    pub parent_id: Option<String>,
    /// Child partition ids: empty for leaves, exactly two otherwise.
    pub child_ids: Vec<String>,
    /// The key-space region this partition covers.
    pub region: Region,
    /// True if this partition has no children.
    pub is_leaf: bool,
    /// The dimension this partition was split on; `None` for leaves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

impl Partition {
    /// Creates a root leaf partition covering the whole key space.
    #[must_use]
    pub fn root_leaf(id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            child_ids: Vec::new(),
            region: Region::whole_key_space(dimensions),
            is_leaf: true,
            dimension: None,
        }
    }
}

/// The boundary between the two children of a split partition.
///
/// Records strictly below `split_point` on `dimension` belong to
/// `left_id`; the rest belong to `right_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitBoundary {
    /// Child covering keys below the split point.
    pub left_id: String,
    /// Child covering keys at or above the split point.
    pub right_id: String,
    /// The dimension the parent was split on.
    pub dimension: usize,
    /// The split point (left child's exclusive max, right child's inclusive min).
    pub split_point: KeyValue,
}

/// A validated, queryable view over a set of partitions.
#[derive(Debug, Clone)]
pub struct PartitionTree {
    by_id: HashMap<String, Partition>,
    root_id: String,
}

impl PartitionTree {
    /// Builds a tree from a partition list and validates its structure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartitionTree`] if the list is empty, has no
    /// single root, contains duplicate ids, or violates the binary-tree and
    /// region-cover invariants.
    pub fn new(partitions: Vec<Partition>) -> Result<Self> {
        if partitions.is_empty() {
            return Err(Error::InvalidPartitionTree {
                message: "no partitions".into(),
            });
        }
        let mut by_id = HashMap::with_capacity(partitions.len());
        let mut root_id = None;
        for partition in partitions {
            if partition.parent_id.is_none() {
                if let Some(existing) = &root_id {
                    return Err(Error::InvalidPartitionTree {
                        message: format!(
                            "multiple roots: {existing} and {}",
                            partition.id
                        ),
                    });
                }
                root_id = Some(partition.id.clone());
            }
            if by_id.insert(partition.id.clone(), partition).is_some() {
                return Err(Error::InvalidPartitionTree {
                    message: "duplicate partition id".into(),
                });
            }
        }
        let root_id = root_id.ok_or_else(|| Error::InvalidPartitionTree {
            message: "no root partition".into(),
        })?;

        let tree = Self { by_id, root_id };
        tree.validate()?;
        Ok(tree)
    }

    /// Checks the structural invariants: every non-leaf has exactly two
    /// children whose regions split the parent's region at a single point
    /// on the recorded dimension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartitionTree`] naming the first violation.
    pub fn validate(&self) -> Result<()> {
        for partition in self.by_id.values() {
            if partition.is_leaf {
                if !partition.child_ids.is_empty() {
                    return Err(Error::InvalidPartitionTree {
                        message: format!("leaf {} has children", partition.id),
                    });
                }
                continue;
            }
            let boundary = self.split_boundary(&partition.id)?;
            let (expected_left, expected_right) = partition
                .region
                .split_at(boundary.dimension, &boundary.split_point)?;
            let left = self.get(&boundary.left_id)?;
            let right = self.get(&boundary.right_id)?;
            if left.region != expected_left || right.region != expected_right {
                return Err(Error::InvalidPartitionTree {
                    message: format!(
                        "children of {} do not cover its region",
                        partition.id
                    ),
                });
            }
            if left.parent_id.as_deref() != Some(partition.id.as_str())
                || right.parent_id.as_deref() != Some(partition.id.as_str())
            {
                return Err(Error::InvalidPartitionTree {
                    message: format!("children of {} disagree on their parent", partition.id),
                });
            }
        }
        Ok(())
    }

    /// Returns the root partition.
    #[must_use]
    pub fn root(&self) -> &Partition {
        // root_id is validated at construction
        &self.by_id[&self.root_id]
    }

    /// Looks up a partition by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is unknown.
    pub fn get(&self, id: &str) -> Result<&Partition> {
        self.by_id
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("partition {id}")))
    }

    /// Returns all partitions in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<Partition> {
        self.by_id.values().cloned().collect()
    }

    /// Returns all leaf partitions in no particular order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Partition> {
        self.by_id.values().filter(|p| p.is_leaf).collect()
    }

    /// Finds the leaf partition whose region contains the key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no leaf contains the key (only
    /// possible for keys of the wrong dimension count).
    pub fn leaf_containing(&self, key: &Key) -> Result<&Partition> {
        self.by_id
            .values()
            .find(|p| p.is_leaf && p.region.contains(key))
            .ok_or_else(|| Error::NotFound(format!("no leaf partition contains key {key}")))
    }

    /// Returns the split boundary between a partition's two children.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartitionTree`] if the partition is a leaf,
    /// does not have exactly two children, or its children's regions do not
    /// meet at a single point on the split dimension.
    pub fn split_boundary(&self, parent_id: &str) -> Result<SplitBoundary> {
        let parent = self.get(parent_id)?;
        let [left_id, right_id] = parent.child_ids.as_slice() else {
            return Err(Error::InvalidPartitionTree {
                message: format!(
                    "partition {parent_id} has {} children, expected 2",
                    parent.child_ids.len()
                ),
            });
        };
        let dimension = parent.dimension.ok_or_else(|| Error::InvalidPartitionTree {
            message: format!("split partition {parent_id} has no dimension"),
        })?;
        let left = self.get(left_id)?;
        let right = self.get(right_id)?;

        let left_max = left
            .region
            .range(dimension)
            .and_then(|r| r.max.clone());
        let right_min = right
            .region
            .range(dimension)
            .and_then(|r| r.min.clone());
        match (left_max, right_min) {
            (Some(a), Some(b)) if a == b => Ok(SplitBoundary {
                left_id: left_id.clone(),
                right_id: right_id.clone(),
                dimension,
                split_point: a,
            }),
            _ => Err(Error::InvalidPartitionTree {
                message: format!("children of {parent_id} do not meet at a split point"),
            }),
        }
    }
}

/// Incremental builder for partition trees.
///
/// Starts from a single root leaf and applies splits one at a time, the
/// same shape of history the splitter produces. Used to seed the state
/// store and to construct trees in tests.
#[derive(Debug)]
pub struct PartitionsBuilder {
    dimensions: usize,
    partitions: HashMap<String, Partition>,
}

impl PartitionsBuilder {
    /// Starts a tree with a single root leaf covering the whole key space.
    #[must_use]
    pub fn root_leaf(root_id: impl Into<String>, dimensions: usize) -> Self {
        let root = Partition::root_leaf(root_id, dimensions);
        let mut partitions = HashMap::new();
        partitions.insert(root.id.clone(), root);
        Self {
            dimensions,
            partitions,
        }
    }

    /// Splits an existing leaf at `point` along `dimension` into two new leaves.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent is unknown or not a leaf, if either
    /// child id is taken, or if the split point is invalid for the parent's
    /// region.
    pub fn split(
        mut self,
        parent_id: &str,
        dimension: usize,
        point: impl Into<KeyValue>,
        left_id: impl Into<String>,
        right_id: impl Into<String>,
    ) -> Result<Self> {
        let left_id = left_id.into();
        let right_id = right_id.into();
        let point = point.into();

        let parent = self
            .partitions
            .get(parent_id)
            .ok_or_else(|| Error::NotFound(format!("partition {parent_id}")))?;
        if !parent.is_leaf {
            return Err(Error::InvalidInput(format!(
                "partition {parent_id} is already split"
            )));
        }
        if self.partitions.contains_key(&left_id) || self.partitions.contains_key(&right_id) {
            return Err(Error::InvalidInput("child partition id already in use".into()));
        }

        let (left_region, right_region) = parent.region.split_at(dimension, &point)?;
        let left = Partition {
            id: left_id.clone(),
            parent_id: Some(parent_id.to_string()),
            child_ids: Vec::new(),
            region: left_region,
            is_leaf: true,
            dimension: None,
        };
        let right = Partition {
            id: right_id.clone(),
            parent_id: Some(parent_id.to_string()),
            child_ids: Vec::new(),
            region: right_region,
            is_leaf: true,
            dimension: None,
        };

        let parent = self
            .partitions
            .get_mut(parent_id)
            .ok_or_else(|| Error::NotFound(format!("partition {parent_id}")))?;
        parent.is_leaf = false;
        parent.child_ids = vec![left_id.clone(), right_id.clone()];
        parent.dimension = Some(dimension);
        self.partitions.insert(left_id, left);
        self.partitions.insert(right_id, right);
        Ok(self)
    }

    /// Finishes the build, validating the tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartitionTree`] if validation fails.
    pub fn build(self) -> Result<PartitionTree> {
        PartitionTree::new(self.partitions.into_values().collect())
    }

    /// Builds a tree by splitting dimension 0 at each point in order.
    ///
    /// Produces a right-deep chain of splits: the first point separates the
    /// lowest leaf, and each later point splits the remaining upper region.
    /// Partition ids are freshly generated.
    ///
    /// # Errors
    ///
    /// Returns an error if the split points are not strictly increasing.
    pub fn from_split_points(dimensions: usize, points: &[KeyValue]) -> Result<PartitionTree> {
        let root_id = new_partition_id();
        let mut builder = Self::root_leaf(root_id.clone(), dimensions);
        let mut current = root_id;
        for point in points {
            let left_id = new_partition_id();
            let right_id = new_partition_id();
            builder = builder.split(&current, 0, point.clone(), left_id, right_id.clone())?;
            current = right_id;
        }
        builder.build()
    }
}

/// Generates a fresh partition id.
#[must_use]
pub fn new_partition_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
