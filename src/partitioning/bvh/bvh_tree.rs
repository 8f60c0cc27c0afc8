use crate::bounding_volume::Aabb;
use core::fmt;

/// The payload of a node of the flattened BVH.
///
/// A node is either a leaf covering a contiguous run of the primitive index
/// array, or an interior node with exactly two children. The first child of
/// an interior node is always stored right after it, at `self_index + 1`;
/// only the second child needs an explicit offset because the size of the
/// first subtree is not known before it is laid out.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum BvhNodeKind {
    /// A node terminating the hierarchy.
    Leaf {
        /// Offset of this leaf's first primitive in the permuted index array.
        first_primitive: u32,
        /// Number of primitives covered by this leaf. Always at least 1.
        primitive_count: u32,
    },
    /// A node with exactly two children, used solely to prune subtrees
    /// during queries.
    Interior {
        /// The axis (0 = x, 1 = y, 2 = z) the children were partitioned along.
        axis: u8,
        /// Index of the second child. The first child is at `self_index + 1`.
        second_child: u32,
    },
}

/// One node of the flattened BVH.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BvhNode {
    pub(super) aabb: Aabb,
    pub(super) kind: BvhNodeKind,
}

impl BvhNode {
    /// The AABB bounding every primitive covered by this node's subtree.
    #[inline]
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    /// The payload of this node.
    #[inline]
    pub fn kind(&self) -> BvhNodeKind {
        self.kind
    }

    /// Is this node a leaf?
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, BvhNodeKind::Leaf { .. })
    }
}

/// A Bounding Volume Hierarchy stored as a flat node array, for any-hit ray
/// queries over a static set of axis-aligned boxes.
///
/// The tree is built once by [`Bvh::new`] (or [`Bvh::from_voxels`]) and is
/// immutable afterwards: changing the primitive set requires building a new
/// tree from scratch. Because queries only take `&self`, a finished tree can
/// be shared and queried from multiple threads. Its storage is freed when it
/// is dropped, like any other value.
///
/// Nodes are laid out in depth-first (preorder) order, with the root at
/// index 0 and the first child of any interior node directly after it.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Bvh {
    pub(super) nodes: Vec<BvhNode>,
    pub(super) max_leaf_size: usize,
}

impl Bvh {
    /// The number of nodes of this tree.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Does this tree not contain any node?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The maximum number of primitives per leaf this tree was built with.
    #[inline]
    pub fn max_leaf_size(&self) -> usize {
        self.max_leaf_size
    }

    /// The AABB bounding everything contained by this tree.
    ///
    /// Returns [`Aabb::new_invalid`] if the tree was built from zero
    /// primitives.
    #[inline]
    pub fn root_aabb(&self) -> Aabb {
        match self.nodes.first() {
            Some(root) => root.aabb,
            None => Aabb::new_invalid(),
        }
    }
}

impl fmt::Display for Bvh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nodes.is_empty() {
            return writeln!(f, "Bvh (empty)");
        }

        writeln!(
            f,
            "Bvh ({} nodes, max leaf size: {})",
            self.nodes.len(),
            self.max_leaf_size
        )?;

        let mut stack = vec![(0u32, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = &self.nodes[id as usize];
            let mins = node.aabb.mins;
            let maxs = node.aabb.maxs;

            for _ in 0..depth {
                write!(f, "  ")?;
            }

            match node.kind {
                BvhNodeKind::Leaf {
                    first_primitive,
                    primitive_count,
                } => writeln!(
                    f,
                    "{}: Leaf primitives [{}..{}] mins [{}, {}, {}] maxs [{}, {}, {}]",
                    id,
                    first_primitive,
                    first_primitive + primitive_count,
                    mins.x,
                    mins.y,
                    mins.z,
                    maxs.x,
                    maxs.y,
                    maxs.z,
                )?,
                BvhNodeKind::Interior { axis, second_child } => {
                    writeln!(
                        f,
                        "{}: Interior axis {} children [{}, {}] mins [{}, {}, {}] maxs [{}, {}, {}]",
                        id,
                        axis,
                        id + 1,
                        second_child,
                        mins.x,
                        mins.y,
                        mins.z,
                        maxs.x,
                        maxs.y,
                        maxs.z,
                    )?;
                    stack.push((second_child, depth + 1));
                    stack.push((id + 1, depth + 1));
                }
            }
        }

        Ok(())
    }
}
