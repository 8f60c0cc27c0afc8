use super::{Bvh, BvhNode, BvhNodeKind};
use crate::bounding_volume::{Aabb, BoundingVolume};
use crate::math::{Point, Real, Vector};

/// An error encountered when building a [`Bvh`].
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum BvhBuildError {
    /// The maximum leaf size must be at least 1 for the recursion to terminate.
    #[error("the maximum leaf size must be at least 1")]
    InvalidMaxLeafSize,
    /// A primitive index pointed outside of the primitive AABB array.
    #[error("the primitive index {index} is out of bounds for {count} primitive AABBs")]
    PrimitiveIndexOutOfBounds {
        /// The offending index.
        index: u32,
        /// The number of primitive AABBs supplied.
        count: usize,
    },
    /// Linear nodes address primitives with 32-bit offsets.
    #[error("the primitive count {0} exceeds the maximum supported by 32-bit node offsets")]
    TooManyPrimitives(usize),
}

// The temporary tree produced by the recursive median split. It never
// outlives the `Bvh::new` call that created it: it is counted, flattened
// into the linear node array, then dropped.
struct BuildNode {
    aabb: Aabb,
    kind: BuildNodeKind,
}

enum BuildNodeKind {
    Leaf {
        first_primitive: u32,
        primitive_count: u32,
    },
    Interior {
        axis: u8,
        children: [Box<BuildNode>; 2],
    },
}

impl BuildNode {
    fn count(&self) -> usize {
        match &self.kind {
            BuildNodeKind::Leaf { .. } => 1,
            BuildNodeKind::Interior { children, .. } => {
                1 + children[0].count() + children[1].count()
            }
        }
    }
}

#[inline]
fn centroid_coord(aabb: &Aabb, axis: usize) -> Real {
    (aabb.mins[axis] + aabb.maxs[axis]) * 0.5
}

/// Recursively partitions `indices` (a subrange of the caller's index array
/// starting at the global offset `first`) with an object-median split.
fn build_recurse(
    primitive_aabbs: &[Aabb],
    indices: &mut [u32],
    first: u32,
    max_leaf_size: usize,
) -> BuildNode {
    let mut aabb = Aabb::new_invalid();
    for i in indices.iter() {
        aabb.merge(&primitive_aabbs[*i as usize]);
    }

    if indices.len() <= max_leaf_size {
        return BuildNode {
            aabb,
            kind: BuildNodeKind::Leaf {
                first_primitive: first,
                primitive_count: indices.len() as u32,
            },
        };
    }

    // Primitives are ranked by centroid, so the split axis is the widest
    // axis of the centroid bounds, not of the geometric bounds.
    let mut centroid_aabb = Aabb::new_invalid();
    for i in indices.iter() {
        let center = primitive_aabbs[*i as usize].center();
        centroid_aabb.merge(&Aabb::new(center, center));
    }

    let extents = centroid_aabb.extents();
    let mut axis = 0;
    if extents.y > extents.x {
        axis = 1;
    }
    if extents.z > extents[axis] {
        axis = 2;
    }

    // Median partition: after this, the first half of `indices` holds the
    // primitives with the smallest centroid coordinates along `axis`. The
    // ordering among equal coordinates is unspecified, and fully coincident
    // primitives simply split by index position.
    let mid = indices.len() / 2;
    let _ = indices.select_nth_unstable_by(mid, |a, b| {
        let ca = centroid_coord(&primitive_aabbs[*a as usize], axis);
        let cb = centroid_coord(&primitive_aabbs[*b as usize], axis);
        ca.total_cmp(&cb)
    });
    let (below, above) = indices.split_at_mut(mid);

    let children = [
        Box::new(build_recurse(primitive_aabbs, below, first, max_leaf_size)),
        Box::new(build_recurse(
            primitive_aabbs,
            above,
            first + mid as u32,
            max_leaf_size,
        )),
    ];

    BuildNode {
        aabb,
        kind: BuildNodeKind::Interior {
            axis: axis as u8,
            children,
        },
    }
}

/// Lowers the build tree into the linear node array, in depth-first
/// preorder, and returns the index the node was written at.
fn flatten(node: &BuildNode, nodes: &mut Vec<BvhNode>) -> u32 {
    let my_index = nodes.len() as u32;

    match &node.kind {
        BuildNodeKind::Leaf {
            first_primitive,
            primitive_count,
        } => {
            nodes.push(BvhNode {
                aabb: node.aabb,
                kind: BvhNodeKind::Leaf {
                    first_primitive: *first_primitive,
                    primitive_count: *primitive_count,
                },
            });
        }
        BuildNodeKind::Interior { axis, children } => {
            // Reserve this node's slot before recursing so the first child
            // always lands at `my_index + 1`.
            nodes.push(BvhNode {
                aabb: node.aabb,
                kind: BvhNodeKind::Interior {
                    axis: *axis,
                    second_child: 0,
                },
            });

            let first_child = flatten(&children[0], nodes);
            debug_assert_eq!(first_child, my_index + 1);

            let second_child = flatten(&children[1], nodes);
            nodes[my_index as usize] = BvhNode {
                aabb: node.aabb,
                kind: BvhNodeKind::Interior {
                    axis: *axis,
                    second_child,
                },
            };
        }
    }

    my_index
}

impl Bvh {
    /// Builds a BVH over the given primitive AABBs.
    ///
    /// `primitive_indices` selects which primitives take part in the tree;
    /// it is permuted in place so that, after the build, each leaf's
    /// primitives occupy one contiguous run of it. Callers must not assume
    /// its original order survives the call. Every index must be in bounds
    /// for `primitive_aabbs`.
    ///
    /// An empty `primitive_indices` slice yields an empty tree, on which
    /// every query reports a miss.
    ///
    /// # Example
    ///
    /// ```rust
    /// use voxel_bvh::bounding_volume::Aabb;
    /// use voxel_bvh::partitioning::Bvh;
    /// use voxel_bvh::na::{Point3, Vector3};
    ///
    /// let aabbs: Vec<_> = (0..4)
    ///     .map(|i| {
    ///         let center = Point3::new(i as f32, i as f32, i as f32);
    ///         Aabb::from_half_extents(center, Vector3::repeat(0.5))
    ///     })
    ///     .collect();
    /// let mut indices: Vec<u32> = (0..4).collect();
    ///
    /// let bvh = Bvh::new(&aabbs, &mut indices, 2).unwrap();
    /// assert!(bvh.node_count() > 0);
    /// ```
    pub fn new(
        primitive_aabbs: &[Aabb],
        primitive_indices: &mut [u32],
        max_leaf_size: usize,
    ) -> Result<Bvh, BvhBuildError> {
        if max_leaf_size == 0 {
            return Err(BvhBuildError::InvalidMaxLeafSize);
        }

        if primitive_indices.len() > u32::MAX as usize {
            return Err(BvhBuildError::TooManyPrimitives(primitive_indices.len()));
        }

        if let Some(index) = primitive_indices
            .iter()
            .copied()
            .find(|i| *i as usize >= primitive_aabbs.len())
        {
            return Err(BvhBuildError::PrimitiveIndexOutOfBounds {
                index,
                count: primitive_aabbs.len(),
            });
        }

        if primitive_indices.is_empty() {
            return Ok(Bvh {
                nodes: Vec::new(),
                max_leaf_size,
            });
        }

        let root = build_recurse(primitive_aabbs, primitive_indices, 0, max_leaf_size);
        let node_count = root.count();

        let mut nodes = Vec::with_capacity(node_count);
        let root_index = flatten(&root, &mut nodes);
        debug_assert_eq!(root_index, 0);
        debug_assert_eq!(nodes.len(), node_count);

        log::debug!(
            "built BVH: {} nodes over {} primitives (max leaf size: {})",
            nodes.len(),
            primitive_indices.len(),
            max_leaf_size
        );

        Ok(Bvh {
            nodes,
            max_leaf_size,
        })
    }

    /// Builds a BVH with one unit box per voxel center, for any-hit
    /// occlusion queries.
    ///
    /// This builds the `(AABBs, indices)` pair with [`voxel_primitives`] and
    /// discards the permuted index buffer afterwards: any-hit queries never
    /// consult it since a leaf's bounds are exact primitive geometry.
    pub fn from_voxels(
        voxel_centers: impl IntoIterator<Item = Point<Real>>,
        max_leaf_size: usize,
    ) -> Result<Bvh, BvhBuildError> {
        let (aabbs, mut indices) = voxel_primitives(voxel_centers);
        Bvh::new(&aabbs, &mut indices, max_leaf_size)
    }
}

/// Builds the `(primitive AABBs, primitive indices)` pair for a set of unit
/// voxels.
///
/// Emits one unit cube per voxel center together with the running index
/// array, which is exactly the input expected by [`Bvh::new`]. This is the
/// whole interface between a voxel world and the tree: the tree itself knows
/// nothing about chunks, materials or world coordinates.
pub fn voxel_primitives(
    voxel_centers: impl IntoIterator<Item = Point<Real>>,
) -> (Vec<Aabb>, Vec<u32>) {
    let aabbs: Vec<_> = voxel_centers
        .into_iter()
        .map(|center| Aabb::from_half_extents(center, Vector::repeat(0.5)))
        .collect();
    let indices = (0..aabbs.len()).map(|i| i as u32).collect();
    (aabbs, indices)
}
