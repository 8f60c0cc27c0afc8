use super::{Bvh, BvhNodeKind};
use crate::bounding_volume::Aabb;
use crate::math::{Point, Real, Vector, DIM};
use crate::query::Ray;
use smallvec::SmallVec;

const TRAVERSAL_STACK_SIZE: usize = 32;

// A ray prepared for repeated slab tests: reciprocal direction components
// and their signs are computed once per query. A zero direction component
// maps to a signed infinity, which the slab test below handles without
// special cases.
struct InvRay {
    origin: Point<Real>,
    inv_dir: Vector<Real>,
    dir_is_neg: [bool; DIM],
}

impl From<&Ray> for InvRay {
    #[inline]
    fn from(ray: &Ray) -> Self {
        let inv_dir = ray.dir.map(|d| 1.0 / d);
        Self {
            origin: ray.origin,
            inv_dir,
            dir_is_neg: [inv_dir.x < 0.0, inv_dir.y < 0.0, inv_dir.z < 0.0],
        }
    }
}

/// Slab test of a prepared ray against `aabb`, restricted to `t ∈ [0, max_toi]`.
///
/// NaNs coming from a `0.0 * inf` product (the ray origin sitting exactly on
/// the plane of a slab it runs parallel to) lose every comparison below, so
/// the corresponding slab simply doesn't constrain the interval.
#[inline]
fn intersects_inv_ray(aabb: &Aabb, ray: &InvRay, max_toi: Real) -> bool {
    let mut tmin = -Real::INFINITY;
    let mut tmax = Real::INFINITY;

    for i in 0..DIM {
        let (near_plane, far_plane) = if ray.dir_is_neg[i] {
            (aabb.maxs[i], aabb.mins[i])
        } else {
            (aabb.mins[i], aabb.maxs[i])
        };

        let t_near = (near_plane - ray.origin[i]) * ray.inv_dir[i];
        let t_far = (far_plane - ray.origin[i]) * ray.inv_dir[i];

        if tmin > t_far || t_near > tmax {
            return false;
        }

        tmin = tmin.max(t_near);
        tmax = tmax.min(t_far);
    }

    tmin < max_toi && tmax > 0.0
}

impl Bvh {
    /// Tests whether a ray hits any primitive of this tree within
    /// `t ∈ [0, max_toi]`.
    ///
    /// This is an any-hit query: it reports `true` as soon as one hit leaf
    /// is found, without looking for the nearest hit or identifying the
    /// primitive. Every primitive is an axis-aligned box equal to the
    /// bounds stored in its leaf, so a leaf passing the slab test *is* a
    /// hit; there is no secondary per-primitive shape test.
    ///
    /// An empty tree reports a miss.
    ///
    /// # Example
    ///
    /// ```rust
    /// use voxel_bvh::partitioning::Bvh;
    /// use voxel_bvh::query::Ray;
    /// use voxel_bvh::na::{Point3, Vector3};
    ///
    /// let centers = (0..4).map(|i| Point3::new(i as f32, i as f32, i as f32));
    /// let bvh = Bvh::from_voxels(centers, 2).unwrap();
    ///
    /// let towards = Ray::new(Point3::new(-1.0, -1.0, -1.0), Vector3::repeat(1.0));
    /// let away = Ray::new(Point3::new(-10.0, -10.0, -10.0), Vector3::repeat(-1.0));
    /// assert!(bvh.intersects_ray(&towards, 1000.0));
    /// assert!(!bvh.intersects_ray(&away, 1000.0));
    /// ```
    pub fn intersects_ray(&self, ray: &Ray, max_toi: Real) -> bool {
        if self.nodes.is_empty() {
            return false;
        }

        let inv_ray = InvRay::from(ray);
        let mut stack: SmallVec<[u32; TRAVERSAL_STACK_SIZE]> = SmallVec::new();
        let mut curr_id = 0u32;

        loop {
            let node = &self.nodes[curr_id as usize];

            if intersects_inv_ray(&node.aabb, &inv_ray, max_toi) {
                match node.kind {
                    BvhNodeKind::Leaf { .. } => return true,
                    BvhNodeKind::Interior { axis, second_child } => {
                        // Visit the near child (along the split axis) first
                        // so a hit is likely found before the far subtree.
                        if inv_ray.dir_is_neg[axis as usize] {
                            stack.push(curr_id + 1);
                            curr_id = second_child;
                        } else {
                            stack.push(second_child);
                            curr_id += 1;
                        }
                        continue;
                    }
                }
            }

            let Some(next) = stack.pop() else {
                return false;
            };
            curr_id = next;
        }
    }
}
