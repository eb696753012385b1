// ==============================================================================
// spatial_tree.rs - BOUNDING-VOLUME TREE OVER TERRAIN TRIANGLES
// ------------------------------------------------------------------------------
// Bulk-built once per terrain load, immutable and read-only afterwards.
//
// Build: recursive top-down mean split along the node's longest axis. Boxes
// that are "long" on the split axis (extent above LONG_BOX_TOLERANCE of the
// node extent) are pinned to the splitting node and never descend; splitting
// stops early when both would-be children are small and the split does not
// actually shrink the bounded volume.
//
// Storage is a flat node array plus the tree-owned box array, partitioned in
// place during the build; each node owns a window [ptr, ptr + count) of that
// array (its pinned boxes, or the full contents for a leaf).
//
// Query returns a superset of the exact overlap set: false positives are
// allowed, false negatives are not.
// ==============================================================================

use parry3d::bounding_volume::{Aabb, BoundingVolume};
use parry3d::math::Real;

use crate::aabb::TaggedAabb;

/// Extent fraction (of the node extent, on the split axis) above which a box
/// is pinned to the splitting node instead of descending into a child.
pub const LONG_BOX_TOLERANCE: Real = 0.8;

/// Below this population a split must also pass the volume check.
pub const MAX_OBJECTS_PER_NODE: usize = 8;

/// Minimum relative volume reduction a small split has to deliver.
pub const VOLUME_TOLERANCE: Real = 0.01;

#[derive(Clone, Copy, Debug)]
struct TreeNode {
    /// Parent node index, -1 at the root.
    father: i32,
    /// Left child index (right child is `child + 1`), -1 for a leaf.
    child: i32,
    /// Start of this node's window into the permuted box array.
    ptr: usize,
    /// Window length: pinned long boxes, or the full contents for a leaf.
    count: usize,
    /// Union of every box in this node's subtree.
    bbox: Aabb,
}

pub struct SpatialTree {
    nodes: Vec<TreeNode>,
    boxes: Vec<TaggedAabb>,
}

impl SpatialTree {
    /// Bulk-build over a set of tagged boxes. The boxes are moved into the
    /// tree and partitioned in place; an empty input yields an empty tree.
    pub fn build(boxes: Vec<TaggedAabb>) -> Self {
        let mut tree = SpatialTree {
            nodes: Vec::new(),
            boxes,
        };
        if tree.boxes.is_empty() {
            return tree;
        }
        tree.nodes.reserve(2 * tree.boxes.len());
        tree.nodes.push(TreeNode {
            father: -1,
            child: -1,
            ptr: 0,
            count: tree.boxes.len(),
            bbox: Aabb::new_invalid(),
        });
        let n = tree.boxes.len();
        tree.build_node(0, 0, n);
        tracing::debug!(
            boxes = tree.boxes.len(),
            nodes = tree.nodes.len(),
            "bounding-volume tree built"
        );
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Union box of everything in the tree.
    pub fn root_bbox(&self) -> Aabb {
        self.nodes
            .first()
            .map(|n| n.bbox)
            .unwrap_or_else(Aabb::new_invalid)
    }

    fn union_bbox(&self, lo: usize, hi: usize) -> Aabb {
        let mut bbox = Aabb::new_invalid();
        for b in &self.boxes[lo..hi] {
            bbox.merge(&b.aabb);
        }
        bbox
    }

    fn build_node(&mut self, node: usize, lo: usize, hi: usize) {
        let bbox = self.union_bbox(lo, hi);
        self.nodes[node].bbox = bbox;
        self.nodes[node].ptr = lo;
        self.nodes[node].count = hi - lo;

        let extents = bbox.maxs - bbox.mins;
        let axis = if extents.x >= extents.y && extents.x >= extents.z {
            0
        } else if extents.y >= extents.z {
            1
        } else {
            2
        };
        let node_extent = extents[axis];

        // pin long boxes to the front of the window; they stay on this node
        let mut short = lo;
        for i in lo..hi {
            if self.boxes[i].extent(axis) > LONG_BOX_TOLERANCE * node_extent {
                self.boxes.swap(i, short);
                short += 1;
            }
        }
        let n_short = hi - short;
        if n_short < 2 {
            return;
        }

        // split at the mean of the short boxes' midpoints
        let mut split_at = 0.0;
        for b in &self.boxes[short..hi] {
            split_at += b.mid(axis);
        }
        split_at /= n_short as Real;

        let mut mid = short;
        for i in short..hi {
            if self.boxes[i].mid(axis) < split_at {
                self.boxes.swap(i, mid);
                mid += 1;
            }
        }
        if mid == short || mid == hi {
            return;
        }

        // small children must actually shrink the bounded volume
        if mid - short < MAX_OBJECTS_PER_NODE && hi - mid < MAX_OBJECTS_PER_NODE {
            let left = self.union_bbox(short, mid);
            let right = self.union_bbox(mid, hi);
            let child_volume = volume_of(&left) + volume_of(&right);
            if child_volume > (1.0 - VOLUME_TOLERANCE) * volume_of(&bbox) {
                return;
            }
        }

        // the node keeps only its pinned boxes; the children own the rest
        self.nodes[node].count = short - lo;
        let left = self.nodes.len();
        let father = node as i32;
        let blank = TreeNode {
            father,
            child: -1,
            ptr: 0,
            count: 0,
            bbox: Aabb::new_invalid(),
        };
        self.nodes.push(blank);
        self.nodes.push(blank);
        self.nodes[node].child = left as i32;
        self.build_node(left, short, mid);
        self.build_node(left + 1, mid, hi);
    }

    /// Ids of all boxes whose Aabb overlaps `qbox`. Superset semantics.
    pub fn query(&self, qbox: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        self.query_into(qbox, &mut out);
        out
    }

    /// Allocation-light variant: clears and refills `out`.
    pub fn query_into(&self, qbox: &Aabb, out: &mut Vec<usize>) {
        out.clear();
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0usize];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n];
            if !node.bbox.intersects(qbox) {
                continue;
            }
            for b in &self.boxes[node.ptr..node.ptr + node.count] {
                if b.overlaps(qbox) {
                    if let Some(id) = b.id {
                        out.push(id);
                    }
                }
            }
            if node.child >= 0 {
                stack.push(node.child as usize);
                stack.push(node.child as usize + 1);
            }
        }
    }

    /// Like `query_into`, but rooted at an arbitrary node and appending.
    fn collect_from(&self, root: usize, qbox: &Aabb, out: &mut Vec<usize>) {
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n];
            if !node.bbox.intersects(qbox) {
                continue;
            }
            for b in &self.boxes[node.ptr..node.ptr + node.count] {
                if b.overlaps(qbox) {
                    if let Some(id) = b.id {
                        out.push(id);
                    }
                }
            }
            if node.child >= 0 {
                stack.push(node.child as usize);
                stack.push(node.child as usize + 1);
            }
        }
    }

    /// Dual traversal over node pairs of two trees: every (id, other_id) pair
    /// whose boxes overlap. Used to prune one mesh against another's region.
    pub fn query_pairs(&self, other: &SpatialTree) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        if self.nodes.is_empty() || other.nodes.is_empty() {
            return out;
        }
        let mut stack = vec![(0usize, 0usize)];
        let mut tmp = Vec::new();
        while let Some((i, j)) = stack.pop() {
            let a = &self.nodes[i];
            let b = &other.nodes[j];
            if !a.bbox.intersects(&b.bbox) {
                continue;
            }
            // boxes pinned on this node meet the whole opposite subtree here
            for ba in &self.boxes[a.ptr..a.ptr + a.count] {
                if let Some(ia) = ba.id {
                    tmp.clear();
                    other.collect_from(j, &ba.aabb, &mut tmp);
                    out.extend(tmp.iter().map(|&jb| (ia, jb)));
                }
            }
            if a.child < 0 {
                continue;
            }
            let (ca, cb) = (a.child as usize, b.child);
            // the opposite node's pinned boxes against this node's subtrees
            for bb in &other.boxes[b.ptr..b.ptr + b.count] {
                if let Some(jb) = bb.id {
                    tmp.clear();
                    self.collect_from(ca, &bb.aabb, &mut tmp);
                    self.collect_from(ca + 1, &bb.aabb, &mut tmp);
                    out.extend(tmp.iter().map(|&ia| (ia, jb)));
                }
            }
            if cb >= 0 {
                let cb = cb as usize;
                stack.push((ca, cb));
                stack.push((ca, cb + 1));
                stack.push((ca + 1, cb));
                stack.push((ca + 1, cb + 1));
            }
        }
        out
    }
}

#[inline]
fn volume_of(aabb: &Aabb) -> Real {
    let e = aabb.maxs - aabb.mins;
    e.x * e.y * e.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use parry3d::math::Point;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_boxes(rng: &mut StdRng, count: usize) -> Vec<TaggedAabb> {
        (0..count)
            .map(|i| {
                let cx = rng.gen_range(-10.0f32..10.0);
                let cy = rng.gen_range(-10.0f32..10.0);
                let cz = rng.gen_range(-10.0f32..10.0);
                let hx = rng.gen_range(0.01f32..1.5);
                let hy = rng.gen_range(0.01f32..1.5);
                let hz = rng.gen_range(0.01f32..1.5);
                let mut b = TaggedAabb::new(
                    Point::new(cx - hx, cy - hy, cz - hz),
                    Point::new(cx + hx, cy + hy, cz + hz),
                );
                b.id = Some(i);
                b
            })
            .collect()
    }

    fn brute_force(boxes: &[TaggedAabb], qbox: &Aabb) -> Vec<usize> {
        boxes
            .iter()
            .filter(|b| b.overlaps(qbox))
            .map(|b| b.id.unwrap())
            .collect()
    }

    #[test]
    fn empty_tree_queries_empty() {
        let tree = SpatialTree::build(Vec::new());
        assert!(tree.is_empty());
        let qbox = Aabb::new(Point::new(-100.0, -100.0, -100.0), Point::new(100.0, 100.0, 100.0));
        assert!(tree.query(&qbox).is_empty());
    }

    #[test]
    fn single_box_round_trip() {
        let mut b = TaggedAabb::new(Point::new(0.0, 0.0, 0.0), Point::new(1.0, 1.0, 1.0));
        b.id = Some(42);
        let tree = SpatialTree::build(vec![b]);
        let hit = Aabb::new(Point::new(0.5, 0.5, 0.5), Point::new(2.0, 2.0, 2.0));
        let miss = Aabb::new(Point::new(5.0, 5.0, 5.0), Point::new(6.0, 6.0, 6.0));
        assert_eq!(tree.query(&hit), vec![42]);
        assert!(tree.query(&miss).is_empty());
    }

    #[test]
    fn query_never_under_reports() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let boxes = random_boxes(&mut rng, 250);
        let reference = boxes.clone();
        let tree = SpatialTree::build(boxes);

        for _ in 0..60 {
            let cx = rng.gen_range(-12.0f32..12.0);
            let cy = rng.gen_range(-12.0f32..12.0);
            let cz = rng.gen_range(-12.0f32..12.0);
            let h = rng.gen_range(0.1f32..4.0);
            let qbox = Aabb::new(
                Point::new(cx - h, cy - h, cz - h),
                Point::new(cx + h, cy + h, cz + h),
            );
            let mut got = tree.query(&qbox);
            got.sort_unstable();
            let expected = brute_force(&reference, &qbox);
            for id in &expected {
                assert!(
                    got.binary_search(id).is_ok(),
                    "box {id} overlaps the query but was not reported"
                );
            }
            // every reported id must at least overlap (the per-box test makes
            // the query exact at the box level)
            for id in &got {
                assert!(reference[*id].overlaps(&qbox));
            }
        }
    }

    #[test]
    fn long_boxes_stay_reachable() {
        // one box spanning the whole extent plus a cloud of small ones
        let mut boxes = vec![{
            let mut b = TaggedAabb::new(Point::new(-50.0, -0.1, -0.1), Point::new(50.0, 0.1, 0.1));
            b.id = Some(0);
            b
        }];
        for i in 0..40 {
            let x = -20.0 + i as Real;
            let mut b =
                TaggedAabb::new(Point::new(x, 1.0, 1.0), Point::new(x + 0.5, 1.5, 1.5));
            b.id = Some(i + 1);
            boxes.push(b);
        }
        let tree = SpatialTree::build(boxes);
        let qbox = Aabb::new(Point::new(30.0, -1.0, -1.0), Point::new(31.0, 1.0, 1.0));
        let got = tree.query(&qbox);
        assert!(got.contains(&0), "the long box must always be reported");
    }

    #[test]
    fn dual_query_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(0xbeef);
        let a = random_boxes(&mut rng, 60);
        let b = random_boxes(&mut rng, 60);
        let (ra, rb) = (a.clone(), b.clone());
        let tree_a = SpatialTree::build(a);
        let tree_b = SpatialTree::build(b);

        let mut got = tree_a.query_pairs(&tree_b);
        got.sort_unstable();
        got.dedup();

        let mut expected = Vec::new();
        for ba in &ra {
            for bb in &rb {
                if ba.aabb.intersects(&bb.aabb) {
                    expected.push((ba.id.unwrap(), bb.id.unwrap()));
                }
            }
        }
        expected.sort_unstable();
        for pair in &expected {
            assert!(
                got.binary_search(pair).is_ok(),
                "overlapping pair {pair:?} was not reported"
            );
        }
        for (ia, jb) in &got {
            assert!(ra[*ia].aabb.intersects(&rb[*jb].aabb));
        }
    }

    #[test]
    fn root_bbox_bounds_everything() {
        let mut rng = StdRng::seed_from_u64(7);
        let boxes = random_boxes(&mut rng, 100);
        let reference = boxes.clone();
        let tree = SpatialTree::build(boxes);
        let root = tree.root_bbox();
        for b in &reference {
            assert!(root.contains(&b.aabb));
        }
    }
}
