use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::features::FeatureVector;
use crate::model::{Handle, FEATURE_DIM};
use crate::vector::Metric;

/// Query capability shared by every index variant. `build` is per-kind
/// (see [`IndexKind`]) so an incremental implementation can be swapped in
/// later without touching the engine.
pub trait VectorIndex: Send + Sync {
    /// Up to `k` nearest handles with their distances, ascending.
    /// Never yields a handle outside the snapshot the index was built from.
    fn query(&self, query: &FeatureVector, k: usize) -> Vec<(Handle, f64)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    KdTree,
    BallTree,
    BruteForce(Metric),
    Lsh,
}

impl IndexKind {
    /// Deterministic for a fixed input order: building twice over the same
    /// vectors yields an index with identical query behavior.
    pub fn build(&self, vectors: &[FeatureVector]) -> Box<dyn VectorIndex> {
        match self {
            IndexKind::KdTree => Box::new(KdTree::build(vectors)),
            IndexKind::BallTree => Box::new(BallTree::build(vectors, Metric::Euclidean)),
            IndexKind::BruteForce(metric) => Box::new(BruteForce::build(vectors, *metric)),
            IndexKind::Lsh => Box::new(crate::lsh::LshIndex::build(vectors)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    dist: OrderedFloat<f64>,
    handle: Handle,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .cmp(&other.dist)
            .then(self.handle.cmp(&other.handle))
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded max-heap insert: keeps the k best candidates, worst on top.
fn push_candidate(heap: &mut BinaryHeap<Candidate>, k: usize, cand: Candidate) {
    heap.push(cand);
    if heap.len() > k {
        heap.pop();
    }
}

fn drain_sorted(heap: BinaryHeap<Candidate>) -> Vec<(Handle, f64)> {
    heap.into_sorted_vec()
        .into_iter()
        .map(|c| (c.handle, c.dist.into_inner()))
        .collect()
}

// --- KD-TREE (EXACT, EUCLIDEAN) ---

struct KdNode {
    handle: Handle,
    axis: usize,
    left: Option<Box<KdNode>>,
    right: Option<Box<KdNode>>,
}

pub struct KdTree {
    points: Vec<FeatureVector>,
    root: Option<Box<KdNode>>,
}

impl KdTree {
    pub fn build(vectors: &[FeatureVector]) -> Self {
        let mut handles: Vec<Handle> = (0..vectors.len()).collect();
        let root = build_kd(vectors, &mut handles, 0);
        Self {
            points: vectors.to_vec(),
            root,
        }
    }

    fn descend(&self, node: &KdNode, query: &FeatureVector, k: usize, heap: &mut BinaryHeap<Candidate>) {
        let point = &self.points[node.handle];
        let d = Metric::Euclidean.distance(query, point);
        push_candidate(
            heap,
            k,
            Candidate {
                dist: OrderedFloat(d),
                handle: node.handle,
            },
        );

        let diff = query[node.axis] - point[node.axis];
        let (near, far) = if diff < 0.0 {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        if let Some(child) = near {
            self.descend(child, query, k, heap);
        }
        // The far half-space can only matter if the splitting plane is
        // closer than the current worst candidate.
        let crosses = match heap.peek() {
            Some(worst) if heap.len() == k => OrderedFloat(diff.abs()) <= worst.dist,
            _ => true,
        };
        if crosses {
            if let Some(child) = far {
                self.descend(child, query, k, heap);
            }
        }
    }
}

fn build_kd(points: &[FeatureVector], handles: &mut [Handle], depth: usize) -> Option<Box<KdNode>> {
    if handles.is_empty() {
        return None;
    }
    let axis = depth % FEATURE_DIM;
    handles.sort_by(|&a, &b| {
        OrderedFloat(points[a][axis])
            .cmp(&OrderedFloat(points[b][axis]))
            .then(a.cmp(&b))
    });
    let mid = handles.len() / 2;
    let handle = handles[mid];
    let (left, right) = handles.split_at_mut(mid);
    let right = &mut right[1..];
    Some(Box::new(KdNode {
        handle,
        axis,
        left: build_kd(points, left, depth + 1),
        right: build_kd(points, right, depth + 1),
    }))
}

impl VectorIndex for KdTree {
    fn query(&self, query: &FeatureVector, k: usize) -> Vec<(Handle, f64)> {
        if k == 0 {
            return vec![];
        }
        let mut heap = BinaryHeap::new();
        if let Some(root) = &self.root {
            self.descend(root, query, k, &mut heap);
        }
        drain_sorted(heap)
    }
}

// --- BALL TREE (EXACT, ANY METRIC) ---

const BALL_LEAF_SIZE: usize = 16;

enum BallNodeKind {
    Leaf(Vec<Handle>),
    Split(Box<BallNode>, Box<BallNode>),
}

struct BallNode {
    centroid: FeatureVector,
    radius: f64,
    kind: BallNodeKind,
}

pub struct BallTree {
    points: Vec<FeatureVector>,
    metric: Metric,
    root: Option<Box<BallNode>>,
}

impl BallTree {
    pub fn build(vectors: &[FeatureVector], metric: Metric) -> Self {
        let mut handles: Vec<Handle> = (0..vectors.len()).collect();
        let root = if handles.is_empty() {
            None
        } else {
            Some(Box::new(build_ball(vectors, metric, &mut handles)))
        };
        Self {
            points: vectors.to_vec(),
            metric,
            root,
        }
    }

    fn descend(&self, node: &BallNode, query: &FeatureVector, k: usize, heap: &mut BinaryHeap<Candidate>) {
        if heap.len() == k {
            if let Some(worst) = heap.peek() {
                // Triangle inequality: nothing inside this ball can beat
                // the current worst candidate.
                let bound = self.metric.distance(query, &node.centroid) - node.radius;
                if bound > worst.dist.into_inner() {
                    return;
                }
            }
        }
        match &node.kind {
            BallNodeKind::Leaf(handles) => {
                for &h in handles {
                    let d = self.metric.distance(query, &self.points[h]);
                    push_candidate(
                        heap,
                        k,
                        Candidate {
                            dist: OrderedFloat(d),
                            handle: h,
                        },
                    );
                }
            }
            BallNodeKind::Split(a, b) => {
                let da = self.metric.distance(query, &a.centroid);
                let db = self.metric.distance(query, &b.centroid);
                let (first, second) = if da <= db { (a, b) } else { (b, a) };
                self.descend(first, query, k, heap);
                self.descend(second, query, k, heap);
            }
        }
    }
}

fn centroid_of(points: &[FeatureVector], handles: &[Handle]) -> FeatureVector {
    let mut c = [0.0; FEATURE_DIM];
    for &h in handles {
        for (acc, v) in c.iter_mut().zip(&points[h]) {
            *acc += v;
        }
    }
    for acc in &mut c {
        *acc /= handles.len() as f64;
    }
    c
}

fn build_ball(points: &[FeatureVector], metric: Metric, handles: &mut [Handle]) -> BallNode {
    let centroid = centroid_of(points, handles);
    let radius = handles
        .iter()
        .map(|&h| OrderedFloat(metric.distance(&centroid, &points[h])))
        .max()
        .map(|d| d.into_inner())
        .unwrap_or(0.0);

    if handles.len() <= BALL_LEAF_SIZE {
        return BallNode {
            centroid,
            radius,
            kind: BallNodeKind::Leaf(handles.to_vec()),
        };
    }

    // Split on the dimension with the widest spread.
    let mut split_axis = 0;
    let mut best_spread = f64::MIN;
    for axis in 0..FEATURE_DIM {
        let mut lo = f64::MAX;
        let mut hi = f64::MIN;
        for &h in handles.iter() {
            lo = lo.min(points[h][axis]);
            hi = hi.max(points[h][axis]);
        }
        if hi - lo > best_spread {
            best_spread = hi - lo;
            split_axis = axis;
        }
    }

    handles.sort_by(|&a, &b| {
        OrderedFloat(points[a][split_axis])
            .cmp(&OrderedFloat(points[b][split_axis]))
            .then(a.cmp(&b))
    });
    let mid = handles.len() / 2;
    let (left, right) = handles.split_at_mut(mid);
    BallNode {
        centroid,
        radius,
        kind: BallNodeKind::Split(
            Box::new(build_ball(points, metric, left)),
            Box::new(build_ball(points, metric, right)),
        ),
    }
}

impl VectorIndex for BallTree {
    fn query(&self, query: &FeatureVector, k: usize) -> Vec<(Handle, f64)> {
        if k == 0 {
            return vec![];
        }
        let mut heap = BinaryHeap::new();
        if let Some(root) = &self.root {
            self.descend(root, query, k, &mut heap);
        }
        drain_sorted(heap)
    }
}

// --- BRUTE FORCE (BASELINE, ANY METRIC) ---

pub struct BruteForce {
    points: Vec<FeatureVector>,
    metric: Metric,
}

impl BruteForce {
    pub fn build(vectors: &[FeatureVector], metric: Metric) -> Self {
        Self {
            points: vectors.to_vec(),
            metric,
        }
    }
}

impl VectorIndex for BruteForce {
    fn query(&self, query: &FeatureVector, k: usize) -> Vec<(Handle, f64)> {
        if k == 0 {
            return vec![];
        }
        let mut all: Vec<Candidate> = self
            .points
            .iter()
            .enumerate()
            .map(|(h, p)| Candidate {
                dist: OrderedFloat(self.metric.distance(query, p)),
                handle: h,
            })
            .collect();
        all.sort();
        all.truncate(k);
        all.into_iter()
            .map(|c| (c.handle, c.dist.into_inner()))
            .collect()
    }
}
