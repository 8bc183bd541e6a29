//! Tolerance-based vertex deduplication
//!
//! Vertices are interned through a three-level comparison tree: a tree of
//! Z values whose nodes each own a tree of Y values, whose nodes each own a
//! tree of X values ending in the vertex itself. Z goes first so points of
//! one footprint at different heights split early. Each axis is compared on
//! its own with `|delta| <= tolerance`, not by Euclidean distance.
//!
//! All nodes live in one arena addressed by index. Vertex ids are reserved
//! only after the walk failed to find a match, so ids stay dense and follow
//! first-seen order; `records` is stored in id order and is the emission
//! order of the final position buffer.

use crate::geometry::Point3;
use indexmap::IndexMap;

pub type VertexId = usize;

/// Store row id of a surface
pub type SurfaceId = i64;

/// One deduplicated vertex
#[derive(Debug, Clone, PartialEq)]
pub struct VertexRecord {
    pub id: VertexId,
    pub coords: Point3,
    /// Texture coordinate per surface this vertex takes part in
    pub uvs: IndexMap<SurfaceId, [f64; 2]>,
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    /// Matched on this axis; continue in the next axis' tree
    Branch { next: u32 },
    /// Matched on the last axis
    Leaf { vertex: VertexId },
}

#[derive(Debug, Clone)]
struct Node {
    value: f64,
    left: Option<u32>,
    right: Option<u32>,
    kind: NodeKind,
}

/// Where a newly created subtree gets linked
#[derive(Clone, Copy)]
enum Slot {
    Root,
    Left(u32),
    Right(u32),
}

#[derive(Debug, Clone)]
pub struct VertexIndex {
    tolerance: f64,
    nodes: Vec<Node>,
    root: Option<u32>,
    records: Vec<VertexRecord>,
}

impl VertexIndex {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance, nodes: Vec::new(), root: None, records: Vec::new() }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Find the vertex equal to `point` within tolerance, creating it if absent.
    /// A supplied uv is attached for `surface_id`.
    pub fn intern(&mut self, surface_id: SurfaceId, point: Point3, uv: Option<[f64; 2]>) -> VertexId {
        let id = self.find_or_insert(point);
        if let Some(uv) = uv {
            self.attach_uv(id, surface_id, uv);
        }
        id
    }

    pub fn attach_uv(&mut self, vertex: VertexId, surface_id: SurfaceId, uv: [f64; 2]) {
        if let Some(record) = self.records.get_mut(vertex) {
            record.uvs.insert(surface_id, uv);
        }
    }

    /// Look up a point without inserting it
    pub fn find(&self, point: Point3) -> Option<VertexId> {
        let key = [point[2], point[1], point[0]];
        let mut level = 0;
        let mut current = self.root;
        while let Some(idx) = current {
            let node = &self.nodes[idx as usize];
            let delta = key[level] - node.value;
            if delta.abs() <= self.tolerance {
                match node.kind {
                    NodeKind::Branch { next } => {
                        level += 1;
                        current = Some(next);
                    }
                    NodeKind::Leaf { vertex } => return Some(vertex),
                }
            } else if delta > 0.0 {
                current = node.right;
            } else {
                current = node.left;
            }
        }
        None
    }

    fn find_or_insert(&mut self, point: Point3) -> VertexId {
        let key = [point[2], point[1], point[0]];
        let mut level = 0;
        let mut slot = Slot::Root;
        let mut current = self.root;

        while let Some(idx) = current {
            let node = &self.nodes[idx as usize];
            let delta = key[level] - node.value;
            if delta.abs() <= self.tolerance {
                match node.kind {
                    NodeKind::Branch { next } => {
                        level += 1;
                        current = Some(next);
                    }
                    NodeKind::Leaf { vertex } => return vertex,
                }
            } else if delta > 0.0 {
                slot = Slot::Right(idx);
                current = node.right;
            } else {
                slot = Slot::Left(idx);
                current = node.left;
            }
        }

        // No match: reserve the id now and build the remaining axis chain bottom-up
        let vertex = self.records.len();
        self.records.push(VertexRecord { id: vertex, coords: point, uvs: IndexMap::new() });

        let mut kind = NodeKind::Leaf { vertex };
        let mut top = 0u32;
        for axis in (level..3).rev() {
            top = self.nodes.len() as u32;
            self.nodes.push(Node { value: key[axis], left: None, right: None, kind });
            kind = NodeKind::Branch { next: top };
        }

        match slot {
            Slot::Root => self.root = Some(top),
            Slot::Left(parent) => self.nodes[parent as usize].left = Some(top),
            Slot::Right(parent) => self.nodes[parent as usize].right = Some(top),
        }
        vertex
    }

    pub fn get(&self, id: VertexId) -> Option<&VertexRecord> {
        self.records.get(id)
    }

    /// Records in first-seen order
    pub fn records(&self) -> &[VertexRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
