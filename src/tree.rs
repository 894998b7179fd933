use hashbrown::HashMap;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use super::bfs::{bfs, post_order};
use super::error::ModelError;
use super::{JointType, Segment, SegmentDescription, SegmentTree};

impl SegmentTree {
    /// Build the tree from segment records.
    ///
    /// Exactly one record must have no parent. Revolute coordinates are
    /// numbered in breadth-first order and never renumbered afterwards.
    pub fn from_segments(descriptions: Vec<SegmentDescription>) -> Result<Self, ModelError> {
        if descriptions.is_empty() {
            return Err(ModelError::InvalidTree("no segments".into()));
        }

        // segment name -> segment id
        let mut name_index = HashMap::with_capacity(descriptions.len());
        for (index, description) in descriptions.iter().enumerate() {
            if name_index.insert(description.name.clone(), index).is_some() {
                return Err(ModelError::InvalidTree(format!(
                    "duplicate segment {}",
                    description.name
                )));
            }
        }

        let mut roots = descriptions.iter().enumerate().filter(|(_, d)| d.parent.is_none());
        let root = match (roots.next(), roots.next()) {
            (Some((index, _)), None) => index,
            (None, _) => return Err(ModelError::InvalidTree("no root segment".into())),
            (Some((_, a)), Some((_, b))) => {
                return Err(ModelError::InvalidTree(format!(
                    "multiple root segments: {} and {}",
                    a.name, b.name
                )))
            }
        };

        // construct a segment id digraph
        // parent id -> child id
        let mut link_graph = DiGraphMap::<usize, ()>::new();
        (0..descriptions.len()).for_each(|index| {
            link_graph.add_node(index);
        });
        let mut parents = Vec::with_capacity(descriptions.len());
        for (index, description) in descriptions.iter().enumerate() {
            let parent = match &description.parent {
                Some(parent) => Some(
                    *name_index
                        .get(parent)
                        .ok_or_else(|| ModelError::UnknownSegment(parent.clone()))?,
                ),
                None => None,
            };
            if let Some(parent) = parent {
                link_graph.add_edge(parent, index, ());
            }
            parents.push(parent);
        }

        let bfs = bfs(&link_graph, root);
        if bfs.len() != descriptions.len() {
            return Err(ModelError::InvalidTree(
                "segments unreachable from the root (cycle?)".into(),
            ));
        }

        let mut segments: Vec<Segment> = descriptions
            .into_iter()
            .zip(parents)
            .map(|(d, parent)| Segment {
                name: d.name,
                parent,
                children: Vec::new(),
                parent_offset: d.parent_offset,
                joint: d.joint,
                inertia: d.inertia,
                joint_path: Vec::new(),
            })
            .collect();

        // children, joint numbering and root->segment joint paths
        let mut joint_index = HashMap::new();
        let mut joint_segments = Vec::new();
        for &id in &bfs {
            let mut path = match segments[id].parent {
                Some(parent) => {
                    segments[parent].children.push(id);
                    segments[parent].joint_path.clone()
                }
                None => Vec::new(),
            };
            if segments[id].joint.joint_type.is_revolute() {
                let coordinate = joint_segments.len();
                joint_index.insert(segments[id].joint.name.clone(), coordinate);
                joint_segments.push(id);
                path.push(coordinate);
            }
            segments[id].joint_path = path;
        }

        debug!(
            segments = segments.len(),
            joints = joint_segments.len(),
            root = %segments[root].name,
            "segment tree built"
        );

        Ok(Self {
            segments,
            link_graph,
            bfs,
            root,
            name_index,
            joint_index,
            joint_segments,
        })
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, index: usize) -> &Segment {
        &self.segments[index]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<usize, ModelError> {
        self.index_of(name)
            .ok_or_else(|| ModelError::UnknownSegment(name.to_string()))
    }

    /// Number of revolute coordinates.
    pub fn joint_count(&self) -> usize {
        self.joint_segments.len()
    }

    pub fn joint_coordinate(&self, joint_name: &str) -> Option<usize> {
        self.joint_index.get(joint_name).copied()
    }

    /// Joint names in coordinate order.
    pub fn joint_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.joint_segments
            .iter()
            .map(|&s| self.segments[s].joint.name.as_str())
    }

    /// Segment moved by coordinate `coordinate`.
    pub fn joint_segment(&self, coordinate: usize) -> usize {
        self.joint_segments[coordinate]
    }

    /// Segment ids, children before parents.
    pub fn post_order(&self) -> impl Iterator<Item = usize> + '_ {
        post_order(&self.bfs)
    }

    /// Segments whose joint type is [`JointType::Rotor`].
    pub fn rotor_segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments
            .iter()
            .filter(|s| matches!(s.joint.joint_type, JointType::Rotor { .. }))
    }
}
