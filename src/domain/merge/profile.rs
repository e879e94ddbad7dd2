//! Profile call-tree merge
//!
//! Sample counts sum per matching frame at each depth; children merge
//! recursively. Frame order follows first appearance, which keeps repeated
//! merges stable.

use crate::domain::wire::{Profile, ProfileNode};

#[derive(Debug, Clone, PartialEq)]
struct MutableProfileNode {
    frame: String,
    sample_count: i64,
    child_nodes: Vec<MutableProfileNode>,
}

impl MutableProfileNode {
    fn from_proto(node: &ProfileNode) -> Self {
        Self {
            frame: node.frame.clone(),
            sample_count: node.sample_count,
            child_nodes: node.child_nodes.iter().map(Self::from_proto).collect(),
        }
    }

    fn to_proto(&self) -> ProfileNode {
        ProfileNode {
            frame: self.frame.clone(),
            sample_count: self.sample_count,
            child_nodes: self.child_nodes.iter().map(Self::to_proto).collect(),
        }
    }
}

fn merge_nodes(to_be_merged: &[ProfileNode], nodes: &mut Vec<MutableProfileNode>) {
    for node in to_be_merged {
        match nodes.iter_mut().find(|existing| existing.frame == node.frame) {
            Some(existing) => {
                existing.sample_count += node.sample_count;
                merge_nodes(&node.child_nodes, &mut existing.child_nodes);
            }
            None => nodes.push(MutableProfileNode::from_proto(node)),
        }
    }
}

/// Accumulates profiles across rows
#[derive(Debug, Default)]
pub struct MutableProfile {
    root_nodes: Vec<MutableProfileNode>,
}

impl MutableProfile {
    pub fn merge(&mut self, profile: &Profile) {
        merge_nodes(&profile.root_nodes, &mut self.root_nodes);
    }

    pub fn is_empty(&self) -> bool {
        self.root_nodes.is_empty()
    }

    pub fn sample_count(&self) -> i64 {
        self.root_nodes.iter().map(|node| node.sample_count).sum()
    }

    pub fn to_proto(&self) -> Profile {
        Profile {
            root_nodes: self.root_nodes.iter().map(MutableProfileNode::to_proto).collect(),
        }
    }
}

/// Reader-side collector: merges profile rows and tracks the last capture time
#[derive(Debug, Default)]
pub struct ProfileCollector {
    profile: MutableProfile,
    last_capture_time: i64,
}

impl ProfileCollector {
    pub fn merge_profile(&mut self, profile: &Profile) {
        self.profile.merge(profile);
    }

    pub fn update_last_capture_time(&mut self, capture_time: i64) {
        self.last_capture_time = self.last_capture_time.max(capture_time);
    }

    pub fn last_capture_time(&self) -> i64 {
        self.last_capture_time
    }

    pub fn profile(&self) -> &MutableProfile {
        &self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(frame: &str, samples: i64, children: Vec<ProfileNode>) -> ProfileNode {
        ProfileNode {
            frame: frame.to_string(),
            sample_count: samples,
            child_nodes: children,
        }
    }

    #[test]
    fn test_matching_frames_sum() {
        let mut profile = MutableProfile::default();
        profile.merge(&Profile {
            root_nodes: vec![node(
                "Controller.handle",
                10,
                vec![node("Repo.find", 6, vec![])],
            )],
        });
        profile.merge(&Profile {
            root_nodes: vec![node(
                "Controller.handle",
                4,
                vec![node("Repo.find", 1, vec![]), node("Cache.get", 2, vec![])],
            )],
        });
        let merged = profile.to_proto();
        assert_eq!(merged.root_nodes.len(), 1);
        let root = &merged.root_nodes[0];
        assert_eq!(root.sample_count, 14);
        assert_eq!(root.child_nodes.len(), 2);
        assert_eq!(root.child_nodes[0].sample_count, 7);
        assert_eq!(root.child_nodes[1].frame, "Cache.get");
    }

    #[test]
    fn test_distinct_roots_stay_separate() {
        let mut profile = MutableProfile::default();
        profile.merge(&Profile {
            root_nodes: vec![node("main", 1, vec![])],
        });
        profile.merge(&Profile {
            root_nodes: vec![node("worker", 2, vec![])],
        });
        assert_eq!(profile.to_proto().root_nodes.len(), 2);
        assert_eq!(profile.sample_count(), 3);
    }

    #[test]
    fn test_merge_twice_doubles_counts() {
        let input = Profile {
            root_nodes: vec![node("main", 5, vec![node("leaf", 3, vec![])])],
        };
        let mut profile = MutableProfile::default();
        profile.merge(&input);
        profile.merge(&input);
        let merged = profile.to_proto();
        assert_eq!(merged.root_nodes[0].sample_count, 10);
        assert_eq!(merged.root_nodes[0].child_nodes[0].sample_count, 6);
    }
}
