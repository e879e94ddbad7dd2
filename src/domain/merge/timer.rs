//! Root-timer tree merge
//!
//! Timers form a tree keyed by (name, extended). Merging sums total_nanos and
//! count per node and recurses into children, so the merge is associative and
//! commutative regardless of row order.

use crate::domain::wire::Timer;

#[derive(Debug, Clone, PartialEq)]
pub struct MutableTimer {
    pub name: String,
    pub extended: bool,
    pub total_nanos: f64,
    pub count: i64,
    pub child_timers: Vec<MutableTimer>,
}

impl MutableTimer {
    fn from_proto(timer: &Timer) -> Self {
        Self {
            name: timer.name.clone(),
            extended: timer.extended,
            total_nanos: timer.total_nanos,
            count: timer.count,
            child_timers: timer.child_timers.iter().map(Self::from_proto).collect(),
        }
    }

    fn merge(&mut self, timer: &Timer) {
        self.total_nanos += timer.total_nanos;
        self.count += timer.count;
        merge_root_timers(&timer.child_timers, &mut self.child_timers);
    }

    pub fn to_proto(&self) -> Timer {
        Timer {
            name: self.name.clone(),
            extended: self.extended,
            total_nanos: self.total_nanos,
            count: self.count,
            child_timers: self.child_timers.iter().map(MutableTimer::to_proto).collect(),
        }
    }
}

/// Merge a decoded timer list into the accumulated roots
pub fn merge_root_timers(to_be_merged: &[Timer], roots: &mut Vec<MutableTimer>) {
    for timer in to_be_merged {
        match roots
            .iter_mut()
            .find(|root| root.name == timer.name && root.extended == timer.extended)
        {
            Some(root) => root.merge(timer),
            None => roots.push(MutableTimer::from_proto(timer)),
        }
    }
}

/// Accumulated roots back to wire form for the rollup write
pub fn to_proto(roots: &[MutableTimer]) -> Vec<Timer> {
    roots.iter().map(MutableTimer::to_proto).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(name: &str, total_nanos: f64, count: i64, children: Vec<Timer>) -> Timer {
        Timer {
            name: name.to_string(),
            extended: false,
            total_nanos,
            count,
            child_timers: children,
        }
    }

    #[test]
    fn test_merge_sums_matching_nodes_recursively() {
        let mut roots = Vec::new();
        merge_root_timers(
            &[timer("http", 1_000.0, 2, vec![timer("jdbc", 400.0, 1, vec![])])],
            &mut roots,
        );
        merge_root_timers(
            &[timer("http", 500.0, 1, vec![timer("jdbc", 100.0, 1, vec![])])],
            &mut roots,
        );
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].total_nanos, 1_500.0);
        assert_eq!(roots[0].count, 3);
        assert_eq!(roots[0].child_timers[0].total_nanos, 500.0);
        assert_eq!(roots[0].child_timers[0].count, 2);
    }

    #[test]
    fn test_extended_flag_separates_nodes() {
        let mut roots = Vec::new();
        let mut extended = timer("http", 100.0, 1, vec![]);
        extended.extended = true;
        merge_root_timers(&[timer("http", 100.0, 1, vec![])], &mut roots);
        merge_root_timers(&[extended], &mut roots);
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = timer("a", 10.0, 1, vec![timer("x", 5.0, 1, vec![])]);
        let b = timer("b", 20.0, 2, vec![]);
        let mut left = Vec::new();
        merge_root_timers(std::slice::from_ref(&a), &mut left);
        merge_root_timers(std::slice::from_ref(&b), &mut left);
        let mut right = Vec::new();
        merge_root_timers(std::slice::from_ref(&b), &mut right);
        merge_root_timers(std::slice::from_ref(&a), &mut right);
        let mut left_proto = to_proto(&left);
        let mut right_proto = to_proto(&right);
        left_proto.sort_by(|x, y| x.name.cmp(&y.name));
        right_proto.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(left_proto, right_proto);
    }
}
