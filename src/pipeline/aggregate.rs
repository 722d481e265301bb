use crate::config::SelfLoopPolicy;
use crate::core::ids::{NodeId, NodeRegistry};
use crate::core::records::{FollowEdge, MessageEvent};
use crate::error::ImportError;
use std::collections::HashMap;
use tracing::debug;

/// Folds message events into per-direction pair counts.
pub struct Aggregator {
    policy: SelfLoopPolicy,
    registry: NodeRegistry,
    pair_counts: HashMap<(NodeId, NodeId), u64>,
    events: u64,
    dropped_self_loops: u64,
}

impl Aggregator {
    pub fn new(policy: SelfLoopPolicy) -> Self {
        Self {
            policy,
            registry: NodeRegistry::new(),
            pair_counts: HashMap::new(),
            events: 0,
            dropped_self_loops: 0,
        }
    }

    pub fn add(&mut self, event: &MessageEvent) {
        if event.is_self_loop() && self.policy == SelfLoopPolicy::Drop {
            self.dropped_self_loops += 1;
            return;
        }
        let src = self.registry.get_or_insert(&event.source_id);
        let dst = self.registry.get_or_insert(&event.target_id);
        *self.pair_counts.entry((src, dst)).or_insert(0) += 1;
        self.events += 1;
    }

    /// Drains `events`, stopping at the first error.
    pub fn consume<I>(mut self, events: I) -> Result<Aggregation, ImportError>
    where
        I: IntoIterator<Item = Result<MessageEvent, ImportError>>,
    {
        for event in events {
            self.add(&event?);
        }
        Ok(self.finish())
    }

    pub fn finish(self) -> Aggregation {
        debug!(
            events = self.events,
            users = self.registry.len(),
            pairs = self.pair_counts.len(),
            dropped_self_loops = self.dropped_self_loops,
            "aggregated message events"
        );
        Aggregation {
            registry: self.registry,
            pair_counts: self.pair_counts,
            events: self.events,
            dropped_self_loops: self.dropped_self_loops,
        }
    }
}

pub struct Aggregation {
    registry: NodeRegistry,
    pair_counts: HashMap<(NodeId, NodeId), u64>,
    events: u64,
    dropped_self_loops: u64,
}

impl Aggregation {
    /// Messages sent from `source` to `target`, ignoring the other direction.
    pub fn message_count(&self, source: &str, target: &str) -> u64 {
        match (self.registry.get(source), self.registry.get(target)) {
            (Some(src), Some(dst)) => self.pair_counts.get(&(src, dst)).copied().unwrap_or(0),
            _ => 0,
        }
    }

    /// Every identifier seen as source or target, in first-seen order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.registry.iter()
    }

    pub fn event_count(&self) -> u64 {
        self.events
    }

    pub fn observed_pair_count(&self) -> usize {
        self.pair_counts.len()
    }

    pub fn dropped_self_loops(&self) -> u64 {
        self.dropped_self_loops
    }

    /// Bidirectional follow set: each observed pair plus its reverse.
    ///
    /// Sorted by `(source, target)` so staging output is reproducible.
    pub fn follow_edges(&self) -> Vec<FollowEdge> {
        let mut edges = Vec::with_capacity(self.pair_counts.len() * 2);
        for (&(src, dst), &count) in &self.pair_counts {
            edges.push(self.edge(src, dst, count));
            if !self.pair_counts.contains_key(&(dst, src)) {
                edges.push(self.edge(dst, src, 0));
            }
        }
        edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        edges
    }

    fn edge(&self, src: NodeId, dst: NodeId, message_count: u64) -> FollowEdge {
        FollowEdge {
            source: self.registry.external_id(src).to_string(),
            target: self.registry.external_id(dst).to_string(),
            message_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(lines: &[(&str, &str, u64)]) -> Vec<Result<MessageEvent, ImportError>> {
        lines
            .iter()
            .map(|(s, d, t)| Ok(MessageEvent::new(*s, *d, *t).unwrap()))
            .collect()
    }

    fn aggregate(lines: &[(&str, &str, u64)]) -> Aggregation {
        Aggregator::new(SelfLoopPolicy::Keep)
            .consume(events(lines))
            .unwrap()
    }

    #[test]
    fn test_counts_are_per_direction() {
        let agg = aggregate(&[("1", "2", 100), ("2", "1", 150), ("1", "2", 200)]);

        assert_eq!(2, agg.message_count("1", "2"));
        assert_eq!(1, agg.message_count("2", "1"));
        assert_eq!(3, agg.event_count());
        assert_eq!(2, agg.observed_pair_count());
    }

    #[test]
    fn test_identifiers_in_discovery_order() {
        let agg = aggregate(&[("9", "3", 1), ("3", "5", 2), ("5", "9", 3)]);
        assert_eq!(vec!["9", "3", "5"], agg.identifiers().collect::<Vec<_>>());
    }

    #[test]
    fn test_follow_edges_are_bidirectional() {
        let agg = aggregate(&[("1", "2", 100), ("2", "1", 150), ("1", "2", 200), ("3", "1", 5)]);

        assert_eq!(
            vec![
                FollowEdge::new("1", "2", 2).unwrap(),
                FollowEdge::new("1", "3", 0).unwrap(),
                FollowEdge::new("2", "1", 1).unwrap(),
                FollowEdge::new("3", "1", 1).unwrap(),
            ],
            agg.follow_edges()
        );
    }

    #[test]
    fn test_every_event_has_an_observed_edge() {
        let input = [("a", "b", 1), ("b", "c", 2), ("c", "a", 3), ("a", "b", 4)];
        let agg = aggregate(&input);
        let edges = agg.follow_edges();

        for (s, d, _) in input {
            let edge = edges
                .iter()
                .find(|e| e.source == s && e.target == d)
                .unwrap();
            assert!(edge.message_count >= 1);
        }
    }

    #[test]
    fn test_self_loops_kept_by_default() {
        let agg = aggregate(&[("4", "4", 1), ("4", "4", 2)]);
        assert_eq!(2, agg.message_count("4", "4"));
        assert_eq!(vec![FollowEdge::new("4", "4", 2).unwrap()], agg.follow_edges());
    }

    #[test]
    fn test_self_loops_dropped_on_request() {
        let agg = Aggregator::new(SelfLoopPolicy::Drop)
            .consume(events(&[("4", "4", 1), ("4", "5", 2), ("6", "6", 3)]))
            .unwrap();

        assert_eq!(0, agg.message_count("4", "4"));
        assert_eq!(2, agg.dropped_self_loops());
        assert_eq!(vec!["4", "5"], agg.identifiers().collect::<Vec<_>>());
    }

    #[test]
    fn test_consume_stops_at_first_error() {
        let mut input = events(&[("1", "2", 1)]);
        input.push(Err(ImportError::Parse {
            line: 2,
            content: "bad".to_string(),
            reason: crate::error::ParseFailure::TokenCount(1),
        }));
        input.extend(events(&[("3", "4", 3)]));

        let result = Aggregator::new(SelfLoopPolicy::Keep).consume(input);
        assert!(matches!(result, Err(ImportError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_unknown_pair_counts_zero() {
        let agg = aggregate(&[("1", "2", 1)]);
        assert_eq!(0, agg.message_count("1", "9"));
        assert_eq!(0, agg.message_count("2", "1"));
    }
}
