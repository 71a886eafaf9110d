use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::BrokerError;
use crate::record::TopicPartition;
use crate::topic::TopicRegistry;

#[derive(Debug, Default)]
struct MemberState {
    subscription: BTreeSet<String>,
    assignment: BTreeSet<TopicPartition>,
}

#[derive(Debug, Default)]
struct GroupState {
    generation: u64,
    /// Keyed by member ID; iteration order is the assignment order.
    members: BTreeMap<String, MemberState>,
    /// Next offset to read, per partition.
    committed: BTreeMap<TopicPartition, u64>,
}

impl GroupState {
    fn member(&self, group: &str, member: &str) -> Result<&MemberState, BrokerError> {
        self.members
            .get(member)
            .ok_or_else(|| BrokerError::MemberNotFound {
                group: group.to_string(),
                member: member.to_string(),
            })
    }
}

/// Read-only view of a consumer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSnapshot {
    pub group: String,
    pub generation: u64,
    pub members: Vec<MemberSnapshot>,
    pub committed: Vec<CommittedOffset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSnapshot {
    pub member_id: String,
    pub subscription: Vec<String>,
    pub assignment: Vec<TopicPartition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedOffset {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

/// Tracks consumer group membership, partition assignment and committed offsets.
///
/// All state sits behind a single mutex: a rebalance revokes and reassigns
/// every partition of the group in one critical section, so `poll` and
/// `commit` never observe a half-applied assignment.
#[derive(Debug)]
pub struct GroupCoordinator {
    registry: Arc<TopicRegistry>,
    groups: Mutex<HashMap<String, GroupState>>,
}

impl GroupCoordinator {
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self {
            registry,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Add `member` to `group` (creating the group if needed) with the given
    /// topic subscription, then rebalance. Joining again replaces the
    /// member's subscription.
    ///
    /// Returns the member's assignment after the rebalance.
    pub fn join(
        &self,
        group: &str,
        member: &str,
        topics: &[String],
    ) -> Result<Vec<TopicPartition>, BrokerError> {
        for topic in topics {
            self.registry.get_topic(topic)?;
        }

        let mut groups = self.lock();
        let state = groups.entry(group.to_string()).or_insert_with(|| {
            tracing::info!(group = %group, "created consumer group");
            GroupState::default()
        });
        state.members.entry(member.to_string()).or_default().subscription =
            topics.iter().cloned().collect();
        tracing::info!(group = %group, member = %member, topics = ?topics, "member joined");

        self.rebalance(group, state);
        Ok(state.member(group, member)?.assignment.iter().cloned().collect())
    }

    /// Remove `member` from `group` and rebalance the remaining members.
    ///
    /// The group and its committed offsets outlive its last member.
    pub fn leave(&self, group: &str, member: &str) -> Result<(), BrokerError> {
        let mut groups = self.lock();
        let state = groups
            .get_mut(group)
            .ok_or_else(|| BrokerError::GroupNotFound(group.to_string()))?;
        if state.members.remove(member).is_none() {
            return Err(BrokerError::MemberNotFound {
                group: group.to_string(),
                member: member.to_string(),
            });
        }
        tracing::info!(group = %group, member = %member, "member left");

        self.rebalance(group, state);
        Ok(())
    }

    /// Record `offset` as the next offset `group` will read from `tp`.
    ///
    /// Committed offsets never move backwards and never pass the log end.
    pub fn commit(&self, group: &str, tp: &TopicPartition, offset: u64) -> Result<(), BrokerError> {
        let topic = self.registry.get_topic(&tp.topic)?;

        let mut groups = self.lock();
        let state = groups
            .get_mut(group)
            .ok_or_else(|| BrokerError::GroupNotFound(group.to_string()))?;

        let end = topic.end_offset(tp.partition)?;
        let committed = state.committed.get(tp).copied().unwrap_or(0);
        if offset < committed {
            return Err(BrokerError::OffsetRegression {
                group: group.to_string(),
                topic: tp.topic.clone(),
                partition: tp.partition,
                offset,
                committed,
            });
        }
        if offset > end {
            return Err(BrokerError::OffsetBeyondLogEnd {
                group: group.to_string(),
                topic: tp.topic.clone(),
                partition: tp.partition,
                offset,
                end,
            });
        }

        state.committed.insert(tp.clone(), offset);
        tracing::debug!(group = %group, topic = %tp.topic, partition = tp.partition, offset, "committed offset");
        Ok(())
    }

    /// Committed offset of `group` for `tp`, 0 if never committed.
    pub fn committed(&self, group: &str, tp: &TopicPartition) -> Result<u64, BrokerError> {
        let groups = self.lock();
        let state = groups
            .get(group)
            .ok_or_else(|| BrokerError::GroupNotFound(group.to_string()))?;
        Ok(state.committed.get(tp).copied().unwrap_or(0))
    }

    /// Partitions currently assigned to `member`, sorted.
    pub fn assignment(&self, group: &str, member: &str) -> Result<Vec<TopicPartition>, BrokerError> {
        let groups = self.lock();
        let state = groups
            .get(group)
            .ok_or_else(|| BrokerError::GroupNotFound(group.to_string()))?;
        Ok(state.member(group, member)?.assignment.iter().cloned().collect())
    }

    /// Assignment of `member` paired with the committed offset of each
    /// partition, read atomically with respect to rebalances.
    pub(crate) fn positions(
        &self,
        group: &str,
        member: &str,
    ) -> Result<Vec<(TopicPartition, u64)>, BrokerError> {
        let groups = self.lock();
        let state = groups
            .get(group)
            .ok_or_else(|| BrokerError::GroupNotFound(group.to_string()))?;
        let member_state = state.member(group, member)?;
        Ok(member_state
            .assignment
            .iter()
            .map(|tp| (tp.clone(), state.committed.get(tp).copied().unwrap_or(0)))
            .collect())
    }

    pub fn describe(&self, group: &str) -> Result<GroupSnapshot, BrokerError> {
        let groups = self.lock();
        let state = groups
            .get(group)
            .ok_or_else(|| BrokerError::GroupNotFound(group.to_string()))?;
        Ok(GroupSnapshot {
            group: group.to_string(),
            generation: state.generation,
            members: state
                .members
                .iter()
                .map(|(id, m)| MemberSnapshot {
                    member_id: id.clone(),
                    subscription: m.subscription.iter().cloned().collect(),
                    assignment: m.assignment.iter().cloned().collect(),
                })
                .collect(),
            committed: state
                .committed
                .iter()
                .map(|(tp, offset)| CommittedOffset {
                    topic: tp.topic.clone(),
                    partition: tp.partition,
                    offset: *offset,
                })
                .collect(),
        })
    }

    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop-the-world rebalance: revoke everything, then deal partitions
    /// (sorted by topic and index) round-robin over members sorted by ID,
    /// skipping members that are not subscribed to the partition's topic.
    fn rebalance(&self, group: &str, state: &mut GroupState) {
        for member in state.members.values_mut() {
            member.assignment.clear();
        }

        let topics: BTreeSet<String> = state
            .members
            .values()
            .flat_map(|m| m.subscription.iter().cloned())
            .collect();
        let partitions: Vec<TopicPartition> = topics
            .iter()
            .filter_map(|name| self.registry.get(name))
            .flat_map(|topic| {
                let name = topic.name().to_string();
                (0..topic.partition_count()).map(move |p| TopicPartition::new(name.clone(), p))
            })
            .collect();

        let member_ids: Vec<String> = state.members.keys().cloned().collect();
        let mut cursor = 0usize;
        for tp in &partitions {
            let owner = (0..member_ids.len())
                .map(|step| (cursor + step) % member_ids.len())
                .find(|&idx| state.members[&member_ids[idx]].subscription.contains(&tp.topic));
            if let Some(idx) = owner {
                if let Some(member) = state.members.get_mut(&member_ids[idx]) {
                    member.assignment.insert(tp.clone());
                }
                cursor = idx + 1;
            }
        }

        state.generation += 1;
        tracing::info!(
            group = %group,
            generation = state.generation,
            members = member_ids.len(),
            partitions = partitions.len(),
            "rebalanced consumer group"
        );
        for (id, member) in &state.members {
            tracing::debug!(group = %group, member = %id, assignment = ?member.assignment, "assigned partitions");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, GroupState>> {
        match self.groups.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("group coordinator lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn setup(topics: &[(&str, u32)]) -> GroupCoordinator {
        let registry = Arc::new(TopicRegistry::new());
        for (name, partitions) in topics {
            registry.create_topic(name, *partitions).unwrap();
        }
        GroupCoordinator::new(registry)
    }

    fn subs(topics: &[&str]) -> Vec<String> {
        topics.iter().map(|t| t.to_string()).collect()
    }

    fn all_assigned(coordinator: &GroupCoordinator, group: &str) -> Vec<TopicPartition> {
        let snapshot = coordinator.describe(group).unwrap();
        snapshot
            .members
            .into_iter()
            .flat_map(|m| m.assignment)
            .collect()
    }

    #[test]
    fn single_member_gets_every_partition() {
        let coordinator = setup(&[("greetings", 3)]);
        let assignment = coordinator
            .join("messenger-group", "m-0", &subs(&["greetings"]))
            .unwrap();
        assert_eq!(
            assignment,
            (0..3).map(|p| TopicPartition::new("greetings", p)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn partitions_are_dealt_round_robin_over_sorted_members() {
        let coordinator = setup(&[("t", 4)]);
        coordinator.join("g", "b", &subs(&["t"])).unwrap();
        coordinator.join("g", "a", &subs(&["t"])).unwrap();

        assert_eq!(
            coordinator.assignment("g", "a").unwrap(),
            vec![TopicPartition::new("t", 0), TopicPartition::new("t", 2)]
        );
        assert_eq!(
            coordinator.assignment("g", "b").unwrap(),
            vec![TopicPartition::new("t", 1), TopicPartition::new("t", 3)]
        );
    }

    #[test]
    fn assignment_is_reproducible_regardless_of_join_order() {
        let first = setup(&[("t", 5), ("u", 2)]);
        let second = setup(&[("t", 5), ("u", 2)]);
        for m in ["m1", "m2", "m3"] {
            first.join("g", m, &subs(&["t", "u"])).unwrap();
        }
        for m in ["m3", "m1", "m2"] {
            second.join("g", m, &subs(&["t", "u"])).unwrap();
        }
        for m in ["m1", "m2", "m3"] {
            assert_eq!(
                first.assignment("g", m).unwrap(),
                second.assignment("g", m).unwrap()
            );
        }
    }

    #[test]
    fn rebalance_covers_every_partition_exactly_once() {
        for members in 1..6 {
            for partitions in 1..8 {
                let coordinator = setup(&[("t", partitions), ("u", 3)]);
                for m in 0..members {
                    coordinator
                        .join("g", &format!("m{m}"), &subs(&["t", "u"]))
                        .unwrap();
                }

                let mut assigned = all_assigned(&coordinator, "g");
                let total = assigned.len();
                assigned.sort();
                assigned.dedup();
                assert_eq!(assigned.len(), total, "partition assigned twice");

                let mut expected: Vec<TopicPartition> = (0..partitions)
                    .map(|p| TopicPartition::new("t", p))
                    .chain((0..3).map(|p| TopicPartition::new("u", p)))
                    .collect();
                expected.sort();
                assert_eq!(assigned, expected);
            }
        }
    }

    #[test]
    fn concurrent_rebalances_never_expose_a_partial_assignment() {
        let coordinator = Arc::new(setup(&[("t", 6), ("u", 3)]));
        coordinator.join("g", "anchor", &subs(&["t", "u"])).unwrap();
        let mut expected: Vec<TopicPartition> = (0..6)
            .map(|p| TopicPartition::new("t", p))
            .chain((0..3).map(|p| TopicPartition::new("u", p)))
            .collect();
        expected.sort();

        let churners: Vec<_> = (0..4)
            .map(|w| {
                let coordinator = coordinator.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let member = format!("w{w}-{}", i % 3);
                        coordinator.join("g", &member, &subs(&["t", "u"])).unwrap();
                        if i % 2 == 1 {
                            coordinator.leave("g", &member).unwrap();
                        }
                    }
                })
            })
            .collect();

        let observers: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = coordinator.clone();
                let expected = expected.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = coordinator.describe("g").unwrap();
                        let mut assigned: Vec<TopicPartition> = snapshot
                            .members
                            .into_iter()
                            .flat_map(|m| m.assignment)
                            .collect();
                        let total = assigned.len();
                        assigned.sort();
                        assigned.dedup();
                        assert_eq!(
                            assigned.len(),
                            total,
                            "partition assigned twice in generation {}",
                            snapshot.generation
                        );
                        assert_eq!(assigned, expected);

                        let anchor = coordinator.assignment("g", "anchor").unwrap();
                        assert!(anchor.iter().all(|tp| expected.contains(tp)));
                    }
                })
            })
            .collect();

        for h in churners.into_iter().chain(observers) {
            h.join().unwrap();
        }

        let mut assigned = all_assigned(&coordinator, "g");
        assigned.sort();
        assert_eq!(assigned, expected);
    }

    #[test]
    fn only_subscribers_receive_a_topic() {
        let coordinator = setup(&[("t", 2), ("u", 2)]);
        coordinator.join("g", "a", &subs(&["t"])).unwrap();
        coordinator.join("g", "b", &subs(&["t", "u"])).unwrap();

        let a = coordinator.assignment("g", "a").unwrap();
        let b = coordinator.assignment("g", "b").unwrap();
        assert!(a.iter().all(|tp| tp.topic == "t"));
        assert!(b.contains(&TopicPartition::new("u", 0)));
        assert!(b.contains(&TopicPartition::new("u", 1)));
        assert_eq!(a.len() + b.len(), 4);
    }

    #[test]
    fn leaving_hands_partitions_to_the_rest() {
        let coordinator = setup(&[("t", 4)]);
        coordinator.join("g", "a", &subs(&["t"])).unwrap();
        coordinator.join("g", "b", &subs(&["t"])).unwrap();
        let generation = coordinator.describe("g").unwrap().generation;

        coordinator.leave("g", "a").unwrap();
        assert_eq!(coordinator.assignment("g", "b").unwrap().len(), 4);
        assert_eq!(coordinator.describe("g").unwrap().generation, generation + 1);

        let err = coordinator.assignment("g", "a").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = coordinator.leave("g", "a").unwrap_err();
        assert!(matches!(err, BrokerError::MemberNotFound { .. }));
    }

    #[test]
    fn join_requires_existing_topics() {
        let coordinator = setup(&[]);
        let err = coordinator.join("g", "a", &subs(&["missing"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(coordinator.group_names().is_empty());
    }

    #[test]
    fn commit_never_regresses_or_passes_log_end() {
        let coordinator = setup(&[("t", 1)]);
        let tp = TopicPartition::new("t", 0);
        for i in 0..3 {
            coordinator.registry.append("t", 0, None, format!("{i}")).unwrap();
        }
        coordinator.join("g", "a", &subs(&["t"])).unwrap();

        assert_eq!(coordinator.committed("g", &tp).unwrap(), 0);
        coordinator.commit("g", &tp, 2).unwrap();
        coordinator.commit("g", &tp, 2).unwrap();

        let err = coordinator.commit("g", &tp, 1).unwrap_err();
        assert!(matches!(err, BrokerError::OffsetRegression { committed: 2, .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = coordinator.commit("g", &tp, 4).unwrap_err();
        assert!(matches!(err, BrokerError::OffsetBeyondLogEnd { end: 3, .. }));

        coordinator.commit("g", &tp, 3).unwrap();
        assert_eq!(coordinator.committed("g", &tp).unwrap(), 3);
    }

    #[test]
    fn commit_validates_group_and_partition() {
        let coordinator = setup(&[("t", 1)]);
        let err = coordinator
            .commit("nope", &TopicPartition::new("t", 0), 0)
            .unwrap_err();
        assert!(matches!(err, BrokerError::GroupNotFound(_)));

        coordinator.join("g", "a", &subs(&["t"])).unwrap();
        let err = coordinator
            .commit("g", &TopicPartition::new("t", 5), 0)
            .unwrap_err();
        assert!(matches!(err, BrokerError::PartitionOutOfRange { .. }));
        let err = coordinator
            .commit("g", &TopicPartition::new("missing", 0), 0)
            .unwrap_err();
        assert!(matches!(err, BrokerError::TopicNotFound(_)));
    }

    #[test]
    fn offsets_survive_the_last_member_leaving() {
        let coordinator = setup(&[("t", 1)]);
        let tp = TopicPartition::new("t", 0);
        coordinator.registry.append("t", 0, None, "x".into()).unwrap();
        coordinator.join("g", "a", &subs(&["t"])).unwrap();
        coordinator.commit("g", &tp, 1).unwrap();
        coordinator.leave("g", "a").unwrap();

        coordinator.join("g", "b", &subs(&["t"])).unwrap();
        assert_eq!(coordinator.committed("g", &tp).unwrap(), 1);
        let snapshot = coordinator.describe("g").unwrap();
        assert_eq!(
            snapshot.committed,
            vec![CommittedOffset {
                topic: "t".into(),
                partition: 0,
                offset: 1,
            }]
        );
    }
}
