//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records and mutation sequences that
//! stay within the fixture schemas' bounds.

use crate::fixtures::HostNode;
use proptest::prelude::*;

/// Strategy for generating valid host names.
pub fn host_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating cluster names.
pub fn cluster_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["clusterA", "clusterB", "clusterC"]).prop_map(str::to_string)
}

/// Strategy for generating optional descriptions within the 50 character
/// bound.
pub fn description_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::string::string_regex("[a-zA-Z0-9 ]{0,50}").expect("Invalid regex"))
}

/// Strategy for generating optional ranks within bounds.
pub fn rank_strategy() -> impl Strategy<Value = Option<i32>> {
    prop::option::of(0..=1_000i32)
}

/// Strategy for generating valid host records.
pub fn host_strategy() -> impl Strategy<Value = HostNode> {
    (
        cluster_name_strategy(),
        host_name_strategy(),
        description_strategy(),
        rank_strategy(),
    )
        .prop_map(|(cluster, host, description, rank)| {
            let mut node = HostNode::new(&cluster, &host);
            node.description = description;
            node.rank = rank;
            node
        })
}

/// A mutation applied to one fixed key.
#[derive(Debug, Clone)]
pub enum MutationOp {
    /// Create the entity (a no-op while it is live).
    Create {
        /// Description to create with.
        description: Option<String>,
    },
    /// Update the description at the current revision.
    Update {
        /// New description.
        description: Option<String>,
    },
    /// Delete the entity.
    Delete,
}

/// Strategy for generating mutations.
pub fn mutation_strategy() -> impl Strategy<Value = MutationOp> {
    prop_oneof![
        2 => description_strategy().prop_map(|description| MutationOp::Create { description }),
        3 => description_strategy().prop_map(|description| MutationOp::Update { description }),
        1 => Just(MutationOp::Delete),
    ]
}

/// Strategy for generating a sequence of mutations.
pub fn mutation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<MutationOp>> {
    prop::collection::vec(mutation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerkey_core::Record;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_hosts_validate(host in host_strategy()) {
            prop_assert!(host.validate().is_ok());
        }

        #[test]
        fn sequences_respect_bounds(ops in mutation_sequence_strategy(1, 8)) {
            prop_assert!(!ops.is_empty());
            prop_assert!(ops.len() < 8);
        }
    }
}
