//! Store scenarios across entity families.

use ledgerkey_core::{
    compare, equals, hash_shared, AuditAction, CompareError, Record, Revision, UpdateError,
};
use ledgerkey_testkit::prelude::*;
use std::thread;

fn hosts_in_cluster_a() -> (ledgerkey_core::MemoryStore<Cluster>, ledgerkey_core::MemoryStore<HostNode>) {
    init_tracing();
    let clusters = cluster_store();
    clusters.create(Cluster::new("clusterA")).unwrap();
    let hosts = host_store(&clusters);
    (clusters, hosts)
}

#[test]
fn create_update_conflict_delete() {
    let (_clusters, hosts) = hosts_in_cluster_a();
    let key = HostNode::new("clusterA", "nodeX").primary_key().unwrap();

    let created = hosts
        .create(HostNode::new("clusterA", "nodeX").with_description("rack 1"))
        .unwrap();
    assert_eq!(created.revision(), Revision::new(1));
    let history = hosts.list_history_for_key(&key).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action(), AuditAction::Create);

    let updated = hosts
        .update(
            HostNode::new("clusterA", "nodeX").with_description("rack 2"),
            Revision::new(1),
        )
        .unwrap();
    assert_eq!(updated.revision(), Revision::new(2));
    let history = hosts.list_history_for_key(&key).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action(), AuditAction::Update);
    assert_eq!(
        history[1].snapshot().record().description.as_deref(),
        Some("rack 2")
    );

    let stale = hosts.update(
        HostNode::new("clusterA", "nodeX").with_description("rack 3"),
        Revision::new(1),
    );
    assert!(matches!(stale, Err(UpdateError::ConcurrencyConflict(_))));
    assert_eq!(
        hosts.find(&key).unwrap().unwrap().revision(),
        Revision::new(2)
    );

    hosts.delete(&key).unwrap();
    assert!(hosts.find(&key).unwrap().is_none());
    let history = hosts.list_history_for_key(&key).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].action(), AuditAction::Delete);
}

#[test]
fn racing_writers_with_the_same_revision() {
    let (_clusters, hosts) = hosts_in_cluster_a();
    hosts.create(HostNode::new("clusterA", "nodeX")).unwrap();

    let outcomes: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let hosts = hosts.clone();
                s.spawn(move || {
                    hosts.update(
                        HostNode::new("clusterA", "nodeX").with_description(&format!("writer {i}")),
                        Revision::INITIAL,
                    )
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = outcomes.iter().filter(|o| o.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|o| matches!(o, Err(UpdateError::ConcurrencyConflict(_))))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(hosts.list_history().unwrap().len(), 2);
}

#[test]
fn index_keys_equal_their_entity() {
    let (_clusters, hosts) = hosts_in_cluster_a();
    let entity = hosts
        .create(
            HostNode::new("clusterA", "nodeX")
                .with_description("rack")
                .with_rank(3),
        )
        .unwrap();

    for index in HOST_NODE.indexes {
        let key = entity.index_key(index.name).unwrap();
        assert!(equals(&entity, &key).unwrap(), "{}", index.name);
        let (a, b) = hash_shared(&entity, &key).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn unrelated_indexes_do_not_compare() {
    init_tracing();
    let countries = standalone_store::<IsoCtry>();
    let country = countries
        .create(IsoCtry::new(840, "US", "United States"))
        .unwrap();

    let by_code = country.index_key("IsoCodeIdx").unwrap();
    let by_name = country.index_key("NameIdx").unwrap();
    assert!(matches!(
        equals(&by_code, &by_name),
        Err(CompareError::UnsupportedComparison { .. })
    ));
    assert!(matches!(
        compare(&by_code, &by_name),
        Err(CompareError::UnsupportedComparison { .. })
    ));
}

#[test]
fn unique_lookup_by_index() {
    let (_clusters, hosts) = hosts_in_cluster_a();
    hosts
        .create(HostNode::new("clusterA", "nodeX").with_description("rack"))
        .unwrap();
    hosts.create(HostNode::new("clusterA", "nodeY")).unwrap();

    let lookup = HostNode::new("clusterA", "any").with_description("rack");
    let found = hosts
        .find_by_index(&lookup.index_key("DescIdx").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(found.record().host_name.as_deref(), Some("nodeX"));

    let in_cluster = hosts
        .list_by_index(&lookup.index_key("ClusterIdx").unwrap())
        .unwrap();
    assert_eq!(in_cluster.len(), 2);
}

#[test]
fn deleting_the_owner_blocks_new_references() {
    let (clusters, hosts) = hosts_in_cluster_a();
    hosts.create(HostNode::new("clusterA", "nodeX")).unwrap();

    clusters
        .delete(&Cluster::new("clusterA").primary_key().unwrap())
        .unwrap();
    assert!(hosts.create(HostNode::new("clusterA", "nodeY")).is_err());
}
