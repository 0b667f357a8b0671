use logspell::registry::{Assignment, ClusterRegistry, RegistryError};

fn seq(s: &str) -> Vec<String> {
    s.split_whitespace().map(String::from).collect()
}

const HDFS: [&str; 6] = [
    "Receiving block blk_-1608999687919862906 src /10.250.19.102 54106 dest /10.250.19.102 50010",
    "Receiving block blk_-1608999687919862906 src /10.250.10.6 40524 dest /10.250.10.6 50010",
    "PacketResponder 1 for block blk_38865049064139660 terminating",
    "PacketResponder 0 for block blk_-6952295868487656571 terminating",
    "BLOCK* NameSystem.allocateBlock /mnt/hadoop/mapred/system/job_200811092030_0001/job.jar blk_-1608999687919862906",
    "PacketResponder 2 for block blk_8229193803249955061 terminating",
];

fn mined() -> ClusterRegistry {
    let mut reg = ClusterRegistry::new(0.5, 1).unwrap();
    for (i, line) in HDFS.iter().enumerate() {
        reg.process(i as u64 + 1, &seq(line)).unwrap();
    }
    reg
}

#[test]
fn test_hdfs_lines_cluster_into_three_templates() {
    let reg = mined();
    assert_eq!(reg.len(), 3);
    let rendered: Vec<String> = reg.clusters().iter().map(|c| c.template.render()).collect();
    assert_eq!(
        rendered,
        vec![
            "Receiving block blk_-1608999687919862906 src <*> <*> dest <*> 50010".to_string(),
            "PacketResponder <*> for block <*> terminating".to_string(),
            "BLOCK* NameSystem.allocateBlock /mnt/hadoop/mapred/system/job_200811092030_0001/job.jar blk_-1608999687919862906".to_string(),
        ]
    );
    assert_eq!(reg.clusters()[0].line_ids, vec![1, 2]);
    assert_eq!(reg.clusters()[1].line_ids, vec![3, 4, 6]);
    assert_eq!(reg.clusters()[2].line_ids, vec![5]);
    assert_eq!(reg.max_line_id(), 6);
    reg.verify().unwrap();
}

#[test]
fn test_process_reports_assignment_kind() {
    let mut reg = ClusterRegistry::new(0.5, 1).unwrap();
    assert_eq!(reg.process(1, &seq(HDFS[2])).unwrap(), Assignment::Created(0));
    assert_eq!(
        reg.process(2, &seq(HDFS[3])).unwrap(),
        Assignment::Matched { id: 0, generalized: true }
    );
    assert_eq!(
        reg.process(3, &seq(HDFS[5])).unwrap(),
        Assignment::Matched { id: 0, generalized: false }
    );
}

#[test]
fn test_line_id_collision_is_rejected_without_side_effects() {
    let mut reg = mined();
    let before = reg.clusters().to_vec();
    let err = reg.process(6, &seq("anything new")).unwrap_err();
    assert_eq!(err, RegistryError::LineIdCollision { line_id: 6, max_assigned: 6 });
    assert!(reg.process(3, &seq(HDFS[0])).is_err());
    assert_eq!(reg.clusters(), &before[..]);
    assert!(reg.process(7, &seq("anything new")).is_ok());
}

#[test]
fn test_invalid_tau_is_rejected() {
    assert!(matches!(ClusterRegistry::new(0.0, 1), Err(RegistryError::InvalidTau(_))));
    assert!(matches!(ClusterRegistry::new(1.01, 1), Err(RegistryError::InvalidTau(_))));
    assert!(ClusterRegistry::new(1.0, 1).is_ok());
}

#[test]
fn test_find_match_does_not_mutate() {
    let reg = mined();
    assert_eq!(reg.find_match(&seq("PacketResponder 9 for block blk_1 terminating")), Some(1));
    assert_eq!(reg.find_match(&seq("Just A Test")), None);
    assert_eq!(reg.max_line_id(), 6);
}

#[test]
fn test_different_lengths_never_share_a_cluster() {
    let mut reg = ClusterRegistry::new(0.5, 1).unwrap();
    reg.process(1, &seq("connection closed by peer")).unwrap();
    reg.process(2, &seq("connection closed by remote peer")).unwrap();
    assert_eq!(reg.len(), 2);
}

#[test]
fn test_empty_sequence_forms_its_own_cluster() {
    let mut reg = ClusterRegistry::new(0.5, 1).unwrap();
    assert_eq!(reg.process(1, &[]).unwrap(), Assignment::Created(0));
    assert_eq!(reg.process(2, &[]).unwrap(), Assignment::Matched { id: 0, generalized: false });
    assert!(reg.clusters()[0].template.is_empty());
}

#[test]
fn test_from_parts_recomputes_max_and_verifies() {
    let reg = mined();
    let rebuilt = ClusterRegistry::from_parts(reg.clusters().to_vec(), reg.trie().clone(), 0.5).unwrap();
    assert_eq!(rebuilt.max_line_id(), 6);

    let mut clusters = reg.clusters().to_vec();
    clusters[1].line_ids.push(1);
    let err = ClusterRegistry::from_parts(clusters, reg.trie().clone(), 0.5).unwrap_err();
    assert!(matches!(err, RegistryError::Inconsistent(_)));

    let stale = logspell::trie::TrieIndex::new(1);
    assert!(ClusterRegistry::from_parts(reg.clusters().to_vec(), stale, 0.5).is_err());
}

#[test]
fn test_shifted_alignment_does_not_split_same_shape_lines() {
    let mut reg = ClusterRegistry::new(0.5, 1).unwrap();
    reg.process(1, &seq("Connection from host1 closed")).unwrap();
    reg.process(2, &seq("Connection closed from host2")).unwrap();
    reg.process(3, &seq("Connection from host3 closed")).unwrap();

    assert_eq!(reg.len(), 1);
    assert_eq!(reg.clusters()[0].line_ids, vec![1, 2, 3]);
    reg.verify().unwrap();
}
