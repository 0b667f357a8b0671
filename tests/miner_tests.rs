use logspell::miner::{LogMiner, MinerError, MinerOpts};
use logspell::param_extractor::ParameterList;

const HDFS_FORMAT: &str = "<Date> <Time> <Pid> <Level> <Component>: <Content>";

fn hdfs_lines() -> Vec<String> {
    [
        "081109 203518 143 INFO dfs.DataNode$DataXceiver: Receiving block blk_-1608999687919862906 src: /10.250.19.102:54106 dest: /10.250.19.102:50010",
        "081109 203518 35 INFO dfs.FSNamesystem: BLOCK* NameSystem.allocateBlock: /mnt/hadoop/mapred/system/job_200811092030_0001/job.jar. blk_-1608999687919862906",
        "081109 203519 143 INFO dfs.DataNode$DataXceiver: Receiving block blk_-1608999687919862906 src: /10.250.10.6:40524 dest: /10.250.10.6:50010",
        "081109 203519 145 INFO dfs.DataNode$PacketResponder: PacketResponder 1 for block blk_-1608999687919862906 terminating",
        "081109 203519 145 INFO dfs.DataNode$PacketResponder: PacketResponder 0 for block blk_-1608999687919862906 terminating",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn hdfs_miner() -> LogMiner {
    LogMiner::new(MinerOpts { log_format: Some(HDFS_FORMAT.to_string()), ..MinerOpts::default() }).unwrap()
}

#[test]
fn test_hdfs_batch_assigns_final_templates() {
    let mut miner = hdfs_miner();
    let out = miner.parse_lines(&hdfs_lines()).unwrap();

    assert_eq!(out.lines.len(), 5);
    let ids: Vec<u64> = out.lines.iter().map(|l| l.line_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    // Line 1 was assigned before line 3 generalized its cluster, yet reports the final template.
    let receiving = "Receiving block blk_-1608999687919862906 src <*> <*> dest <*> 50010";
    assert_eq!(out.lines[0].event_template, receiving);
    assert_eq!(out.lines[2].event_template, receiving);
    assert_eq!(out.lines[0].event_id, out.lines[2].event_id);
    assert_eq!(out.lines[0].event_id, logspell::template::event_id(receiving, 8));

    let responder = "PacketResponder <*> for block blk_-1608999687919862906 terminating";
    assert_eq!(out.lines[3].event_template, responder);
    assert_eq!(out.lines[3].parameters, Some(ParameterList::Values(vec!["1".to_string()])));
    assert_eq!(out.lines[4].parameters, Some(ParameterList::Values(vec!["0".to_string()])));

    assert_eq!(out.lines[1].fields[4], "dfs.FSNamesystem");
    assert_eq!(out.lines[1].parameters, Some(ParameterList::empty()));

    assert_eq!(out.events.len(), 3);
    let occurrences: Vec<usize> = out.events.iter().map(|e| e.occurrences).collect();
    assert_eq!(occurrences, vec![2, 1, 2]);
    assert_eq!(out.skipped.total(), 0);
}

#[test]
fn test_skipped_lines_are_counted_and_get_no_id() {
    let mut miner = LogMiner::new(MinerOpts {
        log_format: Some(HDFS_FORMAT.to_string()),
        max_line_len: 200,
        ..MinerOpts::default()
    })
    .unwrap();
    let mut lines = hdfs_lines();
    lines.insert(1, "garbage".to_string());
    lines.push(format!("081109 203519 145 INFO dfs.X: {}", "y ".repeat(150)));

    let out = miner.parse_lines(&lines).unwrap();
    assert_eq!(out.skipped.unmatched, 1);
    assert_eq!(out.skipped.too_long, 1);
    assert_eq!(out.lines.len(), 5);
    assert_eq!(out.lines.last().map(|l| l.line_id), Some(5));
    assert_eq!(miner.registry().max_line_id(), 5);
}

#[test]
fn test_empty_batch_is_not_an_error() {
    let mut miner = hdfs_miner();
    let out = miner.parse_lines(&[]).unwrap();
    assert!(out.is_empty());
    assert!(out.events.is_empty());
    assert!(miner.registry().is_empty());
}

#[test]
fn test_line_ids_continue_across_batches() {
    let mut miner = hdfs_miner();
    let lines = hdfs_lines();
    miner.parse_lines(&lines[..2]).unwrap();
    let out = miner.parse_lines(&lines[2..]).unwrap();
    let ids: Vec<u64> = out.lines.iter().map(|l| l.line_id).collect();
    assert_eq!(ids, vec![3, 4, 5]);
    // Summaries cover every cluster with its total membership, not just this batch.
    assert_eq!(out.events.len(), 3);
    let occurrences: Vec<usize> = out.events.iter().map(|e| e.occurrences).collect();
    assert_eq!(occurrences, vec![2, 1, 2]);
    assert_eq!(out.events, miner.all_events());
}

#[test]
fn test_params_can_be_disabled() {
    let mut miner = LogMiner::new(MinerOpts {
        log_format: Some(HDFS_FORMAT.to_string()),
        keep_params: false,
        ..MinerOpts::default()
    })
    .unwrap();
    let out = miner.parse_lines(&hdfs_lines()).unwrap();
    assert!(out.lines.iter().all(|l| l.parameters.is_none()));
}

#[test]
fn test_non_ascii_is_normalized_by_default() {
    let mut miner = LogMiner::new(MinerOpts::default()).unwrap();
    let out = miner.parse_lines(&["usuario José conectado".to_string()]).unwrap();
    assert_eq!(out.lines[0].event_template, "usuario Jos<NASCII> conectado");

    let mut raw = LogMiner::new(MinerOpts { replace_non_ascii: false, ..MinerOpts::default() }).unwrap();
    let out = raw.parse_lines(&["usuario José conectado".to_string()]).unwrap();
    assert_eq!(out.lines[0].event_template, "usuario José conectado");
}

#[test]
fn test_invalid_configuration_is_rejected() {
    assert!(matches!(
        LogMiner::new(MinerOpts { tau: 0.0, ..MinerOpts::default() }),
        Err(MinerError::Config(_))
    ));
    assert!(matches!(
        LogMiner::new(MinerOpts { log_format: Some("<Date> <Level>".into()), ..MinerOpts::default() }),
        Err(MinerError::Format(_))
    ));
}

#[test]
fn test_custom_event_id_length() {
    let mut miner = LogMiner::new(MinerOpts { event_id_len: 12, ..MinerOpts::default() }).unwrap();
    let out = miner.parse_lines(&["service started".to_string()]).unwrap();
    assert_eq!(out.lines[0].event_id.len(), 12);
    assert_eq!(out.events[0].event_id, out.lines[0].event_id);
}
