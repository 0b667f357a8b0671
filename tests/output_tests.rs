use logspell::miner::{EventSummary, LogMiner, MinerOpts, ParsedLine};
use logspell::param_extractor::ParameterList;

fn line(id: u64, params: Option<ParameterList>) -> ParsedLine {
    ParsedLine {
        line_id: id,
        fields: vec!["INFO".to_string(), format!("job {id} done")],
        event_id: "abcd1234".to_string(),
        event_template: "job <*> done".to_string(),
        parameters: params,
    }
}

fn headers() -> Vec<String> {
    vec!["Level".to_string(), "Content".to_string()]
}

fn read_rows(path: &std::path::Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

#[test]
fn test_structured_csv_layout() {
    let mut buf = Vec::new();
    let rows = logspell::output::write_structured(
        &mut buf,
        &headers(),
        &[
            line(1, Some(ParameterList::Values(vec!["1".into()]))),
            line(2, Some(ParameterList::TimedOut)),
        ],
        true,
    )
    .unwrap();
    assert_eq!(rows, 2);
    let text = String::from_utf8(buf).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("LineId,Level,Content,EventId,EventTemplate,ParameterList"));
    assert_eq!(lines.next(), Some(r#"1,INFO,job 1 done,abcd1234,job <*> done,"[""1""]""#));
    assert_eq!(lines.next(), Some(r#"2,INFO,job 2 done,abcd1234,job <*> done,"[""TIMEOUT""]""#));
    assert_eq!(lines.next(), None);
}

#[test]
fn test_templates_csv_layout() {
    let mut buf = Vec::new();
    let events = vec![EventSummary {
        event_id: "abcd1234".to_string(),
        event_template: "job <*> done".to_string(),
        occurrences: 7,
    }];
    logspell::output::write_templates(&mut buf, &events).unwrap();
    assert_eq!(
        String::from_utf8(buf).unwrap(),
        "EventId,EventTemplate,Occurrences\nabcd1234,job <*> done,7\n"
    );
}

#[test]
fn test_append_main_skips_rows_already_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app_main_structured.csv");

    let first = vec![line(1, None), line(2, None)];
    assert_eq!(logspell::output::append_main(&path, &headers(), &first, false).unwrap(), 2);

    // Re-delivering line 2 together with line 3 only appends line 3, and no second header.
    let second = vec![line(2, None), line(3, None)];
    assert_eq!(logspell::output::append_main(&path, &headers(), &second, false).unwrap(), 1);

    let rows = read_rows(&path);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0][0], "LineId");
    let ids: Vec<&str> = rows[1..].iter().map(|r| r[0].as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(logspell::output::max_line_id_in(&path).unwrap(), 3);
}

#[test]
fn test_write_batch_creates_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut miner = LogMiner::new(MinerOpts::default()).unwrap();
    let batch = miner
        .parse_lines(&["job 1 done".to_string(), "job 2 done".to_string()])
        .unwrap();
    logspell::output::write_batch(dir.path(), "app.log", miner.headers(), &batch, true).unwrap();

    let structured = read_rows(&logspell::output::structured_path(dir.path(), "app.log"));
    assert_eq!(structured[0], vec!["LineId", "Content", "EventId", "EventTemplate", "ParameterList"]);
    assert_eq!(structured.len(), 3);
    assert_eq!(structured[2][3], "job <*> done");
    assert_eq!(structured[2][4], r#"["2"]"#);

    let templates = read_rows(&logspell::output::templates_path(dir.path(), "app.log"));
    assert_eq!(templates.len(), 2);
    assert_eq!(templates[1][1], "job <*> done");
    assert_eq!(templates[1][2], "2");
}

#[test]
fn test_main_mode_keeps_per_batch_files_too() {
    let dir = tempfile::tempdir().unwrap();
    let mut miner = LogMiner::new(MinerOpts::default()).unwrap();
    let batch = miner
        .parse_lines(&["job 1 done".to_string(), "job 2 done".to_string()])
        .unwrap();
    logspell::output::write_batch(dir.path(), "app.log", miner.headers(), &batch, true).unwrap();
    logspell::output::write_main(dir.path(), "svc", miner.headers(), &batch, &miner.all_events(), true).unwrap();

    for stem in ["app.log", "svc_main"] {
        assert!(logspell::output::structured_path(dir.path(), stem).exists());
        assert!(logspell::output::templates_path(dir.path(), stem).exists());
    }
    let main_rows = read_rows(&logspell::output::structured_path(dir.path(), "svc_main"));
    assert_eq!(main_rows.len(), 3);
}
