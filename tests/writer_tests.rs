//! Integration tests for writing DAG files to disk
//!
//! - side files: per-layer submit files, join no-op file, config file
//! - determinism: rewriting an unmodified graph is byte-identical
//! - edge expansion through the formatter

use std::collections::BTreeMap;
use std::fs;

use dagscribe::{
    write_dag, DagError, EdgeKind, Graph, Node, Nodes, SimpleFormatter, SubmitDescription, Vars,
    WalkOrder,
};
use tempfile::TempDir;

// ============================================================================
// TEST HELPERS
// ============================================================================

fn vars(n: usize) -> Vec<Vars> {
    (0..n)
        .map(|i| Vars::from([("item".to_string(), format!("item-{i}"))]))
        .collect()
}

/// split (1) -> work (4) -> combine (2) -> report (1)
fn pipeline() -> Graph {
    let mut g = Graph::new();
    let split = g
        .layer("split", SubmitDescription::inline("executable = split.sh"), vec![])
        .unwrap();
    let work = g
        .insert_child(
            &Nodes::from(split),
            Node::layer("work", SubmitDescription::inline("executable = work.sh"))
                .with_vars(vars(4))
                .with_retries(2, None),
            None,
        )
        .unwrap();
    let combine = g
        .insert_child(
            &Nodes::from(work),
            Node::layer("combine", SubmitDescription::file("/abs/combine.sub")).with_vars(vars(2)),
            Some(EdgeKind::grouper(2, 1)),
        )
        .unwrap();
    g.insert_child(
        &Nodes::from(combine),
        Node::layer("report", SubmitDescription::inline("executable = report.sh")),
        None,
    )
    .unwrap();
    g
}

fn nodes_section(text: &str) -> Vec<String> {
    text.lines()
        .skip_while(|l| *l != "# BEGIN NODES AND EDGES")
        .skip(1)
        .take_while(|l| *l != "# END NODES AND EDGES")
        .map(str::to_string)
        .collect()
}

// ============================================================================
// FILES
// ============================================================================

#[test]
fn writes_dag_and_side_files() {
    let dir = TempDir::new().unwrap();
    let g = pipeline();
    let path = write_dag(&g, dir.path(), "pipeline.dag", &SimpleFormatter::default()).unwrap();

    assert_eq!(path, dir.path().join("pipeline.dag"));
    assert!(path.exists());

    let work_sub = fs::read_to_string(dir.path().join("work.sub")).unwrap();
    assert_eq!(work_sub, "executable = work.sh\nqueue\n");
    assert!(dir.path().join("split.sub").exists());
    assert!(dir.path().join("report.sub").exists());
    assert!(!dir.path().join("combine.sub").exists());

    // grouper allocated joins, so the shared no-op file exists and is empty
    let noop = fs::read(dir.path().join("__JOIN__.sub")).unwrap();
    assert!(noop.is_empty());

    assert!(!dir.path().join("dagman.config").exists());
}

#[test]
fn config_file_written_when_options_present() {
    let dir = TempDir::new().unwrap();
    let mut g = pipeline();
    g.config_mut()
        .dagman_config
        .insert("DAGMAN_MAX_JOBS_SUBMITTED".into(), "100".into());

    let path = write_dag(&g, dir.path(), "d.dag", &SimpleFormatter::default()).unwrap();
    let config = fs::read_to_string(dir.path().join("dagman.config")).unwrap();
    assert_eq!(config, "DAGMAN_MAX_JOBS_SUBMITTED = 100\n");

    let text = fs::read_to_string(path).unwrap();
    assert!(text.lines().any(|l| l == "CONFIG dagman.config"));
}

#[test]
fn no_join_file_without_joins() {
    let dir = TempDir::new().unwrap();
    let mut g = Graph::new();
    let sub = SubmitDescription::inline("executable = a.sh");
    g.layer("a", sub.clone(), vars(3)).unwrap();
    g.layer("b", sub, vars(3)).unwrap();
    g.add_edge("a", "b", Some(EdgeKind::one_to_one())).unwrap();

    write_dag(&g, dir.path(), "d.dag", &SimpleFormatter::default()).unwrap();
    assert!(!dir.path().join("__JOIN__.sub").exists());
}

#[test]
fn creates_missing_output_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    write_dag(&pipeline(), &nested, "d.dag", &SimpleFormatter::default()).unwrap();
    assert!(nested.join("d.dag").exists());
}

// ============================================================================
// CONTENT
// ============================================================================

#[test]
fn rewriting_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let g = pipeline();
    let formatter = SimpleFormatter::default();

    let first = write_dag(&g, dir.path(), "one.dag", &formatter).unwrap();
    let second = write_dag(&g, dir.path(), "two.dag", &formatter).unwrap();
    assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
}

#[test]
fn pipeline_nodes_and_edges() {
    let dir = TempDir::new().unwrap();
    let path = write_dag(&pipeline(), dir.path(), "d.dag", &SimpleFormatter::default()).unwrap();
    let lines = nodes_section(&fs::read_to_string(path).unwrap());

    let expected = [
        "JOB split:0 split.sub",
        "PARENT split:0 CHILD work:0 work:1 work:2 work:3",
        "JOB work:0 work.sub",
        "VARS work:0 item=\"item-0\"",
        "RETRY work:0 2",
        "JOB work:1 work.sub",
        "VARS work:1 item=\"item-1\"",
        "RETRY work:1 2",
        "JOB work:2 work.sub",
        "VARS work:2 item=\"item-2\"",
        "RETRY work:2 2",
        "JOB work:3 work.sub",
        "VARS work:3 item=\"item-3\"",
        "RETRY work:3 2",
        "PARENT work:0 work:1 CHILD __JOIN__0",
        "PARENT __JOIN__0 CHILD combine:0",
        "PARENT work:2 work:3 CHILD __JOIN__1",
        "PARENT __JOIN__1 CHILD combine:1",
        "JOB combine:0 /abs/combine.sub",
        "VARS combine:0 item=\"item-0\"",
        "JOB combine:1 /abs/combine.sub",
        "VARS combine:1 item=\"item-1\"",
        "PARENT combine:0 combine:1 CHILD report:0",
        "JOB report:0 report.sub",
        "JOB __JOIN__0 __JOIN__.sub NOOP",
        "JOB __JOIN__1 __JOIN__.sub NOOP",
    ];
    assert_eq!(lines, expected);
}

#[test]
fn custom_formatter_is_used_everywhere() {
    let formatter = SimpleFormatter::new("_", 3, 1).unwrap();
    let dir = TempDir::new().unwrap();
    let path = write_dag(&pipeline(), dir.path(), "d.dag", &formatter).unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert!(text.contains("JOB split_001 split.sub\n"));
    assert!(text.contains("PARENT combine_001 combine_002 CHILD report_001\n"));
    assert!(!text.contains("split:0"));
}

#[test]
fn done_and_noop_flags() {
    let mut g = Graph::new();
    g.insert(
        Node::layer("a", SubmitDescription::file("a.sub"))
            .with_vars(vars(3))
            .with_done(BTreeMap::from([(1, true)]))
            .with_noop(BTreeMap::from([(2, true)])),
    )
    .unwrap();
    let dir = TempDir::new().unwrap();
    let path = write_dag(&g, dir.path(), "d.dag", &SimpleFormatter::default()).unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert!(text.contains("JOB a:0 a.sub\n"));
    assert!(text.contains("JOB a:1 a.sub DONE\n"));
    assert!(text.contains("JOB a:2 a.sub NOOP\n"));
}

#[test]
fn vars_values_are_escaped() {
    let mut g = Graph::new();
    let v = Vars::from([
        ("path".to_string(), r"C:\data".to_string()),
        ("quote".to_string(), r#"say "hi""#.to_string()),
    ]);
    g.layer("a", SubmitDescription::file("a.sub"), vec![v]).unwrap();
    let dir = TempDir::new().unwrap();
    let path = write_dag(&g, dir.path(), "d.dag", &SimpleFormatter::default()).unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert!(text.contains(r#"VARS a:0 path="C:\\data" quote="say \"hi\"""#));
}

#[test]
fn formatter_errors_surface() {
    let mut g = Graph::new();
    g.layer("has:colon", SubmitDescription::file("a.sub"), vec![])
        .unwrap();
    let dir = TempDir::new().unwrap();
    let err = write_dag(&g, dir.path(), "d.dag", &SimpleFormatter::default()).unwrap_err();
    assert!(matches!(err, DagError::LayerNameContainsSeparator { .. }));
    assert!(!dir.path().join("d.dag").exists());
}

#[test]
fn writer_walk_matches_breadth_first_order() {
    let g = pipeline();
    let order: Vec<String> = g
        .walk(WalkOrder::BreadthFirst)
        .iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(order, ["split", "work", "combine", "report"]);
}

// ============================================================================
// SUBMIT FILE SAFETY
// ============================================================================

#[test]
fn node_names_with_slashes_are_rejected_before_writing() {
    let mut g = Graph::new();
    let err = g
        .layer("x/y", SubmitDescription::inline("executable = x"), vec![])
        .unwrap_err();
    assert!(matches!(err, DagError::InvalidNodeName { name, .. } if name == "x/y"));
    assert!(g.is_empty());
}

#[test]
fn inline_submit_file_never_replaces_referenced_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.sub"), "USER CONTENT").unwrap();

    let mut g = Graph::new();
    g.layer("a", SubmitDescription::inline("executable = x"), vec![])
        .unwrap();
    g.layer("b", SubmitDescription::file("./a.sub"), vec![])
        .unwrap();

    let err = write_dag(&g, dir.path(), "d.dag", &SimpleFormatter::default()).unwrap_err();
    assert!(matches!(err, DagError::SubmitFileConflict { node, .. } if node == "a"));
    assert_eq!(
        fs::read_to_string(dir.path().join("a.sub")).unwrap(),
        "USER CONTENT"
    );
    assert!(!dir.path().join("d.dag").exists());
}

#[test]
fn referenced_file_elsewhere_is_not_a_conflict() {
    let dir = TempDir::new().unwrap();
    let mut g = Graph::new();
    g.layer("a", SubmitDescription::inline("executable = x"), vec![])
        .unwrap();
    g.layer("b", SubmitDescription::file("shared/a.sub"), vec![])
        .unwrap();

    write_dag(&g, dir.path(), "d.dag", &SimpleFormatter::default()).unwrap();
    assert!(dir.path().join("a.sub").exists());
}
