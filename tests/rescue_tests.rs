//! Integration tests for rescue file lookup and application

use std::fs;

use dagscribe::{
    find_rescue_file, rescue, write_dag, DagError, Graph, Nodes, Node, SimpleFormatter,
    SubmitDescription, Vars,
};
use tempfile::TempDir;

fn vars(n: usize) -> Vec<Vars> {
    (0..n)
        .map(|i| Vars::from([("n".to_string(), i.to_string())]))
        .collect()
}

fn graph() -> Graph {
    let mut g = Graph::new();
    let a = g
        .layer("a", SubmitDescription::file("a.sub"), vars(3))
        .unwrap();
    g.insert_child(
        &Nodes::from(a),
        Node::layer("b", SubmitDescription::file("b.sub")).with_vars(vars(2)),
        None,
    )
    .unwrap();
    g
}

#[test]
fn newest_rescue_file_wins() {
    let dir = TempDir::new().unwrap();
    for name in ["d.dag.rescue001", "d.dag.rescue010", "d.dag.rescue002", "other.dag.rescue099"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let found = find_rescue_file(dir.path(), "d.dag").unwrap();
    assert_eq!(found, dir.path().join("d.dag.rescue010"));
}

#[test]
fn missing_rescue_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("d.dag"), "").unwrap();
    let err = find_rescue_file(dir.path(), "d.dag").unwrap_err();
    assert!(matches!(err, DagError::NoRescueFileFound { dag_file, .. } if dag_file == "d.dag"));
}

#[test]
fn rescue_then_rewrite_marks_done() {
    let dir = TempDir::new().unwrap();
    let formatter = SimpleFormatter::default();
    let mut g = graph();

    let rescue_path = dir.path().join("d.dag.rescue001");
    fs::write(
        &rescue_path,
        "# Rescue DAG file, created after running\n\
         # Total number of Nodes: 7\n\
         \n\
         DONE a:0\n\
         DONE a:1\n\
         DONE __JOIN__0\n",
    )
    .unwrap();

    rescue(&mut g, &rescue_path, &formatter).unwrap();
    let path = write_dag(&g, dir.path(), "d.dag", &formatter).unwrap();
    let text = fs::read_to_string(path).unwrap();

    assert!(text.contains("JOB a:0 a.sub DONE\n"));
    assert!(text.contains("JOB a:1 a.sub DONE\n"));
    assert!(text.contains("JOB a:2 a.sub\n"));
    assert!(text.contains("JOB b:0 b.sub\n"));
    assert!(text.contains("JOB b:1 b.sub\n"));
}

#[test]
fn rescue_with_custom_formatter() {
    let dir = TempDir::new().unwrap();
    let formatter = SimpleFormatter::new("-", 2, 1).unwrap();
    let mut g = graph();

    let rescue_path = dir.path().join("d.dag.rescue001");
    fs::write(&rescue_path, "DONE b-02\n").unwrap();
    rescue(&mut g, &rescue_path, &formatter).unwrap();

    let b = g.node("b").unwrap();
    assert!(!b.is_done(0));
    assert!(b.is_done(1));
    assert!(!g.node("a").unwrap().is_done(0));
}

#[test]
fn unreadable_rescue_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let mut g = graph();
    let err = rescue(
        &mut g,
        dir.path().join("nope.rescue001"),
        &SimpleFormatter::default(),
    )
    .unwrap_err();
    assert!(matches!(err, DagError::Io(_)));
}
