use kestrel_config::{EdgeDef, NodeDef, WorkflowDef};
use kestrel_workflow::{BranchClass, GraphError, NodeKind, SubflowKind, compile};
use serde_json::json;

fn workflow(nodes: Vec<NodeDef>, edges: Vec<EdgeDef>) -> WorkflowDef {
  WorkflowDef {
    nodes,
    edges,
    ..Default::default()
  }
}

fn task(id: &str) -> NodeDef {
  NodeDef::new(id, "print_log")
}

#[test]
fn test_linear_chain() {
  let wf = workflow(
    vec![task("a"), task("b"), task("c")],
    vec![EdgeDef::new("a", "b"), EdgeDef::new("b", "c")],
  );
  let graph = compile(&wf).unwrap();

  assert_eq!(graph.start_nodes(), &["a".to_string()]);
  assert_eq!(graph.next("a"), vec!["b"]);
  assert_eq!(graph.prev("c"), vec!["b"]);
  assert_eq!(graph.join_predecessors("c"), vec!["b"]);
  assert_eq!(graph.executable_count(), 3);
}

#[test]
fn test_empty_workflow() {
  let graph = compile(&WorkflowDef::default()).unwrap();
  assert!(graph.is_empty());
  assert!(graph.start_nodes().is_empty());
}

#[test]
fn test_duplicate_node_rejected() {
  let wf = workflow(vec![task("a"), task("a")], vec![]);
  assert!(matches!(compile(&wf), Err(GraphError::DuplicateNode(id)) if id == "a"));
}

#[test]
fn test_empty_id_rejected() {
  let wf = workflow(vec![task("a"), task("")], vec![]);
  assert!(matches!(compile(&wf), Err(GraphError::EmptyNodeId { index: 1 })));
}

#[test]
fn test_edge_to_unknown_node_rejected() {
  let wf = workflow(vec![task("a")], vec![EdgeDef::new("a", "ghost")]);
  let err = compile(&wf).unwrap_err();
  assert!(matches!(err, GraphError::InvalidEdge { ref from, ref to } if from == "a" && to == "ghost"));
  assert!(err.to_string().starts_with("invalid graph"));
}

#[test]
fn test_condition_branches() {
  let wf = workflow(
    vec![NodeDef::new("c", "condition"), task("t"), task("f")],
    vec![
      EdgeDef::with_handle("c", "t", "true"),
      EdgeDef::with_handle("c", "f", "false"),
    ],
  );
  let graph = compile(&wf).unwrap();

  let branches = graph.condition_branches("c").unwrap();
  assert_eq!(branches.on_true.as_deref(), Some("t"));
  assert_eq!(branches.on_false.as_deref(), Some("f"));
  assert_eq!(graph.targets_for_branch("c", "true"), vec!["t"]);
  assert_eq!(graph.start_nodes(), &["c".to_string()]);
}

#[test]
fn test_duplicate_condition_edge_last_wins() {
  let wf = workflow(
    vec![NodeDef::new("c", "condition"), task("x"), task("y")],
    vec![
      EdgeDef::with_handle("c", "x", "true"),
      EdgeDef::with_handle("c", "y", "true"),
    ],
  );
  let graph = compile(&wf).unwrap();

  assert_eq!(graph.condition_branches("c").unwrap().on_true.as_deref(), Some("y"));
  assert_eq!(graph.targets("c", BranchClass::ConditionTrue), vec!["y"]);
  assert_eq!(graph.targets_for_branch("c", "true"), vec!["y"]);
  // The dropped edge still feeds x, so x waits on c instead of starting
  let incoming = graph.incoming("x");
  assert_eq!(incoming.len(), 1);
  assert!(incoming[0].superseded);
  assert_eq!(graph.join_predecessors("x"), vec!["c"]);
  assert_eq!(graph.start_nodes(), &["c".to_string()]);
}

#[test]
fn test_error_targets_deduplicated() {
  let wf = workflow(
    vec![task("a"), task("h")],
    vec![
      EdgeDef::with_handle("a", "h", "error"),
      EdgeDef::with_handle("a", "h", "catch"),
    ],
  );
  let graph = compile(&wf).unwrap();

  assert_eq!(graph.error_targets("a"), &["h".to_string()]);
  assert!(graph.has_error_branch("a"));
  // Error edges do not count for the join rule
  assert!(graph.join_predecessors("h").is_empty());
  assert_eq!(graph.error_predecessors("h"), vec!["a"]);
  // but they still keep the handler from being a start node
  assert_eq!(graph.start_nodes(), &["a".to_string()]);
}

#[test]
fn test_error_predecessors_exclude_joined_sources() {
  let wf = workflow(
    vec![task("a"), task("b"), task("h")],
    vec![
      EdgeDef::with_handle("a", "h", "error"),
      EdgeDef::new("a", "h"),
      EdgeDef::with_handle("b", "h", "error"),
    ],
  );
  let graph = compile(&wf).unwrap();

  assert_eq!(graph.join_predecessors("h"), vec!["a"]);
  assert_eq!(graph.error_predecessors("h"), vec!["b"]);
}

#[test]
fn test_unknown_handle_is_default_but_routable() {
  let wf = workflow(
    vec![task("a"), task("b")],
    vec![EdgeDef::with_handle("a", "b", "case_1")],
  );
  let graph = compile(&wf).unwrap();

  assert_eq!(graph.outgoing("a")[0].class, BranchClass::Default);
  assert_eq!(graph.targets_for_branch("a", "case_1"), vec!["b"]);
  assert!(graph.targets_for_branch("a", "case_2").is_empty());
}

#[test]
fn test_loop_back_edge_and_closure() {
  // l -body-> b1 -> b2 -> l, l -done-> after, b2 -error-> h
  let wf = workflow(
    vec![
      NodeDef::new("l", "loop"),
      task("b1"),
      task("b2"),
      task("h"),
      task("after"),
    ],
    vec![
      EdgeDef::with_handle("l", "b1", "body"),
      EdgeDef::new("b1", "b2"),
      EdgeDef::new("b2", "l"),
      EdgeDef::with_handle("b2", "h", "error"),
      EdgeDef::with_handle("l", "after", "done"),
    ],
  );
  let graph = compile(&wf).unwrap();

  assert_eq!(graph.kind("l"), NodeKind::Loop);
  let branches = graph.loop_branches("l").unwrap();
  assert_eq!(branches.body, vec!["b1".to_string()]);
  assert_eq!(branches.done, vec!["after".to_string()]);

  let back: Vec<_> = graph.incoming("l").iter().filter(|e| e.back_edge).collect();
  assert_eq!(back.len(), 1);
  assert_eq!(back[0].source, "b2");
  assert!(graph.join_predecessors("l").is_empty());
  assert_eq!(graph.start_nodes(), &["l".to_string()]);

  let closure = graph.body_closure("l");
  assert_eq!(closure.body, vec!["b1".to_string(), "b2".to_string()]);
  assert_eq!(closure.errors, vec!["h".to_string()]);
  assert!(!closure.members().contains("after"));
  assert!(!closure.members().contains("l"));

  let members = closure.members();
  assert_eq!(graph.local_start_nodes(&closure.body, &members), vec!["b1".to_string()]);
}

#[test]
fn test_loop_with_empty_body() {
  let wf = workflow(
    vec![NodeDef::new("l", "foreach"), task("after")],
    vec![EdgeDef::with_handle("l", "after", "exit")],
  );
  let graph = compile(&wf).unwrap();
  assert!(graph.body_closure("l").is_empty());
  assert_eq!(graph.loop_branches("l").unwrap().done, vec!["after".to_string()]);
}

#[test]
fn test_join_predecessors() {
  let wf = workflow(
    vec![task("a"), task("b"), task("j")],
    vec![EdgeDef::new("a", "j"), EdgeDef::new("b", "j"), EdgeDef::new("a", "j")],
  );
  let graph = compile(&wf).unwrap();

  assert_eq!(graph.join_predecessors("j"), vec!["a", "b"]);
  assert_eq!(graph.start_nodes(), &["a".to_string(), "b".to_string()]);
}

#[test]
fn test_cycle_without_loop_node_has_no_start() {
  let wf = workflow(
    vec![task("a"), task("b")],
    vec![EdgeDef::new("a", "b"), EdgeDef::new("b", "a")],
  );
  let graph = compile(&wf).unwrap();
  assert!(graph.start_nodes().is_empty());
}

#[test]
fn test_grouped_subflow() {
  let group = NodeDef::new("g", "group")
    .at(0.0, 0.0)
    .with_data("isSubflow", json!(true))
    .with_data("subflowName", json!("cleanup"))
    .with_data("width", json!(200))
    .with_data("height", json!("100px"));
  let wf = workflow(
    vec![
      NodeDef::new("call", "subflow").at(500.0, 500.0),
      group,
      task("s1").at(10.0, 10.0),
      task("s2").at(150.0, 90.0),
      task("outside").at(300.0, 10.0),
    ],
    vec![EdgeDef::new("s1", "s2")],
  );
  let graph = compile(&wf).unwrap();

  let sub = graph.find_subflow("cleanup").unwrap();
  assert_eq!(sub.kind, SubflowKind::Grouped);
  assert_eq!(sub.members, vec!["s1".to_string(), "s2".to_string()]);
  assert_eq!(graph.find_subflow("g").unwrap().name, "cleanup");
  assert!(graph.find_subflow("missing").is_none());

  assert!(graph.is_subflow_member("s1"));
  assert_eq!(graph.start_nodes(), &["call".to_string(), "outside".to_string()]);
  assert!(!graph.main_members().contains("s1"));
  assert!(!graph.main_members().contains("g"));
  assert_eq!(graph.executable_count(), 4);
}

#[test]
fn test_group_without_subflow_flag_is_plain_container() {
  let group = NodeDef::new("g", "group")
    .with_data("width", json!(200))
    .with_data("height", json!(200));
  let wf = workflow(vec![group, task("a").at(10.0, 10.0)], vec![]);
  let graph = compile(&wf).unwrap();

  assert!(graph.subflows().is_empty());
  assert_eq!(graph.start_nodes(), &["a".to_string()]);
}

#[test]
fn test_headered_subflow() {
  let header = NodeDef::new("hdr", "subflow_header").with_data("label", json!("notify"));
  let wf = workflow(
    vec![task("main"), header, task("n1"), task("n2")],
    vec![EdgeDef::new("hdr", "n1"), EdgeDef::new("n1", "n2")],
  );
  let graph = compile(&wf).unwrap();

  let sub = graph.find_subflow("notify").unwrap();
  assert_eq!(sub.kind, SubflowKind::Headered);
  assert_eq!(sub.members, vec!["n1".to_string(), "n2".to_string()]);
  assert_eq!(graph.start_nodes(), &["main".to_string()]);

  let members = sub.member_set();
  assert_eq!(graph.local_start_nodes(&sub.members, &members), vec!["n1".to_string()]);
}

#[test]
fn test_recompile_is_stable() {
  let wf = workflow(
    vec![NodeDef::new("l", "loop"), task("b"), task("after")],
    vec![
      EdgeDef::with_handle("l", "b", "loop"),
      EdgeDef::new("b", "l"),
      EdgeDef::with_handle("l", "after", "done"),
    ],
  );
  let first = compile(&wf).unwrap();
  let second = compile(&wf).unwrap();
  assert_eq!(first.start_nodes(), second.start_nodes());
  assert_eq!(first.body_closure("l"), second.body_closure("l"));
  assert_eq!(first.incoming("l"), second.incoming("l"));
}
