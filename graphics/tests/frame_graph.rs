//! Frame graph ordering and validation through the renderer.

mod common;

use rstest::rstest;

use common::{CallLog, CameraNode, MeshNode, StageLogger, World, dummy, renderer};
use ironframe_graphics::{
    FrameGraph, FrameStatus, GraphError, GraphState, GraphicsError, NodeContext, PassType,
    RecordContext, RenderNode,
};

/// Passes, then `(node, pass)` pairs, then pass edges, then node edges.
type Shape = (
    &'static [&'static str],
    &'static [(&'static str, &'static str)],
    &'static [(&'static str, &'static str)],
    &'static [(&'static str, &'static str)],
);

/// Coerces a case literal's array references to `Shape`'s slices.
fn shape(shape: Shape) -> Shape {
    shape
}

fn build(shape: Shape, log: &CallLog) -> FrameGraph<World> {
    let (passes, nodes, pass_edges, node_edges) = shape;
    let mut graph = FrameGraph::new();
    for pass in passes {
        graph.add_pass(*pass, PassType::Render).unwrap();
    }
    for (node, pass) in nodes {
        graph.add_node(StageLogger::new(node, log), *node, *pass).unwrap();
    }
    for (from, to) in pass_edges {
        graph.add_pass_edge(*from, *to).unwrap();
    }
    for (from, to) in node_edges {
        graph.add_node_edge(*from, *to).unwrap();
    }
    graph
}

#[rstest]
#[case::unordered_nodes_reverse_registration(
    shape((&["main"], &[("a", "main"), ("b", "main"), ("c", "main")], &[], &[])),
    &["c", "b", "a"]
)]
#[case::chain(
    shape((&["shadow", "geometry", "post"],
     &[("tonemap", "post"), ("shadows", "shadow"), ("meshes", "geometry")],
     &[("geometry", "post"), ("shadow", "geometry")],
     &[])),
    &["shadows", "meshes", "tonemap"]
)]
#[case::diamond(
    shape((&["a", "b", "c", "d"],
     &[("n_d", "d"), ("n_c", "c"), ("n_b", "b"), ("n_a", "a")],
     &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
     &[])),
    &["n_a", "n_c", "n_b", "n_d"]
)]
#[case::node_edges_within_pass(
    shape((&["main"], &[("late", "main"), ("early", "main")], &[], &[("early", "late")])),
    &["early", "late"]
)]
#[case::node_edges_follow_pass_order(
    shape((&["A", "B"],
     &[("n1", "A"), ("n2", "A"), ("n3", "B")],
     &[("A", "B")],
     &[("n1", "n3"), ("n2", "n1")])),
    &["n2", "n1", "n3"]
)]
fn execution_order(#[case] shape: Shape, #[case] expected: &[&str]) {
    let log = CallLog::default();
    let mut graph = build(shape, &log);
    graph.setup().unwrap();
    assert_eq!(graph.state(), GraphState::Built);
    assert_eq!(graph.execution_order(), expected);
}

#[rstest]
#[case::pass_cycle(
    shape((&["A", "B"], &[], &[("A", "B"), ("B", "A")], &[])),
    GraphError::CyclicDependency { from: "B".into(), to: "A".into() }
)]
#[case::unknown_pass(
    shape((&["A"], &[("n", "missing")], &[], &[])),
    GraphError::UnknownPass("missing".into())
)]
#[case::unknown_node(
    shape((&["A"], &[("n", "A")], &[], &[("n", "ghost")])),
    GraphError::UnknownNode("ghost".into())
)]
#[case::backwards_node_edge(
    shape((&["A", "B"], &[("n1", "A"), ("n2", "B")], &[("A", "B")], &[("n2", "n1")])),
    GraphError::CrossPassOrderViolation {
        from: "n2".into(),
        to: "n1".into(),
        from_pass: "B".into(),
        to_pass: "A".into(),
    }
)]
fn invalid_graphs_stay_pending(#[case] shape: Shape, #[case] expected: GraphError) {
    let log = CallLog::default();
    let mut graph = build(shape, &log);
    assert_eq!(graph.setup(), Err(expected));
    assert_eq!(graph.state(), GraphState::Pending);
    assert!(graph.execution_order().is_empty());
}

#[test]
fn invalid_graph_fails_renderer_setup() {
    let mut renderer = renderer(2);
    renderer.graph_mut().add_pass("A", PassType::Render).unwrap();
    renderer.graph_mut().add_pass_edge("A", "A").unwrap();

    let err = renderer.setup().unwrap_err();
    assert!(matches!(
        err,
        GraphicsError::Graph(GraphError::CyclicDependency { .. })
    ));
    assert!(matches!(
        renderer.render(&World::default()),
        Err(GraphicsError::Graph(GraphError::NotBuilt))
    ));
}

#[test]
fn later_nodes_see_resources_declared_earlier() {
    let mut renderer = renderer(2);
    let graph = renderer.graph_mut();
    graph.add_pass("update", PassType::Compute).unwrap();
    graph.add_pass("draw", PassType::Render).unwrap();
    graph.add_pass_edge("update", "draw").unwrap();
    graph.add_node(MeshNode::default(), "meshes", "draw").unwrap();
    graph.add_node(CameraNode, "camera", "update").unwrap();
    renderer.setup().unwrap();

    // MeshNode::record fails unless ready_resources found the camera buffer.
    renderer.render(&World { frame: 7 }).unwrap();

    let camera = renderer.resources().buffer_by_name(common::CAMERA_BUFFER).unwrap();
    let data = dummy(&renderer).buffer_data(camera.gpu()).unwrap();
    assert_eq!(&data[..4], &7u32.to_le_bytes());

    // Declaring again every frame does not duplicate the buffer.
    renderer.render(&World { frame: 8 }).unwrap();
    assert_eq!(renderer.resources().buffers().len(), 1);
}

#[test]
fn rebuilt_graph_keeps_resources() {
    let mut renderer = renderer(2);
    renderer.graph_mut().add_pass("main", PassType::Render).unwrap();
    renderer.graph_mut().add_node(CameraNode, "camera", "main").unwrap();
    renderer.setup().unwrap();
    let camera = renderer.resources().buffer_id(common::CAMERA_BUFFER).unwrap();

    renderer.clear_graph().unwrap();
    assert_eq!(renderer.graph().state(), GraphState::Empty);
    assert!(renderer.graph_mut().add_pass("main", PassType::Render).is_ok());
    renderer.graph_mut().add_node(CameraNode, "camera", "main").unwrap();
    renderer.setup().unwrap();

    assert_eq!(renderer.resources().buffer_id(common::CAMERA_BUFFER), Some(camera));
}

/// Node whose setup stage fails a fixed number of times before succeeding.
struct FlakySetup {
    failures: u32,
    log: CallLog,
}

impl RenderNode<World> for FlakySetup {
    fn setup(&mut self, _: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(GraphicsError::Internal("pipeline creation failed".into()));
        }
        Ok(())
    }

    fn record(&mut self, _: &mut RecordContext<'_>, _: &World) -> Result<(), GraphicsError> {
        self.log.lock().push("flaky:record".into());
        Ok(())
    }
}

#[test]
fn failed_node_setup_blocks_rendering_until_retried() {
    let log = CallLog::default();
    let mut renderer = renderer(2);
    renderer.graph_mut().add_pass("main", PassType::Render).unwrap();
    renderer
        .graph_mut()
        .add_node(
            FlakySetup {
                failures: 1,
                log: log.clone(),
            },
            "flaky",
            "main",
        )
        .unwrap();

    assert!(matches!(renderer.setup(), Err(GraphicsError::Internal(_))));
    assert!(!renderer.is_ready());
    assert!(matches!(
        renderer.render(&World::default()),
        Err(GraphicsError::Graph(GraphError::NotBuilt))
    ));
    assert!(log.lock().is_empty());

    // The retry keeps the built graph and only reruns the node stages.
    renderer.setup().unwrap();
    assert!(renderer.is_ready());
    assert!(matches!(
        renderer.render(&World::default()).unwrap(),
        FrameStatus::Presented { .. }
    ));
    assert_eq!(log.lock().as_slice(), ["flaky:record"]);

    assert!(matches!(
        renderer.setup(),
        Err(GraphicsError::Graph(GraphError::AlreadyBuilt))
    ));
}
