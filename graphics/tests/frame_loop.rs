//! Frame loop integration tests: slot rotation, surface rebuilds and
//! shutdown, driven through the public [`Renderer`] API.

mod common;

use std::collections::HashSet;

use rstest::rstest;

use common::{CallLog, StageLogger, World, dummy, renderer, renderer_with};
use ironframe_graphics::backend::{AcquireResult, BackendEvent, DummyConfig, FenceMode, PresentResult};
use ironframe_graphics::{Extent2d, FrameStatus, GraphicsError, PassType};

#[rstest]
#[case::single(1)]
#[case::double(2)]
#[case::triple(3)]
fn slots_rotate_round_robin(#[case] frames_in_flight: usize) {
    let mut renderer = renderer(frames_in_flight);
    renderer.graph_mut().add_pass("main", PassType::Render).unwrap();
    renderer.setup().unwrap();
    dummy(&renderer).take_events();

    let frames = frames_in_flight * 3 + 1;
    let mut slots = Vec::new();
    for frame in 0..frames {
        slots.push(renderer.synchronizer().unwrap().current_slot());
        let status = renderer.render(&World { frame: frame as u32 }).unwrap();
        assert!(matches!(status, FrameStatus::Presented { .. }));
    }

    let expected: Vec<usize> = (0..frames).map(|frame| frame % frames_in_flight).collect();
    assert_eq!(slots, expected);

    let submitted: HashSet<u64> = dummy(&renderer)
        .events()
        .into_iter()
        .filter_map(|event| match event {
            BackendEvent::Submit { cmd, .. } => Some(cmd),
            _ => None,
        })
        .collect();
    assert_eq!(submitted.len(), frames_in_flight);
    assert!(dummy(&renderer).validation_errors().is_empty());
}

#[rstest]
#[case::single(1)]
#[case::triple(3)]
fn fences_gate_slot_reuse(#[case] frames_in_flight: usize) {
    let mut renderer = renderer_with(
        frames_in_flight,
        DummyConfig {
            fence_mode: FenceMode::OnWait,
            ..DummyConfig::default()
        },
    );
    renderer.setup().unwrap();

    for frame in 0..8 {
        renderer.render(&World { frame }).unwrap();
    }

    // Every wait happened on a fence that ended up signaled, and no command
    // buffer was re-recorded while its previous submission was in flight.
    let backend = dummy(&renderer);
    assert!(backend.validation_errors().is_empty());
    assert!(backend.events().iter().all(|event| match event {
        BackendEvent::WaitFence { signaled, .. } => *signaled,
        _ => true,
    }));
}

#[test]
fn stages_run_once_per_frame_in_graph_order() {
    let log = CallLog::default();
    let mut renderer = renderer(2);
    let graph = renderer.graph_mut();
    graph.add_pass("geometry", PassType::Render).unwrap();
    graph.add_pass("post", PassType::Render).unwrap();
    graph.add_pass_edge("geometry", "post").unwrap();
    graph.add_node(StageLogger::new("tonemap", &log), "tonemap", "post").unwrap();
    graph.add_node(StageLogger::new("meshes", &log), "meshes", "geometry").unwrap();
    renderer.setup().unwrap();
    assert_eq!(
        log.lock().drain(..).collect::<Vec<_>>(),
        [
            "meshes:declare",
            "tonemap:declare",
            "meshes:setup",
            "tonemap:setup"
        ]
    );

    renderer.render(&World::default()).unwrap();
    assert_eq!(
        log.lock().drain(..).collect::<Vec<_>>(),
        [
            "meshes:declare",
            "tonemap:declare",
            "meshes:ready",
            "tonemap:ready",
            "meshes:update",
            "tonemap:update",
            "meshes:record",
            "tonemap:record",
        ]
    );
    assert_eq!(
        common::take_markers(dummy(&renderer)),
        ["geometry", "meshes", "post", "tonemap"]
    );

    // The UI stage belongs to the application and follows the frame.
    renderer.draw_ui(&egui::Context::default(), &World::default());
    assert_eq!(
        log.lock().drain(..).collect::<Vec<_>>(),
        ["meshes:ui", "tonemap:ui"]
    );
}

#[test]
fn out_of_date_surface_skips_then_recovers() {
    let log = CallLog::default();
    let mut renderer = renderer(2);
    renderer.graph_mut().add_pass("main", PassType::Render).unwrap();
    renderer
        .graph_mut()
        .add_node(StageLogger::new("logged", &log), "logged", "main")
        .unwrap();
    renderer.setup().unwrap();
    log.lock().clear();

    renderer.resize(800, 600);
    dummy(&renderer).script_acquire([AcquireResult::OutOfDate]);

    assert_eq!(renderer.render(&World::default()).unwrap(), FrameStatus::Skipped);
    // Nothing was recorded for the skipped frame.
    assert!(log.lock().is_empty());
    assert!(
        dummy(&renderer)
            .events()
            .contains(&BackendEvent::ResizeSurface {
                extent: Extent2d::new(800, 600)
            })
    );

    assert!(matches!(
        renderer.render(&World::default()).unwrap(),
        FrameStatus::Presented { .. }
    ));
    assert!(log.lock().contains(&"logged:record".to_string()));

    let sync = renderer.synchronizer().unwrap();
    assert_eq!(sync.skipped_count(), 1);
    assert_eq!(sync.frame_count(), 1);
}

#[test]
fn suboptimal_present_rebuilds_before_next_acquire() {
    let mut renderer = renderer(2);
    renderer.setup().unwrap();
    dummy(&renderer).script_present([PresentResult::Suboptimal]);

    renderer.render(&World::default()).unwrap();
    assert!(renderer.synchronizer().unwrap().rebuild_requested());
    dummy(&renderer).take_events();

    renderer.render(&World::default()).unwrap();
    let events = dummy(&renderer).events();
    let resize = events
        .iter()
        .position(|event| matches!(event, BackendEvent::ResizeSurface { .. }))
        .unwrap();
    let acquire = events
        .iter()
        .position(|event| matches!(event, BackendEvent::Acquire { .. }))
        .unwrap();
    assert!(resize < acquire);
    assert!(!renderer.synchronizer().unwrap().rebuild_requested());
}

#[test]
fn minimized_window_renders_nothing() {
    let mut renderer = renderer(2);
    renderer.setup().unwrap();
    dummy(&renderer).take_events();

    renderer.resize(0, 0);
    for _ in 0..3 {
        assert_eq!(renderer.render(&World::default()).unwrap(), FrameStatus::Skipped);
    }
    assert!(dummy(&renderer).events().is_empty());

    renderer.resize(1024, 768);
    assert!(matches!(
        renderer.render(&World::default()).unwrap(),
        FrameStatus::Presented { .. }
    ));
}

#[test]
fn stuck_gpu_times_out() {
    let mut renderer = renderer_with(
        2,
        DummyConfig {
            fence_mode: FenceMode::Manual,
            ..DummyConfig::default()
        },
    );
    renderer.setup().unwrap();

    renderer.render(&World::default()).unwrap();
    renderer.render(&World::default()).unwrap();
    // Slot 0 is still in flight.
    assert!(matches!(
        renderer.render(&World::default()),
        Err(GraphicsError::Timeout { .. })
    ));

    dummy(&renderer).complete_all();
    assert!(renderer.render(&World::default()).is_ok());
}

#[test]
fn device_loss_is_fatal() {
    let mut renderer = renderer(2);
    renderer.setup().unwrap();
    renderer.render(&World::default()).unwrap();

    dummy(&renderer).lose_device();
    assert_eq!(
        renderer.render(&World::default()),
        Err(GraphicsError::DeviceLost)
    );
}

#[rstest]
#[case::single(1)]
#[case::triple(3)]
fn shutdown_releases_all_objects(#[case] frames_in_flight: usize) {
    let mut renderer = renderer(frames_in_flight);
    renderer.graph_mut().add_pass("main", PassType::Render).unwrap();
    renderer
        .graph_mut()
        .add_node(common::CameraNode, "camera", "main")
        .unwrap();
    renderer.setup().unwrap();
    renderer.add_models(&[common::triangle(1)]).unwrap();
    for frame in 0..4 {
        renderer.render(&World { frame }).unwrap();
    }
    assert!(dummy(&renderer).live_objects() > 0);

    renderer.shutdown().unwrap();
    assert_eq!(dummy(&renderer).live_objects(), 0);
    assert_eq!(renderer.resources().mesh_count(), 0);
}
