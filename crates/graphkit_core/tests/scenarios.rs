//! End-to-end plotting scenarios against an in-memory canvas.

use graphkit_core::axes::AxesOptions;
use graphkit_core::engine::{CobwebOptions, GraphOptions, TimeSeriesOptions};
use graphkit_core::primitives::Shape;
use graphkit_core::{
    Axis, EvalError, Function, GraphError, PlotSurface, RecordingCanvas, SurfaceOptions, ZoomMode,
};
use nalgebra::Point2;
use std::collections::HashMap;

fn assert_err_contains<T: std::fmt::Debug>(result: Result<T, GraphError>, needle: &str) {
    match result {
        Ok(value) => panic!("expected error containing {needle:?}, got Ok({value:?})"),
        Err(err) => {
            let message = err.to_string();
            assert!(
                message.contains(needle),
                "expected error containing {needle:?}, got {message:?}"
            );
        }
    }
}

fn surface() -> PlotSurface<RecordingCanvas> {
    PlotSurface::new(RecordingCanvas::new(), &SurfaceOptions::default()).expect("surface")
}

fn shapes(surface: &PlotSurface<RecordingCanvas>) -> Vec<Shape> {
    surface.primitives().map(|(_, p)| p.shape().clone()).collect()
}

#[test_log::test]
fn evaluates_square_of_three() {
    let mut function = Function::parse("x^2").unwrap();
    let bindings = HashMap::from([("x".to_string(), 3.0)]);
    assert_eq!(function.evaluate(&bindings).unwrap(), 9.0);
}

#[test_log::test]
fn reciprocal_at_zero_is_division_by_zero() {
    let mut function = Function::parse("1/x").unwrap();
    let bindings = HashMap::from([("x".to_string(), 0.0)]);
    assert_eq!(function.evaluate(&bindings), Err(EvalError::DivisionByZero));
}

#[test]
fn origin_lands_in_the_middle_of_the_default_grid() {
    let surface = surface();
    assert_eq!(surface.to_screen(0.0, 0.0), (100, 100));
    assert_eq!(surface.to_screen(-100.0, 100.0), (0, 0));
    assert_eq!(surface.to_world(200.0, 200.0), (100.0, -100.0));
}

#[test_log::test]
fn cobweb_draws_fifty_step_pairs() {
    let mut surface = surface();
    surface.set_function(Function::parse("x/2").unwrap());
    surface
        .cobweb(CobwebOptions {
            starting_value: Some(0.5),
            iterations: 50,
            ..CobwebOptions::default()
        })
        .unwrap();
    // identity line plus a vertical and a horizontal segment per step
    assert_eq!(surface.len(), 1 + 2 * 50);
    assert!(surface.is_graphed());
}

#[test_log::test]
fn reciprocal_graph_finishes_with_a_marker_at_zero() {
    let mut surface = surface();
    surface.set_function(Function::parse("1/x").unwrap());
    surface.graph(GraphOptions::default()).unwrap();
    let markers: Vec<Shape> = shapes(&surface)
        .into_iter()
        .filter(|shape| matches!(shape, Shape::Circle { .. }))
        .collect();
    assert_eq!(markers.len(), 1);
    match &markers[0] {
        Shape::Circle { center, .. } => assert_eq!(center.x, 0.0),
        other => panic!("unexpected marker {other:?}"),
    }
    // segments on both sides of the pole
    assert!(shapes(&surface).iter().any(|shape| matches!(
        shape,
        Shape::Line(from, _) if from.x > 0.0
    )));
}

#[test]
fn undefined_parameter_is_rejected_before_drawing() {
    let mut surface = surface();
    surface.set_function(Function::parse("a x").unwrap());
    assert_err_contains(surface.graph(GraphOptions::default()), "Undefined variable: a");
    assert!(surface.is_empty());
    assert!(!surface.is_graphed());
}

#[test_log::test]
fn refresh_is_idempotent() {
    let mut surface = surface();
    surface.set_function(Function::parse("r x (1 - x)").unwrap());
    surface.set_variable("r", 3.2);
    surface.draw_axes(AxesOptions::default()).unwrap();
    surface.timeseries(TimeSeriesOptions::default()).unwrap();
    surface.refresh().unwrap();
    let first = shapes(&surface);
    surface.refresh().unwrap();
    assert_eq!(shapes(&surface), first);
    assert_eq!(surface.canvas().len(), first.len());
}

#[test]
fn zoom_then_reset_restores_the_default_view() {
    let mut surface = surface();
    surface.zoom(4.0, 2.0, Some((10.0, -10.0)), ZoomMode::Rescale).unwrap();
    assert_eq!(surface.span(Axis::X), 50.0);
    assert_eq!(surface.span(Axis::Y), 100.0);
    assert_eq!(surface.center(), (10.0, -10.0));
    surface.reset_zoom(ZoomMode::Rescale).unwrap();
    assert_eq!(
        surface.default_view(),
        (Point2::new(-100.0, -100.0), Point2::new(100.0, 100.0))
    );
    assert_eq!(surface.transform().world_min(), Point2::new(-100.0, -100.0));
    assert_eq!(surface.transform().world_max(), Point2::new(100.0, 100.0));
}

#[test]
fn redraw_zoom_replays_the_graph_in_the_new_view() {
    let mut surface = surface();
    surface.set_function(Function::parse("x").unwrap());
    surface
        .graph(GraphOptions {
            interval: Some(50.0),
            ..GraphOptions::default()
        })
        .unwrap();
    assert_eq!(surface.len(), 4);
    surface.zoom(2.0, 2.0, None, ZoomMode::Redraw).unwrap();
    // the x range halves, so the same interval yields two segments
    assert_eq!(surface.len(), 2);
}

#[test]
fn background_cobweb_renders_after_join() {
    let mut surface = surface();
    surface.set_function(Function::parse("x/2").unwrap());
    let job = surface
        .spawn_cobweb(CobwebOptions {
            starting_value: Some(1.0),
            iterations: 10,
            ..CobwebOptions::default()
        })
        .unwrap();
    assert_eq!(surface.len(), 1);
    let buffer = job.join().unwrap();
    surface.render_buffer(&buffer);
    assert_eq!(surface.len(), 21);
}
