//! Plot surface: a transform, a registry of world-space primitives and the
//! record of the last graph drawn on them.
//!
//! Every mutation goes through `&mut PlotSurface`, so the registry is only
//! ever touched from the thread that owns the surface. Background graph runs
//! hand their buffered events back to that thread for drawing.

use crate::axes::AxesOptions;
use crate::canvas::{Canvas, ItemId};
use crate::color::Color;
use crate::engine::GraphRecord;
use crate::error::{EvalError, GraphError, Result};
use crate::function::{Bindings, Function};
use crate::primitives::Primitive;
use crate::transform::{Axis, CoordinateTransform};
use log::{debug, trace};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

/// Divisor of the x span used for the default `plot_point` radius.
pub const POINT_RATIO: f64 = 250.0;

/// Construction options of a [`PlotSurface`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceOptions {
    pub width: u32,
    pub height: u32,
    pub autoflush: bool,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub background: Color,
    pub main_variable: String,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            autoflush: true,
            x_min: -100.0,
            x_max: 100.0,
            y_min: -100.0,
            y_max: 100.0,
            background: Color::white(),
            main_variable: "x".to_string(),
        }
    }
}

/// How a view change treats what is already drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomMode {
    /// Re-render the existing primitives through the new transform.
    #[default]
    Rescale,
    /// Clear and replay axes and the last graph at the new sample density.
    Redraw,
}

pub type CustomGraph<C> = Rc<dyn Fn(&mut PlotSurface<C>) -> Result<()>>;
type MouseHandler = Box<dyn FnMut(f64, f64)>;

pub struct PlotSurface<C: Canvas> {
    pub(crate) canvas: C,
    pub(crate) transform: CoordinateTransform,
    default_view: (Point2<f64>, Point2<f64>),
    items: BTreeMap<ItemId, Primitive>,
    pub(crate) autoflush: bool,
    pub(crate) function: Option<Function>,
    pub(crate) variables: Bindings,
    pub(crate) main_variable: String,
    pub(crate) axes: Option<AxesOptions>,
    pub(crate) graphed: Option<GraphRecord>,
    custom: Option<CustomGraph<C>>,
    last_click: Option<(f64, f64)>,
    mouse_handler: Option<MouseHandler>,
}

impl<C: Canvas> PlotSurface<C> {
    pub fn new(mut canvas: C, options: &SurfaceOptions) -> Result<Self> {
        let world_min = Point2::new(options.x_min, options.y_min);
        let world_max = Point2::new(options.x_max, options.y_max);
        let transform =
            CoordinateTransform::new(options.width, options.height, world_min, world_max)?;
        if options.main_variable.is_empty() {
            return Err(GraphError::config("Main variable name must not be empty."));
        }
        canvas.set_background(&options.background);
        Ok(Self {
            canvas,
            transform,
            default_view: (world_min, world_max),
            items: BTreeMap::new(),
            autoflush: options.autoflush,
            function: None,
            variables: Bindings::new(),
            main_variable: options.main_variable.clone(),
            axes: None,
            graphed: None,
            custom: None,
            last_click: None,
            mouse_handler: None,
        })
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    /// Drawn primitives in handle order.
    pub fn primitives(&self) -> impl Iterator<Item = (ItemId, &Primitive)> {
        self.items.iter().map(|(id, primitive)| (*id, primitive))
    }

    pub fn primitive(&self, id: ItemId) -> Option<&Primitive> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_graphed(&self) -> bool {
        self.graphed.is_some()
    }

    pub fn autoflush(&self) -> bool {
        self.autoflush
    }

    pub fn set_autoflush(&mut self, autoflush: bool) {
        self.autoflush = autoflush;
    }

    pub fn draw(&mut self, primitive: Primitive) -> ItemId {
        let id = self
            .canvas
            .draw(&primitive.render(&self.transform), primitive.style());
        trace!("drew {:?} as {:?}", primitive.shape(), id);
        self.items.insert(id, primitive);
        self.after_mutation();
        id
    }

    /// Removes a primitive from the canvas and the registry and hands it
    /// back. Drawing it again yields a fresh handle.
    pub fn undraw(&mut self, id: ItemId) -> Option<Primitive> {
        let primitive = self.items.remove(&id)?;
        self.canvas.remove(id);
        self.after_mutation();
        Some(primitive)
    }

    /// Applies `change` to a drawn primitive and pushes the result to the host.
    pub fn reconfigure<F>(&mut self, id: ItemId, change: F) -> Result<()>
    where
        F: FnOnce(&mut Primitive) -> Result<()>,
    {
        let primitive = self
            .items
            .get_mut(&id)
            .ok_or_else(|| GraphError::config(format!("No drawn item with handle {}.", id.0)))?;
        change(primitive)?;
        self.canvas
            .update(id, &primitive.render(&self.transform), primitive.style());
        self.after_mutation();
        Ok(())
    }

    pub fn move_item(&mut self, id: ItemId, dx: f64, dy: f64) -> Result<()> {
        self.reconfigure(id, |primitive| {
            primitive.move_by(dx, dy);
            Ok(())
        })
    }

    /// Removes every primitive and forgets the last graph.
    pub fn clear(&mut self) {
        self.clear_items();
        self.graphed = None;
        self.custom = None;
        debug!("surface cleared");
    }

    fn clear_items(&mut self) {
        self.items.clear();
        self.canvas.clear();
        self.after_mutation();
    }

    pub fn flush(&mut self) {
        self.canvas.flush();
    }

    pub(crate) fn after_mutation(&mut self) {
        if self.autoflush {
            self.canvas.flush();
        }
    }

    pub fn set_background(&mut self, color: &Color) {
        self.canvas.set_background(color);
        self.after_mutation();
    }

    /// Serializes the rendered raster through the host. Hosts without an
    /// image backend return `Ok(false)`.
    pub fn save(&mut self, path: &Path) -> Result<bool> {
        self.canvas.save(path)
    }

    /// Single-pixel point, skipped when outside the current bounds.
    pub fn plot(&mut self, x: f64, y: f64, color: Color) -> Option<ItemId> {
        if !self.contains(x, y) {
            return None;
        }
        Some(self.draw(Primitive::point(x, y).with_color(color)))
    }

    /// Filled marker at `(x, y)`. The radius defaults to `x_span / 250` and
    /// the vertical radius is stretched by the aspect ratio of the bounds so
    /// the marker looks round on screen.
    pub fn plot_point(
        &mut self,
        x: f64,
        y: f64,
        color: Color,
        radius: Option<f64>,
    ) -> Option<ItemId> {
        if !self.contains(x, y) {
            return None;
        }
        let x_span = self.transform.span(Axis::X);
        let radius = radius.unwrap_or(x_span / POINT_RATIO);
        let y_radius = radius * self.transform.span(Axis::Y) / x_span;
        let marker = Primitive::oval(x - radius, y - y_radius, x + radius, y + y_radius)
            .with_color(color);
        Some(self.draw(marker))
    }

    pub fn set_coords(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, default: bool) -> Result<()> {
        let (world_min, world_max) = (Point2::new(x1, y1), Point2::new(x2, y2));
        self.transform.set_bounds(world_min, world_max)?;
        if default {
            self.default_view = (world_min, world_max);
        }
        debug!("coordinates set to ({x1}, {y1})..({x2}, {y2}), default: {default}");
        Ok(())
    }

    pub fn default_view(&self) -> (Point2<f64>, Point2<f64>) {
        self.default_view
    }

    /// Rescales the view around `center` (the current centre when `None`),
    /// dividing each span by its ratio. Ratios above one zoom in.
    pub fn zoom(
        &mut self,
        ratio_x: f64,
        ratio_y: f64,
        center: Option<(f64, f64)>,
        mode: ZoomMode,
    ) -> Result<()> {
        for ratio in [ratio_x, ratio_y] {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(GraphError::config(format!(
                    "Zoom ratio must be positive and finite, got {ratio}."
                )));
            }
        }
        let current = self.transform.center();
        let (cx, cy) = center.unwrap_or((current.x, current.y));
        let half_x = self.transform.span(Axis::X) / (ratio_x * 2.0);
        let half_y = self.transform.span(Axis::Y) / (ratio_y * 2.0);
        debug!("zoom by ({ratio_x}, {ratio_y}) around ({cx}, {cy}) with {mode:?}");
        self.apply_view(
            Point2::new(cx - half_x, cy - half_y),
            Point2::new(cx + half_x, cy + half_y),
            mode,
        )
    }

    /// Restores the bounds captured at construction or by the last
    /// `set_coords(.., default = true)`.
    pub fn reset_zoom(&mut self, mode: ZoomMode) -> Result<()> {
        let (world_min, world_max) = self.default_view;
        self.apply_view(world_min, world_max, mode)
    }

    fn apply_view(
        &mut self,
        world_min: Point2<f64>,
        world_max: Point2<f64>,
        mode: ZoomMode,
    ) -> Result<()> {
        self.transform.set_bounds(world_min, world_max)?;
        match mode {
            ZoomMode::Rescale => {
                self.rescale();
                Ok(())
            }
            ZoomMode::Redraw => self.refresh(),
        }
    }

    /// Re-renders every registered primitive through the current transform.
    pub fn rescale(&mut self) {
        for (id, primitive) in &self.items {
            self.canvas
                .update(*id, &primitive.render(&self.transform), primitive.style());
        }
        self.after_mutation();
    }

    /// Clears the surface, redraws the axes if they were drawn and replays
    /// the last graph with its recorded parameters.
    pub fn refresh(&mut self) -> Result<()> {
        self.clear_items();
        if let Some(axes) = self.axes.clone() {
            self.draw_axes(axes)?;
        }
        if let Some(custom) = self.custom.clone() {
            debug!("refresh replays custom graph");
            return custom(self);
        }
        if let Some(record) = self.graphed.clone() {
            debug!("refresh replays {}", record.kind());
            self.replay(record)?;
        }
        Ok(())
    }

    /// Registers a routine that `refresh` calls instead of the last built-in graph.
    pub fn set_custom_graph<F>(&mut self, graph: F)
    where
        F: Fn(&mut PlotSurface<C>) -> Result<()> + 'static,
    {
        self.custom = Some(Rc::new(graph));
    }

    pub fn center(&self) -> (f64, f64) {
        let center = self.transform.center();
        (center.x, center.y)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.transform.contains(x, y)
    }

    pub fn contains_pixel(&self, px: f64, py: f64) -> bool {
        self.transform.contains_pixel(px, py)
    }

    pub fn to_screen(&self, x: f64, y: f64) -> (i64, i64) {
        self.transform.to_screen(x, y)
    }

    pub fn to_world(&self, px: f64, py: f64) -> (f64, f64) {
        self.transform.to_world(px, py)
    }

    pub fn translate_length(&self, pixels: f64, axis: Axis) -> f64 {
        self.transform.translate_length(pixels, axis)
    }

    pub fn span(&self, axis: Axis) -> f64 {
        self.transform.span(axis)
    }

    /// Records a pointer click at pixel `(px, py)` and forwards the world
    /// position to the mouse handler, if any.
    pub fn record_click(&mut self, px: f64, py: f64) {
        let (x, y) = self.to_world(px, py);
        trace!("click at pixel ({px}, {py}) -> ({x}, {y})");
        self.last_click = Some((x, y));
        if let Some(handler) = self.mouse_handler.as_mut() {
            handler(x, y);
        }
    }

    /// Returns the last click in world coordinates and forgets it.
    pub fn check_mouse(&mut self) -> Option<(f64, f64)> {
        self.last_click.take()
    }

    pub fn set_mouse_handler<F>(&mut self, handler: F)
    where
        F: FnMut(f64, f64) + 'static,
    {
        self.mouse_handler = Some(Box::new(handler));
    }

    /// World position of a pointer at pixel `(px, py)`, or the pixel
    /// position unchanged when the pointer is off the surface.
    pub fn mouse_position(&self, px: f64, py: f64) -> (f64, f64) {
        if self.contains_pixel(px, py) {
            self.to_world(px, py)
        } else {
            (px, py)
        }
    }

    pub fn function(&self) -> Option<&Function> {
        self.function.as_ref()
    }

    /// Installs `function`, seeding it with the surface variables.
    pub fn set_function(&mut self, mut function: Function) {
        for (name, value) in &self.variables {
            function.set_variable(name, *value);
        }
        debug!("function set to {:?}", function.source().unwrap_or("<callable>"));
        self.function = Some(function);
    }

    pub fn variables(&self) -> &Bindings {
        &self.variables
    }

    pub fn main_variable(&self) -> &str {
        &self.main_variable
    }

    pub fn create_variable(&mut self, names: &[&str]) {
        for name in names {
            self.set_variable(name, 0.0);
        }
    }

    /// Binds `name` on the surface and in the active function.
    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.variables.insert(name.to_string(), value);
        if let Some(function) = self.function.as_mut() {
            function.set_variable(name, value);
        }
    }

    pub fn delete_variable(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            self.variables
                .remove(*name)
                .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))?;
            if let Some(function) = self.function.as_mut() {
                // the function may never have seen the name
                let _ = function.delete_variable(&[*name]);
            }
        }
        Ok(())
    }

    /// Makes `name` the variable graphs sweep, creating it if needed.
    pub fn set_main_variable(&mut self, name: &str) {
        self.main_variable = name.to_string();
        if !self.variables.contains_key(name) {
            self.create_variable(&[name]);
        }
    }

    /// Evaluates the active function with the surface variables.
    pub fn evaluate(&mut self) -> Result<f64> {
        let function = self
            .function
            .as_mut()
            .ok_or_else(|| GraphError::config("No function set."))?;
        Ok(function.evaluate(&self.variables)?)
    }
}
