//! Several plot surfaces driven as one.

use crate::axes::AxesOptions;
use crate::canvas::Canvas;
use crate::color::Color;
use crate::engine::{BifurcationOptions, CobwebOptions, GraphOptions, TimeSeriesOptions};
use crate::error::{GraphError, Result};
use crate::function::Function;
use crate::surface::{PlotSurface, SurfaceOptions, ZoomMode};

/// Broadcasts view, variable and graphing operations to every member.
/// Fallible operations stop at the first member that fails.
pub struct SurfaceGroup<C: Canvas> {
    surfaces: Vec<PlotSurface<C>>,
}

impl<C: Canvas> SurfaceGroup<C> {
    pub fn new(surfaces: Vec<PlotSurface<C>>) -> Result<Self> {
        if surfaces.is_empty() {
            return Err(GraphError::Construction(
                "A surface group needs at least one surface.".to_string(),
            ));
        }
        Ok(Self { surfaces })
    }

    /// Builds `count` surfaces sharing `options`, one canvas each.
    pub fn create<F>(count: usize, mut canvas: F, options: &SurfaceOptions) -> Result<Self>
    where
        F: FnMut() -> C,
    {
        let surfaces = (0..count)
            .map(|_| PlotSurface::new(canvas(), options))
            .collect::<Result<Vec<_>>>()?;
        Self::new(surfaces)
    }

    pub fn add(&mut self, surface: PlotSurface<C>) {
        self.surfaces.push(surface);
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlotSurface<C>> {
        self.surfaces.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PlotSurface<C>> {
        self.surfaces.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlotSurface<C>> {
        self.surfaces.iter()
    }

    fn try_each<F>(&mut self, mut op: F) -> Result<()>
    where
        F: FnMut(&mut PlotSurface<C>) -> Result<()>,
    {
        self.surfaces.iter_mut().try_for_each(|surface| op(surface))
    }

    pub fn set_coords(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, default: bool) -> Result<()> {
        self.try_each(|s| s.set_coords(x1, y1, x2, y2, default))
    }

    pub fn zoom(&mut self, ratio_x: f64, ratio_y: f64, mode: ZoomMode) -> Result<()> {
        self.try_each(|s| s.zoom(ratio_x, ratio_y, None, mode))
    }

    pub fn reset_zoom(&mut self, mode: ZoomMode) -> Result<()> {
        self.try_each(|s| s.reset_zoom(mode))
    }

    pub fn draw_axes(&mut self, options: &AxesOptions) -> Result<()> {
        self.try_each(|s| s.draw_axes(options.clone()))
    }

    pub fn plot(&mut self, x: f64, y: f64, color: &Color) {
        for surface in &mut self.surfaces {
            surface.plot(x, y, color.clone());
        }
    }

    pub fn plot_point(&mut self, x: f64, y: f64, color: &Color, radius: Option<f64>) {
        for surface in &mut self.surfaces {
            surface.plot_point(x, y, color.clone(), radius);
        }
    }

    pub fn set_function(&mut self, function: &Function) {
        for surface in &mut self.surfaces {
            surface.set_function(function.clone());
        }
    }

    pub fn create_variable(&mut self, names: &[&str]) {
        for surface in &mut self.surfaces {
            surface.create_variable(names);
        }
    }

    pub fn set_variable(&mut self, name: &str, value: f64) {
        for surface in &mut self.surfaces {
            surface.set_variable(name, value);
        }
    }

    pub fn set_main_variable(&mut self, name: &str) {
        for surface in &mut self.surfaces {
            surface.set_main_variable(name);
        }
    }

    pub fn delete_variable(&mut self, names: &[&str]) -> Result<()> {
        self.try_each(|s| s.delete_variable(names))
    }

    pub fn graph(&mut self, options: &GraphOptions) -> Result<()> {
        self.try_each(|s| s.graph(options.clone()))
    }

    pub fn cobweb(&mut self, options: &CobwebOptions) -> Result<()> {
        self.try_each(|s| s.cobweb(options.clone()))
    }

    pub fn timeseries(&mut self, options: &TimeSeriesOptions) -> Result<()> {
        self.try_each(|s| s.timeseries(options.clone()))
    }

    pub fn bifurcation(&mut self, options: &BifurcationOptions) -> Result<()> {
        self.try_each(|s| s.bifurcation(options.clone()))
    }

    pub fn flush(&mut self) {
        for surface in &mut self.surfaces {
            surface.flush();
        }
    }

    pub fn clear(&mut self) {
        for surface in &mut self.surfaces {
            surface.clear();
        }
    }
}
