//! Complex-plane plotting: the real part runs along x, the imaginary part along y.

use crate::canvas::{Canvas, ItemId};
use crate::color::Color;
use crate::surface::PlotSurface;
use num_complex::Complex64;

pub struct ComplexPlot<C: Canvas> {
    surface: PlotSurface<C>,
}

impl<C: Canvas> ComplexPlot<C> {
    pub fn new(surface: PlotSurface<C>) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &PlotSurface<C> {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut PlotSurface<C> {
        &mut self.surface
    }

    pub fn into_inner(self) -> PlotSurface<C> {
        self.surface
    }

    pub fn contains(&self, z: Complex64) -> bool {
        self.surface.contains(z.re, z.im)
    }

    pub fn plot(&mut self, z: Complex64, color: Color) -> Option<ItemId> {
        self.surface.plot(z.re, z.im, color)
    }

    pub fn plot_point(
        &mut self,
        z: Complex64,
        color: Color,
        radius: Option<f64>,
    ) -> Option<ItemId> {
        self.surface.plot_point(z.re, z.im, color, radius)
    }

    /// Marker at the Cartesian position of `r * e^(i theta)`.
    pub fn plot_polar(
        &mut self,
        r: f64,
        theta: f64,
        color: Color,
        radius: Option<f64>,
    ) -> Option<ItemId> {
        self.plot_point(Complex64::from_polar(r, theta), color, radius)
    }

    /// Marker at `(r, theta)` taken as plain x/y coordinates, for plotting
    /// in the polar plane itself.
    pub fn plot_polar_point(
        &mut self,
        r: f64,
        theta: f64,
        color: Color,
        radius: Option<f64>,
    ) -> Option<ItemId> {
        self.surface.plot_point(r, theta, color, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::RecordingCanvas;
    use crate::primitives::Shape;
    use crate::surface::SurfaceOptions;
    use nalgebra::Point2;
    use std::f64::consts::FRAC_PI_2;

    fn plot() -> ComplexPlot<RecordingCanvas> {
        let options = SurfaceOptions {
            x_min: -2.0,
            x_max: 2.0,
            y_min: -2.0,
            y_max: 2.0,
            ..SurfaceOptions::default()
        };
        ComplexPlot::new(PlotSurface::new(RecordingCanvas::new(), &options).expect("surface"))
    }

    fn center_of(plot: &ComplexPlot<RecordingCanvas>, id: ItemId) -> Point2<f64> {
        match plot.surface().primitive(id).unwrap().shape() {
            Shape::Oval(a, b) => nalgebra::center(a, b),
            other => panic!("expected oval, got {other:?}"),
        }
    }

    #[test]
    fn membership_uses_real_and_imaginary_parts() {
        let plot = plot();
        assert!(plot.contains(Complex64::new(1.0, -1.5)));
        assert!(!plot.contains(Complex64::new(0.0, 3.0)));
    }

    #[test]
    fn polar_plot_converts_to_cartesian() {
        let mut plot = plot();
        let id = plot
            .plot_polar(1.0, FRAC_PI_2, Color::red(), Some(0.1))
            .expect("inside");
        let center = center_of(&plot, id);
        assert!(center.x.abs() < 1e-12);
        assert!((center.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn polar_point_uses_raw_coordinates() {
        let mut plot = plot();
        let id = plot
            .plot_polar_point(1.0, 0.5, Color::red(), Some(0.1))
            .expect("inside");
        let center = center_of(&plot, id);
        assert!((center.x - 1.0).abs() < 1e-12);
        assert!((center.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn points_outside_are_skipped() {
        let mut plot = plot();
        assert!(plot.plot(Complex64::new(5.0, 0.0), Color::black()).is_none());
        assert!(plot.plot(Complex64::new(0.5, 0.5), Color::black()).is_some());
        assert_eq!(plot.surface().len(), 1);
    }
}
