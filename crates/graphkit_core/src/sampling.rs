use crate::canvas::Canvas;
use crate::color::Color;
use crate::error::{GraphError, Result};
use crate::surface::PlotSurface;
use serde::{Deserialize, Serialize};

pub(crate) const MAX_DECIMALS: i32 = 15;

/// Number of decimal places in the shortest representation of `step`.
pub fn decimals_of(step: f64) -> i32 {
    let text = format!("{step}");
    match text.split_once('.') {
        Some((_, fraction)) => (fraction.len() as i32).min(MAX_DECIMALS),
        None => 0,
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Iterator over `start + k * step` for `k = 1, 2, ...`, continuing while the
/// previous value is below `stop`. Values are rounded to the decimal places of
/// `step` so that grid points such as `0.0` come out exact.
#[derive(Debug, Clone)]
pub struct DecRange {
    start: f64,
    stop: f64,
    step: f64,
    decimals: i32,
    k: u64,
}

pub fn dec_range(start: f64, stop: f64, step: f64) -> Result<DecRange> {
    if !(step > 0.0) || !step.is_finite() {
        return Err(GraphError::config(format!("Range step must be positive, got {step}.")));
    }
    if !start.is_finite() || !stop.is_finite() {
        return Err(GraphError::config("Range bounds must be finite."));
    }
    Ok(DecRange {
        start,
        stop,
        step,
        decimals: decimals_of(step),
        k: 0,
    })
}

impl Iterator for DecRange {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let previous = self.start + self.k as f64 * self.step;
        if previous >= self.stop {
            return None;
        }
        self.k += 1;
        Some(round_to(self.start + self.k as f64 * self.step, self.decimals))
    }
}

/// A process-random seed for a bifurcation sweep.
pub fn entropy_seed() -> u64 {
    rand::random()
}

/// Uniform starting value in `[0, 1)` for a recurrence with no given start.
pub fn random_start() -> f64 {
    rand::random()
}

/// Which loop of a [`PlaneIteration`] triggers the flush callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushOn {
    /// Once per column of x.
    #[default]
    Row,
    /// Once per grid point.
    Point,
}

/// Walks an x/y grid built from two [`DecRange`]s, x-major, calling `on_flush`
/// every `flush_every` rows or points.
pub struct PlaneIteration<F: FnMut()> {
    xs: Vec<f64>,
    ys: Vec<f64>,
    xi: usize,
    yi: usize,
    flush_on: FlushOn,
    flush_every: usize,
    ticks: usize,
    on_flush: F,
}

impl PlaneIteration<fn()> {
    pub fn new(x: (f64, f64, f64), y: (f64, f64, f64)) -> Result<Self> {
        fn noop() {}
        PlaneIteration::with_flush(x, y, FlushOn::Row, 1, noop as fn())
    }
}

impl<F: FnMut()> PlaneIteration<F> {
    pub fn with_flush(
        x: (f64, f64, f64),
        y: (f64, f64, f64),
        flush_on: FlushOn,
        flush_every: usize,
        on_flush: F,
    ) -> Result<Self> {
        if flush_every == 0 {
            return Err(GraphError::config("flush_every must be at least 1."));
        }
        Ok(Self {
            xs: dec_range(x.0, x.1, x.2)?.collect(),
            ys: dec_range(y.0, y.1, y.2)?.collect(),
            xi: 0,
            yi: 0,
            flush_on,
            flush_every,
            ticks: 0,
            on_flush,
        })
    }

    fn tick(&mut self) {
        if self.ticks % self.flush_every == 0 {
            (self.on_flush)();
        }
        self.ticks += 1;
    }
}

impl<F: FnMut()> Iterator for PlaneIteration<F> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<(f64, f64)> {
        if self.ys.is_empty() {
            return None;
        }
        let x = *self.xs.get(self.xi)?;
        if self.yi == 0 && self.flush_on == FlushOn::Row {
            self.tick();
        }
        if self.flush_on == FlushOn::Point {
            self.tick();
        }
        let y = self.ys[self.yi];
        self.yi += 1;
        if self.yi == self.ys.len() {
            self.yi = 0;
            self.xi += 1;
        }
        Some((x, y))
    }
}

/// A colored point that can plot itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
    pub color: Color,
}

impl Pixel {
    pub fn new(x: f64, y: f64, color: Color) -> Self {
        Self { x, y, color }
    }

    /// Plots with `color`, or with the pixel's own color when `None`.
    pub fn plot<C: Canvas>(&self, surface: &mut PlotSurface<C>, color: Option<&Color>) {
        surface.plot(self.x, self.y, color.unwrap_or(&self.color).clone());
    }
}
