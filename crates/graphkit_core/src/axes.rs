//! Axis lines with tick marks and truncated numeric labels.

use crate::canvas::Canvas;
use crate::color::Color;
use crate::error::{GraphError, Result};
use crate::primitives::Primitive;
use crate::sampling::dec_range;
use crate::surface::PlotSurface;
use crate::transform::Axis;
use serde::{Deserialize, Serialize};

/// Above this span, ticks are placed every label interval instead of every unit.
const MAX_UNIT_TICKS: f64 = 1000.0;
const MAX_TICKS: f64 = 100_000.0;
const LABEL_WIDTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxesOptions {
    /// Draw tick marks and labels.
    pub labels: bool,
    /// Half-length of a tick mark in world units.
    pub tick_length: f64,
    /// Label spacing. Defaults to a tenth of the axis span.
    pub interval: Option<f64>,
    pub color: Color,
}

impl Default for AxesOptions {
    fn default() -> Self {
        Self {
            labels: true,
            tick_length: 0.2,
            interval: None,
            color: Color::black(),
        }
    }
}

fn is_multiple(value: f64, interval: f64) -> bool {
    let quotient = value / interval;
    (quotient - quotient.round()).abs() < 1e-9
}

/// Tick spacing and label interval for an axis spanning `low..high`.
fn tick_spacing(low: f64, high: f64, options: &AxesOptions) -> Result<(f64, f64)> {
    let span = high - low;
    let interval = options.interval.unwrap_or(span / 10.0);
    let step = if span > MAX_UNIT_TICKS { interval } else { 1.0 };
    let count = (high / step).ceil() - (low / step).floor();
    if count > MAX_TICKS {
        return Err(GraphError::config(format!(
            "Axis label interval {interval} needs {count} ticks, more than {MAX_TICKS}."
        )));
    }
    Ok((step, interval))
}

fn label(value: f64) -> String {
    value.to_string().chars().take(LABEL_WIDTH).collect()
}

impl<C: Canvas> PlotSurface<C> {
    /// Draws the x and y axes through the origin. `refresh` redraws them with
    /// the same options.
    pub fn draw_axes(&mut self, options: AxesOptions) -> Result<()> {
        if let Some(interval) = options.interval {
            if !interval.is_finite() || interval <= 0.0 {
                return Err(GraphError::config(format!(
                    "Axis label interval must be positive, got {interval}."
                )));
            }
        }
        let (min, max) = (self.transform.world_min(), self.transform.world_max());
        if options.labels {
            tick_spacing(min.x, max.x, &options)?;
            tick_spacing(min.y, max.y, &options)?;
        }
        self.draw(Primitive::line(min.x, 0.0, max.x, 0.0).with_color(options.color.clone()));
        self.draw(Primitive::line(0.0, min.y, 0.0, max.y).with_color(options.color.clone()));
        if options.labels {
            self.draw_ticks(Axis::X, min.x, max.x, &options)?;
            self.draw_ticks(Axis::Y, min.y, max.y, &options)?;
        }
        self.axes = Some(options);
        Ok(())
    }

    fn draw_ticks(&mut self, axis: Axis, low: f64, high: f64, options: &AxesOptions) -> Result<()> {
        let span = high - low;
        let (step, interval) = tick_spacing(low, high, options)?;
        let offset = -span / 100.0;
        let half = options.tick_length;
        let base = (low / step).floor() * step;
        for n in dec_range(base, high, step)? {
            let (tick, anchor) = match axis {
                Axis::X => (Primitive::line(n, -half, n, half), (n, offset)),
                Axis::Y => (Primitive::line(-half, n, half, n), (offset, n)),
            };
            self.draw(tick.with_color(options.color.clone()));
            if is_multiple(n, interval) {
                let text = Primitive::text(anchor.0, anchor.1, label(n))
                    .with_outline(options.color.clone());
                self.draw(text);
            }
        }
        Ok(())
    }
}
