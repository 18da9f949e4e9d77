//! Affine mapping between world coordinates and a fixed pixel grid.
//!
//! World `y` grows upward while pixel rows grow downward, so the world's
//! upper edge lands on row 0.

use crate::error::{GraphError, Result};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Selects the horizontal or vertical dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    pixel_width: u32,
    pixel_height: u32,
    world_min: Point2<f64>,
    world_max: Point2<f64>,
    scale: Vector2<f64>,
}

impl CoordinateTransform {
    pub fn new(
        pixel_width: u32,
        pixel_height: u32,
        world_min: Point2<f64>,
        world_max: Point2<f64>,
    ) -> Result<Self> {
        if pixel_width == 0 || pixel_height == 0 {
            return Err(GraphError::config(format!(
                "Pixel size must be positive, got {pixel_width}x{pixel_height}."
            )));
        }
        let mut transform = Self {
            pixel_width,
            pixel_height,
            world_min,
            world_max,
            scale: Vector2::new(1.0, 1.0),
        };
        transform.set_bounds(world_min, world_max)?;
        Ok(transform)
    }

    /// Replaces the world rectangle. Degenerate or non-finite bounds are
    /// rejected and leave the transform unchanged.
    pub fn set_bounds(&mut self, world_min: Point2<f64>, world_max: Point2<f64>) -> Result<()> {
        let finite = world_min.coords.iter().chain(world_max.coords.iter()).all(|v| v.is_finite());
        if !finite {
            return Err(GraphError::config("World bounds must be finite."));
        }
        let span = world_max - world_min;
        if span.x <= 0.0 || span.y <= 0.0 {
            return Err(GraphError::config(format!(
                "World bounds are degenerate: ({}, {}) to ({}, {}).",
                world_min.x, world_min.y, world_max.x, world_max.y
            )));
        }
        self.world_min = world_min;
        self.world_max = world_max;
        self.scale = Vector2::new(
            span.x / f64::from(self.pixel_width),
            span.y / f64::from(self.pixel_height),
        );
        Ok(())
    }

    pub fn to_screen(&self, x: f64, y: f64) -> (i64, i64) {
        let (xs, ys) = self.to_screen_exact(x, y);
        ((xs + 0.5).floor() as i64, (ys + 0.5).floor() as i64)
    }

    /// Unrounded pixel position, used where sub-pixel geometry matters (radii).
    pub fn to_screen_exact(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.world_min.x) / self.scale.x,
            (self.world_max.y - y) / self.scale.y,
        )
    }

    pub fn to_world(&self, px: f64, py: f64) -> (f64, f64) {
        (
            px * self.scale.x + self.world_min.x,
            self.world_max.y - py * self.scale.y,
        )
    }

    pub fn world_min(&self) -> Point2<f64> {
        self.world_min
    }

    pub fn world_max(&self) -> Point2<f64> {
        self.world_max
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (self.pixel_width, self.pixel_height)
    }

    pub fn scale_x(&self) -> f64 {
        self.scale.x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale.y
    }

    pub fn span(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.world_max.x - self.world_min.x,
            Axis::Y => self.world_max.y - self.world_min.y,
        }
    }

    pub fn center(&self) -> Point2<f64> {
        nalgebra::center(&self.world_min, &self.world_max)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.world_min.x..=self.world_max.x).contains(&x)
            && (self.world_min.y..=self.world_max.y).contains(&y)
    }

    pub fn contains_pixel(&self, px: f64, py: f64) -> bool {
        (0.0..=f64::from(self.pixel_width)).contains(&px)
            && (0.0..=f64::from(self.pixel_height)).contains(&py)
    }

    /// Converts a length in pixels along `axis` to world units.
    pub fn translate_length(&self, pixels: f64, axis: Axis) -> f64 {
        match axis {
            Axis::X => pixels * self.scale.x,
            Axis::Y => pixels * self.scale.y,
        }
    }
}
