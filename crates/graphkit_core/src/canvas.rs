//! The host canvas seam.
//!
//! A plot surface never paints pixels itself. It renders primitives to
//! [`ScreenShape`]s and hands them to a [`Canvas`], which is whatever the
//! embedding application draws with. [`RecordingCanvas`] keeps a display list
//! in memory; the WASM bridge serializes that list for a browser `<canvas>`.

use crate::color::Color;
use crate::error::Result;
use crate::primitives::{ScreenShape, Style};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Host handle of one drawn shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

pub trait Canvas {
    /// Draws `shape` and returns a fresh handle for it.
    fn draw(&mut self, shape: &ScreenShape, style: &Style) -> ItemId;

    /// Replaces the geometry and style behind an existing handle.
    fn update(&mut self, id: ItemId, shape: &ScreenShape, style: &Style);

    fn remove(&mut self, id: ItemId);

    fn clear(&mut self);

    /// Pushes pending drawing to the screen.
    fn flush(&mut self) {}

    fn set_background(&mut self, _color: &Color) {}

    /// Serializes the rendered raster to `path`. Hosts without an image
    /// backend leave this a no-op and return `Ok(false)`.
    fn save(&mut self, _path: &Path) -> Result<bool> {
        Ok(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayItem {
    pub id: ItemId,
    pub shape: ScreenShape,
    pub style: Style,
}

/// In-memory display list.
#[derive(Debug, Clone)]
pub struct RecordingCanvas {
    items: BTreeMap<ItemId, DisplayItem>,
    next_id: u64,
    background: Color,
    flushes: usize,
}

impl Default for RecordingCanvas {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            next_id: 1,
            background: Color::white(),
            flushes: 0,
        }
    }
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&DisplayItem> {
        self.items.get(&id)
    }

    /// Items in drawing order.
    pub fn items(&self) -> impl Iterator<Item = &DisplayItem> {
        self.items.values()
    }

    pub fn display_list(&self) -> Vec<DisplayItem> {
        self.items.values().cloned().collect()
    }

    pub fn background(&self) -> &Color {
        &self.background
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl Canvas for RecordingCanvas {
    fn draw(&mut self, shape: &ScreenShape, style: &Style) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.items.insert(
            id,
            DisplayItem {
                id,
                shape: shape.clone(),
                style: style.clone(),
            },
        );
        id
    }

    fn update(&mut self, id: ItemId, shape: &ScreenShape, style: &Style) {
        if let Some(item) = self.items.get_mut(&id) {
            item.shape = shape.clone();
            item.style = style.clone();
        }
    }

    fn remove(&mut self, id: ItemId) {
        self.items.remove(&id);
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn set_background(&mut self, color: &Color) {
        self.background = color.clone();
    }
}
