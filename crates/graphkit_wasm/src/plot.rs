//! Interactive plot surface exported to JS.

use crate::shared::{build_function, js_chain, js_error, options_from, serialize};
use graphkit_core::axes::AxesOptions;
use graphkit_core::engine::{BifurcationOptions, CobwebOptions, GraphOptions, TimeSeriesOptions};
use graphkit_core::{Axis, Color, PlotSurface, RecordingCanvas, SurfaceOptions, ZoomMode};
use js_sys::Float64Array;
use std::collections::BTreeMap;
use wasm_bindgen::prelude::*;

fn zoom_mode(mode: &str) -> Result<ZoomMode, JsValue> {
    match mode {
        "" | "rescale" => Ok(ZoomMode::Rescale),
        "redraw" => Ok(ZoomMode::Redraw),
        other => Err(JsValue::from_str(&format!("Unknown zoom mode: {}", other))),
    }
}

fn axis(name: &str) -> Result<Axis, JsValue> {
    match name {
        "x" => Ok(Axis::X),
        "y" => Ok(Axis::Y),
        other => Err(JsValue::from_str(&format!("Unknown axis: {}", other))),
    }
}

#[wasm_bindgen]
pub struct WasmPlot {
    surface: PlotSurface<RecordingCanvas>,
}

#[wasm_bindgen]
impl WasmPlot {
    /// `options` follows `SurfaceOptions`; missing fields take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<WasmPlot, JsValue> {
        console_error_panic_hook::set_once();
        let options: SurfaceOptions = options_from(options, "surface")?;
        let surface = PlotSurface::new(RecordingCanvas::new(), &options).map_err(js_error)?;
        Ok(WasmPlot { surface })
    }

    pub fn set_coords(
        &mut self,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        default: bool,
    ) -> Result<(), JsValue> {
        self.surface
            .set_coords(x1, y1, x2, y2, default)
            .map_err(js_error)
    }

    pub fn to_screen(&self, x: f64, y: f64) -> Float64Array {
        let (px, py) = self.surface.to_screen(x, y);
        Float64Array::from(&[px as f64, py as f64][..])
    }

    pub fn to_world(&self, px: f64, py: f64) -> Float64Array {
        let (x, y) = self.surface.to_world(px, py);
        Float64Array::from(&[x, y][..])
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.surface.contains(x, y)
    }

    pub fn span(&self, axis_name: &str) -> Result<f64, JsValue> {
        Ok(self.surface.span(axis(axis_name)?))
    }

    pub fn translate_length(&self, pixels: f64, axis_name: &str) -> Result<f64, JsValue> {
        Ok(self.surface.translate_length(pixels, axis(axis_name)?))
    }

    /// Installs `expression` with the given initial bindings on top of the
    /// surface variables.
    pub fn set_function(
        &mut self,
        expression: &str,
        var_names: Vec<String>,
        var_values: Vec<f64>,
    ) -> Result<(), JsValue> {
        let function = build_function(expression, &var_names, &var_values).map_err(js_chain)?;
        self.surface.set_function(function);
        for (name, value) in var_names.iter().zip(var_values) {
            self.surface.set_variable(name, value);
        }
        Ok(())
    }

    pub fn create_variable(&mut self, names: Vec<String>) {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.surface.create_variable(&names);
    }

    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.surface.set_variable(name, value);
    }

    pub fn delete_variable(&mut self, names: Vec<String>) -> Result<(), JsValue> {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.surface.delete_variable(&names).map_err(js_error)
    }

    pub fn set_main_variable(&mut self, name: &str) {
        self.surface.set_main_variable(name);
    }

    /// Variable bindings as a name-sorted object.
    pub fn variables(&self) -> Result<JsValue, JsValue> {
        let sorted: BTreeMap<&String, &f64> = self.surface.variables().iter().collect();
        serialize(&sorted)
    }

    pub fn evaluate(&mut self) -> Result<f64, JsValue> {
        self.surface.evaluate().map_err(js_error)
    }

    pub fn plot(&mut self, x: f64, y: f64, color: &str) -> Result<bool, JsValue> {
        let color = Color::new(color).map_err(js_error)?;
        Ok(self.surface.plot(x, y, color).is_some())
    }

    pub fn plot_point(
        &mut self,
        x: f64,
        y: f64,
        color: &str,
        radius: Option<f64>,
    ) -> Result<bool, JsValue> {
        let color = Color::new(color).map_err(js_error)?;
        Ok(self.surface.plot_point(x, y, color, radius).is_some())
    }

    pub fn graph(&mut self, options: JsValue) -> Result<(), JsValue> {
        let options: GraphOptions = options_from(options, "graph")?;
        self.surface.graph(options).map_err(js_error)
    }

    pub fn cobweb(&mut self, options: JsValue) -> Result<(), JsValue> {
        let options: CobwebOptions = options_from(options, "cobweb")?;
        self.surface.cobweb(options).map_err(js_error)
    }

    pub fn timeseries(&mut self, options: JsValue) -> Result<(), JsValue> {
        let options: TimeSeriesOptions = options_from(options, "time series")?;
        self.surface.timeseries(options).map_err(js_error)
    }

    pub fn bifurcation(&mut self, options: JsValue) -> Result<(), JsValue> {
        let options: BifurcationOptions = options_from(options, "bifurcation")?;
        self.surface.bifurcation(options).map_err(js_error)
    }

    pub fn draw_axes(&mut self, options: JsValue) -> Result<(), JsValue> {
        let options: AxesOptions = options_from(options, "axes")?;
        self.surface.draw_axes(options).map_err(js_error)
    }

    /// `mode` is `"rescale"` or `"redraw"`.
    pub fn zoom(&mut self, ratio_x: f64, ratio_y: f64, mode: &str) -> Result<(), JsValue> {
        let mode = zoom_mode(mode)?;
        self.surface
            .zoom(ratio_x, ratio_y, None, mode)
            .map_err(js_error)
    }

    pub fn zoom_at(
        &mut self,
        ratio_x: f64,
        ratio_y: f64,
        center_x: f64,
        center_y: f64,
        mode: &str,
    ) -> Result<(), JsValue> {
        let mode = zoom_mode(mode)?;
        self.surface
            .zoom(ratio_x, ratio_y, Some((center_x, center_y)), mode)
            .map_err(js_error)
    }

    pub fn reset_zoom(&mut self, mode: &str) -> Result<(), JsValue> {
        let mode = zoom_mode(mode)?;
        self.surface.reset_zoom(mode).map_err(js_error)
    }

    pub fn refresh(&mut self) -> Result<(), JsValue> {
        self.surface.refresh().map_err(js_error)
    }

    pub fn clear(&mut self) {
        self.surface.clear();
    }

    pub fn set_background(&mut self, color: &str) -> Result<(), JsValue> {
        let color = Color::new(color).map_err(js_error)?;
        self.surface.set_background(&color);
        Ok(())
    }

    pub fn record_click(&mut self, px: f64, py: f64) {
        self.surface.record_click(px, py);
    }

    /// Last click in world coordinates, consumed by the call.
    pub fn check_mouse(&mut self) -> Option<Vec<f64>> {
        self.surface.check_mouse().map(|(x, y)| vec![x, y])
    }

    pub fn mouse_position(&self, px: f64, py: f64) -> Float64Array {
        let (x, y) = self.surface.mouse_position(px, py);
        Float64Array::from(&[x, y][..])
    }

    pub fn item_count(&self) -> usize {
        self.surface.len()
    }

    /// Pixel-space shapes and styles for the page to paint.
    pub fn display_list(&self) -> Result<JsValue, JsValue> {
        serialize(&self.surface.canvas().display_list())
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::WasmPlot;
    use serde::Serialize;
    use serde_wasm_bindgen::to_value;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[derive(Serialize)]
    struct Bounds {
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    }

    fn plot() -> WasmPlot {
        let bounds = Bounds {
            x_min: -10.0,
            x_max: 10.0,
            y_min: -10.0,
            y_max: 10.0,
        };
        WasmPlot::new(to_value(&bounds).expect("bounds")).expect("plot")
    }

    #[wasm_bindgen_test]
    fn default_options_map_origin_to_center() {
        let plot = WasmPlot::new(JsValue::UNDEFINED).expect("plot");
        assert_eq!(plot.to_screen(0.0, 0.0).to_vec(), vec![100.0, 100.0]);
    }

    #[wasm_bindgen_test]
    fn graph_fills_display_list() {
        let mut plot = plot();
        plot.set_function("k x", vec!["k".to_string()], vec![0.5])
            .expect("function");
        plot.graph(JsValue::UNDEFINED).expect("graph");
        assert!(plot.item_count() > 0);
        assert!(plot.display_list().expect("display list").is_array());
    }

    #[wasm_bindgen_test]
    fn rejects_unknown_zoom_mode() {
        let mut plot = plot();
        let message = plot
            .zoom(2.0, 2.0, "spin")
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Unknown zoom mode"));
    }

    #[wasm_bindgen_test]
    fn reports_bad_expression() {
        let mut plot = plot();
        let message = plot
            .set_function("x $ 2", Vec::new(), Vec::new())
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Invalid expression"));
    }

    #[wasm_bindgen_test]
    fn click_is_consumed_once() {
        let mut plot = plot();
        plot.record_click(100.0, 100.0);
        assert_eq!(plot.check_mouse(), Some(vec![0.0, 0.0]));
        assert_eq!(plot.check_mouse(), None);
    }
}
