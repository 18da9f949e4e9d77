//! Stepped graph runner for progress reporting from JS.

use crate::shared::{build_function, js_chain, js_error, options_from, serialize};
use graphkit_core::engine::{
    BifurcationOptions, BifurcationSweep, CobwebIter, CobwebOptions, GraphOptions, LineSampler,
    TimeSeriesIter, TimeSeriesOptions,
};
use graphkit_core::{GraphKind, GraphRun, PlotEvent};
use log::debug;
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
struct GraphProgress {
    done: bool,
    current_step: usize,
    max_steps: usize,
    x: f64,
    y: f64,
}

#[derive(Serialize)]
struct GraphResult {
    kind: GraphKind,
    steps: usize,
    events: Vec<PlotEvent>,
}

struct GraphRunnerState {
    run: GraphRun,
    events: Vec<PlotEvent>,
    steps_done: usize,
    max_steps: usize,
    last: (f64, f64),
    done: bool,
}

impl GraphRunnerState {
    fn progress(&self) -> GraphProgress {
        GraphProgress {
            done: self.done,
            current_step: self.steps_done,
            max_steps: self.max_steps,
            x: self.last.0,
            y: self.last.1,
        }
    }
}

/// WASM-exported graph runner. Each `run_steps` call advances the graph by
/// a batch of samples or iterations and buffers the produced events.
#[wasm_bindgen]
pub struct WasmGraphRunner {
    state: Option<GraphRunnerState>,
}

#[wasm_bindgen]
impl WasmGraphRunner {
    /// `kind` is one of `line`, `cobweb`, `timeseries` or `bifurcation`;
    /// `options` follows the matching options type. `x_min..x_max` is the
    /// visible x range that line sampling, the cobweb identity line and
    /// marker sizes derive from.
    #[wasm_bindgen(constructor)]
    pub fn new(
        expression: &str,
        var_names: Vec<String>,
        var_values: Vec<f64>,
        main_variable: &str,
        kind: &str,
        options: JsValue,
        x_min: f64,
        x_max: f64,
    ) -> Result<WasmGraphRunner, JsValue> {
        console_error_panic_hook::set_once();

        if !(x_max > x_min) {
            return Err(JsValue::from_str("x_max must exceed x_min."));
        }
        let function = build_function(expression, &var_names, &var_values).map_err(js_chain)?;
        let domain = (x_min, x_max);

        let (run, max_steps) = match kind {
            "line" => {
                let options: GraphOptions = options_from(options, "graph")?;
                let sampler =
                    LineSampler::new(function, main_variable, domain, &options).map_err(js_error)?;
                let steps = sampler.len();
                (GraphRun::Line(sampler), steps)
            }
            "cobweb" => {
                let options: CobwebOptions = options_from(options, "cobweb")?;
                let cobweb =
                    CobwebIter::new(function, main_variable, domain, &options).map_err(js_error)?;
                (GraphRun::Cobweb(cobweb), options.iterations)
            }
            "timeseries" => {
                let options: TimeSeriesOptions = options_from(options, "time series")?;
                let series = TimeSeriesIter::new(function, main_variable, x_max - x_min, &options)
                    .map_err(js_error)?;
                (GraphRun::TimeSeries(series), options.iterations)
            }
            "bifurcation" => {
                let options: BifurcationOptions = options_from(options, "bifurcation")?;
                let sweep =
                    BifurcationSweep::new(function, main_variable, &options).map_err(js_error)?;
                let steps = sweep.len();
                (GraphRun::Bifurcation(sweep), steps)
            }
            other => return Err(JsValue::from_str(&format!("Unknown graph kind: {}", other))),
        };

        debug!("{} runner created with {} steps", run.kind(), max_steps);
        let events = run.reference().into_iter().collect();
        Ok(WasmGraphRunner {
            state: Some(GraphRunnerState {
                run,
                events,
                steps_done: 0,
                max_steps,
                last: (0.0, 0.0),
                done: max_steps == 0,
            }),
        })
    }

    pub fn is_done(&self) -> bool {
        self.state.as_ref().map_or(true, |state| state.done)
    }

    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;

        for _ in 0..batch_size {
            if state.done {
                break;
            }
            match state.run.next() {
                Some(step) => {
                    let step = step.map_err(|e| {
                        state.done = true;
                        js_error(e)
                    })?;
                    state.steps_done += 1;
                    state.last = (step.progress.x, step.progress.y);
                    state.events.extend(step.events);
                }
                None => state.done = true,
            }
        }
        if state.steps_done >= state.max_steps {
            state.done = true;
        }

        serialize(&state.progress())
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        serialize(&state.progress())
    }

    /// Every event produced so far, in draw order. The runner is consumed.
    pub fn get_result(&mut self) -> Result<JsValue, JsValue> {
        let state = self
            .state
            .take()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        let result = GraphResult {
            kind: state.run.kind(),
            steps: state.steps_done,
            events: state.events,
        };
        serialize(&result)
    }
}
