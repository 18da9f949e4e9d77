//! Graph engine: sampled line graphs, cobweb diagrams, time series and
//! bifurcation diagrams.
//!
//! Every algorithm is a resumable iterator ([`GraphRun`]) over [`GraphStep`]s.
//! A step carries the world-space [`PlotEvent`]s produced by one sample or
//! iteration together with its progress. The same iterator serves three
//! drivers:
//!
//! - the foreground path on [`PlotSurface`], which draws events as they arrive;
//! - [`BackgroundJob`], which collects them on a worker thread for the caller
//!   to draw after `join`;
//! - stepped hosts (the WASM runner) that pull a batch of steps per frame.
//!
//! Arithmetic failures of a single sample (division by zero, domain errors,
//! overflow) become marker events and the run continues. Anything else ends
//! the run with an error. Missing variable bindings are detected when a run
//! is built, before anything is drawn.

use crate::canvas::{Canvas, ItemId};
use crate::color::Color;
use crate::error::{EvalError, GraphError, Result};
use crate::function::Function;
use crate::primitives::Primitive;
use crate::sampling::{dec_range, entropy_seed, random_start, round_to, DecRange, MAX_DECIMALS};
use crate::surface::PlotSurface;
use crate::traits::IteratedMap;
use crate::transform::Axis;
use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Samples per domain width when no interval is given.
pub const DEFAULT_SAMPLES: f64 = 1000.0;
/// Marker radius as a multiple of the sampling interval.
pub const MARKER_SCALE: f64 = 10.0;
/// Upper bound on the samples of one line graph.
pub const MAX_SAMPLES: f64 = 1e7;

/// A world-space drawing instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotEvent {
    /// Part of the graph polyline or cobweb.
    Segment { from: (f64, f64), to: (f64, f64) },
    /// The cobweb identity line, drawn in the reference color.
    Reference { from: (f64, f64), to: (f64, f64) },
    /// Outline circle standing in for a sample that failed to evaluate.
    Marker { at: (f64, f64), radius: f64 },
    /// Filled time-series point.
    Dot { at: (f64, f64) },
    /// Single bifurcation pixel.
    Pixel { at: (f64, f64) },
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub x: f64,
    pub y: f64,
    /// Share of the run completed, in `[0, 1]`.
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStep {
    pub events: Vec<PlotEvent>,
    pub progress: Progress,
}

/// Called with `(x, y, fraction)` after every step.
#[derive(Clone)]
pub struct ProgressCallback(Arc<dyn Fn(f64, f64, f64) + Send + Sync>);

impl ProgressCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(f64, f64, f64) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub fn call(&self, progress: &Progress) {
        (self.0)(progress.x, progress.y, progress.fraction)
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressCallback")
    }
}

/// Predicate a rounded bifurcation value must pass to be plotted.
#[derive(Clone)]
pub struct Verifier(Arc<dyn Fn(f64) -> bool + Send + Sync>);

impl Verifier {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(f64) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub fn accepts(&self, value: f64) -> bool {
        (self.0)(value)
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Verifier")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOptions {
    /// Sampling step. Defaults to the x span over 1000.
    pub interval: Option<f64>,
    /// Explicit sample positions replacing the stepped domain.
    pub values: Vec<f64>,
    pub color: Color,
    #[serde(skip)]
    pub update: Option<ProgressCallback>,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            interval: None,
            values: Vec::new(),
            color: Color::red(),
            update: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CobwebOptions {
    /// Seed of the recurrence. Drawn uniformly from `[0, 1)` when unset.
    pub starting_value: Option<f64>,
    pub iterations: usize,
    pub color: Color,
    /// Color of the identity line.
    pub reference_color: Color,
    #[serde(skip)]
    pub update: Option<ProgressCallback>,
}

impl Default for CobwebOptions {
    fn default() -> Self {
        Self {
            starting_value: None,
            iterations: 100,
            color: Color::red(),
            reference_color: Color::blue(),
            update: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesOptions {
    pub starting_value: Option<f64>,
    pub iterations: usize,
    /// Sets the marker radius (`interval * 10`). Defaults to the x span over 1000.
    pub interval: Option<f64>,
    pub color: Color,
    #[serde(skip)]
    pub update: Option<ProgressCallback>,
}

impl Default for TimeSeriesOptions {
    fn default() -> Self {
        Self {
            starting_value: None,
            iterations: 1000,
            interval: None,
            color: Color::red(),
            update: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BifurcationOptions {
    /// Parameter swept across `start..stop`.
    pub iter_variable: String,
    pub start: f64,
    pub stop: f64,
    /// Number of parameter samples.
    pub iterations: usize,
    pub max_period: usize,
    pub transient_length: usize,
    /// Decimal places kept before deduplicating attractor values.
    pub roundoff: u32,
    /// Seed of the generator drawing each sample's starting point.
    pub seed: Option<u64>,
    pub color: Color,
    /// Flushes per run when autoflush is off.
    pub flush_ratio: usize,
    #[serde(skip)]
    pub verify: Option<Verifier>,
    #[serde(skip)]
    pub update: Option<ProgressCallback>,
}

impl Default for BifurcationOptions {
    fn default() -> Self {
        Self {
            iter_variable: "r".to_string(),
            start: 0.0,
            stop: 4.0,
            iterations: 1000,
            max_period: 256,
            transient_length: 1000,
            roundoff: 5,
            seed: None,
            color: Color::red(),
            flush_ratio: 100,
            verify: None,
            update: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphKind {
    Line,
    Cobweb,
    TimeSeries,
    Bifurcation,
}

impl GraphKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GraphKind::Line => "line",
            GraphKind::Cobweb => "cobweb",
            GraphKind::TimeSeries => "timeseries",
            GraphKind::Bifurcation => "bifurcation",
        }
    }
}

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of the last graph, replayed by `refresh`. Random seeds are
/// stored resolved so a replay draws the same picture.
#[derive(Debug, Clone)]
pub(crate) enum GraphRecord {
    Line(GraphOptions),
    Cobweb(CobwebOptions),
    TimeSeries(TimeSeriesOptions),
    Bifurcation(BifurcationOptions),
}

impl GraphRecord {
    pub(crate) fn kind(&self) -> GraphKind {
        match self {
            GraphRecord::Line(_) => GraphKind::Line,
            GraphRecord::Cobweb(_) => GraphKind::Cobweb,
            GraphRecord::TimeSeries(_) => GraphKind::TimeSeries,
            GraphRecord::Bifurcation(_) => GraphKind::Bifurcation,
        }
    }
}

/// Binds `names` (to zero) and checks every free variable has a value.
fn prepare(function: &mut Function, names: &[&str]) -> Result<(), EvalError> {
    for name in names {
        function.set_variable(name, 0.0);
    }
    function.check_bound()
}

/// Evaluates with `variable = x`. Non-finite results count as overflow.
fn sample(function: &mut Function, variable: &str, x: f64) -> Result<f64, EvalError> {
    let y = function.as_map(variable).apply(x)?;
    if y.is_finite() {
        Ok(y)
    } else {
        Err(EvalError::Overflow)
    }
}

fn check_interval(interval: f64) -> Result<()> {
    if !interval.is_finite() || interval <= 0.0 {
        return Err(GraphError::config(format!(
            "Sampling interval must be positive, got {interval}."
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Samples {
    Values(std::vec::IntoIter<f64>),
    Range(std::iter::Chain<std::iter::Once<f64>, DecRange>),
}

impl Iterator for Samples {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        match self {
            Samples::Values(values) => values.next(),
            Samples::Range(range) => range.next(),
        }
    }
}

/// Direct graph: joins consecutive `(x, f(x))` samples with segments.
/// Stepped samples are generated lazily.
#[derive(Debug, Clone)]
pub struct LineSampler {
    function: Function,
    variable: String,
    samples: Samples,
    total: usize,
    taken: usize,
    previous: Option<(f64, f64)>,
    last_y: Option<f64>,
    marker_radius: f64,
    done: bool,
}

impl LineSampler {
    /// Samples `domain` from its lower end in steps of `interval`, or the
    /// explicit `values` when given. More than [`MAX_SAMPLES`] steps is a
    /// configuration error.
    pub fn new(
        mut function: Function,
        variable: &str,
        domain: (f64, f64),
        options: &GraphOptions,
    ) -> Result<Self> {
        prepare(&mut function, &[variable])?;
        let interval = options
            .interval
            .unwrap_or((domain.1 - domain.0) / DEFAULT_SAMPLES);
        check_interval(interval)?;
        let (samples, total) = if options.values.is_empty() {
            let steps = ((domain.1 - domain.0) / interval).ceil().max(0.0);
            if steps > MAX_SAMPLES {
                return Err(GraphError::config(format!(
                    "Sampling interval {interval} needs {steps} samples over {}..{}, \
                     more than {MAX_SAMPLES}.",
                    domain.0, domain.1
                )));
            }
            let range = std::iter::once(domain.0).chain(dec_range(domain.0, domain.1, interval)?);
            (Samples::Range(range), steps as usize + 1)
        } else {
            let values = options.values.clone();
            let total = values.len();
            (Samples::Values(values.into_iter()), total)
        };
        Ok(Self {
            function,
            variable: variable.to_string(),
            samples,
            total,
            taken: 0,
            previous: None,
            last_y: None,
            marker_radius: interval * MARKER_SCALE,
            done: false,
        })
    }

    /// Planned number of samples.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl Iterator for LineSampler {
    type Item = Result<GraphStep, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let x = self.samples.next()?;
        self.taken += 1;
        let fraction = (self.taken as f64 / self.total as f64).min(1.0);
        match sample(&mut self.function, &self.variable, x) {
            Ok(y) => {
                let events = self
                    .previous
                    .map(|from| PlotEvent::Segment { from, to: (x, y) })
                    .into_iter()
                    .collect();
                self.previous = Some((x, y));
                self.last_y = Some(y);
                Some(Ok(GraphStep {
                    events,
                    progress: Progress { x, y, fraction },
                }))
            }
            Err(err) if err.is_recoverable() => {
                let y = self.last_y.unwrap_or(0.0);
                trace!("marker at x = {x}: {err}");
                self.previous = None;
                Some(Ok(GraphStep {
                    events: vec![PlotEvent::Marker {
                        at: (x, y),
                        radius: self.marker_radius,
                    }],
                    progress: Progress { x, y, fraction },
                }))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Cobweb diagram of `x_{n+1} = f(x_n)`.
#[derive(Debug, Clone)]
pub struct CobwebIter {
    function: Function,
    variable: String,
    x: f64,
    iteration: usize,
    iterations: usize,
    reference: PlotEvent,
    marker_radius: f64,
    done: bool,
}

impl CobwebIter {
    /// `domain` is the x range the identity line spans. An unset starting
    /// value is drawn from a fresh random seed.
    pub fn new(
        mut function: Function,
        variable: &str,
        domain: (f64, f64),
        options: &CobwebOptions,
    ) -> Result<Self> {
        prepare(&mut function, &[variable])?;
        let x = options
            .starting_value
            .unwrap_or_else(random_start);
        Ok(Self {
            function,
            variable: variable.to_string(),
            x,
            iteration: 0,
            iterations: options.iterations,
            reference: PlotEvent::Reference {
                from: (domain.0, domain.0),
                to: (domain.1, domain.1),
            },
            marker_radius: (domain.1 - domain.0) / DEFAULT_SAMPLES * MARKER_SCALE,
            done: false,
        })
    }

    pub fn reference(&self) -> &PlotEvent {
        &self.reference
    }

    pub fn starting_value(&self) -> f64 {
        self.x
    }
}

impl Iterator for CobwebIter {
    type Item = Result<GraphStep, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.iteration >= self.iterations {
            return None;
        }
        self.iteration += 1;
        let fraction = self.iteration as f64 / self.iterations as f64;
        let start = self.x;
        match sample(&mut self.function, &self.variable, start) {
            Ok(next) => {
                self.x = next;
                Some(Ok(GraphStep {
                    events: vec![
                        PlotEvent::Segment {
                            from: (start, start),
                            to: (start, next),
                        },
                        PlotEvent::Segment {
                            from: (start, next),
                            to: (next, next),
                        },
                    ],
                    progress: Progress {
                        x: start,
                        y: next,
                        fraction,
                    },
                }))
            }
            Err(err) if err.is_recoverable() => {
                trace!("cobweb marker at {start}: {err}");
                Some(Ok(GraphStep {
                    events: vec![PlotEvent::Marker {
                        at: (start, start),
                        radius: self.marker_radius,
                    }],
                    progress: Progress {
                        x: start,
                        y: start,
                        fraction,
                    },
                }))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Time series `(n, x_{n+1})` of the recurrence.
#[derive(Debug, Clone)]
pub struct TimeSeriesIter {
    function: Function,
    variable: String,
    x: f64,
    iteration: usize,
    iterations: usize,
    marker_radius: f64,
    done: bool,
}

impl TimeSeriesIter {
    pub fn new(
        mut function: Function,
        variable: &str,
        x_span: f64,
        options: &TimeSeriesOptions,
    ) -> Result<Self> {
        prepare(&mut function, &[variable])?;
        let interval = options.interval.unwrap_or(x_span / DEFAULT_SAMPLES);
        check_interval(interval)?;
        let x = options
            .starting_value
            .unwrap_or_else(random_start);
        Ok(Self {
            function,
            variable: variable.to_string(),
            x,
            iteration: 0,
            iterations: options.iterations,
            marker_radius: interval * MARKER_SCALE,
            done: false,
        })
    }
}

impl Iterator for TimeSeriesIter {
    type Item = Result<GraphStep, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.iteration >= self.iterations {
            return None;
        }
        let n = self.iteration as f64;
        self.iteration += 1;
        let fraction = self.iteration as f64 / self.iterations as f64;
        let start = self.x;
        let (event, y) = match sample(&mut self.function, &self.variable, start) {
            Ok(next) => {
                self.x = next;
                (PlotEvent::Dot { at: (n, next) }, next)
            }
            // keep iterating from the last valid value
            Err(err) if err.is_recoverable() => {
                trace!("time series marker at n = {n}: {err}");
                (
                    PlotEvent::Marker {
                        at: (n, start),
                        radius: self.marker_radius,
                    },
                    start,
                )
            }
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        Some(Ok(GraphStep {
            events: vec![event],
            progress: Progress {
                x: start,
                y,
                fraction,
            },
        }))
    }
}

/// Bifurcation diagram: distinct long-run values of the recurrence for each
/// sampled parameter value.
///
/// Attractor detection rounds the collected iterates to `roundoff` decimals
/// and deduplicates them. This is a visual approximation. How many decimals
/// separate distinct cycle points is left to the caller.
#[derive(Debug, Clone)]
pub struct BifurcationSweep {
    function: Function,
    variable: String,
    parameter: String,
    parameters: Vec<f64>,
    next: usize,
    rng: StdRng,
    transient_length: usize,
    max_period: usize,
    roundoff: u32,
    verify: Option<Verifier>,
    done: bool,
}

impl BifurcationSweep {
    /// An unset seed is drawn from process entropy.
    pub fn new(
        mut function: Function,
        variable: &str,
        options: &BifurcationOptions,
    ) -> Result<Self> {
        if options.iter_variable.is_empty() {
            return Err(GraphError::config("Bifurcation needs a parameter variable."));
        }
        if options.iter_variable == variable {
            return Err(GraphError::config(format!(
                "Parameter {:?} cannot be the iterated variable.",
                options.iter_variable
            )));
        }
        if !(options.stop > options.start) || options.iterations == 0 {
            return Err(GraphError::config(format!(
                "Parameter range {}..{} with {} samples is empty.",
                options.start, options.stop, options.iterations
            )));
        }
        if options.roundoff > MAX_DECIMALS as u32 {
            return Err(GraphError::config(format!(
                "Roundoff must be at most {MAX_DECIMALS} decimals, got {}.",
                options.roundoff
            )));
        }
        prepare(&mut function, &[variable, options.iter_variable.as_str()])?;
        let step = (options.stop - options.start) / options.iterations as f64;
        let parameters = dec_range(options.start, options.stop, step)?.collect();
        Ok(Self {
            function,
            variable: variable.to_string(),
            parameter: options.iter_variable.clone(),
            parameters,
            next: 0,
            rng: StdRng::seed_from_u64(options.seed.unwrap_or_else(entropy_seed)),
            transient_length: options.transient_length,
            max_period: options.max_period,
            roundoff: options.roundoff,
            verify: options.verify.clone(),
            done: false,
        })
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Rounded, deduplicated and verified long-run values at `parameter`.
    /// A recoverable failure during burn-in yields no values; one during
    /// collection keeps what was collected so far.
    fn attractor(&mut self, parameter: f64) -> Result<Vec<f64>, EvalError> {
        self.function
            .as_map(&self.variable)
            .set_parameter(&self.parameter, parameter);
        let mut x: f64 = self.rng.gen();
        for _ in 0..self.transient_length {
            match sample(&mut self.function, &self.variable, x) {
                Ok(next) => x = next,
                Err(err) if err.is_recoverable() => return Ok(Vec::new()),
                Err(err) => return Err(err),
            }
        }
        let mut values = Vec::with_capacity(self.max_period + 1);
        for _ in 0..=self.max_period {
            match sample(&mut self.function, &self.variable, x) {
                Ok(next) => {
                    x = next;
                    values.push(round_to(next, self.roundoff as i32));
                }
                Err(err) if err.is_recoverable() => break,
                Err(err) => return Err(err),
            }
        }
        values.retain(|v| v.is_finite());
        values.sort_by(f64::total_cmp);
        values.dedup();
        if let Some(verify) = &self.verify {
            values.retain(|v| verify.accepts(*v));
        }
        Ok(values)
    }
}

impl Iterator for BifurcationSweep {
    type Item = Result<GraphStep, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let parameter = *self.parameters.get(self.next)?;
        self.next += 1;
        let fraction = self.next as f64 / self.parameters.len() as f64;
        match self.attractor(parameter) {
            Ok(values) => Some(Ok(GraphStep {
                progress: Progress {
                    x: parameter,
                    y: values.last().copied().unwrap_or(0.0),
                    fraction,
                },
                events: values
                    .into_iter()
                    .map(|y| PlotEvent::Pixel { at: (parameter, y) })
                    .collect(),
            })),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Any of the four graph algorithms.
#[derive(Debug, Clone)]
pub enum GraphRun {
    Line(LineSampler),
    Cobweb(CobwebIter),
    TimeSeries(TimeSeriesIter),
    Bifurcation(BifurcationSweep),
}

impl GraphRun {
    pub fn kind(&self) -> GraphKind {
        match self {
            GraphRun::Line(_) => GraphKind::Line,
            GraphRun::Cobweb(_) => GraphKind::Cobweb,
            GraphRun::TimeSeries(_) => GraphKind::TimeSeries,
            GraphRun::Bifurcation(_) => GraphKind::Bifurcation,
        }
    }

    /// Event drawn once before the first step (the cobweb identity line).
    pub fn reference(&self) -> Option<PlotEvent> {
        match self {
            GraphRun::Cobweb(cobweb) => Some(cobweb.reference().clone()),
            _ => None,
        }
    }

    /// Runs to completion and returns every event, reference first.
    pub fn collect_events(mut self) -> Result<Vec<PlotEvent>, EvalError> {
        let mut events: Vec<PlotEvent> = self.reference().into_iter().collect();
        for step in &mut self {
            events.extend(step?.events);
        }
        Ok(events)
    }
}

impl Iterator for GraphRun {
    type Item = Result<GraphStep, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            GraphRun::Line(run) => run.next(),
            GraphRun::Cobweb(run) => run.next(),
            GraphRun::TimeSeries(run) => run.next(),
            GraphRun::Bifurcation(run) => run.next(),
        }
    }
}

/// Events produced off-thread, with the colors to draw them in.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotBuffer {
    pub events: Vec<PlotEvent>,
    pub color: Color,
    pub reference_color: Color,
}

/// A graph run executing on a worker thread.
///
/// The worker only fills an event buffer. Drawing happens when the owner of
/// the surface joins the job and passes the buffer to
/// [`PlotSurface::render_buffer`]. There is no cancellation.
#[derive(Debug)]
pub struct BackgroundJob {
    kind: GraphKind,
    handle: JoinHandle<Result<Vec<PlotEvent>, EvalError>>,
    color: Color,
    reference_color: Color,
}

impl BackgroundJob {
    /// Spawns `run` without its reference event, which the caller draws up front.
    pub fn spawn(
        run: GraphRun,
        color: Color,
        reference_color: Color,
        update: Option<ProgressCallback>,
    ) -> Self {
        let kind = run.kind();
        debug!("spawning background {kind} run");
        let handle = thread::spawn(move || {
            let mut events = Vec::new();
            for step in run {
                let step = step?;
                if let Some(update) = &update {
                    update.call(&step.progress);
                }
                events.extend(step.events);
            }
            Ok(events)
        });
        Self {
            kind,
            handle,
            color,
            reference_color,
        }
    }

    pub fn kind(&self) -> GraphKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the worker is done and returns its buffer.
    pub fn join(self) -> Result<PlotBuffer> {
        let events = self
            .handle
            .join()
            .map_err(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                GraphError::WorkerPanicked(message)
            })??;
        debug!("background {} run produced {} events", self.kind, events.len());
        Ok(PlotBuffer {
            events,
            color: self.color,
            reference_color: self.reference_color,
        })
    }
}

impl<C: Canvas> PlotSurface<C> {
    fn domain(&self) -> (f64, f64) {
        let (min, max) = (self.transform.world_min(), self.transform.world_max());
        (min.x, max.x)
    }

    /// The active function seeded with the surface variables.
    fn graph_function(&self) -> Result<Function> {
        let mut function = self
            .function
            .clone()
            .ok_or_else(|| GraphError::config("No function set."))?;
        for (name, value) in &self.variables {
            function.set_variable(name, *value);
        }
        Ok(function)
    }

    pub fn line_run(&self, options: &GraphOptions) -> Result<GraphRun> {
        let function = self.graph_function()?;
        Ok(GraphRun::Line(LineSampler::new(
            function,
            &self.main_variable,
            self.domain(),
            options,
        )?))
    }

    pub fn cobweb_run(&self, options: &CobwebOptions) -> Result<GraphRun> {
        let function = self.graph_function()?;
        Ok(GraphRun::Cobweb(CobwebIter::new(
            function,
            &self.main_variable,
            self.domain(),
            options,
        )?))
    }

    pub fn timeseries_run(&self, options: &TimeSeriesOptions) -> Result<GraphRun> {
        let function = self.graph_function()?;
        Ok(GraphRun::TimeSeries(TimeSeriesIter::new(
            function,
            &self.main_variable,
            self.transform.span(Axis::X),
            options,
        )?))
    }

    pub fn bifurcation_run(&self, options: &BifurcationOptions) -> Result<GraphRun> {
        let function = self.graph_function()?;
        Ok(GraphRun::Bifurcation(BifurcationSweep::new(
            function,
            &self.main_variable,
            options,
        )?))
    }

    /// Graphs the active function over the current x range.
    pub fn graph(&mut self, options: GraphOptions) -> Result<()> {
        let run = self.line_run(&options)?;
        self.drive(run, &options.color, &options.color, options.update.as_ref(), None)?;
        self.graphed = Some(GraphRecord::Line(options));
        Ok(())
    }

    pub fn cobweb(&mut self, options: CobwebOptions) -> Result<()> {
        let options = resolve_cobweb(options);
        let run = self.cobweb_run(&options)?;
        self.drive(
            run,
            &options.color,
            &options.reference_color,
            options.update.as_ref(),
            None,
        )?;
        self.graphed = Some(GraphRecord::Cobweb(options));
        Ok(())
    }

    pub fn timeseries(&mut self, options: TimeSeriesOptions) -> Result<()> {
        let options = resolve_timeseries(options);
        let run = self.timeseries_run(&options)?;
        self.drive(run, &options.color, &options.color, options.update.as_ref(), None)?;
        self.graphed = Some(GraphRecord::TimeSeries(options));
        Ok(())
    }

    pub fn bifurcation(&mut self, options: BifurcationOptions) -> Result<()> {
        let options = resolve_bifurcation(options);
        let run = self.bifurcation_run(&options)?;
        let flush_every = (options.iterations / options.flush_ratio.max(1)).max(1);
        self.drive(
            run,
            &options.color,
            &options.color,
            options.update.as_ref(),
            Some(flush_every),
        )?;
        self.graphed = Some(GraphRecord::Bifurcation(options));
        Ok(())
    }

    /// Runs the direct graph on a worker thread. `refresh` replays it in
    /// the foreground.
    pub fn spawn_graph(&mut self, options: GraphOptions) -> Result<BackgroundJob> {
        let run = self.line_run(&options)?;
        let job = BackgroundJob::spawn(
            run,
            options.color.clone(),
            options.color.clone(),
            options.update.clone(),
        );
        self.graphed = Some(GraphRecord::Line(options));
        Ok(job)
    }

    /// Draws the identity line now and iterates the cobweb on a worker thread.
    pub fn spawn_cobweb(&mut self, options: CobwebOptions) -> Result<BackgroundJob> {
        let options = resolve_cobweb(options);
        let run = self.cobweb_run(&options)?;
        if let Some(reference) = run.reference() {
            self.render_event(&reference, &options.color, &options.reference_color);
        }
        let job = BackgroundJob::spawn(
            run,
            options.color.clone(),
            options.reference_color.clone(),
            options.update.clone(),
        );
        self.graphed = Some(GraphRecord::Cobweb(options));
        Ok(job)
    }

    pub fn spawn_timeseries(&mut self, options: TimeSeriesOptions) -> Result<BackgroundJob> {
        let options = resolve_timeseries(options);
        let run = self.timeseries_run(&options)?;
        let job = BackgroundJob::spawn(
            run,
            options.color.clone(),
            options.color.clone(),
            options.update.clone(),
        );
        self.graphed = Some(GraphRecord::TimeSeries(options));
        Ok(job)
    }

    pub fn spawn_bifurcation(&mut self, options: BifurcationOptions) -> Result<BackgroundJob> {
        let options = resolve_bifurcation(options);
        let run = self.bifurcation_run(&options)?;
        let job = BackgroundJob::spawn(
            run,
            options.color.clone(),
            options.color.clone(),
            options.update.clone(),
        );
        self.graphed = Some(GraphRecord::Bifurcation(options));
        Ok(job)
    }

    pub(crate) fn replay(&mut self, record: GraphRecord) -> Result<()> {
        match record {
            GraphRecord::Line(options) => self.graph(options),
            GraphRecord::Cobweb(options) => self.cobweb(options),
            GraphRecord::TimeSeries(options) => self.timeseries(options),
            GraphRecord::Bifurcation(options) => self.bifurcation(options),
        }
    }

    /// Draws a run step by step. With autoflush off, `flush_every` forces a
    /// flush after that many steps. A run that aborts takes back everything
    /// it drew, leaving the surface as it was before the call.
    fn drive(
        &mut self,
        mut run: GraphRun,
        color: &Color,
        reference_color: &Color,
        update: Option<&ProgressCallback>,
        flush_every: Option<usize>,
    ) -> Result<()> {
        let kind = run.kind();
        debug!("drawing {kind} graph");
        let mut drawn: Vec<ItemId> = Vec::new();
        if let Some(reference) = run.reference() {
            drawn.extend(self.render_event(&reference, color, reference_color));
        }
        let mut steps = 0usize;
        for step in &mut run {
            let step = match step {
                Ok(step) => step,
                Err(err) => {
                    warn!("{kind} graph aborted after {steps} steps: {err}");
                    for id in drawn {
                        self.undraw(id);
                    }
                    return Err(err.into());
                }
            };
            for event in &step.events {
                drawn.extend(self.render_event(event, color, reference_color));
            }
            if let Some(update) = update {
                update.call(&step.progress);
            }
            steps += 1;
            if let Some(every) = flush_every {
                if !self.autoflush && steps % every == 0 {
                    self.flush();
                }
            }
        }
        debug!("{kind} graph finished after {steps} steps");
        Ok(())
    }

    pub fn render_events(&mut self, events: &[PlotEvent], color: &Color, reference_color: &Color) {
        for event in events {
            self.render_event(event, color, reference_color);
        }
    }

    /// Draws the buffer of a joined [`BackgroundJob`].
    pub fn render_buffer(&mut self, buffer: &PlotBuffer) {
        self.render_events(&buffer.events, &buffer.color, &buffer.reference_color);
    }

    fn render_event(
        &mut self,
        event: &PlotEvent,
        color: &Color,
        reference_color: &Color,
    ) -> Option<ItemId> {
        match *event {
            PlotEvent::Segment { from, to } => Some(
                self.draw(Primitive::line(from.0, from.1, to.0, to.1).with_color(color.clone())),
            ),
            PlotEvent::Reference { from, to } => Some(self.draw(
                Primitive::line(from.0, from.1, to.0, to.1).with_color(reference_color.clone()),
            )),
            PlotEvent::Marker { at, radius } => Some(
                self.draw(Primitive::circle(at.0, at.1, radius).with_outline(color.clone())),
            ),
            PlotEvent::Dot { at } => self.plot_point(at.0, at.1, color.clone(), None),
            PlotEvent::Pixel { at } => self.plot(at.0, at.1, color.clone()),
        }
    }
}

fn resolve_cobweb(mut options: CobwebOptions) -> CobwebOptions {
    options
        .starting_value
        .get_or_insert_with(random_start);
    options
}

fn resolve_timeseries(mut options: TimeSeriesOptions) -> TimeSeriesOptions {
    options
        .starting_value
        .get_or_insert_with(random_start);
    options
}

fn resolve_bifurcation(mut options: BifurcationOptions) -> BifurcationOptions {
    options.seed.get_or_insert_with(entropy_seed);
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::RecordingCanvas;
    use crate::primitives::ScreenShape;
    use crate::surface::SurfaceOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn function(source: &str) -> Function {
        Function::parse(source).expect("parse")
    }

    fn segments(events: &[PlotEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, PlotEvent::Segment { .. }))
            .count()
    }

    fn surface() -> PlotSurface<RecordingCanvas> {
        let options = SurfaceOptions {
            x_min: -1.0,
            x_max: 1.0,
            y_min: -1.0,
            y_max: 1.0,
            ..SurfaceOptions::default()
        };
        PlotSurface::new(RecordingCanvas::new(), &options).expect("surface")
    }

    #[test]
    fn line_sampler_marks_singularity_and_restarts_polyline() {
        let options = GraphOptions {
            interval: Some(0.5),
            ..GraphOptions::default()
        };
        let sampler = LineSampler::new(function("1/x"), "x", (-1.0, 1.0), &options).unwrap();
        assert_eq!(sampler.len(), 5);
        let events = GraphRun::Line(sampler).collect_events().expect("completes");
        assert_eq!(segments(&events), 2);
        assert!(events.contains(&PlotEvent::Marker {
            at: (0.0, -2.0),
            radius: 5.0
        }));
    }

    #[test]
    fn line_sampler_uses_explicit_values() {
        let options = GraphOptions {
            values: vec![0.0, 1.0, 2.0],
            ..GraphOptions::default()
        };
        let steps: Vec<GraphStep> = LineSampler::new(function("2x"), "x", (-1.0, 1.0), &options)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[2].events,
            vec![PlotEvent::Segment {
                from: (1.0, 2.0),
                to: (2.0, 4.0)
            }]
        );
        assert_eq!(steps[2].progress.fraction, 1.0);
    }

    #[test]
    fn undefined_variable_fails_before_any_step() {
        let err = LineSampler::new(function("a x"), "x", (-1.0, 1.0), &GraphOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::Evaluation(EvalError::UndefinedVariable(ref name)) if name == "a"
        ));
    }

    #[test]
    fn callable_failure_aborts_the_run() {
        let failing = Function::from_callable(|_| Err(EvalError::Callable("boom".into())));
        let mut sampler =
            LineSampler::new(failing, "x", (0.0, 1.0), &GraphOptions::default()).unwrap();
        assert!(matches!(sampler.next(), Some(Err(EvalError::Callable(_)))));
        assert!(sampler.next().is_none());
    }

    #[test]
    fn cobweb_yields_two_segments_per_iteration() {
        let options = CobwebOptions {
            starting_value: Some(0.5),
            iterations: 50,
            ..CobwebOptions::default()
        };
        let run = CobwebIter::new(function("3.7x(1-x)"), "x", (0.0, 1.0), &options).unwrap();
        let steps: Vec<GraphStep> = run.collect::<Result<_, _>>().unwrap();
        assert_eq!(steps.len(), 50);
        assert!(steps.iter().all(|step| segments(&step.events) == 2));
        assert_eq!(
            steps[0].events[0],
            PlotEvent::Segment {
                from: (0.5, 0.5),
                to: (0.5, 0.925)
            }
        );
    }

    #[test]
    fn time_series_keeps_last_value_after_failure() {
        let options = TimeSeriesOptions {
            starting_value: Some(0.0),
            iterations: 3,
            ..TimeSeriesOptions::default()
        };
        let events = GraphRun::TimeSeries(
            TimeSeriesIter::new(function("1/x"), "x", 2.0, &options).unwrap(),
        )
        .collect_events()
        .unwrap();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| matches!(e, PlotEvent::Marker { at: (_, y), .. } if *y == 0.0)));
    }

    #[test]
    fn time_series_plots_iterates_against_index() {
        let options = TimeSeriesOptions {
            starting_value: Some(1.0),
            iterations: 3,
            ..TimeSeriesOptions::default()
        };
        let events = GraphRun::TimeSeries(
            TimeSeriesIter::new(function("x/2"), "x", 2.0, &options).unwrap(),
        )
        .collect_events()
        .unwrap();
        assert_eq!(
            events,
            vec![
                PlotEvent::Dot { at: (0.0, 0.5) },
                PlotEvent::Dot { at: (1.0, 0.25) },
                PlotEvent::Dot { at: (2.0, 0.125) },
            ]
        );
    }

    #[test]
    fn bifurcation_finds_fixed_points() {
        let options = BifurcationOptions {
            start: 2.4,
            stop: 2.6,
            iterations: 2,
            transient_length: 200,
            max_period: 8,
            roundoff: 3,
            seed: Some(7),
            ..BifurcationOptions::default()
        };
        let events = GraphRun::Bifurcation(
            BifurcationSweep::new(function("r x (1 - x)"), "x", &options).unwrap(),
        )
        .collect_events()
        .unwrap();
        assert_eq!(
            events,
            vec![
                PlotEvent::Pixel { at: (2.5, 0.6) },
                PlotEvent::Pixel { at: (2.6, 0.615) },
            ]
        );
    }

    #[test]
    fn bifurcation_applies_verify() {
        let options = BifurcationOptions {
            start: 2.4,
            stop: 2.6,
            iterations: 2,
            transient_length: 200,
            max_period: 8,
            roundoff: 3,
            seed: Some(7),
            verify: Some(Verifier::new(|y| y > 0.61)),
            ..BifurcationOptions::default()
        };
        let events = GraphRun::Bifurcation(
            BifurcationSweep::new(function("r x (1 - x)"), "x", &options).unwrap(),
        )
        .collect_events()
        .unwrap();
        assert_eq!(events, vec![PlotEvent::Pixel { at: (2.6, 0.615) }]);
    }

    #[test]
    fn bifurcation_rejects_empty_range() {
        let options = BifurcationOptions {
            start: 1.0,
            stop: 1.0,
            ..BifurcationOptions::default()
        };
        assert!(BifurcationSweep::new(function("r x"), "x", &options).is_err());
    }

    #[test]
    fn bifurcation_rejects_roundoff_past_float_precision() {
        let options = BifurcationOptions {
            roundoff: 400,
            ..BifurcationOptions::default()
        };
        let err = BifurcationSweep::new(function("r x (1 - x)"), "x", &options).unwrap_err();
        assert!(matches!(err, GraphError::Configuration(ref msg) if msg.contains("Roundoff")));
    }

    #[test]
    fn line_sampler_rejects_interval_needing_too_many_samples() {
        let options = GraphOptions {
            interval: Some(1e-9),
            ..GraphOptions::default()
        };
        let err = LineSampler::new(function("x"), "x", (-100.0, 100.0), &options).unwrap_err();
        assert!(matches!(err, GraphError::Configuration(ref msg) if msg.contains("samples")));
    }

    #[test]
    fn line_sampler_counts_range_without_collecting_it() {
        let options = GraphOptions {
            interval: Some(0.5),
            ..GraphOptions::default()
        };
        let sampler = LineSampler::new(function("x"), "x", (0.0, 1e6), &options).unwrap();
        assert_eq!(sampler.len(), 2_000_001);
    }

    #[test]
    fn aborted_graph_takes_back_what_it_drew() {
        let mut surface = surface();
        surface
            .draw_axes(crate::axes::AxesOptions {
                labels: false,
                ..Default::default()
            })
            .unwrap();
        let before = surface.len();
        let calls = AtomicUsize::new(0);
        surface.set_function(Function::from_callable(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Ok(0.0)
            } else {
                Err(EvalError::Callable("lost connection".into()))
            }
        }));
        let err = surface
            .graph(GraphOptions {
                interval: Some(0.5),
                ..GraphOptions::default()
            })
            .unwrap_err();
        assert!(matches!(err, GraphError::Evaluation(EvalError::Callable(_))));
        assert_eq!(surface.len(), before);
        assert_eq!(surface.canvas().len(), before);
        assert!(!surface.is_graphed());
    }

    #[test]
    fn foreground_cobweb_draws_reference_first() {
        let mut surface = surface();
        surface.set_function(function("x/2"));
        surface
            .cobweb(CobwebOptions {
                starting_value: Some(1.0),
                iterations: 3,
                ..CobwebOptions::default()
            })
            .unwrap();
        assert_eq!(surface.len(), 7);
        let first = surface.canvas().items().next().unwrap();
        assert_eq!(first.style.outline, Color::blue());
        assert_eq!(
            first.shape,
            ScreenShape::Line {
                x1: 0,
                y1: 200,
                x2: 200,
                y2: 0
            }
        );
    }

    #[test]
    fn update_callback_sees_every_step() {
        let mut surface = surface();
        surface.set_function(function("x"));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        surface
            .graph(GraphOptions {
                interval: Some(0.5),
                update: Some(ProgressCallback::new(move |_, _, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
                ..GraphOptions::default()
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn background_job_hands_back_buffer() {
        let mut surface = surface();
        surface.set_function(function("x^2"));
        let job = surface
            .spawn_graph(GraphOptions {
                interval: Some(0.25),
                ..GraphOptions::default()
            })
            .unwrap();
        assert!(surface.is_empty());
        let buffer = job.join().expect("worker");
        assert_eq!(segments(&buffer.events), 8);
        surface.render_buffer(&buffer);
        assert_eq!(surface.len(), 8);
    }

    #[test]
    fn background_worker_errors_surface_on_join() {
        let mut surface = surface();
        surface.set_function(Function::from_callable(|_| {
            Err(EvalError::Callable("boom".into()))
        }));
        let job = surface.spawn_graph(GraphOptions::default()).unwrap();
        assert!(matches!(
            job.join(),
            Err(GraphError::Evaluation(EvalError::Callable(_)))
        ));
    }

    #[test]
    fn bifurcation_flushes_periodically_without_autoflush() {
        let mut surface = surface();
        surface.set_autoflush(false);
        surface.set_function(function("r x (1 - x)"));
        surface
            .bifurcation(BifurcationOptions {
                start: 0.0,
                stop: 1.0,
                iterations: 10,
                transient_length: 10,
                max_period: 2,
                flush_ratio: 5,
                seed: Some(1),
                ..BifurcationOptions::default()
            })
            .unwrap();
        assert_eq!(surface.canvas().flushes(), 5);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: BifurcationOptions =
            serde_json::from_str(r#"{"start": 2.5, "color": "blue"}"#).expect("options");
        assert_eq!(options.start, 2.5);
        assert_eq!(options.color, Color::blue());
        assert_eq!(options.iter_variable, "r");
        assert_eq!(options.max_period, 256);
        assert!(options.verify.is_none());

        let bad = serde_json::from_str::<GraphOptions>(r#"{"color": "no;color"}"#);
        assert!(bad.is_err());
    }
}
