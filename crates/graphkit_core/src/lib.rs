pub mod axes;
pub mod canvas;
pub mod color;
pub mod complex;
pub mod engine;
pub mod error;
pub mod expression;
pub mod function;
pub mod group;
pub mod primitives;
pub mod sampling;
pub mod surface;
/// The `graphkit_core` crate is the plotting engine behind graphkit: it maps
/// a world coordinate rectangle onto a pixel grid and draws functions and
/// iterated maps onto a host canvas.
///
/// Key components:
/// - **Transform**: `CoordinateTransform`, the affine world/pixel mapping with an inverted y axis.
/// - **Primitives & Canvas**: world-space shapes rendered through the transform to a `Canvas` host.
/// - **Surface**: `PlotSurface`, owning the transform, the drawn primitives, zoom state and axes.
/// - **Function & Expression**: a sandboxed expression grammar evaluated by tree walking.
/// - **Engine**: line graphs, cobweb, time series and bifurcation diagrams as resumable runs.
pub mod traits;
pub mod transform;

pub use canvas::{Canvas, ItemId, RecordingCanvas};
pub use color::{Color, ColorScheme};
pub use engine::{
    BackgroundJob, BifurcationOptions, CobwebOptions, GraphKind, GraphOptions, GraphRun,
    PlotEvent, TimeSeriesOptions,
};
pub use error::{EvalError, GraphError};
pub use function::{Bindings, Function};
pub use surface::{PlotSurface, SurfaceOptions, ZoomMode};
pub use transform::{Axis, CoordinateTransform};
