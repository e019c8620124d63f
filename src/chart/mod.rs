//! Result visualization: maps two-column results to bar and pie charts.

pub mod svg;
pub mod visualizer;

pub use svg::{artifact_file_name, SvgRenderer};
pub use visualizer::{
    display_value, ChartArtifact, ChartData, ChartKind, ChartRenderer, ChartSelection,
    RenderOutcome, ResultVisualizer,
};
