//! Result-to-chart mapping.
//!
//! Column 0 supplies the categories (as display strings), column 1 the
//! magnitudes. Each requested chart kind is rendered independently: one kind
//! failing never prevents the other from being produced.

use crate::types::{InsightError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Kind of a single chart artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Categorical bar chart
    Bar,
    /// Proportional pie chart
    Pie,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Pie => "pie",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart kinds requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartSelection {
    Bar,
    Pie,
    Both,
}

impl ChartSelection {
    /// Artifact kinds to produce, in render order.
    pub fn kinds(&self) -> &'static [ChartKind] {
        match self {
            Self::Bar => &[ChartKind::Bar],
            Self::Pie => &[ChartKind::Pie],
            Self::Both => &[ChartKind::Bar, ChartKind::Pie],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Pie => "pie",
            Self::Both => "both",
        }
    }
}

impl FromStr for ChartSelection {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar" => Ok(Self::Bar),
            "pie" => Ok(Self::Pie),
            "both" => Ok(Self::Both),
            other => Err(InsightError::InsufficientData(format!(
                "unknown chart kind '{}' (expected bar, pie or both)",
                other
            ))),
        }
    }
}

/// Plot-ready data extracted from a two-column result.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    /// Label of column 0 (x axis / slice labels)
    pub x_label: String,

    /// Label of column 1 (y axis / slice sizes)
    pub y_label: String,

    /// Column 0 values as display strings
    pub categories: Vec<String>,

    /// Column 1 values
    pub magnitudes: Vec<f64>,
}

/// Plotting backend.
///
/// Each call produces or overwrites the artifact for its kind and returns where
/// it was written.
pub trait ChartRenderer: Send + Sync {
    /// Render a bar chart: categories on x, magnitudes on y.
    fn render_bar(&self, data: &ChartData) -> Result<PathBuf>;

    /// Render a pie chart: one slice per category, sized by magnitude.
    fn render_pie(&self, data: &ChartData) -> Result<PathBuf>;
}

/// Produced artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartArtifact {
    pub kind: ChartKind,
    pub path: PathBuf,
}

/// Result of rendering every requested kind.
#[derive(Debug, Default)]
pub struct RenderOutcome {
    /// Artifacts that were produced
    pub artifacts: Vec<ChartArtifact>,

    /// Kinds that failed, with their error
    pub failures: Vec<(ChartKind, InsightError)>,
}

impl RenderOutcome {
    /// `true` if no artifact was produced.
    pub fn is_total_failure(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Maps query results to chart artifacts through a [`ChartRenderer`].
pub struct ResultVisualizer {
    renderer: Arc<dyn ChartRenderer>,
}

impl ResultVisualizer {
    pub fn new(renderer: Arc<dyn ChartRenderer>) -> Self {
        Self { renderer }
    }

    /// Render the requested chart kinds.
    ///
    /// # Arguments
    ///
    /// * `columns` - Column labels; at least two are required
    /// * `rows` - Row tuples; only the first two values of each row are used
    /// * `selection` - `bar`, `pie` or `both`
    ///
    /// # Returns
    ///
    /// Artifacts produced plus per-kind failures
    ///
    /// # Errors
    ///
    /// Returns `InsightError::InsufficientData` if fewer than two columns are
    /// given or a row has fewer than two values, whatever the row count
    #[tracing::instrument(skip_all, fields(rows = rows.len(), selection = selection.as_str()))]
    pub fn render(
        &self,
        columns: &[String],
        rows: &[Vec<Value>],
        selection: ChartSelection,
    ) -> Result<RenderOutcome> {
        if columns.len() < 2 {
            return Err(InsightError::InsufficientData(format!(
                "need at least 2 columns to plot, got {}",
                columns.len()
            )));
        }
        if let Some(idx) = rows.iter().position(|r| r.len() < 2) {
            return Err(InsightError::InsufficientData(format!(
                "row {} has fewer than 2 values",
                idx
            )));
        }

        let categories: Vec<String> = rows.iter().map(|r| display_value(&r[0])).collect();
        let magnitudes = rows
            .iter()
            .enumerate()
            .map(|(idx, r)| magnitude(idx, &r[1]))
            .collect::<Result<Vec<f64>>>();

        let mut outcome = RenderOutcome::default();
        for &kind in selection.kinds() {
            let rendered = match &magnitudes {
                Ok(values) => {
                    let data = ChartData {
                        x_label: columns[0].clone(),
                        y_label: columns[1].clone(),
                        categories: categories.clone(),
                        magnitudes: values.clone(),
                    };
                    match kind {
                        ChartKind::Bar => self.renderer.render_bar(&data),
                        ChartKind::Pie => self.renderer.render_pie(&data),
                    }
                }
                Err(e) => Err(InsightError::render(e.to_string())),
            };

            match rendered {
                Ok(path) => {
                    tracing::info!(kind = %kind, path = %path.display(), "chart rendered");
                    outcome.artifacts.push(ChartArtifact { kind, path });
                }
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "chart render failed");
                    outcome.failures.push((kind, e));
                }
            }
        }

        Ok(outcome)
    }
}

/// Display string for a category value.
///
/// Strings are used as-is; `null` becomes `NULL`; everything else uses its JSON form.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

fn magnitude(row: usize, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.filter(|v| v.is_finite()).ok_or_else(|| {
        InsightError::render(format!("row {}: magnitude {} is not numeric", row, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records calls; fails the kinds listed in `fail`.
    #[derive(Default)]
    struct RecordingRenderer {
        fail: Vec<ChartKind>,
        seen: Mutex<Vec<(ChartKind, ChartData)>>,
    }

    impl RecordingRenderer {
        fn record(&self, kind: ChartKind, data: &ChartData) -> Result<PathBuf> {
            self.seen.lock().unwrap().push((kind, data.clone()));
            if self.fail.contains(&kind) {
                return Err(InsightError::render("plotting backend crashed"));
            }
            Ok(PathBuf::from(format!("{}_chart.svg", kind)))
        }
    }

    impl ChartRenderer for RecordingRenderer {
        fn render_bar(&self, data: &ChartData) -> Result<PathBuf> {
            self.record(ChartKind::Bar, data)
        }

        fn render_pie(&self, data: &ChartData) -> Result<PathBuf> {
            self.record(ChartKind::Pie, data)
        }
    }

    fn columns() -> Vec<String> {
        vec!["region".to_string(), "revenue".to_string()]
    }

    fn rows() -> Vec<Vec<Value>> {
        vec![
            vec![json!("north"), json!(100)],
            vec![json!("south"), json!("250.5")],
            vec![json!(null), json!(75)],
        ]
    }

    #[test]
    fn test_maps_columns_to_chart_data() {
        let renderer = Arc::new(RecordingRenderer::default());
        let visualizer = ResultVisualizer::new(renderer.clone());

        let outcome = visualizer.render(&columns(), &rows(), ChartSelection::Bar).unwrap();
        assert_eq!(outcome.artifacts.len(), 1);

        let seen = renderer.seen.lock().unwrap();
        let (kind, data) = &seen[0];
        assert_eq!(*kind, ChartKind::Bar);
        assert_eq!(data.x_label, "region");
        assert_eq!(data.y_label, "revenue");
        assert_eq!(data.categories, vec!["north", "south", "NULL"]);
        assert_eq!(data.magnitudes, vec![100.0, 250.5, 75.0]);
    }

    #[test]
    fn test_fewer_than_two_columns_is_insufficient() {
        let visualizer = ResultVisualizer::new(Arc::new(RecordingRenderer::default()));
        let one_column = vec!["total".to_string()];

        for rows in [vec![], vec![vec![json!(1)]; 10]] {
            let result = visualizer.render(&one_column, &rows, ChartSelection::Both);
            assert!(matches!(result, Err(InsightError::InsufficientData(_))));
        }
    }

    #[test]
    fn test_both_survives_one_failure() {
        let renderer = Arc::new(RecordingRenderer {
            fail: vec![ChartKind::Pie],
            ..Default::default()
        });
        let visualizer = ResultVisualizer::new(renderer);

        let outcome = visualizer.render(&columns(), &rows(), ChartSelection::Both).unwrap();
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.artifacts[0].kind, ChartKind::Bar);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, ChartKind::Pie);
        assert!(!outcome.is_total_failure());
    }

    #[test]
    fn test_non_numeric_magnitude_fails_each_kind() {
        let visualizer = ResultVisualizer::new(Arc::new(RecordingRenderer::default()));
        let rows = vec![vec![json!("north"), json!("lots")]];

        let outcome = visualizer.render(&columns(), &rows, ChartSelection::Both).unwrap();
        assert!(outcome.is_total_failure());
        assert_eq!(outcome.failures.len(), 2);
        assert!(matches!(outcome.failures[0].1, InsightError::RenderError(_)));
    }

    #[test]
    fn test_selection_from_str() {
        assert_eq!("Both".parse::<ChartSelection>().unwrap(), ChartSelection::Both);
        assert_eq!(ChartSelection::Both.kinds(), &[ChartKind::Bar, ChartKind::Pie]);
        assert!("scatter".parse::<ChartSelection>().is_err());
    }
}
