//! SVG plotting backend.
//!
//! Writes `bar_chart.svg` and `pie_chart.svg` into one artifact directory. Each
//! render replaces the previous file for its kind (write to a temp file, then
//! rename), so readers never see a half-written chart.

use crate::chart::visualizer::{ChartData, ChartKind, ChartRenderer};
use crate::types::{InsightError, Result};
use std::f64::consts::PI;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// matplotlib "tab10" palette.
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

const BAR_WIDTH: f64 = 1000.0;
const BAR_HEIGHT: f64 = 600.0;
const BAR_MARGIN_LEFT: f64 = 90.0;
const BAR_MARGIN_RIGHT: f64 = 30.0;
const BAR_MARGIN_TOP: f64 = 60.0;
const BAR_MARGIN_BOTTOM: f64 = 150.0;

const PIE_SIZE: f64 = 800.0;
const PIE_RADIUS: f64 = 280.0;
/// First slice starts here, counter-clockwise from 3 o'clock.
const PIE_START_ANGLE_DEG: f64 = 140.0;

/// Renders charts as standalone SVG documents in a fixed directory.
#[derive(Debug, Clone)]
pub struct SvgRenderer {
    artifact_dir: PathBuf,
}

impl SvgRenderer {
    /// Renderer writing into `artifact_dir` (created on first render).
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
        }
    }

    /// Fixed artifact location for a chart kind.
    pub fn artifact_path(&self, kind: ChartKind) -> PathBuf {
        self.artifact_dir.join(artifact_file_name(kind))
    }

    fn write(&self, kind: ChartKind, svg: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.artifact_dir)
            .map_err(|e| InsightError::render(format!("cannot create artifact dir: {}", e)))?;

        let path = self.artifact_path(kind);
        let tmp = path.with_extension("svg.tmp");
        std::fs::write(&tmp, svg)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| InsightError::render(format!("cannot write {}: {}", path.display(), e)))?;

        Ok(path)
    }
}

/// File name of the artifact slot for a kind.
pub fn artifact_file_name(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Bar => "bar_chart.svg",
        ChartKind::Pie => "pie_chart.svg",
    }
}

impl ChartRenderer for SvgRenderer {
    fn render_bar(&self, data: &ChartData) -> Result<PathBuf> {
        let svg = bar_svg(data)?;
        self.write(ChartKind::Bar, &svg)
    }

    fn render_pie(&self, data: &ChartData) -> Result<PathBuf> {
        let svg = pie_svg(data)?;
        self.write(ChartKind::Pie, &svg)
    }
}

/// Build the bar chart document.
///
/// # Errors
///
/// Returns `InsightError::RenderError` if categories and magnitudes differ in length
pub fn bar_svg(data: &ChartData) -> Result<String> {
    check_lengths(data)?;

    let plot_w = BAR_WIDTH - BAR_MARGIN_LEFT - BAR_MARGIN_RIGHT;
    let plot_h = BAR_HEIGHT - BAR_MARGIN_TOP - BAR_MARGIN_BOTTOM;
    let (lo, hi, step) = nice_scale(&data.magnitudes);
    let y_of = |v: f64| BAR_MARGIN_TOP + plot_h * (hi - v) / (hi - lo);
    let baseline_y = y_of(0.0_f64.clamp(lo, hi));

    let mut svg = open_document(BAR_WIDTH, BAR_HEIGHT);
    text(&mut svg, BAR_WIDTH / 2.0, 35.0, "middle", 20.0, None, "Bar Chart");

    // y ticks and grid
    let mut tick = lo;
    while tick <= hi + step * 1e-9 {
        let y = y_of(tick);
        let _ = writeln!(
            svg,
            r##"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="#dddddd"/>"##,
            BAR_MARGIN_LEFT,
            y,
            BAR_MARGIN_LEFT + plot_w,
            y
        );
        text(&mut svg, BAR_MARGIN_LEFT - 8.0, y + 4.0, "end", 12.0, None, &format_tick(tick));
        tick += step;
    }

    // bars and rotated category labels
    let n = data.categories.len().max(1) as f64;
    let slot = plot_w / n;
    for (idx, (label, value)) in data.categories.iter().zip(&data.magnitudes).enumerate() {
        let x = BAR_MARGIN_LEFT + slot * idx as f64;
        let bar_x = x + slot * 0.1;
        let y = y_of(*value);
        let (top, height) = if y < baseline_y {
            (y, baseline_y - y)
        } else {
            (baseline_y, y - baseline_y)
        };
        let _ = writeln!(
            svg,
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"><title>{}: {}</title></rect>"#,
            bar_x,
            top,
            slot * 0.8,
            height,
            PALETTE[0],
            escape_xml(label),
            format_tick(*value)
        );

        let lx = x + slot / 2.0;
        let ly = BAR_MARGIN_TOP + plot_h + 14.0;
        text(&mut svg, lx, ly, "end", 12.0, Some(-45.0), label);
    }

    // axes
    let _ = writeln!(
        svg,
        r##"<line x1="{0:.1}" y1="{1:.1}" x2="{0:.1}" y2="{2:.1}" stroke="#000000"/>"##,
        BAR_MARGIN_LEFT,
        BAR_MARGIN_TOP,
        BAR_MARGIN_TOP + plot_h
    );
    let _ = writeln!(
        svg,
        r##"<line x1="{:.1}" y1="{2:.1}" x2="{1:.1}" y2="{2:.1}" stroke="#000000"/>"##,
        BAR_MARGIN_LEFT,
        BAR_MARGIN_LEFT + plot_w,
        baseline_y
    );

    text(&mut svg, BAR_MARGIN_LEFT + plot_w / 2.0, BAR_HEIGHT - 12.0, "middle", 14.0, None, &data.x_label);
    text(&mut svg, 22.0, BAR_MARGIN_TOP + plot_h / 2.0, "middle", 14.0, Some(-90.0), &data.y_label);

    svg.push_str("</svg>\n");
    Ok(svg)
}

/// Build the pie chart document.
///
/// # Errors
///
/// Returns `InsightError::RenderError` if any magnitude is negative or they sum to zero
pub fn pie_svg(data: &ChartData) -> Result<String> {
    check_lengths(data)?;

    if let Some(v) = data.magnitudes.iter().find(|v| **v < 0.0) {
        return Err(InsightError::render(format!(
            "pie slices cannot be negative (got {})",
            format_tick(*v)
        )));
    }
    let total: f64 = data.magnitudes.iter().sum();
    if total <= 0.0 {
        return Err(InsightError::render("pie magnitudes sum to zero"));
    }

    let title = format!("{} vs {}", data.x_label, data.y_label);
    let (cx, cy) = (PIE_SIZE / 2.0, PIE_SIZE / 2.0 + 20.0);

    let mut svg = open_document(PIE_SIZE, PIE_SIZE);
    text(&mut svg, PIE_SIZE / 2.0, 35.0, "middle", 20.0, None, &title);

    let mut angle = PIE_START_ANGLE_DEG.to_radians();
    for (idx, (label, value)) in data.categories.iter().zip(&data.magnitudes).enumerate() {
        let fraction = value / total;
        if fraction <= 0.0 {
            continue;
        }
        let sweep = fraction * 2.0 * PI;
        let color = PALETTE[idx % PALETTE.len()];

        if fraction >= 1.0 - 1e-12 {
            let _ = writeln!(
                svg,
                r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="{}"/>"#,
                cx, cy, PIE_RADIUS, color
            );
        } else {
            let (x0, y0) = polar(cx, cy, PIE_RADIUS, angle);
            let (x1, y1) = polar(cx, cy, PIE_RADIUS, angle + sweep);
            let large_arc = if sweep > PI { 1 } else { 0 };
            // counter-clockwise on screen is sweep-flag 0
            let _ = writeln!(
                svg,
                r##"<path d="M {:.2} {:.2} L {:.2} {:.2} A {:.2} {:.2} 0 {} 0 {:.2} {:.2} Z" fill="{}" stroke="#ffffff"/>"##,
                cx, cy, x0, y0, PIE_RADIUS, PIE_RADIUS, large_arc, x1, y1, color
            );
        }

        let mid = angle + sweep / 2.0;
        let (px, py) = polar(cx, cy, PIE_RADIUS * 0.6, mid);
        text(&mut svg, px, py + 4.0, "middle", 13.0, None, &format!("{:.1}%", fraction * 100.0));

        let (lx, ly) = polar(cx, cy, PIE_RADIUS * 1.1, mid);
        let anchor = if mid.cos() >= 0.0 { "start" } else { "end" };
        text(&mut svg, lx, ly + 4.0, anchor, 13.0, None, label);

        angle += sweep;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

fn check_lengths(data: &ChartData) -> Result<()> {
    if data.categories.len() != data.magnitudes.len() {
        return Err(InsightError::render(format!(
            "{} categories but {} magnitudes",
            data.categories.len(),
            data.magnitudes.len()
        )));
    }
    Ok(())
}

fn open_document(width: f64, height: f64) -> String {
    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="DejaVu Sans, Arial, sans-serif">"#,
            "\n",
            r##"<rect width="100%" height="100%" fill="#ffffff"/>"##,
            "\n"
        ),
        w = width,
        h = height
    )
}

fn text(svg: &mut String, x: f64, y: f64, anchor: &str, size: f64, rotate: Option<f64>, content: &str) {
    let transform = match rotate {
        Some(deg) => format!(r#" transform="rotate({} {:.1} {:.1})""#, deg, x, y),
        None => String::new(),
    };
    let _ = writeln!(
        svg,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="{}" font-size="{}"{}>{}</text>"#,
        x,
        y,
        anchor,
        size,
        transform,
        escape_xml(content)
    );
}

/// Point on a circle; `angle` is counter-clockwise from 3 o'clock (screen y grows down).
fn polar(cx: f64, cy: f64, r: f64, angle: f64) -> (f64, f64) {
    (cx + r * angle.cos(), cy - r * angle.sin())
}

/// Axis range and tick step covering `values` and zero, with 1/2/5 steps.
fn nice_scale(values: &[f64]) -> (f64, f64, f64) {
    let min = values.iter().copied().fold(0.0_f64, f64::min);
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    let range = if max > min { max - min } else { 1.0 };

    let raw_step = range / 5.0;
    let magnitude = 10f64.powf(raw_step.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw_step)
        .unwrap_or(10.0 * magnitude);

    let lo = (min / step).floor() * step;
    let mut hi = (max / step).ceil() * step;
    if hi <= lo {
        hi = lo + step;
    }
    (lo, hi, step)
}

fn format_tick(v: f64) -> String {
    if v.fract().abs() < 1e-9 {
        format!("{:.0}", v)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Read an artifact back (used by the HTTP surface).
pub fn read_artifact(dir: &Path, kind: ChartKind) -> Result<String> {
    let path = dir.join(artifact_file_name(kind));
    std::fs::read_to_string(&path).map_err(InsightError::from)
}
