//! Attribution plots rendered as base64-encoded SVG

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::warn;

use super::{ExplainOptions, ExplanationSample};
use crate::error::{MemboostError, Result};

const WIDTH: u32 = 820;
const LABEL_WIDTH: u32 = 240;
const ROW_HEIGHT: u32 = 30;
const TOP: u32 = 60;
const BOTTOM: u32 = 60;
const FONT: &str = "sans-serif";

const POSITIVE: RGBColor = RGBColor(0xff, 0x00, 0x51);
const NEGATIVE: RGBColor = RGBColor(0x00, 0x8b, 0xfb);
const AXIS: RGBColor = RGBColor(0x99, 0x99, 0x99);
const INK: RGBColor = RGBColor(0x33, 0x33, 0x33);

/// Half the height of a bar, in row units
const BAR: f64 = 0.35;

type Root<'b> = DrawingArea<SVGBackend<'b>, Shift>;
type RowChart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// The explainability artifacts of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Summary,
    Bar,
    Beeswarm,
    Waterfall,
    WaterfallLow,
    WaterfallMedium,
    WaterfallHigh,
}

impl Artifact {
    pub const ALL: [Artifact; 7] = [
        Artifact::Summary,
        Artifact::Bar,
        Artifact::Beeswarm,
        Artifact::Waterfall,
        Artifact::WaterfallLow,
        Artifact::WaterfallMedium,
        Artifact::WaterfallHigh,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Artifact::Summary => "summary_plot",
            Artifact::Bar => "bar_plot",
            Artifact::Beeswarm => "beeswarm_plot",
            Artifact::Waterfall => "waterfall_plot",
            Artifact::WaterfallLow => "waterfall_plot_low",
            Artifact::WaterfallMedium => "waterfall_plot_medium",
            Artifact::WaterfallHigh => "waterfall_plot_high",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapPlots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_plot: Option<String>,
    pub bar_plot: Option<String>,
    pub beeswarm_plot: Option<String>,
    pub waterfall_plot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waterfall_plot_low: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waterfall_plot_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waterfall_plot_high: Option<String>,
    /// Failure of the whole explanation step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-artifact render failures, keyed like the plot fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl ShapPlots {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn get(&self, artifact: Artifact) -> Option<&String> {
        self.slot(artifact).as_ref()
    }

    fn slot(&self, artifact: Artifact) -> &Option<String> {
        match artifact {
            Artifact::Summary => &self.summary_plot,
            Artifact::Bar => &self.bar_plot,
            Artifact::Beeswarm => &self.beeswarm_plot,
            Artifact::Waterfall => &self.waterfall_plot,
            Artifact::WaterfallLow => &self.waterfall_plot_low,
            Artifact::WaterfallMedium => &self.waterfall_plot_medium,
            Artifact::WaterfallHigh => &self.waterfall_plot_high,
        }
    }

    fn slot_mut(&mut self, artifact: Artifact) -> &mut Option<String> {
        match artifact {
            Artifact::Summary => &mut self.summary_plot,
            Artifact::Bar => &mut self.bar_plot,
            Artifact::Beeswarm => &mut self.beeswarm_plot,
            Artifact::Waterfall => &mut self.waterfall_plot,
            Artifact::WaterfallLow => &mut self.waterfall_plot_low,
            Artifact::WaterfallMedium => &mut self.waterfall_plot_medium,
            Artifact::WaterfallHigh => &mut self.waterfall_plot_high,
        }
    }

    /// Store a rendered artifact, or isolate its failure under its key
    fn record(&mut self, artifact: Artifact, rendered: Result<String>) {
        match rendered {
            Ok(svg) => *self.slot_mut(artifact) = Some(STANDARD.encode(svg.as_bytes())),
            Err(e) => {
                warn!(artifact = artifact.key(), error = %e, "Artifact render failed");
                self.errors.insert(artifact.key().to_string(), e.to_string());
            }
        }
    }
}

pub(super) fn render_all(sample: &ExplanationSample, options: &ExplainOptions) -> ShapPlots {
    let mut plots = ShapPlots::default();

    if options.summary_plot {
        plots.record(Artifact::Summary, render_dots(sample, 20, "SHAP summary"));
    }
    plots.record(Artifact::Bar, render_bar(sample, 10));
    plots.record(Artifact::Beeswarm, render_dots(sample, 10, "SHAP beeswarm"));
    plots.record(Artifact::Waterfall, render_waterfall(sample, 0, None, 10));

    if options.representative_plots {
        if let Some(rows) = sample.representative_rows() {
            let labelled = [
                (Artifact::WaterfallLow, "Low"),
                (Artifact::WaterfallMedium, "Medium"),
                (Artifact::WaterfallHigh, "High"),
            ];
            for ((artifact, level), row) in labelled.into_iter().zip(rows) {
                let title = format!(
                    "{} {} Example (Predicted: {:.2})",
                    level,
                    options.target_label,
                    sample.predictions()[row]
                );
                plots.record(artifact, render_waterfall(sample, row, Some(&title), 10));
            }
        }
    }

    plots
}

fn ensure_renderable(sample: &ExplanationSample) -> Result<()> {
    if sample.n_rows() == 0 {
        return Err(MemboostError::RenderError("sample has no rows".to_string()));
    }
    if sample.feature_names().is_empty() {
        return Err(MemboostError::RenderError("model has no features".to_string()));
    }
    Ok(())
}

/// Feature indices by descending mean |attribution|, at most `max_display`
fn ranked_features(sample: &ExplanationSample, max_display: usize) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = sample.mean_abs().into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(max_display);
    ranked
}

fn plot_height(rows: usize) -> u32 {
    TOP + rows as u32 * ROW_HEIGHT + BOTTOM
}

/// Range covering the finite `values`, padded so bars never touch the edge
fn padded_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in values.into_iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !lo.is_finite() {
        return -1.0..1.0;
    }
    if hi - lo < f64::EPSILON {
        hi = lo + 1.0;
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}

/// Center of the band for row `pos`, counted from the top
fn row_center(rows: usize, pos: usize) -> f64 {
    rows as f64 - pos as f64 - 0.5
}

/// Blend from the negative to the positive color by `t` in [0, 1]
fn gradient(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(
        mix(NEGATIVE.0, POSITIVE.0),
        mix(NEGATIVE.1, POSITIVE.1),
        mix(NEGATIVE.2, POSITIVE.2),
    )
}

fn text_style(size: f64, h_pos: HPos) -> TextStyle<'static> {
    (FONT, size).into_font().color(&INK).pos(Pos::new(h_pos, VPos::Center))
}

fn canvas(svg: &mut String, rows: usize) -> Result<Root<'_>> {
    let root = SVGBackend::with_string(svg, (WIDTH, plot_height(rows))).into_drawing_area();
    root.fill(&WHITE)?;
    Ok(root)
}

/// Chart with one horizontal band per row, row 0 on top
fn row_chart<'a, 'b>(
    root: &'a Root<'b>,
    caption: &str,
    x_range: Range<f64>,
    rows: usize,
    x_desc: &str,
) -> Result<RowChart<'a, 'b>> {
    let mut chart = ChartBuilder::on(root)
        .caption(caption, (FONT, 16))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(LABEL_WIDTH)
        .build_cartesian_2d(x_range, 0f64..rows as f64)?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_label_formatter(&|_: &f64| String::new())
        .x_desc(x_desc)
        .label_style((FONT, 11))
        .axis_style(&AXIS)
        .draw()?;
    Ok(chart)
}

/// Row labels, right-aligned against the plotting area
fn label_rows(root: &Root<'_>, chart: &RowChart<'_, '_>, x_lo: f64, labels: &[String]) -> Result<()> {
    let style = text_style(12.0, HPos::Right);
    for (pos, label) in labels.iter().enumerate() {
        let (px, py) = chart.backend_coord(&(x_lo, row_center(labels.len(), pos)));
        root.draw(&Text::new(label.as_str(), (px - 8, py), style.clone()))?;
    }
    Ok(())
}

/// Mean |attribution| ranking
fn render_bar(sample: &ExplanationSample, max_display: usize) -> Result<String> {
    ensure_renderable(sample)?;
    let ranked = ranked_features(sample, max_display);
    let labels: Vec<String> = ranked
        .iter()
        .map(|(j, _)| sample.feature_names()[*j].clone())
        .collect();
    let n = ranked.len();
    let x_range = padded_range(ranked.iter().map(|r| r.1).chain([0.0]));
    let x_lo = x_range.start;

    let mut svg = String::new();
    {
        let root = canvas(&mut svg, n)?;
        let mut chart = row_chart(&root, "Feature importance", x_range, n, "mean(|SHAP value|)")?;

        chart.draw_series(ranked.iter().enumerate().map(|(pos, (_, value))| {
            let y = row_center(n, pos);
            Rectangle::new([(0.0, y + BAR), (*value, y - BAR)], POSITIVE.filled())
        }))?;
        let style = text_style(11.0, HPos::Left);
        chart.draw_series(ranked.iter().enumerate().map(|(pos, (_, value))| {
            EmptyElement::at((*value, row_center(n, pos)))
                + Text::new(format!("+{:.3}", value), (4, 0), style.clone())
        }))?;

        label_rows(&root, &chart, x_lo, &labels)?;
        root.present()?;
    }
    Ok(svg)
}

/// One dot per sampled row per feature, colored by the feature's value
fn render_dots(sample: &ExplanationSample, max_display: usize, title: &str) -> Result<String> {
    ensure_renderable(sample)?;
    let ranked = ranked_features(sample, max_display);
    let labels: Vec<String> = ranked
        .iter()
        .map(|(j, _)| sample.feature_names()[*j].clone())
        .collect();
    let values = sample.values();
    let features = sample.features();
    let n = ranked.len();
    let x_range = padded_range(values.iter().copied().chain([0.0]));
    let x_lo = x_range.start;

    let mut dots = Vec::with_capacity(n * sample.n_rows());
    for (pos, (j, _)) in ranked.iter().enumerate() {
        let y = row_center(n, pos);
        let column = features.column(*j);
        let lo = column.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = hi - lo;

        for (i, v) in values.column(*j).iter().enumerate() {
            let t = if span > 0.0 { (column[i] - lo) / span } else { 0.5 };
            let jitter = (((i * 37) % 11) as f64 - 5.0) * 0.05;
            dots.push(Circle::new((*v, y + jitter), 3, gradient(t).mix(0.8).filled()));
        }
    }

    let mut svg = String::new();
    {
        let root = canvas(&mut svg, n)?;
        let mut chart = row_chart(&root, title, x_range, n, "SHAP value (impact on model output)")?;
        chart.draw_series(LineSeries::new(vec![(0.0, 0.0), (0.0, n as f64)], &AXIS))?;
        chart.draw_series(dots)?;
        label_rows(&root, &chart, x_lo, &labels)?;
        root.present()?;
    }
    Ok(svg)
}

/// Single-row breakdown from the base value to the prediction
fn render_waterfall(
    sample: &ExplanationSample,
    row: usize,
    title: Option<&str>,
    max_display: usize,
) -> Result<String> {
    ensure_renderable(sample)?;
    if row >= sample.n_rows() {
        return Err(MemboostError::RenderError(format!(
            "row {} outside sample of {}",
            row,
            sample.n_rows()
        )));
    }

    let phi = sample.row_values(row);
    let x = sample.features().row(row);
    let mut order: Vec<usize> = (0..phi.len()).collect();
    order.sort_by(|&a, &b| {
        phi[b]
            .abs()
            .partial_cmp(&phi[a].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let shown = max_display.saturating_sub(1).max(1).min(order.len());
    let mut steps: Vec<(String, f64)> = order[..shown]
        .iter()
        .map(|&j| (format!("{} = {:.3}", sample.feature_names()[j], x[j]), phi[j]))
        .collect();
    if order.len() > shown {
        let rest: f64 = order[shown..].iter().map(|&j| phi[j]).sum();
        steps.push((format!("{} other features", order.len() - shown), rest));
    }

    // Largest step on top; accumulation runs bottom-up from the base value
    let base = sample.base_value();
    let n = steps.len();
    let mut starts = vec![0.0; n];
    let mut cursor = base;
    for (pos, (_, v)) in steps.iter().enumerate().rev() {
        starts[pos] = cursor;
        cursor += v;
    }
    let fx = cursor;

    let labels: Vec<String> = steps.iter().map(|(label, _)| label.clone()).collect();
    let x_range = padded_range(
        starts
            .iter()
            .zip(&steps)
            .flat_map(|(start, (_, v))| [*start, start + v])
            .chain([base, fx]),
    );
    let x_lo = x_range.start;
    let heading = title.map(str::to_string).unwrap_or_else(|| format!("f(x) = {:.3}", fx));

    let mut svg = String::new();
    {
        let root = canvas(&mut svg, n)?;
        let mut chart = row_chart(&root, &heading, x_range, n, "model output")?;

        chart.draw_series(starts.iter().zip(&steps).enumerate().map(|(pos, (start, (_, v)))| {
            let y = row_center(n, pos);
            let (lo, hi) = (start.min(start + v), start.max(start + v));
            let fill = if *v >= 0.0 { POSITIVE } else { NEGATIVE };
            Rectangle::new([(lo, y + BAR), (hi, y - BAR)], fill.filled())
        }))?;
        let value_style = text_style(11.0, HPos::Left);
        chart.draw_series(starts.iter().zip(&steps).enumerate().map(|(pos, (start, (_, v)))| {
            EmptyElement::at((start.max(start + v), row_center(n, pos)))
                + Text::new(format!("{:+.3}", v), (4, 0), value_style.clone())
        }))?;

        chart.draw_series(LineSeries::new(vec![(base, 0.0), (base, n as f64)], &AXIS))?;
        let marker = text_style(11.0, HPos::Center);
        chart.draw_series([
            EmptyElement::at((base, 0.0))
                + Text::new(format!("E[f(X)] = {:.3}", base), (0, 14), marker.clone()),
            EmptyElement::at((fx, n as f64))
                + Text::new(format!("f(x) = {:.3}", fx), (0, -10), marker),
        ])?;

        label_rows(&root, &chart, x_lo, &labels)?;
        root.present()?;
    }
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};

    fn sample(rows: usize) -> ExplanationSample {
        let x = Array2::from_shape_fn((rows, 3), |(i, j)| (i + j) as f64);
        let values = Array2::from_shape_fn((rows, 3), |(i, j)| (i as f64 - 1.0) * (j as f64 + 0.5));
        let predictions: Array1<f64> = values.rows().into_iter().map(|r| 10.0 + r.sum()).collect();
        ExplanationSample {
            feature_names: vec!["a".into(), "b".into(), "c".into()],
            x,
            values,
            predictions,
            base_value: 10.0,
        }
    }

    fn decode(b64: &str) -> String {
        String::from_utf8(STANDARD.decode(b64).unwrap()).unwrap()
    }

    #[test]
    fn test_all_artifacts_render() {
        let options = ExplainOptions {
            sample_size: 100,
            seed: 42,
            summary_plot: true,
            representative_plots: true,
            target_label: "Sales".to_string(),
        };
        let plots = render_all(&sample(5), &options);
        for artifact in [
            Artifact::Summary,
            Artifact::Bar,
            Artifact::Beeswarm,
            Artifact::Waterfall,
            Artifact::WaterfallLow,
            Artifact::WaterfallMedium,
            Artifact::WaterfallHigh,
        ] {
            let svg = decode(plots.get(artifact).unwrap());
            assert!(svg.starts_with("<svg"), "{} is not svg", artifact.key());
        }
        assert!(decode(plots.waterfall_plot_high.as_ref().unwrap()).contains("High Sales Example (Predicted:"));
    }

    #[test]
    fn test_toggles_respected() {
        let options = ExplainOptions {
            sample_size: 100,
            seed: 42,
            summary_plot: false,
            representative_plots: false,
            target_label: "Sales".to_string(),
        };
        let plots = render_all(&sample(5), &options);
        assert!(plots.summary_plot.is_none());
        assert!(plots.waterfall_plot_low.is_none());
        assert!(plots.bar_plot.is_some());

        let json = serde_json::to_value(&plots).unwrap();
        assert!(json.get("summary_plot").is_none());
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn test_render_failure_is_isolated() {
        let mut empty = sample(1);
        empty.feature_names.clear();
        empty.values = Array2::zeros((1, 0));
        empty.x = Array2::zeros((1, 0));
        let options = ExplainOptions {
            sample_size: 100,
            seed: 42,
            summary_plot: false,
            representative_plots: true,
            target_label: "y".to_string(),
        };
        let plots = render_all(&empty, &options);
        assert!(plots.bar_plot.is_none());
        assert!(plots.errors.contains_key("bar_plot"));
        assert!(plots.errors.contains_key("waterfall_plot"));
        assert!(plots.error.is_none());
    }

    #[test]
    fn test_waterfall_groups_remaining_features() {
        let mut s = sample(2);
        s.feature_names = (0..12).map(|i| format!("f{}", i)).collect();
        s.x = Array2::zeros((2, 12));
        s.values = Array2::from_elem((2, 12), 0.5);
        s.predictions = array![16.0, 16.0];
        let svg = render_waterfall(&s, 0, None, 10).unwrap();
        assert!(svg.contains("3 other features"));
        assert!(svg.contains("f(x) = 16.000"));
        assert!(svg.contains("E[f(X)] = 10.000"));
    }

    #[test]
    fn test_bar_plot_carries_feature_labels() {
        let svg = render_bar(&sample(4), 10).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("<text"));
        assert!(svg.contains("mean(|SHAP value|)"));
    }

    #[test]
    fn test_out_of_range_row_is_a_render_error() {
        let err = render_waterfall(&sample(3), 3, None, 10).unwrap_err();
        assert!(matches!(err, MemboostError::RenderError(_)));
    }

    #[test]
    fn test_padded_range() {
        let range = padded_range([2.0, 4.0, 0.0]);
        assert!(range.start < 0.0 && range.end > 4.0);
        assert_eq!(padded_range([f64::NAN]), -1.0..1.0);
        let flat = padded_range([3.0, 3.0]);
        assert!(flat.end - flat.start > 1.0);
    }

    #[test]
    fn test_gradient_endpoints() {
        assert_eq!(gradient(0.0).rgb(), NEGATIVE.rgb());
        assert_eq!(gradient(1.0).rgb(), POSITIVE.rgb());
        assert_eq!(gradient(f64::NAN).rgb(), gradient(0.5).rgb());
    }
}
