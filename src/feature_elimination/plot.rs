//! Score vs. feature-count curves

use super::report::EliminationReport;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// One curve with its ±std band, points ordered like the trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCurve {
    pub label: String,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl ScoreCurve {
    pub fn lower(&self) -> Vec<f64> {
        self.mean.iter().zip(&self.std).map(|(m, s)| m - s).collect()
    }

    pub fn upper(&self) -> Vec<f64> {
        self.mean.iter().zip(&self.std).map(|(m, s)| m + s).collect()
    }
}

/// Plot data derived from an elimination trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationPlot {
    pub scoring: String,
    pub num_features: Vec<usize>,
    pub train: ScoreCurve,
    pub validation: ScoreCurve,
}

impl EliminationPlot {
    pub fn from_report(report: &EliminationReport) -> Self {
        let records = report.records();
        Self {
            scoring: report.scoring().to_string(),
            num_features: report.num_features(),
            train: ScoreCurve {
                label: "Train Score".to_string(),
                mean: records.iter().map(|r| r.train_metric_mean).collect(),
                std: records.iter().map(|r| r.train_metric_std).collect(),
            },
            validation: ScoreCurve {
                label: "Validation Score".to_string(),
                mean: records.iter().map(|r| r.val_metric_mean).collect(),
                std: records.iter().map(|r| r.val_metric_std).collect(),
            },
        }
    }

    /// Render both curves with shaded bands as a standalone SVG document
    pub fn to_svg(&self, width: u32, height: u32) -> String {
        let margin = 50.0;
        let w = width as f64;
        let h = height as f64;
        let plot_w = (w - 2.0 * margin).max(1.0);
        let plot_h = (h - 2.0 * margin).max(1.0);

        let (x_min, x_max) = bounds(self.num_features.iter().map(|&n| n as f64));
        let (y_min, y_max) = bounds(
            [&self.train, &self.validation]
                .iter()
                .flat_map(|c| c.lower().into_iter().chain(c.upper())),
        );

        // Fewer features to the right, like the elimination proceeds
        let px = |n: f64| margin + (x_max - n) / (x_max - x_min) * plot_w;
        let py = |v: f64| margin + (y_max - v) / (y_max - y_min) * plot_h;

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
            width, height, width, height
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">Backwards Feature Elimination using SHAP &amp; CV</text>"#,
            w / 2.0,
            margin / 2.0
        );
        let _ = writeln!(
            svg,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="black"/>"#,
            margin, margin, plot_w, plot_h
        );

        for (curve, color) in [(&self.train, "#1f77b4"), (&self.validation, "#ff7f0e")] {
            let upper: Vec<String> = self
                .num_features
                .iter()
                .zip(curve.upper())
                .map(|(&n, v)| format!("{:.2},{:.2}", px(n as f64), py(v)))
                .collect();
            let lower: Vec<String> = self
                .num_features
                .iter()
                .zip(curve.lower())
                .rev()
                .map(|(&n, v)| format!("{:.2},{:.2}", px(n as f64), py(v)))
                .collect();
            let _ = writeln!(
                svg,
                r#"<polygon points="{} {}" fill="{}" fill-opacity="0.3" stroke="none"/>"#,
                upper.join(" "),
                lower.join(" "),
                color
            );

            let line: Vec<String> = self
                .num_features
                .iter()
                .zip(&curve.mean)
                .map(|(&n, &v)| format!("{:.2},{:.2}", px(n as f64), py(v)))
                .collect();
            let _ = writeln!(
                svg,
                r#"<polyline points="{}" fill="none" stroke="{}"><title>{}</title></polyline>"#,
                line.join(" "),
                color,
                curve.label
            );
        }

        for &n in &self.num_features {
            let _ = writeln!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-size="10">{}</text>"#,
                px(n as f64),
                h - margin + 15.0,
                n
            );
        }
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">Number of features</text>"#,
            w / 2.0,
            h - 10.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="15" y="{}" transform="rotate(-90 15 {})" text-anchor="middle">Performance {}</text>"#,
            h / 2.0,
            h / 2.0,
            self.scoring
        );
        svg.push_str("</svg>\n");
        svg
    }
}

/// Finite min/max, padded so a flat series still spans a range
fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < 1e-12 {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_elimination::RoundRecord;

    fn report() -> EliminationReport {
        let rec = |round: usize, n: usize, val: f64| RoundRecord {
            round,
            num_features: n,
            features_set: (0..n).map(|i| format!("f{}", i)).collect(),
            shap_importance_mean: vec![0.0; n],
            shap_importance_std: vec![0.0; n],
            train_metric_mean: 1.0,
            train_metric_std: 0.0,
            val_metric_mean: val,
            val_metric_std: 0.05,
            num_eliminated: 1,
            eliminated_features: vec![],
        };
        EliminationReport::new("roc_auc", vec![rec(1, 3, 0.7), rec(2, 2, 0.8), rec(3, 1, 0.9)])
    }

    #[test]
    fn test_plot_data_follows_trace() {
        let plot = EliminationPlot::from_report(&report());
        assert_eq!(plot.num_features, vec![3, 2, 1]);
        assert_eq!(plot.validation.mean, vec![0.7, 0.8, 0.9]);
        assert!((plot.validation.upper()[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_svg_render() {
        let svg = EliminationPlot::from_report(&report()).to_svg(640, 480);
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn test_single_round_svg() {
        let full = report();
        let r = EliminationReport::new(full.scoring(), full.records()[..1].to_vec());
        let svg = EliminationPlot::from_report(&r).to_svg(200, 200);
        assert!(!svg.contains("NaN"));
    }
}
