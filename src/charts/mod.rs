use std::fmt::Write as _;

use axum::{
    extract::{Query, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tracing::instrument;

use crate::error::AppResult;
use crate::model::stats;
use crate::state::AppState;

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 256;
const MAX_DIMENSION: u32 = 4096;
const PADDING: f64 = 8.0;
const SERIES_COLOR: &str = "#0074d9";
const TREND_COLOR: &str = "#6baed6";

pub fn router() -> Router<AppState> {
    Router::new().route("/chart/searches", get(searches_chart))
}

#[derive(Debug, Default, Deserialize)]
pub struct ChartSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ChartSize {
    fn resolve(&self) -> (u32, u32) {
        let clamp = |v: Option<u32>, default: u32| v.filter(|v| *v > 0).unwrap_or(default).min(MAX_DIMENSION);
        (clamp(self.width, DEFAULT_WIDTH), clamp(self.height, DEFAULT_HEIGHT))
    }
}

/// Least squares fit, `(slope, intercept)`. `None` with fewer than two distinct x values.
pub fn linear_regression(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = points.len() as f64;
    if points.len() < 2 {
        return None;
    }
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut num, mut den) = (0.0, 0.0);
    for (x, y) in points {
        num += (x - mean_x) * (y - mean_y);
        den += (x - mean_x) * (x - mean_x);
    }
    if den == 0.0 {
        return None;
    }
    let slope = num / den;
    Some((slope, mean_y - slope * mean_x))
}

struct Scale {
    min_x: f64,
    span_x: f64,
    max_y: f64,
    width: f64,
    height: f64,
}

impl Scale {
    fn new(points: &[(f64, f64)], width: u32, height: u32) -> Self {
        let min_x = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_x = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let max_y = points.iter().map(|p| p.1).fold(0.0, f64::max);
        Self {
            min_x,
            span_x: (max_x - min_x).max(1.0),
            max_y: max_y.max(1.0),
            width: f64::from(width) - 2.0 * PADDING,
            height: f64::from(height) - 2.0 * PADDING,
        }
    }

    fn project(&self, x: f64, y: f64) -> (f64, f64) {
        let px = PADDING + (x - self.min_x) / self.span_x * self.width;
        let py = PADDING + self.height - (y / self.max_y).clamp(0.0, 1.0) * self.height;
        (px, py)
    }
}

/// Line chart of `points` plus a dashed regression line, axes hidden.
pub fn render_svg(points: &[(f64, f64)], width: u32, height: u32) -> String {
    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    let _ = write!(svg, r#"<rect width="{width}" height="{height}" fill="white"/>"#);

    if !points.is_empty() {
        let scale = Scale::new(points, width, height);
        let path = points
            .iter()
            .map(|(x, y)| {
                let (px, py) = scale.project(*x, *y);
                format!("{px:.1},{py:.1}")
            })
            .collect::<Vec<_>>()
            .join(" ");
        let _ = write!(
            svg,
            r#"<polyline fill="none" stroke="{SERIES_COLOR}" stroke-width="1" points="{path}"/>"#
        );

        if let Some((slope, intercept)) = linear_regression(points) {
            let first = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
            let last = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
            let (x1, y1) = scale.project(first, slope * first + intercept);
            let (x2, y2) = scale.project(last, slope * last + intercept);
            let _ = write!(
                svg,
                r#"<line x1="{x1:.1}" y1="{y1:.1}" x2="{x2:.1}" y2="{y2:.1}" stroke="{TREND_COLOR}" stroke-width="1" stroke-dasharray="5,5"/>"#
            );
        }
    }

    svg.push_str("</svg>");
    svg
}

#[instrument(skip(state))]
pub async fn searches_chart(
    State(state): State<AppState>,
    Query(size): Query<ChartSize>,
) -> AppResult<impl IntoResponse> {
    let since = OffsetDateTime::now_utc() - Duration::days(183);
    let counts = stats::searches_per_day(&state.db, since).await?;
    let points: Vec<(f64, f64)> = counts
        .iter()
        .filter_map(|c| {
            let day = c.date()?.midnight().assume_utc().unix_timestamp();
            Some((day as f64, c.count as f64))
        })
        .collect();

    let (width, height) = size.resolve();
    Ok(([(CONTENT_TYPE, "image/svg+xml")], render_svg(&points, width, height)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_of_a_line_is_the_line() {
        let points = [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)];
        let (slope, intercept) = linear_regression(&points).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
        assert!(linear_regression(&[(1.0, 1.0)]).is_none());
        assert!(linear_regression(&[(1.0, 1.0), (1.0, 2.0)]).is_none());
    }

    #[test]
    fn svg_has_series_and_dashed_trend() {
        let svg = render_svg(&[(0.0, 1.0), (86400.0, 4.0), (172800.0, 2.0)], 300, 100);
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"width="300" height="100""#));
        assert!(svg.contains("<polyline"));
        assert!(svg.contains(r#"stroke-dasharray="5,5""#));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn empty_data_is_a_blank_chart() {
        let svg = render_svg(&[], DEFAULT_WIDTH, DEFAULT_HEIGHT);
        assert!(!svg.contains("<polyline"));
        assert!(!svg.contains("<line"));
    }

    #[test]
    fn size_defaults_and_clamps() {
        assert_eq!(ChartSize::default().resolve(), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
        let big = ChartSize {
            width: Some(100_000),
            height: Some(0),
        };
        assert_eq!(big.resolve(), (MAX_DIMENSION, DEFAULT_HEIGHT));
    }
}
