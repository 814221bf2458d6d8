//! PNG charts via plotters (optional feature).
//!
//! Two charts:
//! - accuracy by clock type (hour vs minute vs exact, grouped bars)
//! - optimization history (candidate score per iteration, best-so-far line)

#[cfg(feature = "plotters")]
use plotters::prelude::*;

use super::metrics::MetricSet;
use crate::types::OptimizationRecord;

/// Grouped accuracy bars per clock type.
#[cfg(feature = "plotters")]
pub fn plot_accuracy_by_clock_type(metrics: &MetricSet, output_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let groups: Vec<_> = if metrics.by_clock_type.is_empty() {
        vec![("all".to_string(), metrics)]
    } else {
        metrics
            .by_clock_type
            .iter()
            .map(|(t, m)| (t.as_str().to_string(), m))
            .collect()
    };
    let n = groups.len();

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Accuracy by Clock Type", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..(n as f64), 0.0..1.0)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n.max(1))
        .x_label_formatter(&|x| {
            let idx = x.floor() as usize;
            groups.get(idx).map(|(name, _)| name.clone()).unwrap_or_default()
        })
        .y_desc("Accuracy")
        .draw()?;

    let bars = [
        ("Hour", BLUE, 0.15),
        ("Minute", GREEN, 0.40),
        ("Exact", RGBColor(128, 0, 128), 0.65),
    ];

    for (label, color, offset) in bars {
        chart
            .draw_series(groups.iter().enumerate().map(|(i, (_, m))| {
                let value = match label {
                    "Hour" => m.hour.accuracy,
                    "Minute" => m.minute.accuracy,
                    _ => m.combined.exact_match_accuracy,
                };
                let x = i as f64 + offset;
                Rectangle::new([(x, 0.0), (x + 0.2, value)], color.mix(0.8).filled())
            }))?
            .label(label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    tracing::info!(path = output_path, "saved accuracy chart");
    Ok(())
}

/// Candidate validation score per iteration with the running best.
#[cfg(feature = "plotters")]
pub fn plot_optimization_history(
    history: &[OptimizationRecord],
    initial_best: f64,
    output_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let n = history.len();
    if n == 0 {
        return Ok(());
    }

    let root = BitMapBackend::new(output_path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Prompt Optimization (exact match)", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..(n as f64 + 1.0), 0.0..1.0)?;

    chart
        .configure_mesh()
        .x_desc("Iteration")
        .y_desc("Score")
        .draw()?;

    let candidates: Vec<_> = history
        .iter()
        .map(|r| (r.iteration as f64, r.score_after))
        .collect();
    let training: Vec<_> = history
        .iter()
        .map(|r| (r.iteration as f64, r.score_before))
        .collect();

    let mut best = initial_best;
    let mut best_line = vec![(0.0, initial_best)];
    for r in history {
        if r.status == crate::types::RecordStatus::Accepted {
            best = r.score_after;
        }
        best_line.push((r.iteration as f64, best));
    }

    chart
        .draw_series(LineSeries::new(best_line, &GREEN))?
        .label("Best so far")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &GREEN));

    chart
        .draw_series(candidates.iter().map(|(x, y)| Circle::new((*x, *y), 5, BLUE.filled())))?
        .label("Candidate (validation)")
        .legend(|(x, y)| Circle::new((x + 10, y), 5, BLUE.filled()));

    chart
        .draw_series(training.iter().map(|(x, y)| Cross::new((*x, *y), 5, RED.mix(0.7))))?
        .label("Current best (training)")
        .legend(|(x, y)| Cross::new((x + 10, y), 5, RED));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    tracing::info!(path = output_path, "saved optimization chart");
    Ok(())
}

/// Stub when plotters feature is disabled.
#[cfg(not(feature = "plotters"))]
pub fn plot_accuracy_by_clock_type(_metrics: &MetricSet, _output_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::warn!("plotting requires --features plotters");
    Ok(())
}

/// Stub when plotters feature is disabled.
#[cfg(not(feature = "plotters"))]
pub fn plot_optimization_history(
    _history: &[OptimizationRecord],
    _initial_best: f64,
    _output_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::warn!("plotting requires --features plotters");
    Ok(())
}
