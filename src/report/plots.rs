//! SVG figures for the report deck

use plotters::prelude::*;

use crate::de::DeTable;
use crate::embed::Embedding;
use crate::enrich::OraRow;
use crate::error::{Result, UcseqError};

const FIG_SIZE: (u32, u32) = (760, 520);

fn render_err<E: std::fmt::Display>(figure: &str) -> impl Fn(E) -> UcseqError + '_ {
    move |e| UcseqError::RenderFailed {
        reason: format!("{}: {}", figure, e),
    }
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    if !lo.is_finite() || !hi.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = ((hi - lo) * 0.08).max(1e-6);
    (lo - pad, hi + pad)
}

/// Scatter of the first two embedding axes, one color per group level
pub fn embedding_scatter(
    embedding: &Embedding,
    group_labels: &[String],
    title: &str,
) -> Result<String> {
    if group_labels.len() != embedding.n_samples() {
        return Err(UcseqError::DimensionMismatch {
            expected: format!("{} group labels", embedding.n_samples()),
            got: format!("{}", group_labels.len()),
        });
    }
    let x = embedding.axis(0);
    let y = embedding.axis(1);
    let (x_lo, x_hi) = padded_range(x.iter().copied());
    let (y_lo, y_hi) = padded_range(y.iter().copied());

    let mut levels: Vec<String> = group_labels.to_vec();
    levels.sort();
    levels.dedup();

    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, FIG_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_err("embedding scatter"))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 24))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
            .map_err(render_err("embedding scatter"))?;
        chart
            .configure_mesh()
            .x_desc("axis 1")
            .y_desc("axis 2")
            .draw()
            .map_err(render_err("embedding scatter"))?;

        for (li, level) in levels.iter().enumerate() {
            let color = Palette99::pick(li).mix(0.9);
            chart
                .draw_series(
                    group_labels
                        .iter()
                        .enumerate()
                        .filter(|(_, l)| *l == level)
                        .map(|(i, _)| Circle::new((x[i], y[i]), 5, color.filled())),
                )
                .map_err(render_err("embedding scatter"))?
                .label(level.clone())
                .legend(move |(lx, ly)| Circle::new((lx + 8, ly), 5, color.filled()));
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_err("embedding scatter"))?;
        root.present().map_err(render_err("embedding scatter"))?;
    }
    Ok(buf)
}

/// Volcano plot: log2 fold change against -log10 p, hits highlighted
pub fn volcano(table: &DeTable, padj_max: f64, lfc_min: f64, title: &str) -> Result<String> {
    let points: Vec<(f64, f64, bool)> = table
        .rows
        .iter()
        .filter(|r| r.pvalue.is_finite() && r.log2_fold_change.is_finite())
        .map(|r| {
            let neg_log_p = -r.pvalue.max(1e-300).log10();
            let hit =
                r.padj.is_finite() && r.padj < padj_max && r.log2_fold_change.abs() > lfc_min;
            (r.log2_fold_change, neg_log_p, hit)
        })
        .collect();
    if points.is_empty() {
        return Err(UcseqError::EmptyData {
            reason: "No finite points for the volcano plot".to_string(),
        });
    }
    let (x_lo, x_hi) = padded_range(points.iter().map(|p| p.0));
    let (_, y_hi) = padded_range(points.iter().map(|p| p.1));

    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, FIG_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_err("volcano"))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 24))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_lo..x_hi, 0.0..y_hi)
            .map_err(render_err("volcano"))?;
        chart
            .configure_mesh()
            .x_desc("log2 fold change")
            .y_desc("-log10 p")
            .draw()
            .map_err(render_err("volcano"))?;

        chart
            .draw_series(
                points
                    .iter()
                    .filter(|p| !p.2)
                    .map(|&(x, y, _)| Circle::new((x, y), 2, BLACK.mix(0.35).filled())),
            )
            .map_err(render_err("volcano"))?;
        chart
            .draw_series(
                points
                    .iter()
                    .filter(|p| p.2)
                    .map(|&(x, y, _)| Circle::new((x, y), 3, RED.mix(0.85).filled())),
            )
            .map_err(render_err("volcano"))?;
        root.present().map_err(render_err("volcano"))?;
    }
    Ok(buf)
}

/// Per-gene variance against variance rank, cutoff marked
pub fn variance_curve(variances: &[f64], n_top: usize, title: &str) -> Result<String> {
    if variances.is_empty() {
        return Err(UcseqError::EmptyData {
            reason: "No variances for the variance curve".to_string(),
        });
    }
    let mut sorted: Vec<f64> = variances.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let log_var: Vec<f64> = sorted.iter().map(|&v| (v + 1.0).log10()).collect();
    let (y_lo, y_hi) = padded_range(log_var.iter().copied());

    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, FIG_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_err("variance curve"))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 24))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0.0..sorted.len() as f64, y_lo..y_hi)
            .map_err(render_err("variance curve"))?;
        chart
            .configure_mesh()
            .x_desc("variance rank")
            .y_desc("log10(variance + 1)")
            .draw()
            .map_err(render_err("variance curve"))?;

        chart
            .draw_series(LineSeries::new(
                log_var.iter().enumerate().map(|(i, &v)| (i as f64, v)),
                BLUE.stroke_width(2),
            ))
            .map_err(render_err("variance curve"))?;
        if n_top < sorted.len() {
            chart
                .draw_series(LineSeries::new(
                    [(n_top as f64, y_lo), (n_top as f64, y_hi)],
                    RED.mix(0.6).stroke_width(1),
                ))
                .map_err(render_err("variance curve"))?;
        }
        root.present().map_err(render_err("variance curve"))?;
    }
    Ok(buf)
}

/// Horizontal bar chart of -log10 adjusted p for the leading pathways
pub fn enrichment_bars(rows: &[OraRow], max_bars: usize, title: &str) -> Result<String> {
    if rows.is_empty() {
        return Err(UcseqError::EmptyData {
            reason: "No enrichment rows to plot".to_string(),
        });
    }
    let shown: Vec<&OraRow> = rows.iter().take(max_bars).collect();
    let x_hi = shown
        .iter()
        .map(|r| -r.padj.max(1e-300).log10())
        .fold(0.0f64, f64::max)
        .max(1.0)
        * 1.1;

    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, FIG_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_err("enrichment bars"))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 24))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(220)
            .build_cartesian_2d(0.0..x_hi, 0..shown.len())
            .map_err(render_err("enrichment bars"))?;
        chart
            .configure_mesh()
            .disable_y_mesh()
            .x_desc("-log10 adjusted p")
            .y_labels(shown.len())
            .y_label_formatter(&|idx: &usize| {
                shown
                    .get(*idx)
                    .map(|r| r.set_name.clone())
                    .unwrap_or_default()
            })
            .draw()
            .map_err(render_err("enrichment bars"))?;

        chart
            .draw_series(shown.iter().enumerate().map(|(i, r)| {
                let value = -r.padj.max(1e-300).log10();
                Rectangle::new(
                    [(0.0, i), (value, i + 1)],
                    Palette99::pick(2).mix(0.7).filled(),
                )
            }))
            .map_err(render_err("enrichment bars"))?;
        root.present().map_err(render_err("enrichment bars"))?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::de::DeRow;
    use crate::embed::EmbedMethod;
    use ndarray::array;

    fn embedding() -> Embedding {
        Embedding {
            sample_ids: vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()],
            coords: array![[1.0, 2.0], [-1.0, 0.5], [0.2, -1.0], [2.0, 1.5]],
            method: EmbedMethod::Pca,
            variance_explained: Some(vec![0.5, 0.2]),
        }
    }

    #[test]
    fn test_embedding_scatter_is_svg() {
        let labels = vec!["a".to_string(), "a".to_string(), "b".to_string(), "b".to_string()];
        let svg = embedding_scatter(&embedding(), &labels, "PCA").unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("PCA"));
    }

    #[test]
    fn test_scatter_label_mismatch_rejected() {
        let labels = vec!["a".to_string()];
        assert!(embedding_scatter(&embedding(), &labels, "PCA").is_err());
    }

    #[test]
    fn test_volcano_renders() {
        let rows = (0..50)
            .map(|i| DeRow {
                gene_id: format!("g{}", i),
                symbol: format!("g{}", i),
                base_mean: 10.0,
                log2_fold_change: (i as f64 - 25.0) / 5.0,
                stat: 0.0,
                pvalue: 1e-4 * (i + 1) as f64,
                padj: 1e-3 * (i + 1) as f64,
            })
            .collect();
        let table = DeTable {
            model: "wald".to_string(),
            rows,
        };
        let svg = volcano(&table, 0.07, 1.0, "Volcano").unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn test_variance_curve_renders() {
        let variances: Vec<f64> = (0..200).map(|i| (200 - i) as f64).collect();
        let svg = variance_curve(&variances, 50, "Variance").unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn test_enrichment_bars_render() {
        let rows = vec![OraRow {
            set_name: "IFN".to_string(),
            overlap: 5,
            set_size: 30,
            query_size: 40,
            universe_size: 5000,
            fold_enrichment: 12.0,
            pvalue: 1e-5,
            padj: 1e-4,
        }];
        let svg = enrichment_bars(&rows, 10, "Pathways").unwrap();
        assert!(svg.contains("<svg"));
    }
}
