//! Self-contained HTML slide deck
//!
//! One section per pipeline stage, navigated with the arrow keys or the
//! on-screen buttons. Figures are inlined SVG so the file has no external
//! dependencies and can be mailed around as-is.

use crate::de::DeRow;
use crate::report::ReportContext;

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn fmt_p(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else if v < 1e-3 && v > 0.0 {
        format!("{:.1e}", v)
    } else {
        format!("{:.3}", v)
    }
}

fn de_rows_table(rows: &[DeRow]) -> String {
    let mut out = String::from(
        "<table><tr><th>gene</th><th>symbol</th><th>log2FC</th><th>p</th><th>padj</th></tr>",
    );
    for r in rows {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{:+.2}</td><td>{}</td><td>{}</td></tr>",
            escape(&r.gene_id),
            escape(&r.symbol),
            r.log2_fold_change,
            fmt_p(r.pvalue),
            fmt_p(r.padj),
        ));
    }
    out.push_str("</table>");
    out
}

fn slide(title: &str, body: &str) -> String {
    format!(
        "<section class=\"slide\"><h2>{}</h2>{}</section>\n",
        escape(title),
        body
    )
}

fn figure_or_note(fig: &Option<String>, note: &str) -> String {
    match fig {
        Some(svg) => format!("<div class=\"fig\">{}</div>", svg),
        None => format!("<p class=\"note\">{}</p>", escape(note)),
    }
}

/// Render the whole deck as a single HTML document
pub fn render_deck(ctx: &ReportContext) -> String {
    let mut slides = String::new();

    slides.push_str(&slide(
        "Cohort overview",
        &format!(
            "<ul>\
             <li>{} samples, {} genes ({} after prevalence filtering)</li>\
             <li>Contrast: {} = {} vs {}</li>\
             <li>Embedding: {} on the top {} variable genes, seed {}</li>\
             </ul>",
            ctx.n_samples,
            ctx.n_genes_raw,
            ctx.n_genes_filtered,
            escape(&ctx.params.condition_column),
            escape(&ctx.params.level_a),
            escape(&ctx.params.level_b),
            escape(&ctx.params.embed_method),
            ctx.params.n_top_genes,
            ctx.params.seed,
        ),
    ));

    slides.push_str(&slide(
        "Gene variance",
        &figure_or_note(&ctx.figures.variance, "Variance curve not rendered."),
    ));

    let variance_note = match &ctx.embedding.variance_explained {
        Some(ve) => {
            let parts: Vec<String> = ve
                .iter()
                .enumerate()
                .map(|(i, v)| format!("PC{}: {:.1}%", i + 1, v * 100.0))
                .collect();
            format!("<p>Variance explained: {}</p>", parts.join(", "))
        }
        None => String::new(),
    };
    slides.push_str(&slide(
        "Sample embedding",
        &format!(
            "{}{}",
            figure_or_note(&ctx.figures.embedding, "Embedding figure not rendered."),
            variance_note
        ),
    ));

    let mut assoc_body = String::from(
        "<table><tr><th>component</th><th>factor level</th><th>rho</th><th>p</th><th>padj</th></tr>",
    );
    for r in &ctx.pc_assoc {
        assoc_body.push_str(&format!(
            "<tr><td>PC{}</td><td>{}</td><td>{:+.2}</td><td>{}</td><td>{}</td></tr>",
            r.component + 1,
            escape(&r.factor_level),
            r.rho,
            fmt_p(r.pvalue),
            fmt_p(r.padj),
        ));
    }
    assoc_body.push_str("</table>");
    let mut tests_body = String::from(
        "<table><tr><th>component</th><th>factor</th><th>test</th><th>p</th><th>padj</th></tr>",
    );
    for r in &ctx.group_tests {
        tests_body.push_str(&format!(
            "<tr><td>PC{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            r.component + 1,
            escape(&r.factor),
            escape(&r.test),
            fmt_p(r.pvalue),
            fmt_p(r.padj),
        ));
    }
    tests_body.push_str("</table>");
    slides.push_str(&slide(
        "Component associations",
        &format!("{}<h3>Group tests</h3>{}", assoc_body, tests_body),
    ));

    slides.push_str(&slide(
        "Differential expression (Wald)",
        &format!(
            "{}{}",
            figure_or_note(&ctx.figures.volcano_wald, "Volcano not rendered."),
            de_rows_table(&ctx.top_wald)
        ),
    ));
    slides.push_str(&slide(
        "Differential expression (exact)",
        &format!(
            "{}{}",
            figure_or_note(&ctx.figures.volcano_exact, "Volcano not rendered."),
            de_rows_table(&ctx.top_exact)
        ),
    ));

    let agreement = match ctx.comparison.rank_agreement {
        Some(rho) => format!("rank agreement rho = {:+.2}", rho),
        None => "too few shared genes for a rank agreement".to_string(),
    };
    slides.push_str(&slide(
        "Model comparison",
        &format!(
            "<ul>\
             <li>Shared top genes ({}): {}</li>\
             <li>Wald only: {}</li>\
             <li>Exact only: {}</li>\
             <li>{}</li>\
             </ul>",
            ctx.comparison.shared.len(),
            escape(&ctx.comparison.shared.join(", ")),
            escape(&ctx.comparison.wald_only.join(", ")),
            escape(&ctx.comparison.exact_only.join(", ")),
            escape(&agreement),
        ),
    ));

    if let Some(paired) = &ctx.paired {
        // Genes with the largest mean inflamed/non-inflamed shift
        let means = paired.mean_log2_ratio();
        let mut order: Vec<usize> = (0..means.len()).collect();
        order.sort_by(|&a, &b| {
            means[b]
                .abs()
                .partial_cmp(&means[a].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut body = format!(
            "<p>{} patients with 2 inflamed + 2 non-inflamed biopsies.</p>\
             <table><tr><th>gene</th><th>mean log2 ratio</th></tr>",
            paired.n_patients()
        );
        for &g in order.iter().take(15) {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{:+.2}</td></tr>",
                escape(&ctx.pair_gene_ids[g]),
                means[g],
            ));
        }
        body.push_str("</table>");
        slides.push_str(&slide("Replicate-pair ratios", &body));
    }

    if !ctx.ora.is_empty() || !ctx.gsea.is_empty() {
        let mut body =
            figure_or_note(&ctx.figures.enrichment, "Enrichment figure not rendered.");
        if !ctx.gsea.is_empty() {
            body.push_str(
                "<h3>GSEA</h3><table><tr><th>set</th><th>NES</th><th>p</th><th>padj</th></tr>",
            );
            for r in ctx.gsea.iter().take(10) {
                body.push_str(&format!(
                    "<tr><td>{}</td><td>{:+.2}</td><td>{}</td><td>{}</td></tr>",
                    escape(&r.set_name),
                    r.nes,
                    fmt_p(r.pvalue),
                    fmt_p(r.padj),
                ));
            }
            body.push_str("</table>");
        }
        slides.push_str(&slide("Pathway enrichment", &body));
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Ulcerative colitis cohort report</title>\n<style>\n{}\n</style>\n</head>\n<body>\n\
         <main id=\"deck\">\n{}\n</main>\n\
         <nav><button id=\"prev\">&#8592;</button>\
         <span id=\"pos\"></span>\
         <button id=\"next\">&#8594;</button></nav>\n\
         <script>\n{}\n</script>\n</body>\n</html>\n",
        STYLE, slides, SCRIPT
    )
}

const STYLE: &str = "\
body { font-family: sans-serif; margin: 0; background: #fafafa; }
.slide { display: none; padding: 2rem 3rem; max-width: 900px; margin: 0 auto; }
.slide.active { display: block; }
.fig svg { max-width: 100%; height: auto; }
table { border-collapse: collapse; margin-top: 0.5rem; }
td, th { border: 1px solid #ccc; padding: 0.25rem 0.6rem; text-align: left; }
nav { position: fixed; bottom: 1rem; width: 100%; text-align: center; }
nav button { font-size: 1.2rem; padding: 0.2rem 0.8rem; }
.note { color: #888; font-style: italic; }";

const SCRIPT: &str = "\
const slides = document.querySelectorAll('.slide');
let current = 0;
function show(i) {
  current = Math.max(0, Math.min(slides.length - 1, i));
  slides.forEach((s, j) => s.classList.toggle('active', j === current));
  document.getElementById('pos').textContent = (current + 1) + ' / ' + slides.length;
}
document.getElementById('prev').addEventListener('click', () => show(current - 1));
document.getElementById('next').addEventListener('click', () => show(current + 1));
document.addEventListener('keydown', (e) => {
  if (e.key === 'ArrowLeft') show(current - 1);
  if (e.key === 'ArrowRight' || e.key === ' ') show(current + 1);
});
show(0);";
