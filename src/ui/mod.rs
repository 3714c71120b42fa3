/// Presentation layer: Plotly figure JSON for each chart panel.
///
/// The page itself lives in `static/index.html` and only ever draws what
/// [`plot::build_figure`] returns.

pub mod plot;
