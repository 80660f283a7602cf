//! Bar chart of a series table as SVG.
//!
//! All coordinates are millimetres: the document declares its size in `mm`
//! and a matching `viewBox`, so one user unit is one millimetre.
//!
//! Layout per workload: a navy section header, one row per successful
//! configuration with three bar groups (GC time inside total time, live heap
//! inside total heap, average pause with a deviation whisker), then a footer
//! with the axis labels.

use svg::node::element::{Line, Rectangle, Text};
use svg::Document;

use super::model::{SeriesTable, Workload};
use super::report::write_float;

/* ----------------------------- Layout ----------------------------- */

pub const COLUMN_WIDTH: f64 = 100.0;
/// Usable bar length inside a column.
pub const PLOT_WIDTH: f64 = 95.0;
pub const BAR_HEIGHT: f64 = 10.0;
pub const TITLE_WIDTH: f64 = 70.0;
pub const LINE_WEIGHT: f64 = 0.4;
pub const HEADER_HEIGHT: f64 = 14.0;
pub const SECTION_HEIGHT: f64 = 8.0;
pub const FOOTER_HEIGHT: f64 = 5.0;

const LINE_COLOR: &str = "rgb(190,190,190)";
const WHISKER_COLOR: &str = "rgb(250,0,0)";
const WHISKER_WEIGHT: f64 = 0.5;
/// Whisker caps stop this far short of the bar edges.
const CAP_INSET: f64 = 2.0;

/// (base, accent) fill pairs. Accent draws the inner bar.
pub const PALETTE: [(&str, &str); 5] = [
    ("rgb(204,70,95)", "rgb(161,55,74)"),
    ("rgb(101,86,150)", "rgb(79,67,117)"),
    ("rgb(183,210,217)", "rgb(157,180,186)"),
    ("rgb(255,227,168)", "rgb(246,219,105)"),
    ("rgb(255,113,97)", "rgb(244,108,62)"),
];

const FONT: &str = "font-family:Noto Serif; font-weight:bold";
const HEADER_FONT_SIZE: f64 = 4.2;
const NAME_FONT_SIZE: f64 = 5.3;
const METRIC_FONT_SIZE: f64 = 3.9;

const COLUMN_TITLES: [(&str, &str); 3] = [
    ("GC time /", "total time (s)"),
    ("Live heap /", "total heap (Kb)"),
    ("Average pause (s)", "+ pause deviation"),
];

/* ----------------------------- Geometry ----------------------------- */

/// Per-workload scale of one bar group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub max: f64,
    pub scale: f64,
}

impl Axis {
    pub fn new(max: f64) -> Self {
        let scale = if max > 0.0 { PLOT_WIDTH / max } else { 0.0 };
        Self { max, scale }
    }

    pub fn length(&self, value: f64) -> f64 {
        value * self.scale
    }
}

/// Horizontal extent of a deviation whisker, axis-local.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Whisker {
    pub start: f64,
    pub end: f64,
}

/// Whisker around a bar ending at `end`, spanning `deviation` to each side.
/// The left end never crosses the axis origin.
pub fn whisker(end: f64, deviation: f64) -> Whisker {
    Whisker {
        start: (end - deviation).max(0.0),
        end: end + deviation,
    }
}

/// Bar lengths of one configuration within a workload section.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRow {
    pub configuration: String,
    pub color: usize,
    pub total_time: f64,
    pub gc_time: f64,
    pub total_heap: f64,
    pub live_heap: f64,
    pub pause: f64,
    pub whisker: Whisker,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadGeometry {
    pub workload: Workload,
    pub time: Axis,
    pub heap: Axis,
    pub pause: Axis,
    pub rows: Vec<BarRow>,
}

impl WorkloadGeometry {
    fn height(&self) -> f64 {
        SECTION_HEIGHT + FOOTER_HEIGHT + self.rows.len() as f64 * (LINE_WEIGHT + BAR_HEIGHT)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartGeometry {
    pub sections: Vec<WorkloadGeometry>,
}

impl ChartGeometry {
    pub fn width(&self) -> f64 {
        TITLE_WIDTH + 3.0 * COLUMN_WIDTH + 5.0 * LINE_WEIGHT
    }

    pub fn height(&self) -> f64 {
        let body: f64 = self.sections.iter().map(WorkloadGeometry::height).sum();
        body + HEADER_HEIGHT + 2.0 * LINE_WEIGHT
    }
}

/// Compute bar lengths for every workload with at least one result.
///
/// `configuration_names` fixes each configuration's palette slot so a
/// configuration keeps its color in every section.
pub fn chart_geometry(series: &SeriesTable, configuration_names: &[String]) -> ChartGeometry {
    let mut sections = Vec::new();

    for (workload, entries) in series.iter() {
        if entries.is_empty() {
            continue;
        }

        let time = Axis::new(max_of(entries.iter().map(|e| e.result.total_seconds)));
        let heap = Axis::new(max_of(entries.iter().map(|e| e.result.average_heap)));
        let pause = Axis::new(max_of(
            entries
                .iter()
                .map(|e| e.result.average_pause + e.result.pause_deviation),
        ));

        let rows = entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let r = &e.result;
                let slot = configuration_names
                    .iter()
                    .position(|n| *n == e.configuration)
                    .unwrap_or(i);
                let pause_len = pause.length(r.average_pause);
                BarRow {
                    configuration: e.configuration.clone(),
                    color: slot % PALETTE.len(),
                    total_time: time.length(r.total_seconds),
                    gc_time: time.length(r.gc_seconds),
                    total_heap: heap.length(r.average_heap),
                    live_heap: heap.length(r.live_heap()),
                    pause: pause_len,
                    whisker: whisker(pause_len, pause.length(r.pause_deviation)),
                }
            })
            .collect();

        sections.push(WorkloadGeometry {
            workload: workload.clone(),
            time,
            heap,
            pause,
            rows,
        });
    }

    ChartGeometry { sections }
}

fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, f64::max)
}

/* ----------------------------- SVG ----------------------------- */

/// Left edge of bar column `i` (0..3).
fn column_x(i: usize) -> f64 {
    TITLE_WIDTH + 2.0 * LINE_WEIGHT + i as f64 * (COLUMN_WIDTH + LINE_WEIGHT)
}

fn line(x1: f64, y1: f64, x2: f64, y2: f64, color: &str, weight: f64) -> Line {
    Line::new()
        .set("x1", x1)
        .set("y1", y1)
        .set("x2", x2)
        .set("y2", y2)
        .set("stroke", color)
        .set("stroke-width", weight)
}

fn rect(x: f64, y: f64, w: f64, h: f64, fill: &str) -> Rectangle {
    Rectangle::new()
        .set("x", x)
        .set("y", y)
        .set("width", w)
        .set("height", h)
        .set("fill", fill)
}

fn text(x: f64, y: f64, size: f64, anchor: &str, fill: &str, body: &str) -> Text {
    Text::new(body)
        .set("x", x)
        .set("y", y)
        .set("fill", fill)
        .set("text-anchor", anchor)
        .set("style", format!("font-size:{size}px; {FONT}"))
}

/// Render chart geometry as a standalone SVG document.
pub fn render_svg(chart: &ChartGeometry) -> String {
    let width = chart.width();
    let height = chart.height();
    let mut doc = Document::new()
        .set("xmlns", "http://www.w3.org/2000/svg")
        .set("width", format!("{width:.2}mm"))
        .set("height", format!("{height:.2}mm"))
        .set("viewBox", format!("0 0 {width:.2} {height:.2}"));

    // Border and column dividers
    doc = doc
        .add(line(0.0, 0.0, width, 0.0, LINE_COLOR, LINE_WEIGHT))
        .add(line(0.0, 0.0, 0.0, height, LINE_COLOR, LINE_WEIGHT))
        .add(line(0.0, height, width, height, LINE_COLOR, LINE_WEIGHT))
        .add(line(width, 0.0, width, height, LINE_COLOR, LINE_WEIGHT));
    for i in 0..3 {
        let x = column_x(i) - LINE_WEIGHT;
        doc = doc.add(line(x, 0.0, x, height, LINE_COLOR, LINE_WEIGHT));
    }

    for (i, (first, second)) in COLUMN_TITLES.iter().enumerate() {
        let x = column_x(i) + 10.0;
        doc = doc
            .add(text(x, 5.0, HEADER_FONT_SIZE, "start", "rgb(0,0,0)", first))
            .add(text(x, 10.0, HEADER_FONT_SIZE, "start", "rgb(0,0,0)", second));
    }

    let mut y = HEADER_HEIGHT + LINE_WEIGHT;
    for section in &chart.sections {
        doc = doc.add(rect(0.0, y, width, SECTION_HEIGHT, "navy"));
        y += SECTION_HEIGHT;
        doc = doc.add(text(
            width / 2.0,
            y - 2.0,
            NAME_FONT_SIZE,
            "middle",
            "rgb(255,255,255)",
            section.workload.name(),
        ));

        for row in &section.rows {
            let (base, accent) = PALETTE[row.color];
            let (time_x, heap_x, pause_x) = (column_x(0), column_x(1), column_x(2));

            doc = doc
                .add(rect(time_x, y, row.total_time, BAR_HEIGHT, base))
                .add(rect(time_x, y, row.gc_time, BAR_HEIGHT, accent))
                .add(rect(heap_x, y, row.total_heap, BAR_HEIGHT, base))
                .add(rect(heap_x, y, row.live_heap, BAR_HEIGHT, accent))
                .add(rect(pause_x, y, row.pause, BAR_HEIGHT, base));

            let (left, right) = (pause_x + row.whisker.start, pause_x + row.whisker.end);
            let (top, bottom) = (y + CAP_INSET, y + BAR_HEIGHT - CAP_INSET);
            let mid = y + BAR_HEIGHT / 2.0;
            doc = doc
                .add(line(left, top, left, bottom, WHISKER_COLOR, WHISKER_WEIGHT))
                .add(line(left, mid, right, mid, WHISKER_COLOR, WHISKER_WEIGHT))
                .add(line(right, top, right, bottom, WHISKER_COLOR, WHISKER_WEIGHT));

            y += BAR_HEIGHT;
            doc = doc
                .add(text(
                    TITLE_WIDTH - 10.0,
                    y - 4.0,
                    NAME_FONT_SIZE,
                    "end",
                    "rgb(0,0,0)",
                    &row.configuration,
                ))
                .add(line(0.0, y, width, y, LINE_COLOR, LINE_WEIGHT));
            y += LINE_WEIGHT;
        }

        y += FOOTER_HEIGHT - 1.0;
        for (i, axis) in [section.time, section.heap, section.pause].iter().enumerate() {
            let x = TITLE_WIDTH + i as f64 * COLUMN_WIDTH;
            doc = doc
                .add(text(x + 5.0, y, METRIC_FONT_SIZE, "start", "rgb(0,0,0)", "0"))
                .add(text(
                    x + COLUMN_WIDTH - 5.0,
                    y,
                    METRIC_FONT_SIZE,
                    "end",
                    "rgb(0,0,0)",
                    &write_float(axis.max),
                ));
        }
        y += 1.0;
    }

    let mut out = doc.to_string();
    out.push('\n');
    out
}

/* ----------------------------- Tests ----------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::model::{RawMetrics, RunResult};

    fn result(total: f64, gc: f64, heap: f64, free: f64, pause: f64, dev: f64) -> RunResult {
        RunResult::new(RawMetrics {
            total_seconds: total,
            gc_seconds: gc,
            average_heap: heap,
            average_free_heap: free,
            average_pause: pause,
            pause_deviation: dev,
            ..Default::default()
        })
        .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// @test The largest value on each axis spans the whole plot width.
    #[test]
    fn max_bar_spans_plot() {
        let wl = [Workload::from("diff")];
        let mut table = SeriesTable::new(&wl);
        table.push(&wl[0], "a", result(4.0, 1.0, 2000.0, 500.0, 0.01, 0.0));
        table.push(&wl[0], "b", result(2.0, 0.5, 1000.0, 500.0, 0.02, 0.0));

        let chart = chart_geometry(&table, &names(&["a", "b"]));
        let rows = &chart.sections[0].rows;
        assert!((rows[0].total_time - PLOT_WIDTH).abs() < 1e-9);
        assert!((rows[1].total_time - PLOT_WIDTH / 2.0).abs() < 1e-9);
        assert!((rows[0].gc_time - PLOT_WIDTH / 4.0).abs() < 1e-9);
        assert!((rows[0].total_heap - PLOT_WIDTH).abs() < 1e-9);
        assert!((rows[1].live_heap - PLOT_WIDTH / 4.0).abs() < 1e-9);
        assert!((rows[1].pause - PLOT_WIDTH).abs() < 1e-9);
    }

    /// @test The pause axis leaves room for the widest whisker.
    #[test]
    fn pause_axis_includes_deviation() {
        let wl = [Workload::from("diff")];
        let mut table = SeriesTable::new(&wl);
        table.push(&wl[0], "a", result(1.0, 0.0, 1.0, 0.0, 3.0, 1.0));

        let chart = chart_geometry(&table, &names(&["a"]));
        let section = &chart.sections[0];
        assert_eq!(section.pause.max, 4.0);
        let row = &section.rows[0];
        assert!((row.whisker.end - PLOT_WIDTH).abs() < 1e-9);
        assert!(row.pause < PLOT_WIDTH);
    }

    /// @test Whisker left end is clipped at the origin.
    #[test]
    fn whisker_clipped() {
        assert_eq!(whisker(5.0, 8.0), Whisker { start: 0.0, end: 13.0 });
        assert_eq!(whisker(10.0, 2.0), Whisker { start: 8.0, end: 12.0 });
    }

    /// @test An all-zero axis draws zero-length bars.
    #[test]
    fn zero_max_zero_scale() {
        let axis = Axis::new(0.0);
        assert_eq!(axis.scale, 0.0);
        assert_eq!(axis.length(5.0), 0.0);
    }

    /// @test Colors follow configuration position, not row position.
    #[test]
    fn colors_stable_across_workloads() {
        let wl = [Workload::from("w1"), Workload::from("w2")];
        let mut table = SeriesTable::new(&wl);
        let r = result(1.0, 0.1, 10.0, 1.0, 0.1, 0.0);
        table.push(&wl[0], "a", r.clone());
        table.push(&wl[0], "b", r.clone());
        // "a" failed on w2, so "b" is the first row there.
        table.push(&wl[1], "b", r);

        let chart = chart_geometry(&table, &names(&["a", "b"]));
        assert_eq!(chart.sections[0].rows[1].color, 1);
        assert_eq!(chart.sections[1].rows[0].color, 1);
    }

    /// @test Palette wraps after five configurations.
    #[test]
    fn palette_wraps() {
        let wl = [Workload::from("w")];
        let list = ["c0", "c1", "c2", "c3", "c4", "c5"];
        let mut table = SeriesTable::new(&wl);
        for name in list {
            table.push(&wl[0], name, result(1.0, 0.1, 10.0, 1.0, 0.1, 0.0));
        }
        let chart = chart_geometry(&table, &names(&list));
        assert_eq!(chart.sections[0].rows[5].color, 0);
    }

    /// @test Workloads without results are left out of the chart.
    #[test]
    fn empty_series_omitted() {
        let wl = [Workload::from("emptyWorkload"), Workload::from("fullWorkload")];
        let mut table = SeriesTable::new(&wl);
        table.push(&wl[1], "a", result(1.0, 0.1, 10.0, 1.0, 0.1, 0.0));

        let chart = chart_geometry(&table, &names(&["a"]));
        assert_eq!(chart.sections.len(), 1);
        assert_eq!(chart.sections[0].workload, wl[1]);
        let svg = render_svg(&chart);
        assert!(!svg.contains("emptyWorkload"));
        assert!(svg.contains("fullWorkload"));
    }

    /// @test Document size is declared in millimetres.
    #[test]
    fn svg_in_millimetres() {
        let wl = [Workload::from("w")];
        let mut table = SeriesTable::new(&wl);
        table.push(&wl[0], "a", result(1.0, 0.1, 10.0, 1.0, 0.1, 0.0));
        let chart = chart_geometry(&table, &names(&["a"]));

        let svg = render_svg(&chart);
        assert!(svg.contains("<svg"));
        assert!(svg.contains("width=\"372.00mm\""));
        let expected_h = SECTION_HEIGHT + FOOTER_HEIGHT + LINE_WEIGHT + BAR_HEIGHT
            + HEADER_HEIGHT
            + 2.0 * LINE_WEIGHT;
        assert!(svg.contains(&format!("height=\"{expected_h:.2}mm\"")));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    /// @test Markup in names never reaches the document unescaped.
    #[test]
    fn names_escaped() {
        let wl = [Workload::from("a<b")];
        let mut table = SeriesTable::new(&wl);
        table.push(&wl[0], "x<y", result(1.0, 0.1, 10.0, 1.0, 0.1, 0.0));
        let svg = render_svg(&chart_geometry(&table, &names(&["x<y"])));
        assert!(!svg.contains("a<b"));
        assert!(!svg.contains("x<y"));
    }

    /// @test Every bar is drawn as a rectangle with the row's palette colors.
    #[test]
    fn bars_use_palette() {
        let wl = [Workload::from("w")];
        let mut table = SeriesTable::new(&wl);
        table.push(&wl[0], "a", result(1.0, 0.1, 10.0, 1.0, 0.1, 0.0));
        table.push(&wl[0], "b", result(2.0, 0.1, 10.0, 1.0, 0.1, 0.0));
        let svg = render_svg(&chart_geometry(&table, &names(&["a", "b"])));

        // Section header plus five bars per row.
        assert_eq!(svg.matches("<rect").count(), 1 + 2 * 5);
        for (base, accent) in &PALETTE[..2] {
            assert!(svg.contains(base));
            assert!(svg.contains(accent));
        }
        assert!(!svg.contains(PALETTE[2].0));
    }
}
