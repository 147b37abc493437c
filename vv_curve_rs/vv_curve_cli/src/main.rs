use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use vv_curve::snapshot::{load_snapshot_file, parse_timestamp, DEFAULT_PATTERN};
use vv_curve::{
    compute_entity_curve, parse_vote_count, select_top, DirectorySource, EntityCurve,
    FileSource, NegativeDeltaPolicy, RateSample, Snapshot, SnapshotSource, VelocityConfig,
    VelocityCurve, VvError,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Vote velocity curve CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute votes-per-minute curves (CSV/plot/report) from the latest snapshot
    Curve(CurveArgs),
    /// Print the entities with the highest latest vote counts
    Top(TopArgs),
    /// Append one leaderboard reading (`name,votes` rows) to a history file
    Record(RecordArgs),
}

#[derive(Args, Debug)]
struct SnapshotArgs {
    /// Directory searched for the newest history file
    #[arg(long, default_value = ".", value_hint = ValueHint::DirPath)]
    dir: PathBuf,

    /// File name pattern with a single `*` wildcard
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// Read this history file instead of searching `--dir`
    #[arg(long, value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TuningArgs {
    /// JSON file with configuration values (flags override it)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Moving-average window over raw rates (odd)
    #[arg(long)]
    smoothing_window: Option<usize>,

    /// Minutes between observations that count as a collection gap
    #[arg(long)]
    gap_threshold: Option<f64>,

    /// Spline residual budget per sample
    #[arg(long)]
    spline_factor: Option<f64>,

    /// Number of points on the resampled curve
    #[arg(long)]
    resolution: Option<usize>,

    /// Rates above this many votes/min are treated as corrupt
    #[arg(long)]
    outlier_ceiling: Option<f64>,

    /// Disable the outlier ceiling
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "outlier_ceiling")]
    no_outlier_ceiling: bool,

    /// What to do with decreasing counts
    #[arg(long, value_enum)]
    negative_policy: Option<NegativePolicyOpt>,

    /// Number of leading entities to process
    #[arg(long)]
    top: Option<usize>,
}

#[derive(Parser, Debug)]
struct CurveArgs {
    #[command(flatten)]
    snapshot: SnapshotArgs,

    #[command(flatten)]
    tuning: TuningArgs,

    /// Process every entity instead of the top N
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "entity")]
    all: bool,

    /// Process these entities (repeatable)
    #[arg(long)]
    entity: Vec<String>,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "velocity.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output chart path, `.png` or `.svg` (defaults next to CSV)
    #[arg(long, value_hint = ValueHint::FilePath)]
    png: Option<PathBuf>,

    /// Skip chart rendering
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Write a JSON report with per-entity diagnostics
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,

    /// Log stage timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct TopArgs {
    #[command(flatten)]
    snapshot: SnapshotArgs,

    /// JSON file with configuration values
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Number of entities to list
    #[arg(short = 'n', long)]
    top: Option<usize>,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct RecordArgs {
    /// History file to append to (created if missing)
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    history: PathBuf,

    /// Leaderboard reading as `name,votes` rows (`-` for stdin)
    #[arg(default_value = "-", value_hint = ValueHint::FilePath)]
    reading: PathBuf,

    /// Entity names to leave out (case-insensitive, comma separated)
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Observation time (RFC 3339 or naive ISO, UTC); defaults to now
    #[arg(long)]
    at: Option<String>,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum NegativePolicyOpt {
    Clamp,
    Reject,
}

impl From<NegativePolicyOpt> for NegativeDeltaPolicy {
    fn from(value: NegativePolicyOpt) -> Self {
        match value {
            NegativePolicyOpt::Clamp => NegativeDeltaPolicy::ClampToZero,
            NegativePolicyOpt::Reject => NegativeDeltaPolicy::Reject,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ChartKind {
    Png,
    Svg,
}

impl ChartKind {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => ChartKind::Svg,
            _ => ChartKind::Png,
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: String,
    source: String,
    params_hash: String,
    config: &'a VelocityConfig,
    entities: &'a [EntityCurve],
    skipped: Vec<SkippedEntity>,
}

#[derive(Serialize)]
struct SkippedEntity {
    entity: String,
    error: String,
}

const PALETTE: [RGBColor; 6] = [
    RGBColor(30, 144, 255),
    RGBColor(218, 165, 32),
    RGBColor(50, 205, 50),
    RGBColor(218, 112, 214),
    RGBColor(220, 20, 60),
    RGBColor(105, 105, 105),
];

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Curve(args) => args.verbose,
        Command::Top(args) => args.verbose,
        Command::Record(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Curve(args) => handle_curve(args),
        Command::Top(args) => handle_top(args),
        Command::Record(args) => handle_record(args),
    }
}

fn handle_curve(args: CurveArgs) -> Result<()> {
    let config = build_config(&args.tuning)?;
    let t_load = Instant::now();
    let (snapshot, source) = load_snapshot(&args.snapshot)?;
    if args.profile || args.verbose {
        info!(
            "Load stage: {:.1} ms ({} entities)",
            t_load.elapsed().as_secs_f64() * 1000.0,
            snapshot.series().len()
        );
    }

    let entities = choose_entities(&snapshot, &args, &config);
    if entities.is_empty() {
        return Err(anyhow!("snapshot {} has no entities to chart", source));
    }
    info!("Charting {} entities: {}", entities.len(), entities.join(", "));

    // Unreadable entries are always reported, even when not selected.
    let mut wanted = entities.clone();
    for invalid in snapshot.invalid() {
        if !wanted.contains(&invalid.entity) {
            wanted.push(invalid.entity.clone());
        }
    }

    let t_compute = Instant::now();
    let results: Vec<(String, Result<EntityCurve, VvError>)> = wanted
        .par_iter()
        .map(|name| (name.clone(), compute_entity_curve(&snapshot, name, &config)))
        .collect();
    if args.profile || args.verbose {
        info!(
            "Compute stage: {:.1} ms",
            t_compute.elapsed().as_secs_f64() * 1000.0
        );
    }

    let mut curves = Vec::new();
    let mut skipped = Vec::new();
    for (name, result) in results {
        match result {
            Ok(curve) => {
                info!(
                    "{}: {} curve, {} points, {} gaps",
                    name,
                    if curve.curve.is_fitted() { "fitted" } else { "raw" },
                    curve.curve.len(),
                    curve.gaps.len()
                );
                curves.push(curve);
            }
            Err(err) => skipped.push(SkippedEntity {
                entity: name,
                error: err.to_string(),
            }),
        }
    }

    if curves.is_empty() {
        return Err(anyhow!("no entity produced a velocity curve"));
    }

    if args.output.as_os_str() == "-" {
        write_curve_stdout(&curves)?;
    } else {
        write_curve_csv(&curves, &args.output)?;
        info!("Wrote curve CSV: {}", args.output.display());
    }

    if let Some(path) = args.report.as_ref() {
        let report = Report {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            source,
            params_hash: config.params_hash_sha256()?,
            config: &config,
            entities: &curves,
            skipped,
        };
        let text = serde_json::to_string_pretty(&report)?;
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote report: {}", path.display());
    }

    if !args.no_plot {
        let chart_path = match args.png.as_ref() {
            Some(path) => Some(path.clone()),
            None if args.output.as_os_str() != "-" => Some(args.output.with_extension("png")),
            None => None,
        };
        if let Some(path) = chart_path {
            let t_plot = Instant::now();
            match render_chart_guard(&curves, &path) {
                Ok(()) => info!("Wrote plot: {}", path.display()),
                Err(err) => warn!("Skipping plot render ({}): {}", path.display(), err),
            }
            if args.profile || args.verbose {
                info!(
                    "Plot stage: {:.1} ms",
                    t_plot.elapsed().as_secs_f64() * 1000.0
                );
            }
        }
    }

    Ok(())
}

fn handle_top(args: TopArgs) -> Result<()> {
    let mut config = load_config_file(args.config.as_deref())?;
    if let Some(n) = args.top {
        config.top_n = n;
    }
    let (snapshot, source) = load_snapshot(&args.snapshot)?;
    debug!("Ranking {} entities from {}", snapshot.series().len(), source);

    let counts = snapshot.latest_counts();
    let top = select_top(&counts, config.top_n);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (rank, name) in top.iter().enumerate() {
        let votes = counts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| *c)
            .unwrap_or_default();
        writeln!(out, "{}\t{}\t{}", rank + 1, name, votes)?;
    }
    Ok(())
}

fn handle_record(args: RecordArgs) -> Result<()> {
    let at = match args.at.as_deref() {
        Some(text) => parse_timestamp(text).ok_or_else(|| anyhow!("unreadable --at {text}"))?,
        None => Utc::now(),
    };

    let readings = if args.reading.as_os_str() == "-" {
        parse_readings(io::stdin().lock(), &args.exclude)?
    } else {
        let file = File::open(&args.reading)
            .with_context(|| format!("failed to open {}", args.reading.display()))?;
        parse_readings(file, &args.exclude)?
    };
    if readings.is_empty() {
        return Err(anyhow!("reading contained no usable `name,votes` rows"));
    }

    let mut snapshot = match load_snapshot_file(&args.history) {
        Ok(snapshot) => snapshot,
        Err(VvError::SnapshotUnavailable(_)) => {
            info!("Starting new history file {}", args.history.display());
            Snapshot::default()
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", args.history.display()))
        }
    };
    snapshot.record_observations(at, &readings);

    let text = snapshot.to_json_string()?;
    fs::write(&args.history, text)
        .with_context(|| format!("failed to write {}", args.history.display()))?;
    info!(
        "Recorded {} readings at {} into {}",
        readings.len(),
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        args.history.display()
    );
    Ok(())
}

fn load_config_file(path: Option<&Path>) -> Result<VelocityConfig> {
    let Some(path) = path else {
        return Ok(VelocityConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let config: VelocityConfig = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

fn build_config(args: &TuningArgs) -> Result<VelocityConfig> {
    let mut config = load_config_file(args.config.as_deref())?;
    if let Some(window) = args.smoothing_window {
        config.smoothing_window = window;
    }
    if let Some(threshold) = args.gap_threshold {
        config.gap_threshold_minutes = threshold;
    }
    if let Some(factor) = args.spline_factor {
        config.spline_smoothing_factor_per_point = factor;
    }
    if let Some(resolution) = args.resolution {
        config.resample_resolution = resolution;
    }
    if let Some(ceiling) = args.outlier_ceiling {
        config.rate_outlier_ceiling = Some(ceiling);
    }
    if args.no_outlier_ceiling {
        config.rate_outlier_ceiling = None;
    }
    if let Some(policy) = args.negative_policy {
        config.negative_delta_policy = policy.into();
    }
    if let Some(n) = args.top {
        config.top_n = n;
    }
    config.validate()?;
    Ok(config)
}

fn load_snapshot(args: &SnapshotArgs) -> Result<(Snapshot, String)> {
    let (source, label): (Box<dyn SnapshotSource>, String) = match args.input.as_ref() {
        Some(path) => (
            Box::new(FileSource::new(path)) as Box<dyn SnapshotSource>,
            path.display().to_string(),
        ),
        None => {
            let latest = DirectorySource::with_pattern(&args.dir, &args.pattern)?.latest_path()?;
            let label = latest.display().to_string();
            (Box::new(FileSource::new(latest)) as Box<dyn SnapshotSource>, label)
        }
    };
    let snapshot = source
        .load_latest()
        .with_context(|| format!("failed to load snapshot {}", label))?;
    info!("Loaded snapshot: {}", label);
    Ok((snapshot, label))
}

fn choose_entities(snapshot: &Snapshot, args: &CurveArgs, config: &VelocityConfig) -> Vec<String> {
    if !args.entity.is_empty() {
        return args.entity.clone();
    }
    if args.all {
        return snapshot.series().iter().map(|s| s.entity.clone()).collect();
    }
    select_top(&snapshot.latest_counts(), config.top_n)
}

fn parse_readings<R: Read>(reader: R, exclude: &[String]) -> Result<Vec<(String, u64)>> {
    let excluded: Vec<String> = exclude.iter().map(|e| e.trim().to_uppercase()).collect();
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut out = Vec::new();
    for (idx, row) in csv_reader.records().enumerate() {
        let row = row.with_context(|| format!("failed to read reading row {}", idx + 1))?;
        let (Some(name), Some(votes)) = (row.get(0), row.get(1)) else {
            debug!("row {}: expected `name,votes`", idx + 1);
            continue;
        };
        let Some(count) = parse_vote_count(votes) else {
            debug!("row {}: '{}' is not a vote count", idx + 1, votes);
            continue;
        };
        if name.is_empty() || excluded.contains(&name.to_uppercase()) {
            continue;
        }
        out.push((name.to_string(), count));
    }
    Ok(out)
}

fn write_curve_stdout(curves: &[EntityCurve]) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_curve_rows(curves, &mut writer)
}

fn write_curve_csv(curves: &[EntityCurve], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_curve_rows(curves, &mut writer)
}

fn write_curve_rows<W: Write>(curves: &[EntityCurve], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["entity", "timestamp", "rate_per_minute", "is_gap", "kind"])?;

    for curve in curves {
        match &curve.curve {
            VelocityCurve::Fitted(points) => {
                for point in points {
                    writer.write_record([
                        curve.entity.clone(),
                        point.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                        format!("{:.3}", point.rate_per_minute),
                        point.is_gap.to_string(),
                        "fitted".to_string(),
                    ])?;
                }
            }
            VelocityCurve::Raw(samples) => {
                for sample in samples {
                    let across_gap = raw_sample_crosses_gap(curve, sample);
                    writer.write_record([
                        curve.entity.clone(),
                        sample.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                        format!("{:.3}", sample.rate_per_minute),
                        across_gap.to_string(),
                        "raw".to_string(),
                    ])?;
                }
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// A raw rate sample is stamped at the end of its interval, so it spans a gap
/// exactly when a gap ends at that timestamp.
fn raw_sample_crosses_gap(curve: &EntityCurve, sample: &RateSample) -> bool {
    curve.gaps.iter().any(|g| g.at == sample.timestamp)
}

/// `(minutes, rate, is_gap)` triples for one entity, as drawn on the chart.
/// The flag covers the segment leaving the point; for raw samples that is the
/// interval of the following sample.
fn chart_points(curve: &EntityCurve, origin: DateTime<Utc>) -> Vec<(f64, f64, bool)> {
    match &curve.curve {
        VelocityCurve::Fitted(points) => points
            .iter()
            .map(|p| (minutes_since(origin, p.timestamp), p.rate_per_minute, p.is_gap))
            .collect(),
        VelocityCurve::Raw(samples) => samples
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let next_crosses = samples
                    .get(i + 1)
                    .is_some_and(|next| raw_sample_crosses_gap(curve, next));
                (minutes_since(origin, s.timestamp), s.rate_per_minute, next_crosses)
            })
            .collect(),
    }
}

fn minutes_since(origin: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    (t - origin).num_milliseconds() as f64 / 60_000.0
}

/// Split a dense curve into polylines of uniform gap status. The segment
/// leaving a point takes that point's flag; neighbouring runs share their
/// joining vertex so the drawn line stays connected.
fn split_gap_runs(points: &[(f64, f64, bool)]) -> Vec<(bool, Vec<(f64, f64)>)> {
    let mut runs: Vec<(bool, Vec<(f64, f64)>)> = Vec::new();
    for pair in points.windows(2) {
        let (x0, y0, gap) = pair[0];
        let (x1, y1, _) = pair[1];
        let extends = matches!(runs.last(), Some((run_gap, _)) if *run_gap == gap);
        if extends {
            if let Some((_, run)) = runs.last_mut() {
                run.push((x1, y1));
            }
        } else {
            runs.push((gap, vec![(x0, y0), (x1, y1)]));
        }
    }
    runs
}

fn render_chart_guard(curves: &[EntityCurve], path: &Path) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_chart(curves, path, ChartKind::from_path(path))
            .map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_chart(curves: &[EntityCurve], path: &Path, kind: ChartKind) -> Result<()> {
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, (1280, 720)).into_drawing_area();
            draw_chart(root, curves)
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, (1280, 720)).into_drawing_area();
            draw_chart(root, curves)
        }
    }
}

fn draw_chart<DB>(root: DrawingArea<DB, plotters::coord::Shift>, curves: &[EntityCurve]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let origin = curves
        .iter()
        .filter_map(|c| match &c.curve {
            VelocityCurve::Fitted(points) => points.first().map(|p| p.timestamp),
            VelocityCurve::Raw(samples) => samples.first().map(|s| s.timestamp),
        })
        .min()
        .ok_or_else(|| anyhow!("nothing to plot"))?;

    let series: Vec<(&str, Vec<(f64, f64, bool)>, bool)> = curves
        .iter()
        .map(|c| (c.entity.as_str(), chart_points(c, origin), c.curve.is_fitted()))
        .collect();

    let x_max = series
        .iter()
        .flat_map(|(_, pts, _)| pts.iter().map(|p| p.0))
        .fold(1.0, f64::max);
    let mut y_max = series
        .iter()
        .flat_map(|(_, pts, _)| pts.iter().map(|p| p.1))
        .fold(1.0, f64::max)
        * 1.1;
    if !y_max.is_finite() || y_max <= 0.0 {
        y_max = 1.0;
    }
    let y_min = series
        .iter()
        .flat_map(|(_, pts, _)| pts.iter().map(|p| p.1))
        .fold(0.0, f64::min);

    let area = root;
    area.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&area)
        .margin(25)
        .caption("Vote speed over time", ("sans-serif", 26))
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .x_desc(format!("Minutes since {}", origin.format("%Y-%m-%d %H:%M UTC")))
        .y_desc("Votes per minute")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font.color(&BLACK.mix(0.85)))
        .draw()?;

    for (idx, (name, points, fitted)) in series.into_iter().enumerate() {
        let color = PALETTE[idx % PALETTE.len()];
        let label = if fitted {
            name.to_string()
        } else {
            format!("{} (raw)", name)
        };
        let width = if fitted { 2 } else { 1 };
        let mut labelled = false;
        for (is_gap, run) in split_gap_runs(&points) {
            // Interpolation across a hole is drawn faint.
            let style = if is_gap {
                color.mix(0.3).stroke_width(width)
            } else {
                color.stroke_width(width)
            };
            let anno = chart.draw_series(LineSeries::new(run, style))?;
            if !labelled && !is_gap {
                anno.label(label.clone()).legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 30, y)], color.stroke_width(width))
                });
                labelled = true;
            }
        }
        if !fitted {
            let anno = chart.draw_series(
                points
                    .iter()
                    .map(|p| Circle::new((p.0, p.1), 3, color.filled())),
            )?;
            if !labelled {
                anno.label(label)
                    .legend(move |(x, y)| Circle::new((x + 15, y), 3, color.filled()));
            }
        }
    }

    let legend_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(legend_font.color(&BLACK))
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    area.present()?;
    Ok(())
}
