use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use intero_lib::{
    accuracy::{score_trials, HctTrial},
    epochs::{
        check_agreement, epoch_count_warning, extract_epochs, realign_timestamps, EpochWindow,
    },
    error::QualityWarning,
    events::{find_events, onsets, EventOptions, Polarity, Threshold},
    features::hrv_summary,
    io::{read_f64_series, read_indices, read_recording, text as text_io},
    overrides::OverrideTable,
    plot::Figure,
    qc::{QcCollector, QcPanel},
    signal::Beats,
};
use intero_run::{
    config::{read_config, BatchConfig},
    run_batch,
    simulate::{write_dataset, SimulationSpec},
    tables::{pair_trials, read_hct_behavior},
};
use plotters::prelude::*;
use serde::Serialize;
use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

const PANEL_SIZE: (u32, u32) = (480, 280);
const MOSAIC_COLUMNS: usize = 4;

#[derive(Parser)]
#[command(
    name = "intero",
    version,
    about = "Interoception physio pipeline: HRV, HEP and heartbeat counting scores"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MarkerPolarity {
    Below,
    Above,
}

impl From<MarkerPolarity> for Polarity {
    fn from(p: MarkerPolarity) -> Self {
        match p {
            MarkerPolarity::Below => Polarity::Below,
            MarkerPolarity::Above => Polarity::Above,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process every participant of a dataset into the cohort and HEP tables
    Batch {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        overrides: Option<PathBuf>,
        /// Write one QC mosaic PNG per signal type here
        #[arg(long)]
        qc_dir: Option<PathBuf>,
        /// Write the batch summary as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Detect marker events in one channel of a recording
    EventsFind {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "PHOTO")]
        column: String,
        /// Sampling rate when the recording has no sidecar
        #[arg(long)]
        fs: Option<f64>,
        #[arg(long, default_value_t = 5.0)]
        duration_min_s: f64,
        #[arg(long, default_value = "below")]
        polarity: MarkerPolarity,
        /// Fixed threshold; midpoint of the channel range when omitted
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Epoch a recording at behavioral timestamps realigned onto its markers
    Epochs {
        #[arg(long)]
        input: PathBuf,
        /// Newline-delimited behavioral event times in seconds
        #[arg(long)]
        timestamps: PathBuf,
        /// Sample of the behavioral clock's zero; by default the first
        /// timestamp is aligned to the first detected marker
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<i64>,
        #[arg(long, default_value = "PHOTO")]
        column: String,
        #[arg(long)]
        fs: Option<f64>,
        #[arg(long, default_value_t = 0.5)]
        duration_min_s: f64,
        #[arg(long, default_value = "below")]
        polarity: MarkerPolarity,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        tmin: f64,
        #[arg(long, default_value_t = 1.0)]
        tmax: f64,
        /// Indicator channel counted within each epoch
        #[arg(long)]
        count: Option<String>,
        /// Smallest acceptable interval correlation between both sources
        #[arg(long, default_value_t = 0.9)]
        min_r: f64,
    },
    /// Score heartbeat counting trials against detected counts
    HctScore {
        /// Detected counts, comma separated, in trial order
        #[arg(long, value_delimiter = ',', required = true)]
        detected: Vec<usize>,
        /// Behavior table with Answer and Confidence columns
        #[arg(long)]
        beh: PathBuf,
        /// 0-based trials left out of the summaries
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<usize>,
    },
    /// HRV summary from newline-delimited beat sample indices
    Hrv {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        fs: f64,
    },
    /// Write a synthetic dataset in the layout `batch` reads
    Simulate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 3)]
        participants: usize,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        #[arg(long, default_value_t = 100.0)]
        fs: f64,
        /// Largest error added to each reported count
        #[arg(long, default_value_t = 0)]
        count_error: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Batch {
            root,
            out,
            config,
            overrides,
            qc_dir,
            summary,
        } => cmd_batch(
            &root,
            &out,
            config.as_deref(),
            overrides.as_deref(),
            qc_dir.as_deref(),
            summary.as_deref(),
        )?,
        Commands::EventsFind {
            input,
            column,
            fs,
            duration_min_s,
            polarity,
            threshold,
        } => cmd_events_find(&input, &column, fs, duration_min_s, polarity, threshold)?,
        Commands::Epochs {
            input,
            timestamps,
            offset,
            column,
            fs,
            duration_min_s,
            polarity,
            tmin,
            tmax,
            count,
            min_r,
        } => {
            let rec = read_recording(&input, fs)?;
            let opts = EventOptions {
                polarity: polarity.into(),
                threshold: Threshold::Auto,
                duration_min: ((duration_min_s * rec.fs()).round() as usize).max(1),
                duration_max: None,
                inter_min: 0,
            };
            let markers = onsets(&find_events(rec.channel(&column)?, &opts));
            if markers.is_empty() && offset.is_none() {
                bail!("no {column} markers to align to; pass --offset");
            }
            let report = cmd_epochs(
                &rec,
                &read_f64_series(&timestamps)?,
                markers,
                offset,
                (tmin, tmax),
                count.as_deref(),
                min_r,
            )?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Commands::HctScore {
            detected,
            beh,
            exclude,
        } => cmd_hct_score(&detected, &beh, &exclude)?,
        Commands::Hrv { input, fs } => cmd_hrv(input.as_deref(), fs)?,
        Commands::Simulate {
            out,
            participants,
            seed,
            fs,
            count_error,
        } => cmd_simulate(
            &out,
            SimulationSpec {
                participants,
                seed,
                fs,
                count_error,
                ..SimulationSpec::default()
            },
        )?,
    }
    Ok(())
}

fn cmd_batch(
    root: &Path,
    out: &Path,
    config: Option<&Path>,
    overrides: Option<&Path>,
    qc_dir: Option<&Path>,
    summary_path: Option<&Path>,
) -> Result<()> {
    let config = match config {
        Some(path) => read_config(path)?,
        None => BatchConfig::default(),
    };
    let overrides = match overrides {
        Some(path) => OverrideTable::load(path)?,
        None => OverrideTable::default(),
    };
    let mut qc = QcCollector::new();
    let summary = run_batch(&config, root, out, &overrides, &mut qc)?;
    if let Some(dir) = qc_dir {
        fs::create_dir_all(dir)?;
        for (kind, panels) in qc.iter() {
            let path = dir.join(format!("{}.png", kind.file_stem()));
            draw_mosaic(&path, panels)?;
            log::info!("wrote {}", path.display());
        }
    }
    if let Some(path) = summary_path {
        fs::write(path, serde_json::to_string_pretty(&summary)?)?;
    }
    for (id, error) in &summary.failed {
        eprintln!("{id}: {error}");
    }
    Ok(())
}

fn cmd_events_find(
    input: &Path,
    column: &str,
    fs: Option<f64>,
    duration_min_s: f64,
    polarity: MarkerPolarity,
    threshold: Option<f64>,
) -> Result<()> {
    let rec = read_recording(input, fs)?;
    let opts = EventOptions {
        polarity: polarity.into(),
        threshold: threshold.map(Threshold::Fixed).unwrap_or(Threshold::Auto),
        duration_min: ((duration_min_s * rec.fs()).round() as usize).max(1),
        duration_max: None,
        inter_min: 0,
    };
    let events = find_events(rec.channel(column)?, &opts);
    println!("{}", serde_json::to_string(&events)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct EpochReport {
    offset: i64,
    /// Marker onsets found in the recording, in samples.
    markers: Vec<usize>,
    /// Realigned behavioral events, in samples.
    anchors: Vec<i64>,
    n_epochs: usize,
    truncated: Vec<usize>,
    counts: Option<Vec<usize>>,
    warnings: Vec<QualityWarning>,
}

/// Realign `timestamps` (s) onto the recording; without `offset` the first
/// timestamp lands on the first marker.
fn cmd_epochs(
    rec: &intero_lib::Recording,
    timestamps: &[f64],
    markers: Vec<usize>,
    offset: Option<i64>,
    (tmin, tmax): (f64, f64),
    count: Option<&str>,
    min_r: f64,
) -> Result<EpochReport> {
    if let Some(i) = timestamps.iter().position(|t| !t.is_finite()) {
        bail!("timestamp {} is missing", i + 1);
    }
    let fs = rec.fs();
    let offset = match (offset, markers.first(), timestamps.first()) {
        (Some(offset), _, _) => offset,
        (None, Some(&onset), Some(&first)) => onset as i64 - (first * fs).round() as i64,
        (None, _, _) => bail!("nothing to align the timestamps to"),
    };
    let anchors = realign_timestamps(timestamps, fs, offset);

    let mut warnings = Vec::new();
    warnings.extend(epoch_count_warning(markers.len(), timestamps.len(), "epochs"));
    let anchor_s: Vec<f64> = anchors.iter().map(|a| a.sample as f64 / fs).collect();
    let marker_s: Vec<f64> = markers.iter().map(|m| *m as f64 / fs).collect();
    warnings.extend(check_agreement(&anchor_s, &marker_s, min_r, "epochs"));

    let epochs = extract_epochs(rec, &anchors, &EpochWindow::seconds(fs, tmin, tmax))?;
    let counts = match count {
        Some(channel) => Some(
            epochs
                .iter()
                .map(|e| e.count(channel))
                .collect::<Result<Vec<usize>, _>>()?,
        ),
        None => None,
    };
    Ok(EpochReport {
        offset,
        markers,
        anchors: anchors.iter().map(|a| a.sample).collect(),
        n_epochs: epochs.len(),
        truncated: epochs.iter().filter(|e| e.truncated).map(|e| e.index).collect(),
        counts,
        warnings,
    })
}

fn cmd_hct_score(detected: &[usize], beh: &Path, exclude: &[usize]) -> Result<()> {
    let behavior = read_hct_behavior(beh)?;
    let trials: Vec<HctTrial> = pair_trials(detected, &behavior);
    let scores = score_trials(&trials, exclude);
    println!("{}", serde_json::to_string(&scores)?);
    Ok(())
}

fn cmd_hrv(input: Option<&Path>, fs: f64) -> Result<()> {
    if fs <= 0.0 {
        bail!("--fs must be positive, got {fs}");
    }
    let indices = match input {
        Some(path) => read_indices(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_indices(&buf)?
        }
    };
    let summary = hrv_summary(&Beats::from_indices(indices), fs);
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_simulate(out: &Path, spec: SimulationSpec) -> Result<()> {
    let ids = write_dataset(&spec, out)?;
    println!("{}", serde_json::to_string(&ids)?);
    Ok(())
}

fn rgb(color: intero_lib::plot::Color) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

/// One panel per participant in a fixed-width grid.
fn draw_mosaic(path: &Path, panels: &[QcPanel]) -> Result<()> {
    let cols = panels.len().clamp(1, MOSAIC_COLUMNS);
    let rows = panels.len().div_ceil(cols).max(1);
    let size = (PANEL_SIZE.0 * cols as u32, PANEL_SIZE.1 * rows as u32);
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    for (area, panel) in root.split_evenly((rows, cols)).iter().zip(panels) {
        draw_panel(area, &panel.participant, &panel.figure)?;
    }
    root.present()?;
    Ok(())
}

fn draw_panel(
    area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    participant: &str,
    fig: &Figure,
) -> Result<()> {
    let caption = match &fig.title {
        Some(title) => format!("{participant} {title}"),
        None => participant.to_string(),
    };
    let Some(([x_min, x_max], [y_min, y_max])) = fig.bounds() else {
        area.titled(&caption, ("sans-serif", 16))?;
        return Ok(());
    };
    let mut chart = ChartBuilder::on(area)
        .margin(6)
        .caption(caption, ("sans-serif", 16))
        .x_label_area_size(24)
        .y_label_area_size(36)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    if let Some(label) = &fig.x.label {
        mesh.x_desc(label.as_str());
    }
    if let Some(label) = &fig.y.label {
        mesh.y_desc(label.as_str());
    }
    mesh.label_style(("sans-serif", 10)).draw()?;
    for span in &fig.spans {
        let color = rgb(span.color).mix(0.2);
        chart.draw_series(std::iter::once(Rectangle::new(
            [(span.from, y_min), (span.to, y_max)],
            color.filled(),
        )))?;
    }
    for line in &fig.lines {
        let points = line
            .points
            .iter()
            .filter(|p| p[0].is_finite() && p[1].is_finite())
            .map(|p| (p[0], p[1]));
        let color = rgb(line.color);
        if line.marker {
            chart.draw_series(points.map(|p| Circle::new(p, line.width, color.filled())))?;
        } else {
            chart.draw_series(LineSeries::new(points, color.stroke_width(line.width)))?;
        }
    }
    Ok(())
}
