use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::Rng;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use xray_overlay_review::analysis::AnalysisStage;
use xray_overlay_review::chart::{BitmapSurface, ChartData, ChartSnapshotProducer};
use xray_overlay_review::config::{out_root, ReviewConfig};
use xray_overlay_review::context::CaseContext;
use xray_overlay_review::layers::{build_layer_model, LayerId};
use xray_overlay_review::report::write_report;
use xray_overlay_review::scores::resolve_scores;
use xray_overlay_review::service::{load_response, FileAnalysisService};

#[derive(Parser, Debug)]
#[command(
    name = "xray-review",
    version,
    about = "Build overlay stacks, score charts, and review reports from X-ray analysis responses"
)]
struct Cli {
    /// Optional JSON config file (display scale, opacities, chart options)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Print the derived layer stack and resolved scores as JSON
    Inspect(InspectArgs),
    /// Render the score probability chart to a PNG
    Chart(ChartArgs),
    /// Run a full review: analysis, overlay edits, and report output
    Review(ReviewArgs),
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Recorded analysis response JSON
    response: PathBuf,
}

#[derive(Args, Debug)]
struct ChartArgs {
    /// Recorded analysis response JSON
    response: PathBuf,
    /// Output PNG path
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct ReviewArgs {
    /// Recorded analysis response JSON
    response: PathBuf,
    /// Source X-ray reference stored with the case
    #[arg(long, default_value = "xray.png")]
    source: String,
    /// Output root (default: $XRAY_REVIEW_OUT_DIR or .xray-review)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Layer index to foreground
    #[arg(long)]
    select: Option<usize>,
    /// Opacity for a layer, as INDEX=VALUE (repeatable)
    #[arg(long = "opacity", value_parser = parse_opacity_arg)]
    opacities: Vec<(usize, f64)>,
    /// Layer index to hide (repeatable)
    #[arg(long = "hide")]
    hidden: Vec<usize>,
    /// Clinician notes stored in the report
    #[arg(long)]
    notes: Option<String>,
    /// Print the final case snapshot JSON to stdout
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = ReviewConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Inspect(args) => command_inspect(args, &config),
        Commands::Chart(args) => command_chart(args, &config),
        Commands::Review(args) => command_review(args, config),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "inspect",
            "description": "Print the layer stack and resolved KL scores for a response."
        }),
        json!({
            "name": "chart",
            "description": "Render the KL score probability chart to PNG."
        }),
        json!({
            "name": "review",
            "description": "Apply overlay edits, advance to the report stage, and write report artifacts."
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn command_inspect(args: InspectArgs, config: &ReviewConfig) -> Result<()> {
    let response = load_response(&args.response)?;
    let scores = resolve_scores(&response.kl_scores.distributions)?;
    let model = build_layer_model(&response.base_image, &response.explanations, config);

    let payload = json!({
        "response": abs_path(&args.response).display().to_string(),
        "baseImage": model.base_image,
        "layers": model.layers,
        "predictedScore": scores.predicted,
        "distribution": scores.display,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn command_chart(args: ChartArgs, config: &ReviewConfig) -> Result<()> {
    let response = load_response(&args.response)?;
    let scores = resolve_scores(&response.kl_scores.distributions)?;
    let chart = ChartData::from_distribution(&scores.display, &config.chart);

    let mut producer = ChartSnapshotProducer::new(BitmapSurface::new(&config.chart));
    let pass = CaseContext::new().issue_render_pass();
    producer.request(&chart, pass)?;
    let Some(snapshot) = producer.on_settled(pass)? else {
        bail!("chart render pass produced no snapshot");
    };

    ensure_parent_dir(&args.out)?;
    fs::write(&args.out, snapshot.png_bytes()?)
        .with_context(|| format!("failed to save chart image: {}", args.out.display()))?;
    println!("{}", abs_path(&args.out).display());
    Ok(())
}

fn command_review(args: ReviewArgs, config: ReviewConfig) -> Result<()> {
    if !args.response.exists() {
        bail!("response not found: {}", args.response.display());
    }

    let mut ctx = CaseContext::new();
    ctx.set_source_image(args.source.clone());
    ctx.advance_stage();
    ctx.advance_stage();

    let service = FileAnalysisService::new(&args.response);
    let surface = BitmapSurface::new(&config.chart);
    let mut stage = AnalysisStage::new(config, surface);
    stage.enter(&service, &args.source);
    if let Some(err) = stage.run_until_idle(&mut ctx).into_iter().next() {
        return Err(err).context("analysis response rejected");
    }

    if let Some(message) = &stage.view().last_error {
        bail!("analysis fetch failed: {message}");
    }
    if !stage.view().editable() {
        bail!("analysis response contained no explanation layers");
    }

    for (index, opacity) in &args.opacities {
        let id = layer_id_at(&stage, *index)?;
        stage.set_opacity(&mut ctx, id, *opacity)?;
    }
    for index in &args.hidden {
        let id = layer_id_at(&stage, *index)?;
        stage.set_visible(&mut ctx, id, false)?;
    }
    if let Some(index) = args.select {
        stage.select_layer(index)?;
    }
    if let Some(notes) = args.notes {
        ctx.set_notes(notes);
    }

    stage.advance(&mut ctx);

    let report_dir = out_root(args.out.as_deref()).join(format!(
        "report-{}-{}-{}",
        timestamp_compact(),
        std::process::id(),
        rand::thread_rng().gen_range(1000..9999)
    ));
    let paths = write_report(&ctx.snapshot(), &report_dir)?;

    if args.json {
        let mut payload: Value = serde_json::to_value(ctx.snapshot())?;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert(
                "reportPath".to_string(),
                json!(abs_path(&paths.json).display().to_string()),
            );
        }
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        println!("{}", abs_path(&paths.json).display());
    }
    Ok(())
}

fn layer_id_at(stage: &AnalysisStage<BitmapSurface>, index: usize) -> Result<LayerId> {
    let layers = stage.view().overlays.layers();
    layers
        .get(index)
        .map(|layer| layer.id)
        .with_context(|| format!("layer index {index} out of range (layers: {})", layers.len()))
}

fn parse_opacity_arg(raw: &str) -> std::result::Result<(usize, f64), String> {
    let (index, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=VALUE, got '{raw}'"))?;
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|err| format!("invalid layer index '{index}': {err}"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid opacity '{value}': {err}"))?;
    Ok((index, value))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn timestamp_compact() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}
