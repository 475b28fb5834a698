use anyhow::Context;
use clap::{Args, ColorChoice, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use is_terminal::IsTerminal;
use platesense::config::PlateConfig;
use platesense::resolver::{self, OverlayBox, Playback, Viewport};
use platesense::schema::{InferenceResponse, RawBox, ResultSet, TrackedPlate};
use platesense::{ConsolidationEngine, PlateStore};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const EMPTY_STATE: &str = "No valid license plates recognized.";

#[derive(Parser)]
#[command(
    name = "platesense",
    about = "Consolidate and inspect license plate detections",
    arg_required_else_help = true
)]
struct Cli {
    /// Disable color
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Read settings from this TOML file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log consolidation decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List consolidated plates
    List(ListArgs),
    /// Rank plates against a query
    Search(SearchArgs),
    /// Show the boxes visible at one point of playback
    Overlay(OverlayArgs),
    /// Print the JSON Schema of the list output
    Schema,
}

#[derive(Args, Clone)]
struct ListArgs {
    /// Inference response JSON file
    file: PathBuf,

    /// Output JSON (stable schema)
    #[arg(long)]
    json: bool,

    /// Plain tab-separated rows without colors/headers
    #[arg(long, conflicts_with = "json")]
    raw: bool,
}

#[derive(Args, Clone)]
struct SearchArgs {
    /// Inference response JSON file
    file: PathBuf,

    /// Text to look for (case-insensitive)
    query: String,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct OverlayArgs {
    /// Inference response JSON file
    file: PathBuf,

    /// Frame number to resolve
    #[arg(long, conflicts_with = "time", required_unless_present = "time")]
    frame: Option<u32>,

    /// Playback position in seconds
    #[arg(long, value_name = "SECONDS")]
    time: Option<f64>,

    /// Also list unconsolidated debug boxes at that frame
    #[arg(long)]
    raw_boxes: bool,

    /// Media size the boxes were detected in, e.g. 1920x1080
    #[arg(long, value_name = "WxH", value_parser = parse_size, requires = "display")]
    natural: Option<(f64, f64)>,

    /// Displayed size to scale boxes onto
    #[arg(long, value_name = "WxH", value_parser = parse_size, requires = "natural")]
    display: Option<(f64, f64)>,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

fn parse_size(s: &str) -> Result<(f64, f64), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite() && *n > 0.0)
            .ok_or_else(|| format!("invalid dimension '{}'", v))
    };
    Ok((parse(w)?, parse(h)?))
}

struct Loaded {
    engine: ConsolidationEngine,
    response: InferenceResponse,
    store: PlateStore,
}

fn build_engine(config_path: Option<&Path>) -> anyhow::Result<ConsolidationEngine> {
    let config = match config_path {
        Some(path) => PlateConfig::load_from(path)?,
        None => PlateConfig::load(),
    };
    Ok(ConsolidationEngine::new(config)?)
}

fn load(file: &Path, config_path: Option<&Path>) -> anyhow::Result<Loaded> {
    let engine = build_engine(config_path)?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let response = InferenceResponse::from_json(&content)
        .with_context(|| format!("{} is not an inference response", file.display()))?;
    let store = engine.consolidate(&response);
    Ok(Loaded {
        engine,
        response,
        store,
    })
}

fn load_or_exit(file: &Path, config_path: Option<&Path>) -> Result<Loaded, i32> {
    load(file, config_path).map_err(|e| {
        eprintln!("Error: {:#}", e);
        2
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), i32> {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            Ok(())
        }
        Err(_) => Err(3),
    }
}

struct Style {
    color: bool,
    hyperlinks: bool,
}

impl Style {
    fn heading(&self, text: &str) -> String {
        if self.color {
            text.bold().cyan().to_string()
        } else {
            text.to_string()
        }
    }

    fn plate_text(&self, text: &str) -> String {
        if self.color {
            text.bold().green().to_string()
        } else {
            text.to_string()
        }
    }

    fn confidence(&self, confidence: f64) -> String {
        let v = format!("{:.2}", confidence);
        if !self.color {
            return v;
        }
        if confidence >= 0.8 {
            v.green().to_string()
        } else if confidence >= 0.5 {
            v.yellow().to_string()
        } else {
            v.red().to_string()
        }
    }

    fn image(&self, image: &str) -> String {
        if image.starts_with("data:") {
            return format!("inline image ({} bytes)", image.len());
        }
        if self.hyperlinks {
            format!("\x1b]8;;{}\x1b\\{}\x1b]8;;\x1b\\", image, image)
        } else {
            image.to_string()
        }
    }
}

fn frame_span(plate: &TrackedPlate) -> String {
    match (plate.first_frame(), plate.last_frame()) {
        (Some(first), Some(last)) if first == last => format!("frame {}", first),
        (Some(first), Some(last)) => {
            format!("frames {}-{} ({})", first, last, plate.detections.len())
        }
        _ => "no frames".to_string(),
    }
}

fn render_plates<'a>(
    plates: impl IntoIterator<Item = &'a TrackedPlate>,
    playback: &Playback,
    style: &Style,
    raw: bool,
) -> String {
    let mut out = String::new();
    for (i, plate) in plates.into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if raw {
            out.push_str(&format!(
                "{}\t{}\t{}\t{:.2}\t{}\t{}",
                plate.track_id,
                plate.best.text,
                plate.best.filtered_text,
                plate.best.confidence,
                plate.first_frame().unwrap_or(0),
                plate.last_frame().unwrap_or(0),
            ));
            continue;
        }
        out.push_str(&format!(
            "  {}  {}  filtered={}  confidence={}  {}",
            plate.track_id,
            style.plate_text(&plate.best.text),
            plate.best.filtered_text,
            style.confidence(plate.best.confidence),
            frame_span(plate),
        ));
        if let Some(first) = plate.first_frame() {
            out.push_str(&format!("  seek={:.2}s", playback.seek_time(first)));
        }
        if let Some(image) = &plate.best.image {
            out.push('\n');
            out.push_str("      image = ");
            out.push_str(&style.image(image));
        }
    }
    out
}

fn render_overlay(boxes: &[OverlayBox], raw_boxes: &[RawBox], style: &Style) -> String {
    let mut out = String::new();
    for overlay in boxes {
        let (x, y) = overlay.bbox.anchor();
        let mut flags = Vec::new();
        flags.push(if overlay.interpolated {
            "interpolated"
        } else {
            "detected"
        });
        if overlay.tracked {
            flags.push("tracked");
        }
        out.push('\n');
        out.push_str(&format!(
            "  {}  {}  at ({:.1}, {:.1})  {}",
            overlay.track_id,
            style.plate_text(&overlay.label),
            x,
            y,
            flags.join(", "),
        ));
    }
    if !raw_boxes.is_empty() {
        out.push('\n');
        out.push_str(&style.heading("Raw boxes:"));
        for raw in raw_boxes {
            let (x, y) = raw.bbox.anchor();
            out.push_str(&format!("\n  at ({:.1}, {:.1})", x, y));
        }
    }
    out
}

fn run_list(args: ListArgs, config: Option<&Path>, style: &Style) -> Result<(), i32> {
    let loaded = load_or_exit(&args.file, config)?;
    let playback = loaded.engine.playback(&loaded.store);

    if args.json {
        let result: ResultSet = loaded.engine.result_set(&loaded.store, &loaded.response);
        print_json(&result)?;
        return if result.plates.is_empty() { Err(1) } else { Ok(()) };
    }

    if loaded.store.is_empty() {
        if !args.raw {
            println!("{}", EMPTY_STATE);
        }
        return Err(1);
    }

    if args.raw {
        println!("{}", render_plates(loaded.store.plates(), &playback, style, true));
        return Ok(());
    }

    let mut heading = format!("Plates ({}):", loaded.store.len());
    if let Some(name) = &loaded.response.filename {
        heading = format!("{} {}", heading, name);
    }
    println!("{}", style.heading(&heading));
    println!("{}", render_plates(loaded.store.plates(), &playback, style, false));

    if !loaded.store.failures().is_empty() {
        println!("{}", style.heading("Failed recognitions:"));
        for message in loaded.store.failures() {
            println!("  {}", message);
        }
    }
    Ok(())
}

fn run_search(args: SearchArgs, config: Option<&Path>, style: &Style) -> Result<(), i32> {
    let loaded = load_or_exit(&args.file, config)?;
    let ranked = loaded.store.search(&args.query);

    if args.json {
        print_json(&json!({
            "query": args.query,
            "plates": ranked,
        }))?;
    } else if ranked.is_empty() {
        println!("{}", EMPTY_STATE);
    } else {
        let playback = loaded.engine.playback(&loaded.store);
        println!(
            "{}",
            style.heading(&format!("Results for \"{}\":", args.query))
        );
        println!("{}", render_plates(ranked.iter().copied(), &playback, style, false));
    }

    if ranked.is_empty() { Err(1) } else { Ok(()) }
}

fn run_overlay(args: OverlayArgs, config: Option<&Path>, style: &Style) -> Result<(), i32> {
    let loaded = load_or_exit(&args.file, config)?;
    let playback = loaded.engine.playback(&loaded.store);
    let frame = match (args.frame, args.time) {
        (Some(frame), _) => frame,
        (None, Some(seconds)) => playback.frame_at(seconds),
        (None, None) => 0,
    };

    let mut boxes = resolver::overlay_at_frame(&loaded.store, frame, loaded.engine.max_gap());
    let mut raw_boxes: Vec<RawBox> = if args.raw_boxes {
        resolver::raw_boxes_at_frame(&loaded.store, frame)
            .into_iter()
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    if let (Some(natural), Some(display)) = (args.natural, args.display) {
        let viewport = Viewport { natural, display };
        for overlay in &mut boxes {
            overlay.bbox = viewport.apply(&overlay.bbox);
        }
        for raw in &mut raw_boxes {
            raw.bbox = viewport.apply(&raw.bbox);
        }
    }

    if args.json {
        print_json(&json!({
            "frame": frame,
            "time": playback.seek_time(frame),
            "boxes": boxes,
            "raw_boxes": raw_boxes,
        }))?;
    } else {
        let heading = format!("Frame {} ({:.2}s):", frame, playback.seek_time(frame));
        print!("{}", style.heading(&heading));
        println!("{}", render_overlay(&boxes, &raw_boxes, style));
    }

    if boxes.is_empty() && raw_boxes.is_empty() {
        Err(1)
    } else {
        Ok(())
    }
}

fn run_schema() -> Result<(), i32> {
    let schema = schemars::schema_for!(ResultSet);
    print_json(&schema)
}

fn detect_color_choice() -> ColorChoice {
    // Scan args before clap so help/errors honor `--no-color`.
    // Mirror clap's parsing by stopping at `--` which terminates flags.
    let mut args = std::env::args_os();
    // Skip binary name
    args.next();
    let mut flag = false;
    for arg in args {
        if arg == "--" {
            break;
        }
        if arg == "--no-color" {
            flag = true;
            break;
        }
    }
    if flag || std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let color = detect_color_choice();
    let matches = Cli::command().color(color).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    init_logging(cli.verbose);

    let is_tty = std::io::stdout().is_terminal();
    let style = Style {
        color: is_tty
            && !matches!(color, ColorChoice::Never)
            && supports_color::on(supports_color::Stream::Stdout).is_some(),
        hyperlinks: is_tty && supports_hyperlinks::on(supports_hyperlinks::Stream::Stdout),
    };
    let config = cli.config.as_deref();

    let result = match cli.command {
        Some(Commands::List(args)) => run_list(args, config, &style),
        Some(Commands::Search(args)) => run_search(args, config, &style),
        Some(Commands::Overlay(args)) => run_overlay(args, config, &style),
        Some(Commands::Schema) => run_schema(),
        None => Ok(()),
    };
    if let Err(code) = result {
        std::process::exit(code);
    }
}
