use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use foto3x4_contracts::images::{BackgroundRequest, EncodedImage};
use foto3x4_engine::codec::{probe, RasterCodec};
use foto3x4_engine::cropper::{crop_to_ratio, CROP_QUALITY};
use foto3x4_engine::geometry::ID_PHOTO_RATIO;
use foto3x4_engine::lettering::SheetFont;
use foto3x4_engine::loader::{load_file, UPLOAD_QUALITY};
use foto3x4_engine::sheet::{compose, encode_sheet, render_sheet, SheetFormat, SheetGeometry};
use foto3x4_engine::{Foto3x4Engine, PhotoError, PipelineConfig};

#[derive(Debug, Parser)]
#[command(
    name = "foto3x4",
    version,
    about = "3x4 ID photos with AI-replaced white and blue backgrounds"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Full pipeline: load, generate both backgrounds, crop, print sheet.
    Process(ProcessArgs),
    /// Downscale and re-encode an upload.
    Prepare(PrepareArgs),
    /// Center-crop an image to 3:4.
    Crop(CropArgs),
    /// Lay out already-cropped photos on an A4 sheet.
    Sheet(SheetArgs),
}

#[derive(Debug, Parser)]
struct ProcessArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    model: Option<String>,
    /// Generator request timeout in seconds (15-300).
    #[arg(long)]
    timeout: Option<f64>,
    /// Copies of each colour on the sheet (1-12).
    #[arg(long)]
    copies: Option<usize>,
    #[arg(long)]
    dpi: Option<u32>,
    /// Sheet output path; defaults to `<out>/sheet.jpg`.
    #[arg(long)]
    sheet: Option<PathBuf>,
    /// TrueType font for the sheet title and footer.
    #[arg(long)]
    font: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct PrepareArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    max_width: Option<u32>,
}

#[derive(Debug, Parser)]
struct CropArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Parser)]
struct SheetArgs {
    #[arg(long)]
    white: Option<PathBuf>,
    #[arg(long)]
    blue: Option<PathBuf>,
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    copies: Option<usize>,
    #[arg(long)]
    dpi: Option<u32>,
    /// TrueType font for the sheet title and footer.
    #[arg(long)]
    font: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("foto3x4 error: {}", error_line(&err));
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Process(args) => run_process(args),
        Command::Prepare(args) => run_prepare(args),
        Command::Crop(args) => run_crop(args),
        Command::Sheet(args) => run_sheet(args),
    }
}

/// Pipeline failures print their user message; anything else its full chain.
fn error_line(err: &anyhow::Error) -> String {
    match err.downcast_ref::<PhotoError>() {
        Some(photo) => photo.user_message(),
        None => format!("{err:#}"),
    }
}

fn config_from_args(args: &ProcessArgs) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    if let Some(provider) = &args.provider {
        config = config.with_provider(provider.as_str());
    }
    if let Some(model) = &args.model {
        config = config.with_model(model.as_str());
    }
    if let Some(timeout) = args.timeout {
        config = config.with_request_timeout(timeout);
    }
    if let Some(copies) = args.copies {
        config = config.with_copies(copies);
    }
    if let Some(dpi) = args.dpi {
        config = config.with_sheet_dpi(dpi);
    }
    if let Some(font) = &args.font {
        config = config.with_sheet_font(font);
    }
    config
}

fn run_process(args: ProcessArgs) -> Result<i32> {
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let config = config_from_args(&args);
    let mut engine = Foto3x4Engine::new(&args.out, &events_path, config)?;
    let sheet_path = args
        .sheet
        .clone()
        .unwrap_or_else(|| args.out.join("sheet.jpg"));

    let result = run_pipeline(&mut engine, &args.input, &sheet_path);
    engine.finish()?;
    result?;
    Ok(0)
}

fn run_pipeline(engine: &mut Foto3x4Engine, input: &Path, sheet_path: &Path) -> Result<()> {
    let original = engine.select_file(input)?;
    println!(
        "Loaded {} ({}x{})",
        input.display(),
        original.width(),
        original.height()
    );

    println!("Generating ID photos with {}...", engine.config().provider);
    engine.process()?;
    for background in BackgroundRequest::ALL {
        if let Some(image) = engine.state().result(background) {
            println!(
                "{background} photo: {} ({}x{})",
                engine.run_dir().join(format!("{background}.jpg")).display(),
                image.width(),
                image.height()
            );
        }
    }

    let written = engine.render_sheet(sheet_path)?;
    println!("Print sheet: {}", written.display());
    Ok(())
}

fn run_prepare(args: PrepareArgs) -> Result<i32> {
    let config = match args.max_width {
        Some(width) => PipelineConfig::default().with_max_upload_width(width),
        None => PipelineConfig::default(),
    };
    let codec = RasterCodec::default();
    let prepared = load_file(&codec, &args.input, config.max_upload_width, UPLOAD_QUALITY)?;
    write_output(&args.output, prepared.bytes())?;
    println!(
        "Prepared {} ({}x{}, {} bytes)",
        args.output.display(),
        prepared.width(),
        prepared.height(),
        prepared.len()
    );
    Ok(0)
}

fn run_crop(args: CropArgs) -> Result<i32> {
    let codec = RasterCodec::default();
    let source = read_image(&args.input)?;
    let outcome = crop_to_ratio(&codec, &source, ID_PHOTO_RATIO, CROP_QUALITY)?;
    write_output(&args.output, outcome.image.bytes())?;
    println!(
        "Cropped {}x{} -> {}x{} at +{}+{}",
        source.width(),
        source.height(),
        outcome.pixels.width,
        outcome.pixels.height,
        outcome.pixels.x,
        outcome.pixels.y
    );
    Ok(0)
}

fn run_sheet(args: SheetArgs) -> Result<i32> {
    if args.white.is_none() && args.blue.is_none() {
        bail!("sheet needs --white, --blue or both");
    }
    let mut config = PipelineConfig::default();
    if let Some(copies) = args.copies {
        config = config.with_copies(copies);
    }
    if let Some(dpi) = args.dpi {
        config = config.with_sheet_dpi(dpi);
    }

    let white = args.white.as_deref().map(read_image).transpose()?;
    let blue = args.blue.as_deref().map(read_image).transpose()?;
    let entries = compose(white.as_ref(), blue.as_ref(), config.copies_per_color);

    let codec = RasterCodec::default();
    let geometry = SheetGeometry::default().with_dpi(config.sheet_dpi);
    let font = SheetFont::discover(args.font.as_deref())?;
    let rendered = render_sheet(&codec, &entries, &geometry, font.as_ref())?;
    let bytes = encode_sheet(&rendered, geometry.dpi, SheetFormat::from_path(&args.output))?;
    write_output(&args.output, &bytes)?;
    println!(
        "Print sheet: {} ({} photos, {}x{} px at {} dpi)",
        args.output.display(),
        entries.len(),
        rendered.width(),
        rendered.height(),
        geometry.dpi
    );
    Ok(0)
}

fn read_image(path: &Path) -> Result<EncodedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(probe(bytes)?)
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foto3x4_contracts::events::read_event_types;
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::Value;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 90])
        });
        img.save_with_format(path, ImageFormat::Png).unwrap();
    }

    fn dims(path: &Path) -> (u32, u32) {
        image::image_dimensions(path).unwrap()
    }

    #[test]
    fn process_flags_parse_into_config() {
        let cli = Cli::try_parse_from([
            "foto3x4",
            "process",
            "--input",
            "me.jpg",
            "--out",
            "runs/one",
            "--provider",
            "dryrun",
            "--timeout",
            "900",
            "--copies",
            "6",
            "--dpi",
            "600",
            "--font",
            "fonts/Sans.ttf",
        ])
        .unwrap();
        let Command::Process(args) = cli.command else {
            panic!("expected process");
        };
        let config = config_from_args(&args);
        assert_eq!(config.provider, "dryrun");
        assert_eq!(config.request_timeout_s, 300.0);
        assert_eq!(config.copies_per_color, 6);
        assert_eq!(config.sheet_dpi, 600);
        assert_eq!(config.sheet_font, Some(PathBuf::from("fonts/Sans.ttf")));
        assert_eq!(config.model, "gemini-2.5-flash-image");
    }

    #[test]
    fn process_requires_input_and_out() {
        assert!(Cli::try_parse_from(["foto3x4", "process", "--out", "x"]).is_err());
        assert!(Cli::try_parse_from(["foto3x4", "crop", "--input", "a.jpg"]).is_err());
    }

    #[test]
    fn prepare_caps_width() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("wide.png");
        let output = temp.path().join("prepared.jpg");
        write_png(&input, 1600, 1200);

        let code = run_prepare(PrepareArgs {
            input,
            output: output.clone(),
            max_width: None,
        })
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(dims(&output), (1024, 768));
    }

    #[test]
    fn crop_writes_three_by_four() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("square.png");
        let output = temp.path().join("nested/cropped.jpg");
        write_png(&input, 400, 400);

        run_crop(CropArgs {
            input,
            output: output.clone(),
        })
        .unwrap();
        assert_eq!(dims(&output), (300, 400));
    }

    #[test]
    fn sheet_from_single_colour() {
        let temp = tempfile::tempdir().unwrap();
        let blue = temp.path().join("blue.png");
        let output = temp.path().join("sheet.png");
        write_png(&blue, 90, 120);

        run_sheet(SheetArgs {
            white: None,
            blue: Some(blue),
            output: output.clone(),
            copies: Some(2),
            dpi: Some(72),
            font: None,
        })
        .unwrap();
        assert_eq!(dims(&output), (595, 842));
    }

    #[test]
    fn sheet_without_photos_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = run_sheet(SheetArgs {
            white: None,
            blue: None,
            output: temp.path().join("sheet.jpg"),
            copies: None,
            dpi: None,
            font: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("--white"));
    }

    #[test]
    fn unreadable_font_fails_the_sheet() {
        let temp = tempfile::tempdir().unwrap();
        let blue = temp.path().join("blue.png");
        let font = temp.path().join("font.ttf");
        let output = temp.path().join("sheet.jpg");
        write_png(&blue, 90, 120);
        fs::write(&font, b"not a font").unwrap();

        let err = run_sheet(SheetArgs {
            white: None,
            blue: Some(blue),
            output: output.clone(),
            copies: Some(1),
            dpi: Some(72),
            font: Some(font),
        })
        .unwrap_err();
        assert!(error_line(&err).contains("font.ttf"));
        assert!(!output.exists());
    }

    #[test]
    fn dryrun_process_writes_run_artifacts() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("portrait.png");
        let out = temp.path().join("run-cli");
        write_png(&input, 160, 200);

        let code = run_process(ProcessArgs {
            input,
            out: out.clone(),
            events: None,
            provider: Some("dryrun".to_string()),
            model: None,
            timeout: None,
            copies: None,
            dpi: Some(72),
            sheet: None,
            font: None,
        })
        .unwrap();
        assert_eq!(code, 0);

        for name in [
            "original.jpg",
            "white.jpg",
            "blue.jpg",
            "receipt-white.json",
            "receipt-blue.json",
            "sheet.jpg",
            "summary.json",
        ] {
            assert!(out.join(name).exists(), "missing {name}");
        }
        assert_eq!(dims(&out.join("white.jpg")), (150, 200));

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["run_id"], Value::String("run-cli".to_string()));
        let types = read_event_types(&out.join("events.jsonl")).unwrap();
        assert_eq!(types.first().map(String::as_str), Some("run_started"));
        assert_eq!(types.last().map(String::as_str), Some("run_finished"));
    }

    #[test]
    fn unreadable_input_reports_a_load_message() {
        let temp = tempfile::tempdir().unwrap();
        let err = run_process(ProcessArgs {
            input: temp.path().join("missing.jpg"),
            out: temp.path().join("run"),
            events: None,
            provider: Some("dryrun".to_string()),
            model: None,
            timeout: None,
            copies: None,
            dpi: None,
            sheet: None,
            font: None,
        })
        .unwrap_err();
        assert!(error_line(&err).starts_with("Could not load the image"));
        assert!(temp.path().join("run/summary.json").exists());
    }
}
