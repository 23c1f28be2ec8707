//! image_celebrities - Recognise celebrities in a local image and write an
//! annotated copy.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use celebrity_overlay::aws::{Credentials, RekognitionClient};
use celebrity_overlay::config::RunConfig;
use celebrity_overlay::overlay::load_font;
use celebrity_overlay::{annotate_image, FsImageWriter, OverlayRenderer};

#[derive(Parser, Debug)]
#[command(
    name = "image_celebrities",
    about = "Recognise celebrities in an image and draw the results"
)]
struct Args {
    /// Image to analyse (JPEG or PNG)
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Config file (toml, or json by extension)
    #[arg(long, env = "CELEB_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for the annotated copy
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// TrueType font for labels
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = RunConfig::load_from(args.config.as_deref())?;
    let output_dir = args.output_dir.unwrap_or(cfg.render.output_dir);
    let font_path = args.font.or(cfg.render.font_path);

    let recognition = RekognitionClient::new(
        Credentials::from_env()?,
        &cfg.aws.region,
        cfg.aws.rekognition_endpoint,
    )?;
    let font = load_font(font_path.as_deref())?;
    let mut renderer = OverlayRenderer::new(cfg.render.image_style).with_font(font);

    let report = annotate_image(
        &recognition,
        &FsImageWriter,
        &mut renderer,
        &args.image,
        &output_dir,
    )?;

    println!(
        "image_celebrities: {} celebrities, saved {}",
        report.annotations.len(),
        report.path.display()
    );
    for annotation in &report.annotations {
        println!("  {}", annotation.label);
    }
    Ok(())
}
