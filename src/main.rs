use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use poster_studio::config::StudioConfig;
use poster_studio::layout::PosterLayout;
use poster_studio::model::{ExportRequest, PosterParameters, SourceContent};
use poster_studio::pdf::{DocumentMeta, PosterAssets, load_image_file};
use poster_studio::service::{ExportService, JsonContentSource, StaticTokenAuthorizer};
use poster_studio::validator::{TemplateProbe, validate_image_height};
use poster_studio::wire::{ExportSubmission, encode_data_uri};
use poster_studio::{Error, fonts::FontSet, render_poster_to_file};

#[derive(Parser)]
#[command(name = "poster-studio")]
#[command(version)]
#[command(about = "Lay out posters and export them to PDF", long_about = None)]
struct Cli {
    /// Config file (JSON); environment variables override it
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the initial editor parameters for a content record
    Prefill {
        #[arg(value_name = "CONTENT_JSON")]
        content: PathBuf,
    },

    /// Print the computed layout, optionally trying a new image height
    Layout {
        #[arg(value_name = "PARAMS_JSON")]
        params: PathBuf,

        /// Candidate image band height in mm
        #[arg(long)]
        image_height: Option<f32>,
    },

    /// Render a poster to a PDF file directly
    Render {
        #[arg(value_name = "PARAMS_JSON")]
        params: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Full-page capture to embed instead of redrawing
        #[arg(long, value_name = "IMAGE")]
        capture: Option<PathBuf>,

        #[arg(long, value_name = "IMAGE")]
        featured: Option<PathBuf>,

        /// Link to encode in the QR code
        #[arg(long)]
        qr: Option<String>,
    },

    /// Run a full export request through the service and store the result
    Export {
        #[arg(long)]
        post_id: u64,

        #[arg(long)]
        token: String,

        #[arg(long, value_name = "PARAMS_JSON")]
        params: Option<PathBuf>,

        #[arg(long, value_name = "IMAGE")]
        capture: Option<PathBuf>,

        /// Overrides the configured upload directory
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Overrides the configured upload URL
        #[arg(long)]
        base_url: Option<String>,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<(), Error> {
    let mut config = StudioConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Prefill { content } => {
            let content: SourceContent = read_json(&content)?;
            print_json(&PosterParameters::prefill(&content))
        }
        Commands::Layout {
            params,
            image_height,
        } => {
            let mut params = read_json::<PosterParameters>(&params)?.normalized();
            let fonts = FontSet::load(params.font_family);
            let layout = match image_height {
                Some(candidate) => {
                    let mut probe = TemplateProbe::with_fonts(&params, &config.template, fonts);
                    let edit = validate_image_height(&mut probe, &mut params, candidate);
                    log::info!("Image height edit: {edit:?}");
                    probe.layout()
                }
                None => PosterLayout::compute(&params, &config.template, &fonts),
            };
            print_json(&serde_json::json!({
                "imageHeightMm": params.image_height_mm,
                "fitsPage": layout.fits_page(),
                "contentBottomMm": layout.content_bottom_mm(),
                "layout": layout,
            }))
        }
        Commands::Render {
            params,
            output,
            capture,
            featured,
            qr,
        } => {
            let parameters: PosterParameters = read_json(&params)?;
            let captured_image = capture.as_deref().map(load_image_file).transpose()?;
            let assets = PosterAssets {
                featured_image: featured.as_deref().map(load_image_file).transpose()?,
                logo: config.logo_path.as_deref().map(load_image_file).transpose()?,
                qr_target: qr,
            };
            let meta = DocumentMeta {
                title: parameters.display_title(),
                author: config.author.clone(),
                creator: config.creator.clone(),
            };
            let report = render_poster_to_file(
                ExportRequest {
                    parameters,
                    captured_image,
                },
                &assets,
                &config.template,
                meta,
                &output,
            )?;
            print_json(&report)
        }
        Commands::Export {
            post_id,
            token,
            params,
            capture,
            out_dir,
            base_url,
        } => {
            if let Some(dir) = out_dir {
                config.upload_dir = dir;
            }
            if let Some(url) = base_url {
                config.upload_url = url;
            }
            let parameters = match params {
                Some(path) => read_json(&path)?,
                None => PosterParameters::default(),
            };
            let image_data = match capture {
                Some(path) => {
                    let mime = match path.extension().and_then(|e| e.to_str()) {
                        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
                        _ => "image/jpeg",
                    };
                    Some(encode_data_uri(mime, &std::fs::read(&path)?))
                }
                None => None,
            };

            let content = JsonContentSource::new(&config.content_dir);
            let service = ExportService::new(config, StaticTokenAuthorizer::editor(&token), content);
            let response = service.handle(&ExportSubmission {
                post_id: post_id.into(),
                auth_token: token,
                parameters,
                image_data,
            });
            print_json(&response)?;
            if response.success {
                Ok(())
            } else {
                Err(Error::Render(response.message.unwrap_or_default()))
            }
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
