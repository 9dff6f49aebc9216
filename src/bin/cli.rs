use anyhow::Context;
use carousel_engine::carousel::{self, CarouselData};
use carousel_engine::compositor::{CanvasLayout, Compositor, FontFace};
use carousel_engine::config::Config;
use carousel_engine::export;
use carousel_engine::image_handler::ImageSource;
use carousel_engine::store::MockupStore;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Mockup database (overrides CAROUSEL_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory for rendered images (overrides CAROUSEL_OUTPUT_DIR)
    #[arg(short, long, global = true)]
    out_dir: Option<PathBuf>,

    /// Caption font file (overrides CAROUSEL_FONT_PATH)
    #[arg(long, global = true)]
    font: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store image files as mockups, in the given order
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List stored mockups, most recent first
    List,
    /// Remove a stored mockup
    Delete { id: String },
    /// Burn a caption onto one background image
    Composite {
        /// File path or data URL
        #[arg(short, long)]
        image: String,
        #[arg(short, long)]
        text: String,
        #[arg(long)]
        title: String,
        #[arg(short, long, default_value = "completa")]
        suffix: String,
    },
    /// Render every image of a generated carousel (JSON)
    Render {
        #[arg(short, long)]
        carousel: PathBuf,
        /// Use a random stored mockup for the closing slide
        #[arg(long)]
        random_mockup: bool,
    },
    /// Print the built-in themes
    Themes,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(dir) = cli.out_dir {
        config.output_dir = dir;
    }
    if let Some(font) = cli.font {
        config.font_path = Some(font);
    }

    match cli.command {
        Commands::Add { files } => {
            let store = MockupStore::open(&config.db_path)?;
            let mut failed = 0;
            for outcome in store.save_files(&files) {
                match outcome.result {
                    Ok(mockup) => println!("{}\t{}", mockup.id, outcome.path.display()),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", outcome.path.display(), e);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} files could not be stored", failed, files.len());
            }
        }

        Commands::List => {
            let store = MockupStore::open(&config.db_path)?;
            for mockup in store.list()? {
                let when = chrono::DateTime::from_timestamp_millis(mockup.timestamp)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| mockup.timestamp.to_string());
                println!("{}\t{}\t{} bytes", mockup.id, when, mockup.data_url.len());
            }
        }

        Commands::Delete { id } => {
            let store = MockupStore::open(&config.db_path)?;
            if store.delete(&id)? {
                println!("Deleted {}.", id);
            } else {
                println!("No mockup with id {}.", id);
            }
        }

        Commands::Composite {
            image,
            text,
            title,
            suffix,
        } => {
            let compositor = load_compositor(&config)?;
            let artifact = compositor.render(
                ImageSource::parse(&image),
                &text,
                &title,
                &suffix,
                config.load_timeout,
            )?;
            let path = export::write_artifact(&config.output_dir, &artifact)?;
            println!("{}", path.display());
        }

        Commands::Render {
            carousel: json_path,
            random_mockup,
        } => {
            let json = std::fs::read_to_string(&json_path)
                .with_context(|| format!("reading {}", json_path.display()))?;
            let mut data = CarouselData::from_json(&json)?;
            if random_mockup {
                let store = MockupStore::open(&config.db_path)?;
                data = carousel::with_random_mockup(&data, &store.list()?, &mut rand::rng());
            }

            let compositor = load_compositor(&config)?;
            let mut failed = 0;
            for outcome in carousel::render_carousel(&compositor, &data, config.load_timeout) {
                let written = outcome
                    .result
                    .and_then(|artifact| export::write_artifact(&config.output_dir, &artifact));
                match written {
                    Ok(path) => println!("{}", path.display()),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", outcome.suffix, e);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} images could not be rendered", failed);
            }
        }

        Commands::Themes => {
            for theme in carousel::THEMES {
                println!("{}", theme);
            }
        }
    }

    Ok(())
}

fn load_compositor(config: &Config) -> anyhow::Result<Compositor<FontFace>> {
    let layout = CanvasLayout::default();
    let face = FontFace::from_file(config.require_font()?, layout.font_size)?;
    Ok(Compositor::new(face, layout))
}
