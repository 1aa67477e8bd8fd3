use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use weatherbox_models::{image, BuildConfig, ImageManifest, Variant};
use weatherbox_packaging::layer_entries;
use weatherbox_pipeline::BuildPipeline;

#[derive(Parser)]
#[command(name = "weatherbox-build")]
#[command(about = "Build the Weatherbox runtime image")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the build pipeline and produce an image
    Build {
        /// Configuration file (TOML)
        #[arg(long, default_value = "configs/default.toml")]
        config: PathBuf,
        /// Repository URL override
        #[arg(long)]
        repo: Option<String>,
        /// Git ref override
        #[arg(long)]
        git_ref: Option<String>,
        /// Build without the native helper
        #[arg(long)]
        no_helper: bool,
        /// Output directory override
        #[arg(long)]
        output: Option<PathBuf>,
        /// Additional manifest packages to exclude
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
    /// Print the manifest and contents of a built image
    Inspect {
        /// Image directory (the one holding manifest.json)
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            config,
            repo,
            git_ref,
            no_helper,
            output,
            exclude,
        } => {
            let mut config = BuildConfig::load(Some(config.as_path()))?;
            if let Some(repo) = repo {
                config.source.repo_url = repo;
            }
            if let Some(git_ref) = git_ref {
                config.source.git_ref = git_ref;
            }
            if no_helper {
                config.variant = Variant::Plain;
            }
            if let Some(output) = output {
                config.image.output_dir = output;
            }
            config.install.exclude.extend(exclude);

            let image = BuildPipeline::new(config).run().await?;
            info!(
                "Image ready: {} (build {})",
                image.dir.display(),
                image.manifest.build_id
            );
        }
        Commands::Inspect { dir } => {
            let manifest_file = dir.join(image::MANIFEST_FILE);
            let body = std::fs::read_to_string(&manifest_file)?;
            let manifest: ImageManifest = serde_json::from_str(&body)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);

            let layer_file = dir.join(image::LAYER_FILE);
            if layer_file.is_file() {
                let entries = layer_entries(&layer_file)?;
                println!("layer entries: {}", entries.len());
            }
        }
    }
    Ok(())
}
