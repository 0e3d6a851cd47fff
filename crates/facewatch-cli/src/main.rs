use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facewatch_core::normalize::normalize;
use facewatch_core::{Config, NccScorer, Similarity};
use facewatch_store::FaceStore;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facewatch", about = "Inspect and manage the facewatch face collection")]
struct Cli {
    /// Configuration file (TOML). Falls back to $FACEWATCH_CONFIG.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the configured image store is reachable
    Ping,
    /// List stored faces
    List,
    /// Show backend metadata for a stored face
    Info {
        /// Image identifier
        id: String,
    },
    /// Remove a stored face
    Delete {
        /// Image identifier
        id: String,
    },
    /// Print the resolved configuration
    Config,
    /// Score two face images the way the daemon compares them
    Score {
        a: PathBuf,
        b: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Ping => {
            let store = open_store(&config)?;
            if !store.ping() {
                anyhow::bail!("{} image store is unreachable", store.name());
            }
            println!("{}: reachable", store.name());
        }
        Commands::List => {
            let store = open_store(&config)?;
            let faces = store.load_all(None);
            if faces.is_empty() {
                println!("No faces stored");
            } else {
                println!("{:<48} {:>6} {:>6}", "ID", "WIDTH", "HEIGHT");
                for face in &faces {
                    let (id, width, height) = (&face.id, face.image.width(), face.image.height());
                    println!("{id:<48} {width:>6} {height:>6}");
                }
                println!("{} face(s)", faces.len());
            }
        }
        Commands::Info { id } => {
            let store = open_store(&config)?;
            let info = store.info(&id).with_context(|| format!("failed to look up {id}"))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Delete { id } => {
            let store = open_store(&config)?;
            store.delete(&id).with_context(|| format!("failed to delete {id}"))?;
            println!("Deleted {id}");
        }
        Commands::Config => print!("{}", render_config(&config)?),
        Commands::Score { a, b } => {
            let grid_a = load_grid(&a)?;
            let grid_b = load_grid(&b)?;
            let score = NccScorer.score(&grid_a, &grid_b);
            let verdict = verdict(score, config.similarity_threshold);
            println!(
                "similarity {score:.4} (threshold {:.2}): {verdict}",
                config.similarity_threshold
            );
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Box<dyn FaceStore>> {
    tracing::debug!(backend = ?config.storage.backend, "opening image store");
    facewatch_store::open(&config.storage).context("failed to open image store")
}

/// TOML rendering of `config` with the API token masked.
fn render_config(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    if shown.storage.api_token.is_some() {
        shown.storage.api_token = Some("<redacted>".to_string());
    }
    Ok(toml::to_string_pretty(&shown)?)
}

/// Same rule as the daemon: a match needs a score strictly above the threshold.
fn verdict(score: f32, threshold: f32) -> &'static str {
    if score > threshold {
        "same face"
    } else {
        "different faces"
    }
}

fn load_grid(path: &Path) -> Result<facewatch_core::FaceGrid> {
    let image = image::open(path).with_context(|| format!("failed to read {}", path.display()))?;
    normalize(&image).with_context(|| format!("failed to normalize {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_config_hides_token() {
        let mut config = Config::default();
        config.storage.api_token = Some("s3cret".into());
        config.storage.api_url = Some("https://faces.example/api".into());

        let text = render_config(&config).unwrap();
        assert!(!text.contains("s3cret"));
        assert!(text.contains("api_token = \"<redacted>\""));
        assert!(text.contains("https://faces.example/api"));
        assert_eq!(config.storage.api_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_config_without_token() {
        let text = render_config(&Config::default()).unwrap();
        assert!(!text.contains("api_token"));
        assert!(!text.contains("<redacted>"));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.similarity_threshold, Config::default().similarity_threshold);
    }

    #[test]
    fn test_verdict_is_strictly_above_threshold() {
        assert_eq!(verdict(0.61, 0.6), "same face");
        assert_eq!(verdict(0.6, 0.6), "different faces");
        assert_eq!(verdict(0.59, 0.6), "different faces");
        assert_eq!(verdict(-1.0, -1.0), "different faces");
    }

    #[test]
    fn test_load_grid_scores_identical_images_as_same() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        GrayImage::from_fn(40, 40, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]))
            .save(&path)
            .unwrap();

        let grid = load_grid(&path).unwrap();
        let score = NccScorer.score(&grid, &grid);
        assert_eq!(verdict(score, 0.6), "same face");
        assert!(load_grid(&dir.path().join("missing.png")).is_err());
    }
}
