//! Command-line interface.
//!
//! One-shot commands against the configured providers; nothing is polled
//! or persisted.

mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use tracing::debug;

use coursefetch::{EngineConfig, Provider, ProviderRegistry};

#[derive(Parser)]
#[command(name = "coursefetch")]
#[command(about = "Discover and fetch course materials from learning-management portals")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, global = true, env = "COURSEFETCH_CONFIG", default_value = "coursefetch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// List configured providers and whether they are ready
    Providers,

    /// List the courses visible to a provider's account
    Courses {
        /// Provider name from the config file
        provider: String,
    },

    /// Enumerate candidate materials of a course
    Materials {
        provider: String,
        /// Course id as printed by `courses`
        course_id: String,
    },

    /// List users enrolled in a course
    Enrollments {
        provider: String,
        course_id: String,
    },

    /// Fetch one material and write its bytes to disk
    Download {
        provider: String,
        /// Material id as printed by `materials`
        material_id: String,
        /// Output file, or directory to place the file in (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Parse arguments, run the command, release the browser.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;
    let registry = ProviderRegistry::from_config(config);

    let result = dispatch(&cli, &registry).await;
    registry.shutdown().await;
    result
}

async fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    if path.exists() {
        debug!("Loading config from {}", path.display());
        Ok(EngineConfig::load_from_path(path).await?)
    } else {
        anyhow::bail!(
            "config file {} not found (set --config or COURSEFETCH_CONFIG)",
            path.display()
        )
    }
}

fn provider(registry: &ProviderRegistry, name: &str) -> anyhow::Result<Arc<dyn Provider>> {
    registry.get(name).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown provider '{}' (configured: {})",
            name,
            registry.list().join(", ")
        )
    })
}

async fn dispatch(cli: &Cli, registry: &ProviderRegistry) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Providers => {
            let rows: Vec<output::ProviderRow> = registry
                .providers()
                .map(|p| output::ProviderRow {
                    name: p.name().to_string(),
                    kind: p.kind().to_string(),
                    configured: p.is_configured(),
                })
                .collect();
            output::print_providers(&rows, cli.json)
        }
        Commands::Courses { provider: name } => {
            let courses = provider(registry, name)?.list_courses().await?;
            output::print_courses(&courses, cli.json)
        }
        Commands::Materials {
            provider: name,
            course_id,
        } => {
            let materials = provider(registry, name)?.list_materials(course_id).await?;
            output::print_materials(&materials, cli.json)
        }
        Commands::Enrollments {
            provider: name,
            course_id,
        } => {
            let enrollments = provider(registry, name)?.list_enrollments(course_id).await?;
            output::print_enrollments(&enrollments, cli.json)
        }
        Commands::Download {
            provider: name,
            material_id,
            output: target,
        } => {
            let (bytes, material) = provider(registry, name)?
                .download_material(material_id)
                .await?;
            let path = output_path(target.as_deref(), &material.filename);
            tokio::fs::write(&path, &bytes).await?;

            if cli.json {
                output::print_json(&material)
            } else {
                println!(
                    "{} {} ({} bytes, {}) -> {}",
                    style("✓").green(),
                    material.title,
                    material.size_bytes,
                    material.content_type,
                    path.display()
                );
                Ok(())
            }
        }
    }
}

/// Directories get the material's filename appended.
fn output_path(target: Option<&Path>, filename: &str) -> PathBuf {
    let safe_name = Path::new(filename)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    match target {
        Some(path) if path.is_dir() => path.join(safe_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(safe_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_download() {
        let cli = Cli::try_parse_from([
            "coursefetch",
            "--json",
            "download",
            "campus",
            "materialurl:abc",
            "-o",
            "out.pdf",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Download { ref provider, ref output, .. }
                if provider == "campus" && output.as_deref() == Some(Path::new("out.pdf"))
        ));
    }

    #[test]
    fn test_output_path_strips_directories_from_filename() {
        assert_eq!(output_path(None, "../../etc/passwd"), PathBuf::from("passwd"));
        assert_eq!(
            output_path(Some(Path::new("x.pdf")), "lec1.pdf"),
            PathBuf::from("x.pdf")
        );
        let dir = std::env::temp_dir();
        assert_eq!(output_path(Some(&dir), "lec1.pdf"), dir.join("lec1.pdf"));
    }
}
