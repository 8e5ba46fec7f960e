use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::Level;

use timeplace::{
    actions::Action,
    pipeline::{Config, Pipeline},
};

#[derive(Parser)]
#[command(name = "timeplace")]
#[command(about = "Organize photos by date and location")]
struct Args {
    /// Configuration file (YAML); flags override its values
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Source folder containing images
    #[arg(short, long)]
    source: Option<Utf8PathBuf>,

    /// Target folder for organized images
    #[arg(short, long)]
    target: Option<Utf8PathBuf>,

    /// Google location history JSON export
    #[arg(short = 'g', long)]
    location_history: Option<Utf8PathBuf>,

    /// Folder with GeoNames *.txt dumps
    #[arg(long)]
    geonames: Option<Utf8PathBuf>,

    /// Destination template relative to the target folder
    #[arg(long)]
    template: Option<String>,

    /// Copy instead of move
    #[arg(long)]
    copy: bool,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Only look at files directly inside the source folder
    #[arg(long)]
    no_recursive: bool,

    /// Dry run - show what would be done without doing it
    #[arg(short, long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_yaml_file(path)?,
            None => {
                let (Some(source), Some(target)) = (&self.source, &self.target) else {
                    anyhow::bail!("--source and --target are required without --config");
                };
                Config::new(source.clone(), target.clone())
            }
        };

        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(target) = self.target {
            config.target = target;
        }
        if let Some(history) = self.location_history {
            config.location_history = Some(history);
        }
        if let Some(geonames) = self.geonames {
            config.geonames = geonames;
        }
        if let Some(template) = self.template {
            config.template = template;
        }
        if let Some(threads) = self.threads {
            config.threads = Some(threads);
        }
        if self.copy {
            config.action = Action::Copy;
        }
        if self.no_recursive {
            config.recursive = false;
        }
        if self.dry_run {
            config.dry_run = true;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    timeplace::init_logging(if args.verbose { Level::DEBUG } else { Level::INFO })?;

    let config = args.into_config()?;
    let dry_run = config.dry_run;

    println!("📷 timeplace - sorting by date and place");
    println!("Source: {}", config.source);
    println!("Target: {}", config.target);
    match &config.location_history {
        Some(path) => println!("Location history: {path}"),
        None => println!("Location history: (none)"),
    }
    if dry_run {
        println!("🔍 DRY RUN MODE - No files will be moved or modified");
    }

    let pipeline = Pipeline::from_config(config)?;
    let summary = pipeline.run()?;

    println!("\n🎉 Summary:");
    println!("   Files processed: {}", summary.processed);
    println!("   Files moved: {}", summary.moved);
    println!("   Already in place: {}", summary.unchanged);
    println!("   Located from history: {}", summary.located_from_history);
    println!("   Without a place: {}", summary.unnamed);
    println!("   Errors: {}", summary.errors);

    Ok(())
}
