/// Command-line front end for block-level yield prediction.
///
/// `states` and `districts` only read the boundary file. `predict` and
/// `train` authenticate against the compute service first and stop with an
/// error if that fails.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cropyield::core::render::{self, Theme};
use cropyield::{
    authenticate, AuthResult, FieldDataReader, ModelTrainer, PipelineConfig, RegionSet,
    RemoteEngine, ServiceAccountCredentials, YieldPredictor,
};

#[derive(Parser, Debug)]
#[command(
    name = "cropyield",
    version,
    about = "District-wise kharif crop yield prediction from remote-sensing features"
)]
struct Cli {
    /// Pipeline configuration (JSON); defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Administrative boundaries (GeoJSON with State/District/Block)
    #[arg(long, global = true, default_value = "data/regions.geojson")]
    regions: PathBuf,

    /// Service-account key file, used when the credential environment
    /// variables are unset
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the states present in the boundary file
    States,

    /// List the districts of a state
    Districts {
        #[arg(long)]
        state: String,
    },

    /// Predict yield for every block of a district
    Predict {
        #[arg(long)]
        state: String,
        #[arg(long)]
        district: String,
        #[arg(long)]
        year: i32,
        /// Trained model artifact
        #[arg(long)]
        model: PathBuf,
        /// Write the predicted blocks as styled GeoJSON
        #[arg(long)]
        out_geojson: Option<PathBuf>,
        /// Write the bar chart description as JSON
        #[arg(long)]
        out_chart: Option<PathBuf>,
        #[arg(long, default_value = "light")]
        theme: Theme,
    },

    /// Train a model from field observations
    Train {
        /// Field survey CSV with Latitude, Longitude and a yield column
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        model_out: PathBuf,
        /// Yield column name; detected from the header when omitted
        #[arg(long)]
        yield_column: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::States => {
            let regions = load_regions(&cli.regions)?;
            for state in regions.states() {
                println!("{}", state);
            }
        }
        Command::Districts { state } => {
            let regions = load_regions(&cli.regions)?;
            let districts = regions.districts(&state);
            if districts.is_empty() {
                log::warn!("No districts found for state '{}'", state);
            }
            for district in districts {
                println!("{}", district);
            }
        }
        Command::Predict {
            state,
            district,
            year,
            model,
            out_geojson,
            out_chart,
            theme,
        } => {
            let regions = load_regions(&cli.regions)?.select(&state, &district);
            if regions.is_empty() {
                bail!("no blocks found for {} / {}", state, district);
            }
            let predictor = YieldPredictor::from_path(&model, config.clone())
                .with_context(|| format!("loading model {}", model.display()))?;
            let engine = connect(&config, cli.key_file.as_deref())?;

            let result = predictor
                .predict_regions(&engine, &regions, year)
                .context("yield prediction failed")?;

            println!("{:<30} {:>12}", "Block", "Yield");
            for row in &result.rows {
                println!(
                    "{:<30} {:>12}",
                    row.region.block,
                    render::format_yield(row.predicted_yield)
                );
            }

            if let Some(path) = out_geojson {
                render::save_feature_collection(&result, &path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            if let Some(path) = out_chart {
                render::bar_chart(&result, theme)
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Command::Train {
            csv,
            year,
            model_out,
            yield_column,
        } => {
            let mut reader = FieldDataReader::new();
            if let Some(column) = yield_column {
                reader = reader.with_yield_column(column);
            }
            let observations = reader
                .read_path(&csv)
                .with_context(|| format!("reading {}", csv.display()))?;
            let engine = connect(&config, cli.key_file.as_deref())?;

            let outcome = ModelTrainer::new(&config)
                .train(&engine, &observations, year)
                .context("training failed")?;
            outcome
                .artifact
                .save(&model_out)
                .with_context(|| format!("saving model {}", model_out.display()))?;

            println!("R²:  {:.4}", outcome.report.r2);
            println!("MAE: {:.4}", outcome.report.mae);
            println!(
                "Trained on {} rows, evaluated on {}",
                outcome.report.n_train, outcome.report.n_test
            );
        }
    }

    Ok(())
}

fn load_regions(path: &Path) -> Result<RegionSet> {
    RegionSet::from_path(path).with_context(|| format!("loading regions {}", path.display()))
}

fn connect(config: &PipelineConfig, key_file: Option<&Path>) -> Result<RemoteEngine> {
    let auth = match ServiceAccountCredentials::discover(key_file) {
        Ok(credentials) => authenticate(&config.service, &credentials),
        Err(e) => {
            log::error!("No usable service-account credentials: {}", e);
            AuthResult::Failed(e.to_string())
        }
    };
    RemoteEngine::from_auth(auth, &config.service).context("compute service unavailable")
}
