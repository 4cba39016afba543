//! SMOS data cube CLI.
//!
//! Lists and describes the SMOS datasets, writes cubes to Zarr and
//! iterates over the L2 products of a time range.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use netcdf_refs::silence_hdf5_errors;
use smos_cube::{CubeWriter, DataType, OpenedData, SmosDataStore, StoreParams};

#[derive(Parser, Debug)]
#[command(name = "smos-cube")]
#[command(about = "Open SMOS L2 data cubes")]
struct Cli {
    /// NetCDF Kerchunk index of the L2 archive
    #[arg(long, env = "SMOS_INDEX_PATH", global = true)]
    index: Option<PathBuf>,

    /// DGG tile pyramid root
    #[arg(long, env = "SMOS_DGG_PATH", global = true)]
    dgg: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG", global = true)]
    log_level: String,

    /// Write logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List data identifiers and openers
    List {
        /// Only list data of this type: dataset, mldataset or smosdsiter
        #[arg(short = 't', long)]
        data_type: Option<String>,
    },
    /// Describe a dataset
    Describe {
        data_id: String,
        #[arg(short = 't', long)]
        data_type: Option<String>,
        /// Print the open parameters schema instead
        #[arg(long)]
        schema: bool,
    },
    /// Open a cube and write it as Zarr
    Write {
        data_id: String,
        /// Output directory
        output: PathBuf,
        #[command(flatten)]
        open: OpenArgs,
        /// Pyramid level to write
        #[arg(long)]
        res_level: Option<usize>,
    },
    /// Iterate over the L2 products of a time range
    Iterate {
        data_id: String,
        #[command(flatten)]
        open: OpenArgs,
    },
}

#[derive(Args, Debug)]
struct OpenArgs {
    /// Start of the time range, e.g. 2023-04-01; mission start if omitted
    #[arg(long)]
    start: Option<String>,

    /// End of the time range; a date covers the whole day, now if omitted
    #[arg(long)]
    end: Option<String>,

    /// Bounding box as x_min,y_min,x_max,y_max
    #[arg(long, value_delimiter = ',', num_args = 4)]
    bbox: Option<Vec<f64>>,

    /// Variables to include
    #[arg(long, value_delimiter = ',')]
    variables: Option<Vec<String>>,

    /// Number of L2 products kept open
    #[arg(long)]
    cache_size: Option<usize>,
}

impl OpenArgs {
    fn to_params(&self, res_level: Option<usize>) -> Value {
        let mut params = Map::new();
        params.insert("time_range".into(), json!([self.start, self.end]));
        if let Some(bbox) = &self.bbox {
            params.insert("bbox".into(), json!(bbox));
        }
        if let Some(names) = &self.variables {
            params.insert("variable_names".into(), json!(names));
        }
        if let Some(size) = self.cache_size {
            params.insert("l2_product_cache_size".into(), json!(size));
        }
        if let Some(level) = res_level {
            params.insert("res_level".into(), json!(level));
        }
        Value::Object(params)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let builder = fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
    silence_hdf5_errors();

    match &cli.command {
        Command::List { data_type } => {
            let ids = SmosDataStore::get_data_ids(data_type.as_deref())?;
            let openers = SmosDataStore::get_data_opener_ids(None, data_type.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&json!({"data_ids": ids, "opener_ids": openers}))?);
        }
        Command::Describe {
            data_id,
            data_type,
            schema,
        } => {
            let value = if *schema {
                let opener = data_type
                    .as_deref()
                    .map(|t| DataType::parse(t).map(|t| t.opener_id()))
                    .transpose()?;
                SmosDataStore::get_open_data_params_schema(Some(data_id), opener.as_deref())?
            } else {
                serde_json::to_value(open_store(&cli)?.describe_data(data_id, data_type.as_deref())?)?
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Write {
            data_id,
            output,
            open,
            res_level,
        } => {
            let store = open_store(&cli)?;
            let opened = store
                .open_data(data_id, None, open.to_params(*res_level))
                .await
                .with_context(|| format!("Failed to open {}", data_id))?;
            let OpenedData::Dataset(dataset) = opened else {
                bail!("Expected a dataset");
            };
            let writer = CubeWriter::create(output)?;
            let report = writer.write(&dataset).await?;
            info!(path = %report.path.display(), images = report.images_written, "Cube written");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Iterate { data_id, open } => {
            let store = open_store(&cli)?;
            let opened = store
                .open_data(data_id, Some(&DataType::DsIter.opener_id()), open.to_params(None))
                .await
                .with_context(|| format!("Failed to open {}", data_id))?;
            let OpenedData::Iterator(iterator) = opened else {
                bail!("Expected a dataset iterator");
            };
            let mut steps = Box::pin(iterator.into_stream());
            while let Some(step) = steps.next().await {
                let step = step?;
                let (height, width) = step.shape();
                println!(
                    "{}\t{}\t{}x{}\t{}",
                    step.time.to_rfc3339(),
                    step.record.path,
                    height,
                    width,
                    step.var_names().join(",")
                );
            }
        }
    }
    Ok(())
}

fn open_store(cli: &Cli) -> Result<SmosDataStore> {
    let params = StoreParams {
        index_path: cli.index.clone(),
        dgg_path: cli.dgg.clone(),
    };
    SmosDataStore::from_config(&params.to_config()).context("Failed to open the SMOS data store")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_params() {
        let cli = Cli::try_parse_from([
            "smos-cube",
            "write",
            "SMOS-L2C-SM",
            "out.zarr",
            "--start",
            "2023-04-01",
            "--bbox",
            "0,40,20,60",
            "--variables",
            "Soil_Moisture,Chi_2",
            "--res-level",
            "2",
        ])
        .unwrap();
        let Command::Write { open, res_level, .. } = cli.command else {
            panic!("expected write");
        };
        let params = open.to_params(res_level);
        assert_eq!(params["time_range"], json!(["2023-04-01", null]));
        assert_eq!(params["bbox"], json!([0.0, 40.0, 20.0, 60.0]));
        assert_eq!(params["variable_names"], json!(["Soil_Moisture", "Chi_2"]));
        assert_eq!(params["res_level"], json!(2));
        assert!(params.get("l2_product_cache_size").is_none());
    }

    #[test]
    fn test_bbox_needs_four_values() {
        let result =
            Cli::try_parse_from(["smos-cube", "iterate", "SMOS-L2C-OS", "--bbox", "0,40,20"]);
        assert!(result.is_err());
    }
}
