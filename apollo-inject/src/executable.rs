//! Main entry point for the `inject` CLI.

use std::path::PathBuf;

use anyhow::Context as _;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::configuration::Configuration;
use crate::configuration::generate_config_schema;
use crate::demos::shipping;
use crate::directive::InjectMode;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::resolver::Context;
use crate::resolver::TYPENAME;
use crate::schema::SchemaBuilder;

/// Options for the shipping subgraph.
#[derive(Parser, Debug)]
#[clap(name = "inject", about = "Field-level data injection for federated subgraphs")]
struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[clap(long = "log", default_value = "info", env = "APOLLO_INJECT_LOG")]
    log_level: String,

    /// Configuration location relative to the current directory.
    #[clap(short, long = "config", env = "APOLLO_INJECT_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// How `@inject` annotations are satisfied. Overrides the configuration file.
    #[clap(long, env = "INJECT_MODE")]
    mode: Option<InjectMode>,

    /// Prints the configuration schema.
    #[clap(long)]
    schema: bool,

    /// Resolve the shipping estimate of this product instead of printing the SDL.
    #[clap(long, requires = "zipcode")]
    sku: Option<String>,

    /// Destination zip code of the shipping estimate.
    #[clap(long)]
    zipcode: Option<String>,
}

/// This is the main `inject` entrypoint.
pub fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(rt_main())
}

async fn rt_main() -> Result<()> {
    let opt = Opt::parse();

    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::try_new(&opt.log_level).context("could not parse log")?)
        .with_writer(std::io::stderr)
        .init();

    if opt.schema {
        let schema = generate_config_schema();
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let mut configuration = match &opt.config_path {
        Some(path) => {
            let path = if path.is_relative() {
                std::env::current_dir()?.join(path)
            } else {
                path.clone()
            };
            Configuration::from_file(&path)
                .with_context(|| format!("could not load configuration from {}", path.display()))?
        }
        None => Configuration::default(),
    };
    if opt.mode.is_some() {
        configuration.inject.mode = opt.mode;
    }

    let builder = SchemaBuilder::from_configuration(&configuration.inject)?;
    let schema = shipping::shipping_schema(builder)?;

    let Some(sku) = opt.sku else {
        print!("{schema}");
        return Ok(());
    };

    let mut parent = Object::new();
    parent.insert(TYPENAME, Value::from(shipping::PRODUCT_TYPE));
    parent.insert("sku", Value::from(sku));
    let mut arguments = Object::new();
    if let Some(zipcode) = opt.zipcode {
        arguments.insert("zipcode", Value::from(zipcode));
    }

    let estimate = schema
        .resolve_field(
            shipping::PRODUCT_TYPE,
            shipping::SHIPPING_ESTIMATE_FIELD,
            &parent,
            arguments,
            &Context::default(),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&estimate)?);
    Ok(())
}
