//! tflite-bridge CLI - TF.js to TFLite conversion server

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use warp::Filter;

use tflite_bridge::api;
use tflite_bridge::config::Config;
use tflite_bridge::convert::{ModelConverter, TfliteToolchain};

#[derive(Parser)]
#[command(name = "tflite-bridge")]
#[command(version = "0.1.0")]
#[command(about = "Converts TensorFlow.js models to TFLite for embedded inference devices", long_about = None)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, global = true, env = "TFLITE_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the conversion server
    Serve {
        /// Server port
        #[arg(short, long, env = "TFLITE_BRIDGE_PORT")]
        port: Option<u16>,

        /// Bind address (default: 127.0.0.1)
        #[arg(long, env = "TFLITE_BRIDGE_BIND")]
        bind: Option<String>,

        /// Maximum multipart upload size in MiB
        #[arg(long)]
        max_upload_mb: Option<u64>,

        /// Path to the tensorflowjs_converter binary
        #[arg(long, env = "TFLITE_BRIDGE_TFJS_CONVERTER")]
        tfjs_converter: Option<PathBuf>,

        /// Path to the tflite_convert binary
        #[arg(long, env = "TFLITE_BRIDGE_TFLITE_CONVERT")]
        tflite_convert: Option<PathBuf>,
    },

    /// Generate example configuration file
    ConfigGen {
        /// Output format (yaml, toml)
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config file if specified; CLI flags override file values.
    let mut config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| anyhow::anyhow!("{}", e))?,
        None => Config::default(),
    };

    // Initialize logging
    let level: Level = config
        .logging
        .level
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid log level: {}", config.logging.level))?;
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            max_upload_mb,
            tfjs_converter,
            tflite_convert,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(mb) = max_upload_mb {
                config.server.max_upload_mb = mb;
            }
            if let Some(path) = tfjs_converter {
                config.toolchain.tensorflowjs_converter = path;
            }
            if let Some(path) = tflite_convert {
                config.toolchain.tflite_convert = path;
            }

            run_server(config).await?;
        }

        Commands::ConfigGen { format, output } => {
            let content = match format.to_lowercase().as_str() {
                "yaml" | "yml" => Config::example_yaml(),
                "toml" => Config::example_toml(),
                _ => anyhow::bail!("Unsupported format: {}. Use 'yaml' or 'toml'", format),
            };

            if let Some(path) = output {
                std::fs::write(&path, &content)?;
                println!("Configuration written to: {}", path.display());
            } else {
                println!("{}", content);
            }
        }
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let bind = config.server.bind.clone();
    let port = config.server.port;

    println!("TF.js to TFLite Conversion Server");
    println!("====================================");
    println!("Endpoints:");
    println!("  POST http://{}:{}/convert  - Convert TF.js model to TFLite", bind, port);
    println!("  GET  http://{}:{}/health   - Health check", bind, port);
    println!();
    println!(
        "Upload cap:  {} MiB per request",
        config.server.max_upload_mb
    );

    let toolchain = Arc::new(TfliteToolchain::new(&config.toolchain));

    // One-shot capability probe so missing tools surface at startup rather
    // than on the first conversion.
    let status = toolchain.status().await;
    match &status.tensorflowjs {
        Some(version) => println!("TF.js converter:  {}", version),
        None => warn!(
            "tensorflowjs_converter not found ({}). Install with: pip install tensorflowjs",
            config.toolchain.tensorflowjs_converter.display()
        ),
    }
    match &status.tensorflow {
        Some(version) => println!("TFLite converter: {}", version),
        None => warn!(
            "tflite_convert not found ({}). Install with: pip install tensorflow",
            config.toolchain.tflite_convert.display()
        ),
    }
    println!();

    let converter: Arc<dyn ModelConverter> = toolchain;
    let routes = api::routes(converter, config.server.max_upload_bytes())
        .recover(api::handle_rejection);

    let bind_addr: std::net::IpAddr = bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", bind, e))?;

    info!("Server listening on {}:{}", bind, port);
    warp::serve(routes).run((bind_addr, port)).await;

    Ok(())
}
