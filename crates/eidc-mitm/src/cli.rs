use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "eidc-mitm",
    version,
    about = "Transparent proxy for eIDC32 door controllers"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Listen port (overrides config file setting)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Leaf certificate PEM file (overrides config file setting)
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Private key PEM file (overrides config file setting)
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Dial the manager in plain TCP instead of TLS
    #[arg(long)]
    pub plain_dial: bool,
}
