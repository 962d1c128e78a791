use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sahara_core::{
    DEFAULT_ROUND_LIMIT, EmulatorConfig, FileSink, LoopbackHost, MockTransport, SaharaDevice,
    SaharaEngine, run_loopback,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Qualcomm Sahara EDL device emulator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a template configuration file
    InitConfig {
        /// Where to write the TOML file
        #[arg(default_value = "sahara.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Push a loader through the emulated device and store what it extracts
    Replay {
        /// Emulator configuration (identity, output directory)
        #[arg(short, long)]
        config: PathBuf,

        /// Loader image (ELF or raw MBN) to upload
        #[arg(short, long)]
        loader: PathBuf,

        /// Override the configured output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Bulk packet size used by the simulated host
        #[arg(long, default_value_t = 0x200)]
        packet_size: usize,
    },
    /// Read the identity back in Sahara command mode
    Identify {
        /// Emulator configuration
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args.command) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::InitConfig { path, force } => init_config(path, force),
        Commands::Replay {
            config,
            loader,
            output_dir,
            packet_size,
        } => replay(config, loader, output_dir, packet_size),
        Commands::Identify { config } => identify(config),
    }
}

fn init_config(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    EmulatorConfig::default()
        .save_to_file(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "Template written; fill in the identity before use");
    Ok(())
}

fn load_config(path: &Path) -> Result<EmulatorConfig> {
    EmulatorConfig::load_from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn replay(
    config_path: PathBuf,
    loader: PathBuf,
    output_dir: Option<PathBuf>,
    packet_size: usize,
) -> Result<()> {
    let config = load_config(&config_path)?;
    let output_dir = output_dir.unwrap_or(config.output_dir);
    let image = std::fs::read(&loader).with_context(|| format!("reading {}", loader.display()))?;
    info!(path = %loader.display(), size = image.len(), "Loader loaded");

    let transport = MockTransport::new();
    let engine = SaharaEngine::new(
        transport.clone(),
        FileSink::new(&output_dir),
        config.identity.clone(),
    );
    let mut device = SaharaDevice::new(engine);
    let mut host = LoopbackHost::upload(image).with_max_packet_size(packet_size);

    let rounds = run_loopback(&mut device, &transport, &mut host, DEFAULT_ROUND_LIMIT)?;
    info!(rounds, bytes = host.bytes_served(), "Transfer complete");

    println!(
        "{}",
        output_dir.join(config.identity.loader_file_name()).display()
    );
    Ok(())
}

fn identify(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;

    let transport = MockTransport::new();
    let engine = SaharaEngine::new(
        transport.clone(),
        FileSink::new(&config.output_dir),
        config.identity.clone(),
    );
    let mut device = SaharaDevice::new(engine);
    let mut host = LoopbackHost::identify();
    run_loopback(&mut device, &transport, &mut host, DEFAULT_ROUND_LIMIT)?;

    let Some(seen) = host.identity() else {
        bail!("host did not receive every identity field");
    };
    println!("HW ID:       {}", hex::encode_upper(seen.hw_id));
    println!("Serial:      0x{:08X}", seen.serial);
    println!("OEM PK hash: {}", hex::encode(seen.oem_pk_hash));
    println!("SBL version: 0x{:08X}", seen.sbl_version);

    if seen != config.identity {
        bail!("identity read back differs from configuration");
    }
    Ok(())
}
