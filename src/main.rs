use clap::{Parser, Subcommand};
use rencfs::{diagnostics, LocalFsProvider, Volume, VolumeConfig, VolumeKeys};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rencfs", version = "1.0.0", about = "EncFS 1.x read-path decoder CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// AES-256 cipher key, 32 bytes hex
    #[arg(long, global = true)]
    cipher_key: Option<String>,
    /// IV seed, 16 bytes hex
    #[arg(long, global = true)]
    iv_seed: Option<String>,
    /// HMAC-SHA1 MAC key, 20 bytes hex
    #[arg(long, global = true)]
    mac_key: Option<String>,

    /// Ciphertext bytes per block
    #[arg(long, global = true, default_value = "1024")]
    block_size: u32,
    /// Whether files carry an 8-byte encrypted header IV
    #[arg(long, global = true, default_value = "true")]
    unique_iv: bool,
    /// Block MAC bytes: 0 or 8
    #[arg(long, global = true, default_value = "8")]
    block_mac_bytes: u32,
    /// Random padding bytes following the MAC in each block
    #[arg(long, global = true, default_value = "0")]
    block_mac_rand_bytes: u32,
    /// Whether all-zero ciphertext blocks decode as sparse holes
    #[arg(long, global = true, default_value = "true")]
    holes_allowed: bool,

    /// Directory containing the raw (encrypted) EncFS tree
    #[arg(long, global = true, default_value = ".")]
    raw_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode one encrypted file and write its plaintext to stdout
    Read { path: String },
    /// Scan an encrypted file's blocks for MAC/hole/corruption status
    Diagnose { path: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let cipher_key = parse_key::<32>(cli.cipher_key.as_deref(), "cipher-key")?;
    let iv_seed = parse_key::<16>(cli.iv_seed.as_deref(), "iv-seed")?;
    let mac_key = parse_key::<20>(cli.mac_key.as_deref(), "mac-key")?;

    let config = VolumeConfig::new(
        cli.block_size,
        cli.unique_iv,
        cli.block_mac_bytes,
        cli.block_mac_rand_bytes,
        cli.holes_allowed,
        false,
    )?;
    let keys = VolumeKeys {
        cipher_key,
        iv_seed,
        mac_key,
    };
    let provider = LocalFsProvider::new(&cli.raw_dir);

    match cli.command {
        Commands::Read { path } => {
            let volume = Volume::new(config, keys, provider);
            let plaintext = volume.read_file(&path)?;
            use std::io::Write;
            std::io::stdout().write_all(&plaintext)?;
        }
        Commands::Diagnose { path } => {
            let report = diagnostics::scan_file(&config, &keys, &provider, &path)?;
            println!("── block scan: {path} ──");
            for block in &report.blocks {
                println!(
                    "  [{:>4}] offset={:<8} len={:<5} {:?}",
                    block.block_index, block.ciphertext_offset, block.ciphertext_len, block.health
                );
            }
            println!("  {}/{} blocks healthy", report.healthy_count(), report.blocks.len());
        }
    }

    Ok(())
}

fn parse_key<const N: usize>(hex_str: Option<&str>, flag: &str) -> Result<[u8; N], Box<dyn std::error::Error>> {
    let hex_str = hex_str.ok_or_else(|| format!("--{flag} is required"))?;
    let bytes = hex::decode(hex_str)?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("--{flag} must decode to {N} bytes, got {}", v.len()).into())
}
