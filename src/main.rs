use clap::{ArgAction, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use vaultfs::superblock::{Header, HEADER_BYTES};
use vaultfs::{
    shell, CipherId, CreateOptions, EventSink, OpenOpts, ProgressEvent, Vault,
};

#[derive(Parser)]
#[command(name = "vaultfs", version = "1.0.0", about = "Encrypted single-file virtual filesystem")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a container image
    Make {
        /// Container image path
        image: PathBuf,
        /// Size of the filesystem in 4096-byte blocks (12800 = 50MB)
        blocks: u64,
        /// Cipher: aes (default), twofish, serpent, rc6, mars, cast256,
        /// camellia, rc5, shacal2, null
        #[arg(long, default_value = "aes")]
        cipher: String,
        /// Create a sparse image
        #[arg(long, default_value_t = false, action = ArgAction::Set)]
        sparse: bool,
        /// Plant an alternative hidden sub-volume
        #[arg(long, default_value_t = false, action = ArgAction::Set)]
        coffee: bool,
        /// Root block of the hidden sub-volume (prompted when omitted)
        #[arg(long)]
        coffee_block: Option<u64>,
        /// Password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Open an interactive shell inside a container
    Shell {
        image: PathBuf,
        /// Password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
        /// Root block to mount (a hidden sub-volume's block index)
        #[arg(long, default_value_t = 0)]
        root_block: u64,
    },
    /// Show plaintext header information for an image
    Info {
        image: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // option errors exit 1, matching the documented CLI contract
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(1);
    });

    match cli.command {

        // ── Make ─────────────────────────────────────────────────────────────
        Commands::Make { image, blocks, cipher, sparse, coffee, coffee_block, password } => {
            let cipher_id = CipherId::from_name(&cipher).unwrap_or_else(|| {
                eprintln!("Unknown cipher '{cipher}'");
                std::process::exit(1);
            });

            let hidden_root = if coffee {
                let block = match coffee_block {
                    Some(b) => b,
                    None => prompt("sub-volume root block: ")?.trim().parse()?,
                };
                if block == 0 || block >= blocks {
                    eprintln!("Error: sub-volume root block must be greater than 0 and less than {blocks}");
                    std::process::exit(1);
                }
                Some(block)
            } else {
                None
            };

            let password = match password {
                Some(p) => p,
                None => prompt("vaultfs password: ")?,
            };

            let opts = CreateOptions {
                blocks,
                cipher: cipher_id,
                sparse,
                hidden_root,
                ..Default::default()
            };

            println!("image path: {}", image.display());
            println!("file system size in blocks: {blocks}");
            println!("encryption algorithm: {}", cipher_id.name());

            let vault = Vault::create_with_progress(&image, &password, &opts, progress_sink())?;
            let size = std::fs::metadata(&image)?.len();
            println!(
                "Created: {}  ({} blocks, {} free, {} B on disk)",
                image.display(),
                vault.block_count(),
                vault.free_block_count(),
                size,
            );
        }

        // ── Shell ────────────────────────────────────────────────────────────
        Commands::Shell { image, password, root_block } => {
            let password = match password {
                Some(p) => p,
                None => prompt("vaultfs password: ")?,
            };
            let opts = OpenOpts { root_block, ..Default::default() };
            let mut vault = Vault::open_with_progress(&image, &password, &opts, progress_sink())?;
            shell::run(&mut vault)?;
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { image } => {
            let mut f = std::fs::File::open(&image)?;
            let header = Header::read_from(&mut f)?;
            let file_size = std::fs::metadata(&image)?.len();

            println!("── vaultfs image ───────────────────────────────────────");
            println!("  Path            {}", image.display());
            println!("  File size       {} B ({:.2} MiB)", file_size, file_size as f64 / 1048576.0);
            println!("  Cipher          {}", header.cipher.name());
            println!("  Legacy rounds   {}", header.rounds);
            for (i, word) in header.iv.iter().enumerate() {
                println!("  IV word {i}       {word:#018x}");
            }
            // the block count itself sits inside the encrypted region
            println!("  Encrypted body  {} B", file_size.saturating_sub(HEADER_BYTES));
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn prompt(message: &str) -> Result<String, std::io::Error> {
    print!("{message}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Progress callback: narrate key derivation and image building.
fn progress_sink() -> EventSink {
    EventSink::new(|event| match event {
        ProgressEvent::KeyDerivationStart => println!("Deriving encryption key (this can take a while).."),
        ProgressEvent::KeyDerivationEnd => println!("Key ready."),
        ProgressEvent::ImageBuildStart { blocks } => println!("Building image ({blocks} blocks).."),
        ProgressEvent::ImageBuildUpdate { blocks_written } => {
            if blocks_written % 4096 == 0 {
                println!("  .. {blocks_written} blocks written");
            }
        }
        ProgressEvent::ImageBuildEnd => println!("Image body written."),
    })
}
