use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const LAMBDA_PACKAGE: &str = "kms_grant_lambda";
const LAMBDA_BINARY: &str = "grant_lambda";
const WORKSPACE_CRATES: [&str; 2] = ["kms_grant_core", LAMBDA_PACKAGE];

#[derive(Parser)]
#[command(name = "xtask", about = "Checks and packages the KMS grant custom resource")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// fmt, clippy and tests for every workspace crate
    Check,
    /// Cross-build the grant Lambda and zip it as a custom runtime bundle
    Package {
        /// Lambda function architecture
        #[arg(value_enum, long, default_value_t = LambdaArch::Arm64)]
        arch: LambdaArch,
        #[arg(long, default_value = "dist")]
        output_dir: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LambdaArch {
    #[value(name = "x86_64")]
    X86_64,
    Arm64,
}

impl LambdaArch {
    fn target_triple(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64-unknown-linux-gnu",
            Self::Arm64 => "aarch64-unknown-linux-gnu",
        }
    }

    fn artifact_name(self) -> String {
        let suffix = match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        };
        format!("{LAMBDA_BINARY}-{suffix}.zip")
    }
}

fn cargo(args: &[&str]) -> Result<(), Box<dyn Error>> {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
    Ok(())
}

fn check() -> Result<(), Box<dyn Error>> {
    cargo(&["fmt", "--all", "--", "--check"])?;
    cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
    for name in WORKSPACE_CRATES {
        cargo(&["test", "-p", name])?;
    }
    Ok(())
}

fn package(arch: LambdaArch, output_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let target = arch.target_triple();
    cargo(&[
        "build",
        "--release",
        "-p",
        LAMBDA_PACKAGE,
        "--bin",
        LAMBDA_BINARY,
        "--target",
        target,
    ])?;

    let binary_path = Path::new("target")
        .join(target)
        .join("release")
        .join(LAMBDA_BINARY);
    let binary = fs::read(&binary_path)
        .map_err(|error| format!("reading {}: {error}", binary_path.display()))?;

    fs::create_dir_all(output_dir)?;
    let zip_path = output_dir.join(arch.artifact_name());
    write_bootstrap_zip(&binary, &zip_path)?;
    Ok(zip_path)
}

// provided.al2023 runs the archive's `bootstrap` entry.
fn write_bootstrap_zip(binary: &[u8], zip_path: &Path) -> Result<(), Box<dyn Error>> {
    let mut zip = ZipWriter::new(fs::File::create(zip_path)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)?;
    zip.write_all(binary)?;
    zip.finish()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    match Cli::parse().command {
        Commands::Check => check()?,
        Commands::Package { arch, output_dir } => {
            let zip_path = package(arch, &output_dir)?;
            eprintln!("packaged {}", zip_path.display());
        }
    }
    Ok(())
}
