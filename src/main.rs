use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use floatkit::host::{HttpTransport, ModuleManifest, ModuleRuntime, ReqwestTransport, Sandbox};

#[derive(Parser)]
#[command(name = "floatkit", about = "Run sandboxed integration modules.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Invoke a module once and print its output document
    Run {
        /// Module manifest (YAML)
        manifest: PathBuf,
        /// Input JSON file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
        /// Sandbox directory (defaults to a fresh temporary directory)
        #[arg(short, long)]
        sandbox: Option<PathBuf>,
    },
    /// Load a module and report its capabilities without running it
    Check {
        /// Module manifest (YAML)
        manifest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("floatkit=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            manifest,
            input,
            sandbox,
        } => {
            let status = run(manifest, &input, sandbox).await?;
            if status != 0 {
                std::process::exit(i32::try_from(status).unwrap_or(i32::MAX));
            }
        }
        Command::Check { manifest } => check(manifest)?,
    }
    Ok(())
}

fn read_input(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read input from stdin")?;
        Ok(buf)
    } else {
        std::fs::read(source).with_context(|| format!("failed to read input file {source}"))
    }
}

async fn run(manifest_path: PathBuf, input: &str, sandbox_dir: Option<PathBuf>) -> Result<u32> {
    let manifest = ModuleManifest::load(&manifest_path)?;
    let input = read_input(input)?;

    let runtime = ModuleRuntime::new()?;
    let module = runtime
        .load_module_from_path(&manifest.wasm_path())
        .with_context(|| format!("failed to load module {}", manifest.module.name))?;

    // Lives until the invocation finishes.
    let temp;
    let root = match sandbox_dir {
        Some(dir) => dir,
        None => {
            temp = tempfile::TempDir::new().context("failed to create sandbox directory")?;
            temp.path().to_path_buf()
        }
    };
    let sandbox = Sandbox::open(root)?;

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
        tokio::runtime::Handle::current(),
        manifest.limits.timeout(),
    )?);

    info!(
        module = %manifest.module.name,
        entry = %manifest.module.entry_point,
        sandbox = %sandbox.root().display(),
        input_bytes = input.len(),
        "invoking module"
    );

    let report = tokio::task::spawn_blocking(move || {
        runtime.invoke(&module, &manifest, &sandbox, transport, &input)
    })
    .await
    .context("invocation task panicked")??;

    match &report.output {
        Some(output) => println!("{}", String::from_utf8_lossy(output)),
        None => warn!(status = report.status, "module produced no output document"),
    }
    Ok(report.status)
}

fn check(manifest_path: PathBuf) -> Result<()> {
    let manifest = ModuleManifest::load(&manifest_path)?;
    let runtime = ModuleRuntime::new()?;
    let module = runtime.load_module_from_path(&manifest.wasm_path())?;
    module.verify_entry(&manifest.module.entry_point)?;

    let capabilities: Vec<String> = module
        .capabilities()
        .iter()
        .map(ToString::to_string)
        .collect();

    println!("module:       {}", manifest.module.name);
    println!("entry point:  {}", manifest.module.entry_point);
    println!("capabilities: {}", capabilities.join(", "));
    println!(
        "grants:       network={} file_write={} allowed_hosts=[{}]",
        manifest.grants.network,
        manifest.grants.file_write,
        manifest.grants.allowed_hosts.join(", ")
    );
    if manifest.grants.file_write {
        return Ok(());
    }
    if module
        .capabilities()
        .contains(&floatkit::abi::Capability::WriteResource)
    {
        bail!("module imports write_resource but the manifest grants no file_write");
    }
    Ok(())
}
