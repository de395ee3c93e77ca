// Driver binary: exercises the resolver and bundle tooling from the
// command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use corehost::bundle::{extract, Bundle, BundleWriter, FileType};
use corehost::deps;
use corehost::discovery::{discover_roots, DiscoveryOptions};
use corehost::framework;
use corehost::host::{self, StubEngine};
use corehost::HostResult;

#[derive(Parser)]
#[command(name = "corehost")]
#[command(author, version, about = "Managed-runtime host resolver and bundle tool", long_about = None)]
struct Cli {
    /// Explicit install root; wins over COREHOST_ROOT.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Skip the global install locations.
    #[arg(long, global = true)]
    no_multilevel: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print host identity and discovered install roots
    Info,
    /// List installed frameworks under every discovery root
    ListRuntimes,
    /// Run the full resolution pipeline for an application and print the plan
    Resolve {
        /// Application assembly or bundled host executable
        app: PathBuf,
    },
    /// Dump the bundle trailer, header, and file table of a host executable
    Inspect { host: PathBuf },
    /// Force-extract every bundle entry to the extraction cache
    Extract { host: PathBuf },
    /// Compose a single-file bundle from a host stub and an app directory
    Pack {
        /// Host stub executable to append to
        #[arg(long)]
        stub: PathBuf,
        /// Directory whose files become bundle entries
        #[arg(long)]
        app_dir: PathBuf,
        /// Output path for the composed bundle
        #[arg(long)]
        output: PathBuf,
        /// Bundle layout version (1-6)
        #[arg(long, default_value_t = 6)]
        bundle_version: u32,
        /// Deflate-compress eligible entries (v6 only)
        #[arg(long)]
        compress: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,corehost=debug")),
        )
        .init();

    let cli = Cli::parse();
    let options = DiscoveryOptions {
        explicit_root: cli.root.clone(),
        disable_multilevel_lookup: cli.no_multilevel,
    };

    match run(cli.command, &options) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, options: &DiscoveryOptions) -> HostResult<ExitCode> {
    match command {
        Commands::Info => {
            println!("rid: {}", deps::host_rid());
            println!("extraction root: {}", extract::extraction_root().display());
            let roots = discover_roots(options);
            if roots.is_empty() {
                println!("install roots: none");
            } else {
                println!("install roots:");
                for root in roots {
                    println!("  {}", root.display());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::ListRuntimes => {
            let roots = discover_roots(options);
            let installed = framework::list_installed(&roots);
            if installed.is_empty() {
                println!("no installed frameworks found");
            }
            for (name, component) in installed {
                println!("{} {} [{}]", name, component.version, component.path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resolve { app } => {
            let context = host::initialize(&app, options)?;
            let plan = &context.plan;
            println!("app: {}", plan.app_path.display());
            println!("rid: {}", plan.host_rid);
            for reference in &plan.frameworks {
                println!(
                    "framework: {} {} -> {}",
                    reference.name,
                    reference.requested_version,
                    reference
                        .resolved_version
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "unresolved".to_string()),
                );
            }
            println!("assemblies: {}", plan.assets.runtime.len());
            for path in &plan.assets.runtime {
                println!("  {}", path.display());
            }
            for dir in plan.assets.native_search_dirs() {
                println!("native dir: {}", dir.display());
            }
            // Dry-run the engine contract against a stub loader.
            let exit = host::run_app(&context, &StubEngine::new(), &[])?;
            println!("stub engine exit code: {exit}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Inspect { host } => {
            match Bundle::open(&host)? {
                None => {
                    println!("{}: not a bundle", host.display());
                    Ok(ExitCode::FAILURE)
                }
                Some(bundle) => {
                    let header = &bundle.manifest.header;
                    println!("bundle id: {}", header.bundle_id);
                    println!("version: {}.{}", header.major_version, header.minor_version);
                    println!("files: {}", header.file_count);
                    if header.extract_all() {
                        println!("flags: extract-all");
                    }
                    for entry in &bundle.manifest.entries {
                        println!(
                            "  {:>10} {:>10} {:?} {}",
                            entry.offset,
                            entry.size,
                            entry.file_type,
                            entry.relative_path
                        );
                    }
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
        Commands::Extract { host } => match Bundle::open(&host)? {
            None => {
                println!("{}: not a bundle", host.display());
                Ok(ExitCode::FAILURE)
            }
            Some(bundle) => {
                let dir = extract::extract_all(&bundle)?;
                println!("extracted to {}", dir.display());
                Ok(ExitCode::SUCCESS)
            }
        },
        Commands::Pack {
            stub,
            app_dir,
            output,
            bundle_version,
            compress,
        } => {
            let app_name = app_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "app".to_string());
            let mut writer = BundleWriter::new(app_name, bundle_version).with_compression(compress);
            add_dir_entries(&mut writer, &app_dir, &app_dir)?;
            let header = writer.write_to_file(&stub, &output)?;
            println!(
                "wrote {} (bundle id {}, {} files)",
                output.display(),
                header.bundle_id,
                header.file_count
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Walk `dir` recursively, adding each file with a type inferred from its
/// name.
fn add_dir_entries(writer: &mut BundleWriter, base: &PathBuf, dir: &PathBuf) -> HostResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|source| corehost::HostError::Io {
        path: dir.clone(),
        source,
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            add_dir_entries(writer, base, &path)?;
            continue;
        }
        let relative = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        writer.add_file(&relative, infer_type(&relative), &path)?;
    }
    Ok(())
}

fn infer_type(relative_path: &str) -> FileType {
    if relative_path.ends_with(".deps.json") {
        FileType::DepsJson
    } else if relative_path.ends_with(".runtimeconfig.json") {
        FileType::RuntimeConfigJson
    } else if relative_path.ends_with(".dll") {
        FileType::Assembly
    } else if relative_path.ends_with(".pdb") {
        FileType::Symbols
    } else if relative_path.ends_with(".so")
        || relative_path.ends_with(".dylib")
        || relative_path.ends_with(".exe")
        || !relative_path.contains('.')
    {
        FileType::NativeBinary
    } else {
        FileType::Unknown
    }
}
