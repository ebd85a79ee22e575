use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use labconvert::{
    model::FileEncoding, options, Config, ConversionRequest, ConvertError, Converter,
    DirProfileStore, RawFile,
};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Mutex,
    time::Instant,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status of a request the pipeline rejected.
const REJECTED: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "labconvert",
    version,
    about = "Convert laboratory instrument files to JCAMP-DX using stored profiles"
)]
struct Cli {
    /// Client whose profiles are used (defaults to DEFAULT_CLIENT)
    #[arg(long, global = true)]
    client: Option<String>,
    /// Profile store root (defaults to PROFILES_DIR)
    #[arg(long, global = true)]
    profiles_dir: Option<PathBuf>,
    /// Text encoding of the input files (`utf-8`, `latin1`, `binary`, ...),
    /// instead of detecting it from the content
    #[arg(long, global = true)]
    encoding: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tables a file is parsed into, as JSON
    Tables {
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Convert one file; the document goes to stdout unless --output is given
    Convert {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Convert every file of a directory in parallel
    ConvertDir {
        dir: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Manage stored profiles
    Profiles {
        #[command(subcommand)]
        command: ProfilesCommand,
    },
    /// Print the JCAMP header vocabulary as JSON
    Options,
}

#[derive(Subcommand, Debug)]
enum ProfilesCommand {
    /// Print every profile of the client as JSON
    List,
    /// Validate and store a profile document
    Save { file: PathBuf },
}

/// One line of the `convert-dir` report.
#[derive(Debug, Serialize)]
struct FileOutcome {
    file: String,
    stage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_logging(&config)?;

    let client = cli.client.unwrap_or_else(|| config.default_client.clone());
    let profiles_dir = cli.profiles_dir.unwrap_or_else(|| config.profiles_dir.clone());
    info!(client = %client, profiles_dir = %profiles_dir.display(), "startup");

    let encoding = cli
        .encoding
        .as_deref()
        .map(|label| {
            FileEncoding::from_label(label).with_context(|| format!("unknown encoding {:?}", label))
        })
        .transpose()?;
    let converter = Converter::with_default_readers(DirProfileStore::new(profiles_dir));

    match cli.command {
        Command::Tables { file, content_type } => {
            let mut raw = load_file(&file, content_type, encoding)?;
            match converter.read(&mut raw) {
                Ok(data) => print_json(&data),
                Err(e) => reject(&e),
            }
        }
        Command::Convert {
            file,
            output,
            content_type,
        } => {
            let raw = load_file(&file, content_type, encoding)?;
            let request = ConversionRequest {
                file: raw,
                client_id: client,
            };
            let conversion = match converter.convert(request) {
                Ok(conversion) => conversion,
                Err(e) => return reject(&e),
            };
            match output {
                Some(path) => {
                    fs::write(&path, &conversion.document)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), profile_id = %conversion.profile_id, "wrote document");
                }
                None => print!("{}", conversion.document),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::ConvertDir { dir, output } => {
            convert_dir(&converter, &client, &dir, &output, encoding)
        }
        Command::Profiles { command } => match command {
            ProfilesCommand::List => match converter.list_profiles(&client) {
                Ok(profiles) => print_json(&profiles),
                Err(e) => reject(&e),
            },
            ProfilesCommand::Save { file } => {
                let json = fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                match converter.save_profile(&client, &json) {
                    Ok(id) => print_json(&serde_json::json!({ "id": id })),
                    Err(e) => reject(&e),
                }
            }
        },
        Command::Options => print_json(options::options()),
    }
}

/// `RUST_LOG` wins over `LOG_LEVEL`; `LOG_FILE` redirects output from
/// stderr to an appended file.
fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder().with_env_filter(filter);

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).with_ansi(false).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn load_file(
    path: &Path,
    content_type: Option<String>,
    encoding: Option<FileEncoding>,
) -> Result<RawFile> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let content_type = content_type.unwrap_or_else(|| guess_content_type(path).to_string());
    let raw = RawFile::new(bytes, name, content_type);
    Ok(match encoding {
        Some(encoding) => raw.with_encoding(encoding),
        None => raw,
    })
}

/// What a browser upload would declare for the file's extension.
fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => "text/csv",
        "txt" | "asc" | "dat" | "xy" | "tsv" | "dta" => "text/plain",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::SUCCESS)
}

fn reject(err: &ConvertError) -> Result<ExitCode> {
    warn!(stage = err.stage(), "request rejected: {}", err);
    println!("{}", serde_json::to_string_pretty(&err.rejection())?);
    Ok(ExitCode::from(REJECTED))
}

fn convert_dir(
    converter: &Converter<DirProfileStore>,
    client: &str,
    dir: &Path,
    out_dir: &Path,
    encoding: Option<FileEncoding>,
) -> Result<ExitCode> {
    let start = Instant::now();
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let pattern = format!("{}/*", dir.display());
    let files: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("bad glob pattern {}", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    info!(files = files.len(), dir = %dir.display(), "converting directory");

    // failures are per file; the batch always runs to the end
    let outcomes: Vec<FileOutcome> = files
        .par_iter()
        .map(|path| convert_one(converter, client, path, out_dir, encoding))
        .collect();

    let failed = outcomes.iter().filter(|o| o.stage != "Converted").count();
    info!(
        converted = outcomes.len() - failed,
        failed,
        elapsed = ?start.elapsed(),
        "directory done"
    );
    print_json(&outcomes)?;
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(REJECTED)
    })
}

fn convert_one(
    converter: &Converter<DirProfileStore>,
    client: &str,
    path: &Path,
    out_dir: &Path,
    encoding: Option<FileEncoding>,
) -> FileOutcome {
    let file = path.display().to_string();
    let failure = |stage: &'static str, message: String| FileOutcome {
        file: file.clone(),
        stage,
        profile_id: None,
        message: Some(message),
    };

    let raw = match load_file(path, None, encoding) {
        Ok(raw) => raw,
        Err(e) => {
            error!(file = %file, "{:#}", e);
            return failure("Io", format!("{:#}", e));
        }
    };
    let request = ConversionRequest {
        file: raw,
        client_id: client.to_string(),
    };
    let conversion = match converter.convert(request) {
        Ok(conversion) => conversion,
        Err(e) => {
            warn!(file = %file, stage = e.stage(), "{}", e);
            return failure(e.stage(), e.to_string());
        }
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "converted".to_string());
    let target = out_dir.join(format!("{}.jdx", stem));
    if let Err(e) = fs::write(&target, &conversion.document) {
        error!(file = %file, "writing {}: {}", target.display(), e);
        return failure("Io", format!("writing {}: {}", target.display(), e));
    }

    FileOutcome {
        file,
        stage: "Converted",
        profile_id: Some(conversion.profile_id.to_string()),
        message: None,
    }
}
