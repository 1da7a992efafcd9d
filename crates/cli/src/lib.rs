#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Command-line front end.
//!
//! One binary, one `--command` flag selecting the pipeline, gflags-style
//! long options for everything else. Unset outputs and URIs are derived
//! from the inputs (`<input>.kysync`, `<input>.pzst`, `<data_uri>.kysync`,
//! `file://<input>`), each derivation logged so a user can see what the run
//! actually operated on.

use std::ffi::OsString;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use engine::{EngineError, PrepareCommand, SyncCommand};
use observability::Observer;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "kysync", version, about = "Delta-based file synchronization")]
struct Options {
    /// Pipeline to run: prepare or sync.
    #[arg(long = "command")]
    command: String,

    /// Source input path (prepare); default seed source (sync).
    #[arg(long = "input_filename")]
    input_filename: Option<String>,

    /// Artifact output path; defaults to `<input>.kysync`.
    #[arg(long = "output_kysync_filename")]
    output_kysync_filename: Option<String>,

    /// Compressed payload output path; defaults to `<input>.pzst`.
    #[arg(long = "output_compressed_filename")]
    output_compressed_filename: Option<String>,

    /// Reconstructed target path (sync).
    #[arg(long = "output_filename")]
    output_filename: Option<String>,

    /// URI of the (compressed) source data (sync).
    #[arg(long = "data_uri")]
    data_uri: Option<String>,

    /// URI of the artifact; defaults to `<data_uri>.kysync`.
    #[arg(long = "metadata_uri")]
    metadata_uri: Option<String>,

    /// URI of the seed; defaults to `file://<input_filename>`.
    #[arg(long = "seed_data_uri")]
    seed_data_uri: Option<String>,

    /// Block size used by prepare.
    #[arg(long = "block_size", default_value_t = 1024)]
    block_size: u64,

    /// Worker threads per phase.
    #[arg(long = "threads", default_value_t = 32)]
    threads: usize,

    /// Blocks fetched per batched retrieval (sync).
    #[arg(long = "num_blocks_in_batch", default_value_t = 4)]
    num_blocks_in_batch: usize,

    /// Whether the data URI points at compressed blocks (sync).
    #[arg(long = "use_compression", default_value_t = true, action = clap::ArgAction::Set)]
    use_compression: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("--command must be `prepare` or `sync`, got `{0}`")]
    UnknownCommand(String),

    #[error("missing required flag {0}")]
    MissingFlag(&'static str),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Fully resolved invocation, all defaults applied.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Prepare {
        input: String,
        metadata: String,
        compressed: String,
        block_size: u64,
        threads: usize,
    },
    Sync {
        data_uri: String,
        metadata_uri: String,
        seed_uri: String,
        output: String,
        compression_disabled: bool,
        blocks_per_batch: usize,
        threads: usize,
    },
}

/// Parses `args`, runs the selected pipeline under an observer, and maps
/// the outcome to an exit code.
pub fn run<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let options = match Options::try_parse_from(args) {
        Ok(options) => options,
        Err(error) => {
            let _ = error.print();
            return match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    init_tracing();

    match plan(options).and_then(execute) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Applies the defaulting rules and produces a runnable [`Action`].
fn plan(options: Options) -> Result<Action, CliError> {
    match options.command.as_str() {
        "prepare" => {
            let input = options
                .input_filename
                .ok_or(CliError::MissingFlag("--input_filename"))?;

            let metadata = options.output_kysync_filename.unwrap_or_else(|| {
                let derived = format!("{input}.kysync");
                tracing::info!("metadata filename defaulted to {derived}");
                derived
            });
            let compressed = options.output_compressed_filename.unwrap_or_else(|| {
                let derived = format!("{input}.pzst");
                tracing::info!("compressed output defaulted to {derived}");
                derived
            });

            Ok(Action::Prepare {
                input,
                metadata,
                compressed,
                block_size: options.block_size,
                threads: options.threads,
            })
        }
        "sync" => {
            let output = options
                .output_filename
                .ok_or(CliError::MissingFlag("--output_filename"))?;
            let mut data_uri = options
                .data_uri
                .ok_or(CliError::MissingFlag("--data_uri"))?;

            // The artifact name derives from the data URI as given, before
            // the payload suffix is appended below.
            let metadata_uri = options.metadata_uri.unwrap_or_else(|| {
                let derived = format!("{data_uri}.kysync");
                tracing::info!("metadata uri defaulted to {derived}");
                derived
            });

            if options.use_compression
                && !data_uri.ends_with(".pzst")
                && !data_uri.starts_with("memory://")
            {
                data_uri.push_str(".pzst");
                tracing::info!("data uri defaulted to {data_uri}");
            }

            let seed_uri = match options.seed_data_uri {
                Some(uri) => uri,
                None => {
                    let input = options
                        .input_filename
                        .ok_or(CliError::MissingFlag("--seed_data_uri or --input_filename"))?;
                    let derived = format!("file://{input}");
                    tracing::info!("seed data uri defaulted to {derived}");
                    derived
                }
            };

            Ok(Action::Sync {
                data_uri,
                metadata_uri,
                seed_uri,
                output,
                compression_disabled: !options.use_compression,
                blocks_per_batch: options.num_blocks_in_batch,
                threads: options.threads,
            })
        }
        other => Err(CliError::UnknownCommand(other.to_string())),
    }
}

fn execute(action: Action) -> Result<(), CliError> {
    match action {
        Action::Prepare {
            input,
            metadata,
            compressed,
            block_size,
            threads,
        } => {
            let mut command =
                PrepareCommand::new(input, metadata, compressed, block_size, threads)?;
            let observable = command.observable();
            Observer::new(&observable).run(|| command.run())?;
        }
        Action::Sync {
            data_uri,
            metadata_uri,
            seed_uri,
            output,
            compression_disabled,
            blocks_per_batch,
            threads,
        } => {
            let mut command = SyncCommand::new(
                data_uri,
                metadata_uri,
                seed_uri,
                output,
                compression_disabled,
                blocks_per_batch,
                threads,
            )?;
            let observable = command.observable();
            Observer::new(&observable).run(|| command.run())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Action, Options, plan};

    fn parse(args: &[&str]) -> Options {
        Options::try_parse_from(args).expect("flags should parse")
    }

    #[test]
    fn prepare_outputs_default_from_input() {
        let action = plan(parse(&[
            "kysync",
            "--command",
            "prepare",
            "--input_filename",
            "data.bin",
        ]))
        .unwrap();

        assert_eq!(
            action,
            Action::Prepare {
                input: "data.bin".into(),
                metadata: "data.bin.kysync".into(),
                compressed: "data.bin.pzst".into(),
                block_size: 1024,
                threads: 32,
            }
        );
    }

    #[test]
    fn sync_derives_metadata_before_payload_suffix() {
        let action = plan(parse(&[
            "kysync",
            "--command",
            "sync",
            "--data_uri",
            "http://host/data.bin",
            "--output_filename",
            "out.bin",
            "--seed_data_uri",
            "file://seed.bin",
        ]))
        .unwrap();

        let Action::Sync {
            data_uri,
            metadata_uri,
            seed_uri,
            compression_disabled,
            blocks_per_batch,
            ..
        } = action
        else {
            panic!("expected a sync action");
        };

        assert_eq!(metadata_uri, "http://host/data.bin.kysync");
        assert_eq!(data_uri, "http://host/data.bin.pzst");
        assert_eq!(seed_uri, "file://seed.bin");
        assert!(!compression_disabled);
        assert_eq!(blocks_per_batch, 4);
    }

    #[test]
    fn sync_without_compression_keeps_data_uri() {
        let action = plan(parse(&[
            "kysync",
            "--command",
            "sync",
            "--data_uri",
            "file://data.bin",
            "--output_filename",
            "out.bin",
            "--input_filename",
            "seed.bin",
            "--use_compression",
            "false",
        ]))
        .unwrap();

        let Action::Sync {
            data_uri,
            seed_uri,
            compression_disabled,
            ..
        } = action
        else {
            panic!("expected a sync action");
        };

        assert_eq!(data_uri, "file://data.bin");
        assert_eq!(seed_uri, "file://seed.bin");
        assert!(compression_disabled);
    }

    #[test]
    fn memory_uris_never_get_the_payload_suffix() {
        let action = plan(parse(&[
            "kysync",
            "--command",
            "sync",
            "--data_uri",
            "memory://10:10",
            "--output_filename",
            "out.bin",
            "--seed_data_uri",
            "memory://20:10",
        ]))
        .unwrap();

        let Action::Sync { data_uri, .. } = action else {
            panic!("expected a sync action");
        };
        assert_eq!(data_uri, "memory://10:10");
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(plan(parse(&["kysync", "--command", "frobnicate"])).is_err());
    }
}
