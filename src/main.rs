use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::{bail, Context, Result};
use clap::Parser;

use idlc::{ast::Target, color, error::CompileError, generators::Lang, Options};

#[derive(Parser)]
#[command(name = "idlc", about = "The IPC message definitions compiler.")]
struct Args {
    /// The output language.
    #[arg(long, value_enum, default_value_t = Lang::C)]
    lang: Lang,

    /// The output file.
    #[arg(short = 'o', long = "out")]
    out: PathBuf,

    /// Byte width of kernel object handles (cid, handle, task): 4 or 8.
    #[arg(long, default_value_t = 4)]
    handle_size: usize,

    /// The IDL files, concatenated in argument order into one unit.
    #[arg(required = true)]
    idls: Vec<PathBuf>,
}

fn run(args: &Args) -> Result<()> {
    if args.handle_size != 4 && args.handle_size != 8 {
        bail!("--handle-size must be 4 or 8, got {}", args.handle_size);
    }

    // Input files share one namespace and id space.
    let mut source = String::new();
    for path in &args.idls {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        source.push_str(&text);
        source.push('\n');
    }

    let base_dir = std::env::current_dir().context("failed to get the current directory")?;
    let options = Options {
        lang: args.lang,
        target: Target {
            handle_size: args.handle_size,
            ..Target::default()
        },
    };

    // compile() buffers the whole output in memory, so a failed compile
    // never leaves a truncated output file behind.
    let text = idlc::compile(&source, &base_dir, &options)?;
    fs::write(&args.out, text)
        .with_context(|| format!("failed to write '{}'", args.out.display()))?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("idlc: {}error:{} {err:#}", color::RED, color::END);
            if let Some(hint) = err
                .downcast_ref::<CompileError>()
                .and_then(CompileError::hint)
            {
                eprintln!("{}    | Hint:{} {hint}", color::YELLOW, color::END);
            }
            ExitCode::FAILURE
        }
    }
}
