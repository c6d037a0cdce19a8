use clap::Parser;
use env_logger::Env;
use log::{debug, error};
use std::process::ExitCode;

use gin_casegen::generator::{
    Generator, HarnessContract, DEFAULT_CASE_NAME, DEFAULT_HARNESS_IMPORT,
};
use gin_casegen::parser::GoParser;
use gin_casegen::walker::Corpus;

/// Generate integration test scaffolding for a gin handler from its Go source
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Name of the handler function or method
    handler: String,

    /// Name of the generated case
    #[arg(default_value = DEFAULT_CASE_NAME)]
    case_name: String,

    /// Request spec as JSON/YAML, or @file
    #[arg(long = "req")]
    request: Option<String>,

    /// Expected response spec as JSON/YAML, or @file
    #[arg(long)]
    expect: Option<String>,

    /// Source directory to scan for handlers, structs and routes
    #[arg(short, long, default_value = ".")]
    root: String,

    /// Directory the test scaffolding is written under
    #[arg(short = 'o', long, default_value = "test")]
    test_root: String,

    /// Extension of the source files to scan
    #[arg(long, default_value = "go")]
    ext: String,

    /// Go import path of the test harness package
    #[arg(long, default_value = DEFAULT_HARNESS_IMPORT)]
    harness: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env = Env::default().filter_or("RUST_LOG", if cli.verbose { "debug" } else { "info" });
    env_logger::init_from_env(env);

    let parser = GoParser::new(Corpus::new(&cli.root, cli.ext.as_str()));
    debug!("Scanning {} for *.{} files", parser.corpus().root().display(), cli.ext);
    let generator = Generator::new(cli.handler.as_str(), cli.case_name.as_str())
        .with_test_root(&cli.test_root)
        .with_harness(HarnessContract::new(cli.harness.as_str()));

    match generator.generate(&parser, cli.request.as_deref(), cli.expect.as_deref()) {
        Ok(paths) => {
            println!(
                "generated test scaffolding for method '{}' case '{}' at {}",
                generator.handler(),
                generator.case_name(),
                paths.handler_dir.display()
            );
            println!("case.yml path: {}", paths.case_file.display());
            println!("test file path: {}", paths.test_file.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
