use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser as ClapParser, Subcommand};
use visform::cli::{self, CliError};

#[derive(ClapParser)]
#[command(name = "visform")]
#[command(about = "visform - compile declarative form and map files into component trees")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a form file and report what it declares
    Check {
        /// Form file (reads from stdin if not provided)
        form: Option<PathBuf>,

        /// Dump the token stream instead of parsing
        #[arg(long)]
        tokens: bool,
    },

    /// Print the SQL of every data-bound template of a map's startup form
    Sql {
        /// Map file
        map: PathBuf,
    },

    /// Compile a map end to end and print the component tree
    Run {
        /// Map file
        map: PathBuf,

        /// Directory holding canned query rows (<relation>.json)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { form, tokens } => run_check(form, tokens),
        Commands::Sql { map } => cli::print_sql(&map).map(|out| print!("{out}")),
        Commands::Run { map, data, pretty } => {
            cli::run(&map, data.as_deref(), pretty).map(|out| println!("{out}"))
        }
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_check(form: Option<PathBuf>, tokens: bool) -> Result<(), CliError> {
    let (source, name) = match form {
        Some(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            (fs::read_to_string(&path)?, name)
        }
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            (buffer, "stdin".to_string())
        }
        None => return Err(CliError::MissingInput),
    };

    if tokens {
        print!("{}", cli::list_tokens(&source)?);
    } else {
        println!("{}", cli::check_form(&source, &name)?);
    }
    Ok(())
}
