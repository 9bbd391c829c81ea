use clap::{Parser, Subcommand, ValueEnum};

/// Maximum source file size in bytes (1MB).
const MAX_SOURCE_SIZE: usize = 1_000_000;

#[derive(Parser, Debug)]
#[command(name = "ivy")]
#[command(about = "Ivy: an educational language with visible memory semantics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze and execute an Ivy program
    Run {
        /// Path to .ivy source file
        file: String,

        /// Write the memory-event trace to a JSONL file
        #[arg(long)]
        events: Option<String>,
    },

    /// Run the analyzer only and list its diagnostics
    Check {
        /// Path to .ivy source file
        file: String,
    },

    /// Parse a source file and dump the AST
    Parse {
        /// Path to .ivy source file
        file: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },

    /// Dump the token stream
    Tokens {
        /// Path to .ivy source file
        file: String,
    },
}

#[derive(ValueEnum, Clone, Debug)]
enum Format {
    Pretty,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { file, events } => cmd_run(&file, events.as_deref()),
        Commands::Check { file } => cmd_check(&file),
        Commands::Parse { file, format } => cmd_parse(&file, format),
        Commands::Tokens { file } => cmd_tokens(&file),
    }
}

fn load_source(path: &str) -> Result<String, Box<dyn std::error::Error>> {
    let src = std::fs::read_to_string(path)?;
    if src.len() > MAX_SOURCE_SIZE {
        eprintln!(
            "Error: source file exceeds {}MB limit ({} bytes)",
            MAX_SOURCE_SIZE / 1_000_000,
            src.len()
        );
        std::process::exit(1);
    }
    Ok(src)
}

fn cmd_run(file: &str, events_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let src = load_source(file)?;
    let program = ivy_parse::parse_str(&src)?;

    let diags = ivy_types::analyze(&program);
    if !diags.is_empty() {
        for d in &diags {
            eprintln!("{}", d);
        }
        std::process::exit(1);
    }

    let mut trace: Vec<ivy_cli::events::MemEvent> = Vec::new();
    let mut out = |line: String| println!("{}", line);
    let mut on_event = |e: ivy_cli::events::MemEvent| {
        if events_path.is_some() {
            trace.push(e);
        }
    };

    let result = ivy_cli::eval::run(&program, &mut out, &mut on_event);

    // The trace is produced eagerly, so write whatever was captured even
    // when the run aborted.
    if let Some(path) = events_path {
        use std::io::Write;
        let mut w = std::io::BufWriter::new(std::fs::File::create(path)?);
        for e in &trace {
            writeln!(w, "{}", serde_json::to_string(e)?)?;
        }
        w.flush()?;
        eprintln!("Events written to {}", path);
    }

    result?;
    Ok(())
}

fn cmd_check(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let src = load_source(file)?;
    let program = ivy_parse::parse_str(&src)?;
    let diags = ivy_types::analyze(&program);
    if diags.is_empty() {
        println!("No issues found.");
        Ok(())
    } else {
        for d in &diags {
            println!("{}", d);
        }
        std::process::exit(1);
    }
}

fn cmd_parse(file: &str, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let src = load_source(file)?;
    let program = ivy_parse::parse_str(&src)?;
    match format {
        Format::Pretty => println!("{:#?}", program),
        Format::Json => println!("{}", serde_json::to_string_pretty(&program)?),
    }
    Ok(())
}

fn cmd_tokens(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let src = load_source(file)?;
    for tok in ivy_parse::lex(&src)? {
        println!("{}:{} {:?}", tok.line, tok.col, tok.kind);
    }
    Ok(())
}
