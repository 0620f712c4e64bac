use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use fmusim::master::{Master, RunConfig};
use fmusim::models::BuiltinLoader;
use fmusim::parser::{ContentSource, FsSource, ZipSource, parse_graph, parse_model_description};
use fmusim::validator::{validate_graph, validate_model_description};
use std::io::BufWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fixed-step co-simulation of FMI 1.0 component graphs", long_about = None)]
struct Cli {
    /// Component diagram XML file wiring the simulated components
    #[arg(value_name = "GRAPH_FILE", required_unless_present = "describe")]
    graph_file: Option<Utf8PathBuf>,

    /// Simulation end time
    #[arg(long, default_value_t = 1.0)]
    end_time: f64,

    /// Communication step size
    #[arg(long, default_value_t = 0.1)]
    step_size: f64,

    /// Enable slave logging
    #[arg(long)]
    logging: bool,

    /// CSV column separator
    #[arg(long, default_value_t = ';')]
    separator: char,

    /// Result trace file
    #[arg(long, default_value = "result.csv")]
    output: Utf8PathBuf,

    /// Parse a component description (.xml or .fmu) and print it as JSON
    /// instead of simulating
    #[arg(long, value_name = "DESCRIPTION_FILE", conflicts_with = "graph_file")]
    describe: Option<Utf8PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    if let Some(path) = &cli.describe {
        return describe(path);
    }
    let Some(graph_file) = &cli.graph_file else {
        bail!("no component diagram given");
    };

    let xml = FsSource
        .read_to_string(graph_file)
        .with_context(|| format!("cannot read {graph_file}"))?;
    let mut graph = parse_graph(&xml).with_context(|| format!("cannot parse {graph_file}"))?;
    validate_graph(&mut graph)?;

    let loader = BuiltinLoader::with_demo_models();
    let mut master = Master::load(graph, &loader)?;

    let config = RunConfig {
        end_time: cli.end_time,
        step_size: cli.step_size,
        logging_on: cli.logging,
        separator: cli.separator,
    };
    println!(
        "simulating '{graph_file}' from t=0..{} with step size h={}, loggingOn={}, csv separator='{}'",
        config.end_time, config.step_size, config.logging_on, config.separator
    );

    let file = std::fs::File::create(&cli.output)
        .with_context(|| format!("cannot create {}", cli.output))?;
    let mut out = BufWriter::new(file);
    let summary = master.run(&config, &mut out)?;

    println!(
        "CSV file '{}' written, {} steps until t={}",
        cli.output, summary.steps, summary.end_time
    );
    Ok(())
}

/// Parse, validate and dump one component description as JSON.
fn describe(path: &Utf8PathBuf) -> Result<()> {
    let xml = if path.extension() == Some("fmu") || path.extension() == Some("zip") {
        let file = std::fs::File::open(path).with_context(|| format!("cannot open {path}"))?;
        let mut source = ZipSource::new(std::io::BufReader::new(file))?;
        source.read_to_string(Utf8PathBuf::from("modelDescription.xml").as_path())?
    } else {
        FsSource
            .read_to_string(path)
            .with_context(|| format!("cannot read {path}"))?
    };
    let description =
        parse_model_description(&xml).with_context(|| format!("cannot parse {path}"))?;
    validate_model_description(&description)?;
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}
