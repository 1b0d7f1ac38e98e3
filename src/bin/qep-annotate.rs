use clap::Parser;
use log::info;
use qepexplain::{
    bin_utils, render_lines, render_tree, Analysis, Analyzer, AnalyzerConfig, EnumerationMode,
    PlanFixture, PsqlSession, RecordedSession, RecordingSession, Result,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
enum Visualization {
    Lines,
    Tree,
    Dot,
}

#[derive(Parser)]
#[command(about = "Explains why PostgreSQL picked a plan by comparing it with the alternatives")]
struct Args {
    #[arg(short, long)]
    query: Option<String>,

    #[arg(short = 'f', long)]
    query_file: Option<PathBuf>,

    /// libpq connection string handed to psql.
    #[arg(long)]
    conninfo: Option<String>,

    #[arg(long)]
    psql: Option<PathBuf>,

    /// Replay plans from a recorded fixture instead of asking a server.
    #[arg(long, conflicts_with_all = ["conninfo", "record"])]
    replay: Option<PathBuf>,

    /// Save every plan the server returned to a fixture.
    #[arg(long)]
    record: Option<PathBuf>,

    #[arg(long, default_value_t = EnumerationMode::Exhaustive)]
    mode: EnumerationMode,

    #[arg(long)]
    cost_tolerance: Option<f64>,

    #[arg(long)]
    visualize: Option<Visualization>,

    #[arg(long)]
    costs_csv: Option<PathBuf>,

    #[arg(long)]
    no_validate: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn with_defaults(mut self) -> Self {
        self.conninfo
            .get_or_insert_with(|| "dbname=postgres".to_string());
        self.psql.get_or_insert_with(|| PathBuf::from("psql"));
        self.cost_tolerance
            .get_or_insert(AnalyzerConfig::default().cost_tolerance);
        self
    }
}

fn main() -> ExitCode {
    let args = Args::parse().with_defaults();
    if let Err(err) = bin_utils::init_logging(args.verbose) {
        eprintln!("{}", err);
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let query = bin_utils::read_query(args.query.clone(), args.query_file.clone())?;

    let mut analyzer = Analyzer::default();
    analyzer
        .with_mode(args.mode)
        .with_cost_tolerance(args.cost_tolerance.unwrap_or_default())
        .set_validate_query(!args.no_validate);

    let analysis = analyze(&analyzer, &query, &args)?;
    println!("{}", analyzer.annotate(&analysis));

    if let Some(visualization) = args.visualize {
        println!();
        match visualization {
            Visualization::Lines => println!("{}", render_lines(&analysis.qep)),
            Visualization::Tree => print!("{}", render_tree(&analysis.qep)),
            Visualization::Dot => println!("{}", analyzer.get_visualization(&analysis.qep)),
        }
    }

    if let Some(output) = &args.costs_csv {
        bin_utils::write_records(output, analysis.cost_tables.records())?;
        info!("wrote cost tables to {}", output.display());
    }
    Ok(())
}

fn analyze(analyzer: &Analyzer, query: &str, args: &Args) -> Result<Analysis> {
    if let Some(fixture) = &args.replay {
        let mut session = RecordedSession::new(PlanFixture::load(fixture)?);
        return analyzer.analyze(query, &mut session);
    }

    let mut session = PsqlSession::new(args.conninfo.clone().unwrap_or_default());
    if let Some(psql) = &args.psql {
        session = session.with_psql(psql.clone());
    }

    match &args.record {
        Some(fixture) => {
            let mut session = RecordingSession::new(session);
            let analysis = analyzer.analyze(query, &mut session)?;
            session.into_fixture().save(fixture)?;
            info!("recorded plans to {}", fixture.display());
            Ok(analysis)
        }
        None => analyzer.analyze(query, &mut session),
    }
}
