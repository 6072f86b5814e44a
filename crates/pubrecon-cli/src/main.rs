use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pubrecon_core::error::ExitCode;
use pubrecon_core::{
    AppConfig, CoreError, IdentityStore, NewPerson, PersonId, ReportStore, SourceKind, SqliteStore,
    VenueGroup,
};
use pubrecon_engine::{
    AnalyzeOptions, Analyzer, DepartmentSurvey, EngineError, IdentifierInput, IdentifierResolver,
    PersonQuery, SourceContext, TitleMatcher,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pubrecon",
    about = "Cross-check researchers' publication lists between bibliographic sources",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format. Also enabled by setting PUBRECON_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tracked people and their source identifiers.
    Person {
        #[command(subcommand)]
        action: PersonAction,
    },

    /// Reconcile one person's publications and store the report.
    Analyze {
        id: PersonId,
        /// Replace a stored report even if a source failed this run.
        #[arg(long)]
        confirm_overwrite: bool,
    },

    /// Analyze everyone, one person at a time.
    Scan {
        /// Pause between people, overriding the config.
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long)]
        confirm_overwrite: bool,
    },

    /// Show a person's stored report.
    Report {
        id: PersonId,
        /// Bucket missing publications by publisher.
        #[arg(long)]
        grouped: bool,
    },

    /// Compare two titles the way reconciliation does.
    Match {
        a: String,
        b: String,
        #[arg(long)]
        threshold: Option<f64>,
        /// Use the lower thesis threshold.
        #[arg(long, conflicts_with = "threshold")]
        thesis: bool,
    },

    /// List supervised-thesis titles with no matching publication in source B.
    Theses {
        id: PersonId,
        #[arg(required = true)]
        titles: Vec<String>,
    },

    /// Count a department's articles and conference papers for one year.
    /// Without names, the faculty are listed by affiliation.
    Survey {
        #[arg(long)]
        year: i32,
        names: Vec<String>,
        /// Institution whose authors make up the roster.
        #[arg(long)]
        institution: Option<String>,
        /// Citation index affiliation id, preferred over --institution.
        #[arg(long)]
        affiliation_id: Option<String>,
        /// Department keyword narrowing the roster, e.g. "Electrical".
        #[arg(long)]
        department: Option<String>,
    },
}

#[derive(Subcommand)]
enum PersonAction {
    /// Track a new person.
    Add {
        name: String,
        #[arg(long)]
        institution: Option<String>,
        /// Identifier or profile URL, as `source=value`. Repeatable.
        #[arg(long = "id", action = clap::ArgAction::Append)]
        ids: Vec<String>,
    },
    /// List tracked people.
    List,
    /// Set a person's identifier in one source. A value that is neither an id nor a
    /// profile URL is treated as a name and searched for.
    SetId {
        id: PersonId,
        source: SourceKind,
        value: String,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_output = cli.json || std::env::var("PUBRECON_JSON").as_deref() == Ok("1");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(cli.command, json_output).await {
        let code = exit_code(&e);
        if json_output {
            let _ = print_json(&serde_json::json!({
                "status": "error",
                "error": format!("{code:?}"),
                "message": e.to_string(),
            }));
        } else {
            eprintln!("error: {e:#}");
        }
        std::process::exit(code as i32);
    }
}

async fn run(command: Commands, json_output: bool) -> Result<()> {
    let start = Instant::now();
    let mut config = AppConfig::load()?;

    match command {
        Commands::Person { action } => person(action, &config, json_output, start).await,

        Commands::Analyze {
            id,
            confirm_overwrite,
        } => {
            let store = open_store(&config)?;
            let analyzer = Analyzer::from_config(&config, store.clone(), store)?;
            let outcome = analyzer
                .analyze_person(id, AnalyzeOptions { confirm_overwrite })
                .await?;

            if json_output {
                return print_ok(&outcome, start);
            }
            println!("{} (#{})", outcome.name, outcome.person_id);
            for side in &outcome.extractions {
                println!(
                    "  {:<15} {:<12} {:>4} records  id={}",
                    side.source.to_string(),
                    format!("{:?}", side.status).to_lowercase(),
                    side.count,
                    side.identifier.as_deref().unwrap_or("-"),
                );
            }
            print_groups("missing in A", &outcome.report.grouped_missing_in_a);
            print_groups("missing in B", &outcome.report.grouped_missing_in_b);
            if !outcome.saved {
                println!("Report not saved: a source failed and a previous report exists.");
                println!("Re-run with --confirm-overwrite to replace it.");
            }
            Ok(())
        }

        Commands::Scan {
            delay_ms,
            confirm_overwrite,
        } => {
            if let Some(ms) = delay_ms {
                config.scan.inter_person_delay_ms = ms;
            }
            let store = open_store(&config)?;
            let analyzer = Analyzer::from_config(&config, store.clone(), store)?;
            let summary = analyzer.scan_all(AnalyzeOptions { confirm_overwrite }).await?;

            if json_output {
                return print_ok(&summary, start);
            }
            println!(
                "Analyzed {} ({} saved, {} held back), {} failed",
                summary.analyzed,
                summary.saved,
                summary.held_back,
                summary.failures.len()
            );
            for failure in &summary.failures {
                println!("  #{}: {}", failure.person_id, failure.error);
            }
            Ok(())
        }

        Commands::Report { id, grouped } => {
            let store = open_store(&config)?;
            store.get_person(id)?;
            let Some(stored) = store.load_report(id)? else {
                bail!(CoreError::ValidationError(format!(
                    "no report for person {id}; run `pubrecon analyze {id}` first"
                )));
            };

            let mut report = stored.report;
            if !grouped && let Some(map) = report.as_object_mut() {
                map.remove("grouped_missing_in_a");
                map.remove("grouped_missing_in_b");
            }
            if json_output {
                return print_json(&serde_json::json!({
                    "status": "ok",
                    "data": report,
                    "meta": { "saved_at": stored.saved_at, "duration_ms": start.elapsed().as_millis() }
                }));
            }

            println!("Report for #{id}, saved {}", stored.saved_at.format("%Y-%m-%d %H:%M"));
            let keys: &[(&str, &str)] = if grouped {
                &[("grouped_missing_in_a", "missing in A"), ("grouped_missing_in_b", "missing in B")]
            } else {
                &[("missing_in_a", "missing in A"), ("missing_in_b", "missing in B")]
            };
            for (key, label) in keys {
                if grouped {
                    let groups: Vec<VenueGroup> =
                        serde_json::from_value(report[*key].clone()).unwrap_or_default();
                    print_groups(label, &groups);
                } else {
                    let items = report[*key].as_array().cloned().unwrap_or_default();
                    println!("{label} ({}):", items.len());
                    for item in items {
                        println!(
                            "  [{}] {} ({})",
                            item["year"].as_str().unwrap_or("?"),
                            item["title"].as_str().unwrap_or(""),
                            item["venue"].as_str().unwrap_or(""),
                        );
                    }
                }
            }
            Ok(())
        }

        Commands::Match {
            a,
            b,
            threshold,
            thesis,
        } => {
            let threshold = match (threshold, thesis) {
                (Some(t), _) => t,
                (None, true) => config.matcher.thesis_threshold,
                (None, false) => config.matcher.threshold,
            };
            let decision = TitleMatcher::new(threshold).decide(&a, &b);
            if json_output {
                return print_ok(&decision, start);
            }
            println!(
                "{} ({:?}, threshold {threshold})",
                if decision.matched { "match" } else { "no match" },
                decision.tier
            );
            Ok(())
        }

        Commands::Theses { id, titles } => {
            let store = open_store(&config)?;
            let analyzer = Analyzer::from_config(&config, store.clone(), store)?;
            let check = analyzer.unverified_theses(id, &titles).await?;
            if json_output {
                return print_ok(&check, start);
            }
            if !check.checked {
                println!(
                    "No usable publications from {} ({:?}); theses not checked.",
                    check.source, check.status
                );
                return Ok(());
            }
            println!("{} of {} theses unmatched in {}:", check.unmatched.len(), titles.len(), check.source);
            for title in &check.unmatched {
                println!("  {title}");
            }
            Ok(())
        }

        Commands::Survey {
            year,
            names,
            institution,
            affiliation_id,
            department,
        } => {
            if institution.is_some() {
                config.survey.institution = institution;
            }
            if affiliation_id.is_some() {
                config.survey.affiliation_id = affiliation_id;
            }
            if department.is_some() {
                config.survey.department_keyword = department;
            }
            let survey = DepartmentSurvey::from_config(&config)?;
            let report = survey.run(&names, year).await?;
            if json_output {
                return print_ok(&report, start);
            }
            println!(
                "{:<30} {:>12} {:>8} {:>8} {:>8} {:>8}",
                "name", "author id", "art.nat", "art.int", "conf.nat", "conf.int"
            );
            for row in &report.rows {
                println!(
                    "{:<30} {:>12} {:>8} {:>8} {:>8} {:>8}{}",
                    row.name,
                    row.author_id.as_deref().unwrap_or("-"),
                    row.counts.national_articles,
                    row.counts.international_articles,
                    row.counts.national_conferences,
                    row.counts.international_conferences,
                    row.error.as_ref().map(|e| format!("  ! {e}")).unwrap_or_default(),
                );
            }
            let t = &report.totals;
            println!(
                "{:<30} {:>12} {:>8} {:>8} {:>8} {:>8}",
                "total", "", t.national_articles, t.international_articles, t.national_conferences,
                t.international_conferences
            );
            Ok(())
        }
    }
}

async fn person(action: PersonAction, config: &AppConfig, json_output: bool, start: Instant) -> Result<()> {
    let store = open_store(config)?;
    match action {
        PersonAction::Add {
            name,
            institution,
            ids,
        } => {
            let mut new = NewPerson::new(name);
            if let Some(inst) = institution {
                new = new.with_institution(inst);
            }
            for pair in ids {
                let Some((source, value)) = pair.split_once('=') else {
                    bail!(CoreError::ValidationError(format!("expected source=value, got '{pair}'")));
                };
                let source: SourceKind = source.parse()?;
                match IdentifierInput::parse(source, value) {
                    IdentifierInput::Id(id) => new = new.with_identifier(source, id),
                    IdentifierInput::Name(_) => bail!(CoreError::ValidationError(format!(
                        "'{value}' is not a {source} identifier or profile URL"
                    ))),
                }
            }
            let person = store.add_person(new)?;
            if json_output {
                return print_ok(&person, start);
            }
            println!("Added #{}: {}", person.id, person.name);
            Ok(())
        }

        PersonAction::List => {
            let people = store.list_people()?;
            if json_output {
                return print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": people, "total": people.len() },
                    "meta": { "duration_ms": start.elapsed().as_millis() }
                }));
            }
            if people.is_empty() {
                println!("No people tracked. Use `pubrecon person add` to add one.");
            }
            for p in &people {
                let ids: Vec<String> = p.identifiers.iter().map(|(s, id)| format!("{s}={id}")).collect();
                println!(
                    "{:>4}  {:<30}  {:<25}  {}",
                    p.id,
                    p.name,
                    p.institution.as_deref().unwrap_or(""),
                    ids.join(" ")
                );
            }
            Ok(())
        }

        PersonAction::SetId { id, source, value } => {
            let person = store.get_person(id)?;
            let identifier = match IdentifierInput::parse(source, &value) {
                IdentifierInput::Id(identifier) => {
                    store.set_identifier(id, source, &identifier)?;
                    identifier
                }
                IdentifierInput::Name(name) => {
                    let context = SourceContext::from_config(config)?;
                    let adapter = context.adapter(source, config)?;
                    let query = PersonQuery::new(&name, &config.resolver.honorifics)
                        .with_institution(person.institution.clone())
                        .with_affiliation_keywords(config.resolver.affiliation_keywords.clone());
                    let resolver = IdentifierResolver::new(Duration::from_secs(
                        config.resolver.strategy_timeout_secs,
                    ));
                    // Searched from scratch: a working stored id must not short-circuit.
                    let resolution = resolver.resolve(&adapter, &query, None).await;
                    match resolution.identifier {
                        Some(identifier) => {
                            store.set_identifier(id, source, &identifier)?;
                            identifier
                        }
                        None => bail!(EngineError::ProfileNotFound {
                            kind: source,
                            identifier: name,
                        }),
                    }
                }
            };

            if json_output {
                return print_ok(
                    &serde_json::json!({ "person_id": id, "source": source, "identifier": identifier }),
                    start,
                );
            }
            println!("#{id} {source} = {identifier}");
            Ok(())
        }
    }
}

fn print_groups(label: &str, groups: &[VenueGroup]) {
    let total: usize = groups.iter().map(|g| g.publications.len()).sum();
    println!("{label} ({total}):");
    for group in groups {
        println!("  {} / {} ({})", group.kind, group.publisher, group.publications.len());
        for p in &group.publications {
            println!("    [{}] {} ({})", p.year, p.title, p.venue);
        }
    }
}

fn print_ok<T: serde::Serialize>(data: &T, start: Instant) -> Result<()> {
    print_json(&serde_json::json!({
        "status": "ok",
        "data": data,
        "meta": { "duration_ms": start.elapsed().as_millis() }
    }))
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::open(&config.database_path())?))
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    if let Some(core) = err.downcast_ref::<CoreError>() {
        return core.exit_code();
    }
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Core(core)) => core.exit_code(),
        Some(
            EngineError::Http(_)
            | EngineError::HttpStatus { .. }
            | EngineError::RateLimit(..)
            | EngineError::Timeout(..),
        ) => ExitCode::NetworkError,
        Some(EngineError::ProfileNotFound { .. }) => ExitCode::NotFound,
        Some(
            EngineError::SourceUnavailable(_)
            | EngineError::MissingCredential(_)
            | EngineError::NoRoster,
        ) => {
            ExitCode::InvalidArgs
        }
        _ => ExitCode::GeneralError,
    }
}
