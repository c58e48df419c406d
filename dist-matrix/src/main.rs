use std::io::Write;
use std::panic;
use std::sync::Mutex;

use clap::Parser;
use cli::{Cli, Commands, GenerateCiArgs, OutputFormat, PlanArgs, ReportSchemaArgs, RunArgs};
use comfy_table::{presets::UTF8_FULL, Table};
use console::Term;
use dist_matrix::config::{Config, ConfigLayer};
// Import everything from the lib version of ourselves
use dist_matrix::*;
use dist_matrix_schema::{EntryOutcome, RunReport};
use lazy_static::lazy_static;
use miette::{Diagnostic, IntoDiagnostic};
use thiserror::Error;
use tracing::error;

mod cli;

type ReportErrorFunc = dyn Fn(&miette::Report) + Send + Sync + 'static;

lazy_static! {
    static ref REPORT_ERROR: Mutex<Option<Box<ReportErrorFunc>>> = Mutex::new(None);
}

fn set_report_errors_as_json() {
    *REPORT_ERROR.lock().unwrap() = Some(Box::new(move |error| {
        // Manually invoke JSONReportHandler to format the error as a report
        // to out_.
        let mut report = String::new();
        miette::JSONReportHandler::new()
            .render_report(&mut report, error.as_ref())
            .unwrap();
        writeln!(&mut Term::stdout(), r#"{{"error": {report}}}"#).unwrap();
    }));
}

fn report_error(error: &miette::Report) {
    {
        let guard = REPORT_ERROR.lock().unwrap();
        if let Some(do_report) = &*guard {
            do_report(error);
            return;
        }
    }
    error!("{:?}", error);
}

fn main() {
    let cli = Cli::parse();
    // Init the logger
    tracing_subscriber::fmt::fmt()
        .with_max_level(cli.verbose)
        .with_target(false)
        .without_time()
        .with_ansi(console::colors_enabled_stderr())
        .with_writer(std::io::stderr)
        .init();

    // Control how errors are formatted by setting the miette hook. This will
    // only be used for errors presented to humans, when formatting an error as
    // JSON, it will be handled by a custom `report_error` override, bypassing
    // the hook.
    miette::set_hook(Box::new(move |_| {
        let graphical_theme = if console::colors_enabled_stderr() {
            miette::GraphicalTheme::unicode()
        } else {
            miette::GraphicalTheme::unicode_nocolor()
        };
        Box::new(
            miette::MietteHandlerOpts::new()
                .graphical_theme(graphical_theme)
                .build(),
        )
    }))
    .expect("failed to initialize error handler");

    // Now that miette is set up, use it to format panics.
    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            msg
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            &msg[..]
        } else {
            "something went wrong"
        };

        #[derive(Debug, Error, Diagnostic)]
        #[error("{message}")]
        pub struct PanicError {
            pub message: String,
            #[help]
            pub help: Option<String>,
        }

        report_error(
            &miette::Report::from(PanicError {
                message: message.to_owned(),
                help: panic_info
                    .location()
                    .map(|loc| format!("at {}:{}:{}", loc.file(), loc.line(), loc.column())),
            })
            .wrap_err("dist-matrix panicked"),
        );
    }));

    // If we're outputting JSON, replace the error report method such that it
    // writes errors out to the normal output stream as JSON.
    if cli.output_format == OutputFormat::Json {
        set_report_errors_as_json();
    }

    match real_main(&cli) {
        Ok(Success::Complete) => {}
        // the report already says what went wrong
        Ok(Success::Partial) => std::process::exit(1),
        Err(e) => {
            report_error(&e);
            std::process::exit(-1);
        }
    }
}

/// How a command that didn't error out went
enum Success {
    /// Everything worked
    Complete,
    /// Some matrix entries failed
    Partial,
}

fn real_main(cli: &Cli) -> Result<Success, miette::Report> {
    match &cli.command {
        Commands::Plan(args) => cmd_plan(cli, args),
        Commands::Run(args) => cmd_run(cli, args),
        Commands::GenerateCi(args) => cmd_generate_ci(args),
        Commands::ReportSchema(args) => cmd_report_schema(args),
    }
}

fn load_config(project: &cli::ProjectArgs, layer: ConfigLayer) -> Result<Config, miette::Report> {
    Ok(Config::load(&project.project_dir, layer)?)
}

fn print_human(out: &mut Term, report: &RunReport) -> Result<(), std::io::Error> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Target", "Host", "Archive", "Status"]);
    for entry in &report.entries {
        let status = match &entry.outcome {
            EntryOutcome::Planned => "planned".to_owned(),
            EntryOutcome::Packaged { path } => match path {
                Some(path) => format!("packaged ({path})"),
                None => "packaged".to_owned(),
            },
            EntryOutcome::Uploaded => "uploaded".to_owned(),
            EntryOutcome::Failed { kind, message } => format!("{kind}: {message}"),
        };
        table.add_row(vec![
            entry.target_triple.to_string(),
            entry.host.to_string(),
            entry.archive_name.clone(),
            status,
        ]);
    }
    writeln!(out, "{table}")?;

    let failed = report.failures().count();
    if failed > 0 {
        writeln!(
            out,
            "{failed} of {} entries failed, the release is partial",
            report.entries.len()
        )?;
    }
    Ok(())
}

fn print_json(out: &mut Term, report: &RunReport) -> Result<(), std::io::Error> {
    let string = serde_json::to_string_pretty(report)?;
    writeln!(out, "{string}")?;
    Ok(())
}

fn print_report(cli: &Cli, report: &RunReport) -> Result<(), miette::Report> {
    let mut out = Term::stdout();
    match cli.output_format {
        OutputFormat::Human => print_human(&mut out, report).into_diagnostic()?,
        OutputFormat::Json => print_json(&mut out, report).into_diagnostic()?,
    }
    Ok(())
}

fn cmd_plan(cli: &Cli, args: &PlanArgs) -> Result<Success, miette::Report> {
    let cfg = load_config(&args.project, args.config_layer())?;
    let report = do_plan(&cfg)?;
    print_report(cli, &report)?;
    Ok(Success::Complete)
}

fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<Success, miette::Report> {
    let cfg = load_config(&args.project, args.config_layer())?;
    let publish = PublishArgs {
        no_publish: args.no_publish,
        event: args.event.clone(),
        upload_url: args.upload_url.clone(),
    };

    let report = block_on_run(do_run(&cfg, &publish))??;

    print_report(cli, &report)?;
    if report.has_failures() {
        Ok(Success::Partial)
    } else {
        Ok(Success::Complete)
    }
}

fn cmd_generate_ci(args: &GenerateCiArgs) -> Result<Success, miette::Report> {
    let cfg = load_config(&args.project, args.config_layer())?;
    let file = do_generate_ci(&cfg, args.check)?;
    if args.check {
        eprintln!("{file} is up to date");
    }
    Ok(Success::Complete)
}

fn cmd_report_schema(_args: &ReportSchemaArgs) -> Result<Success, miette::Report> {
    let schema = RunReport::json_schema();
    let json = serde_json::to_string_pretty(&schema).into_diagnostic()?;
    writeln!(&mut Term::stdout(), "{json}").into_diagnostic()?;
    Ok(Success::Complete)
}
