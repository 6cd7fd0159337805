use std::io::{self, IsTerminal};
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use modelsync_core::{ExecutionOutcome, HttpSettings, MarkerPolicy, SyncConfig};
use serde_json::Value;

mod cli;
mod style;

use cli::ModelsyncCli;
use style::{FileTone, Style};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = ModelsyncCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let config = build_config(&cli);
    let outcome = modelsync_core::execute(&config, &cli.url);
    let code = emit_output(&cli, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("modelsync={level},modelsync_core={level},modelsync_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn build_config(cli: &ModelsyncCli) -> SyncConfig {
    let mut config = SyncConfig::new(&cli.root);
    config.api_base.clone_from(&cli.api_base);
    config.dry_run = cli.dry_run;
    config.allow_unsafe = cli.allow_unsafe;
    config.markers = MarkerPolicy {
        remove_stale_incomplete: !cli.keep_incomplete_markers,
        write_invalid: !cli.no_invalid_markers,
    };
    config.http = HttpSettings::from_env(Duration::from_secs(cli.timeout));
    config
}

fn emit_output(cli: &ModelsyncCli, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();
    let style = Style::new(cli.no_color, io::stdout().is_terminal());

    if cli.json {
        let payload = outcome.to_json_response();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !cli.quiet {
        let message = modelsync_core::outcome::format_status_message(&outcome.message);
        println!("{}", style.status(&outcome.status, &message));
        if let Some(table) = render_file_table(&style, &outcome.details) {
            println!("{table}");
        }
        if let Some(hint) = outcome.hint() {
            println!("{}", style.hint(&format!("Hint: {hint}")));
        }
    } else if code != 0 {
        eprintln!("{}", modelsync_core::outcome::format_status_message(&outcome.message));
    }

    Ok(code)
}

struct FileRow {
    version: String,
    file: String,
    status: String,
    tone: FileTone,
}

fn render_file_table(style: &Style, details: &Value) -> Option<String> {
    let versions = details.get("report")?.get("versions")?.as_array()?;
    let mut rows = Vec::new();
    for version in versions {
        let name = version.get("name")?.as_str()?;
        for file in version.get("files")?.as_array()? {
            let (status, tone) = file_status(file.get("outcome")?);
            rows.push(FileRow {
                version: name.to_string(),
                file: file.get("name")?.as_str()?.to_string(),
                status,
                tone,
            });
        }
    }
    if rows.is_empty() {
        return None;
    }
    Some(format_file_table(style, &rows))
}

fn file_status(outcome: &Value) -> (String, FileTone) {
    let field = |value: &Value, key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };
    match outcome.get("status").and_then(Value::as_str) {
        Some("synced") => {
            let result = outcome.get("result").unwrap_or(&Value::Null);
            let failed = result
                .get("verification")
                .and_then(|v| v.get("result"))
                .and_then(Value::as_str)
                == Some("failed");
            let label = field(result, "outcome");
            if failed {
                (format!("{label} (digest mismatch)"), FileTone::Mismatch)
            } else {
                (label, FileTone::Settled)
            }
        }
        Some("planned") => {
            let action = outcome.get("action").unwrap_or(&Value::Null);
            (format!("would {}", field(action, "action")), FileTone::Planned)
        }
        Some(other) => (other.to_string(), FileTone::Skipped),
        None => ("unknown".to_string(), FileTone::Skipped),
    }
}

fn format_file_table(style: &Style, rows: &[FileRow]) -> String {
    let headers = ["Version", "File", "Status"];
    let mut widths = [headers[0].len(), headers[1].len(), headers[2].len()];
    for row in rows {
        widths[0] = widths[0].max(row.version.chars().count());
        widths[1] = widths[1].max(row.file.chars().count());
    }

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format!(
        "{:<w0$}  {:<w1$}  {}",
        headers[0],
        headers[1],
        headers[2],
        w0 = widths[0],
        w1 = widths[1],
    ));
    lines.push(format!(
        "{:-<w0$}  {:-<w1$}  {:-<w2$}",
        "",
        "",
        "",
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
    ));
    for row in rows {
        let status = style.file(&row.status, row.tone);
        lines.push(format!(
            "{:<w0$}  {:<w1$}  {status}",
            row.version,
            row.file,
            w0 = widths[0],
            w1 = widths[1],
        ));
    }
    lines.join("\n")
}
