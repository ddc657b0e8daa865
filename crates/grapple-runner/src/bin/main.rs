use clap::Parser;
use grapple_runner::{Config, Finding, Params, RunResult, Runner, Step};
use std::path::PathBuf;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "grapple-runner")]
#[command(about = "Resilient scenario-based browser automation")]
#[command(version)]
struct Cli {
    /// Scenario file to run
    config: PathBuf,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Poll timeout for every wait, in milliseconds (overrides config)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate scenario and list its steps without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    }
}

fn main() -> grapple_runner::Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(cli.level())
        .with_target(false)
        .compact()
        .init();

    let params = Params::from_args(&cli.params)?;
    let mut config = Config::load_with_params(&cli.config, &params)?;
    for name in params.undeclared(&config.params) {
        warn!("parameter '{}' is not declared by the scenario", name);
    }

    if cli.check {
        describe(&config);
        return Ok(());
    }

    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(ms) = cli.timeout_ms {
        config.poll.timeout_ms = ms;
    }

    println!("Running: {} ({})", config.name, config.target.url);
    let mut runner = Runner::launch(&config.browser)?;
    let result = runner.run(&config);
    runner.close()?;
    let result = result?;

    report(&result);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Scenario outline for `--check`.
fn describe(config: &Config) {
    println!("Scenario valid: {}", config.name);
    println!("  Target: {}", config.target.url);
    println!(
        "  Poll: {}ms every {}ms",
        config.poll.timeout_ms, config.poll.interval_ms
    );
    println!("  Steps ({} including nested):", config.step_count());
    outline(&config.steps, 2);

    if !config.params.is_empty() {
        let mut names: Vec<_> = config.params.iter().collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        println!("  Parameters:");
        for (name, def) in names {
            let req = if def.required { " (required)" } else { "" };
            println!(
                "    {}{}: {}",
                name,
                req,
                def.description.as_deref().unwrap_or("")
            );
        }
    }
    if let Some(retry) = config.on_failure.as_ref().and_then(|f| f.retry.as_ref()) {
        println!("  Retry: {} attempts, {}ms apart", retry.attempts, retry.delay_ms);
    }
}

fn outline(steps: &[Step], depth: usize) {
    let pad = "  ".repeat(depth);
    for step in steps {
        let names: Vec<_> = step.targets().iter().map(|t| t.name.as_str()).collect();
        if names.is_empty() {
            println!("{}- {}", pad, step.name());
        } else {
            println!("{}- {} [{}]", pad, step.name(), names.join(", "));
        }
        if let Step::WithinFrame(s) = step {
            outline(&s.steps, depth + 1);
        } else if let Step::WithinNewWindow(s) = step {
            outline(&s.steps, depth + 1);
        }
    }
}

fn report(result: &RunResult) {
    println!();
    match result.error {
        None if result.success => println!("✓ Success"),
        None => println!("✗ Failed"),
        Some(ref error) => println!("✗ Failed: {}", error),
    }
    print!("  {} steps in {}ms", result.steps_executed, result.duration_ms);
    if result.retries > 0 {
        print!(" after {} retries", result.retries);
    }
    println!();

    if result.success {
        for finding in &result.findings {
            println!("  - {}", finding);
        }
        return;
    }

    // Interactions no strategy could carry out, with what each one saw.
    for finding in &result.findings {
        let Finding::Interaction { target, execution } = finding else {
            continue;
        };
        if execution.succeeded() {
            continue;
        }
        println!("  '{}' was never handled:", target);
        for (i, attempt) in execution.trace.iter().enumerate() {
            println!("    {}. {}: {}", i + 1, attempt.strategy, attempt.outcome);
        }
        if let Some(ref diagnostic) = execution.diagnostic {
            match diagnostic.excerpt {
                Some(ref excerpt) => println!("    page near '{}': {}", diagnostic.needle, excerpt.trim()),
                None => println!(
                    "    '{}' not in page source ({} bytes)",
                    diagnostic.needle, diagnostic.source_len
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_and_overrides() {
        let cli = Cli::try_parse_from(["grapple-runner", "s.yaml", "-vv", "--timeout-ms", "500"]).unwrap();
        assert_eq!(cli.level(), Level::DEBUG);
        assert_eq!(cli.timeout_ms, Some(500));

        let cli = Cli::try_parse_from(["grapple-runner", "s.yaml", "-v", "-q"]).unwrap();
        assert_eq!(cli.level(), Level::ERROR);
        assert_eq!(Cli::try_parse_from(["grapple-runner", "s.yaml"]).unwrap().level(), Level::WARN);
    }
}
