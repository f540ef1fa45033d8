use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use fanout_core::hook::Hook;
use fanout_core::{Config, ExecutorSpec, ForkLimit, Job, Registry};

mod builtins;
mod hosts;

/// Exit code for an operator interrupt (128 + SIGINT).
const INTERRUPT_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "fanout")]
#[command(about = "Run a command across many hosts concurrently", long_about = None)]
struct Cli {
    /// Execute on the named machine(s); comma separated, repeatable
    #[arg(short = 'm', long = "machine", value_name = "HOST")]
    machines: Vec<String>,

    /// Read hosts from a file, one per line
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Read hosts from a named group file
    #[arg(short = 'g', long = "group", value_name = "GROUP")]
    groups: Vec<String>,

    /// Max hosts to run at once: a count ("16") or a percentage ("50%")
    #[arg(short = 'l', long = "forklimit", value_name = "LIMIT")]
    forklimit: Option<String>,

    /// Per-host timeout in seconds; 0 means unbounded
    #[arg(short = 't', long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Select extra hooks by name; "-name" removes one chosen in config
    #[arg(long = "hooks", value_name = "NAME")]
    hooks: Vec<String>,

    /// Executor spec, e.g. "ssh" or "session:user=deploy,port=2222"
    #[arg(short = 'e', long, value_name = "SPEC")]
    executor: Option<String>,

    /// Extra option forwarded to the ssh backend; repeatable
    #[arg(short = 'o', long = "ssh-option", value_name = "OPT", allow_hyphen_values = true)]
    ssh_options: Vec<String>,

    /// Extra config file applied over the standard locations
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Don't prefix output lines with hostnames
    #[arg(long)]
    no_machines: bool,

    /// Don't print remote output
    #[arg(long)]
    no_output: bool,

    /// Report completion percentage as hosts finish
    #[arg(long)]
    percent: bool,

    /// Run hosts one at a time
    #[arg(long)]
    serial: bool,

    /// Command to run on every host; omit to list the resolved hosts
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = tokio::select! {
        result = run(cli) => match result {
            Ok(rc) => rc,
            Err(err) => {
                eprintln!("fanout: {err:#}");
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("fanout: interrupted");
            INTERRUPT_EXIT_CODE
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::load_default_files()?;
    if let Some(path) = &cli.config {
        config.update_from_file(path)?;
    }
    apply_args(&mut config, &cli);

    let hosts = hosts::resolve(&cli.machines, &cli.files, &cli.groups)?;
    if hosts.is_empty() {
        bail!("no hosts specified (use -m, -f, or -g)");
    }

    // No command: just show what would be targeted.
    if cli.command.is_empty() {
        for host in &hosts {
            println!("{host}");
        }
        return Ok(0);
    }

    let registry = builtins::registry();
    let hooks = build_hooks(&config, &registry)?;
    let executor = registry
        .executor(&config.executor)
        .with_context(|| format!("starting executor '{}'", config.executor.name))?;

    debug!(
        hosts = hosts.len(),
        executor = %config.executor.name,
        hooks = hooks.len(),
        "dispatching job"
    );

    let mut job = Job::new(
        hosts,
        cli.command.clone(),
        config.fork_limit,
        config.timeout_duration(),
        hooks,
        executor,
    );
    job.run_async().await;
    let rc = job.wait(None).await?;
    Ok(rc)
}

/// Command line arguments override whatever the config files said.
fn apply_args(config: &mut Config, cli: &Cli) {
    if let Some(limit) = &cli.forklimit {
        config.fork_limit = ForkLimit::parse(limit);
    }
    if cli.serial {
        config.fork_limit = ForkLimit::Count(1);
    }
    if let Some(timeout) = cli.timeout {
        config.timeout = timeout;
    }
    if cli.no_machines {
        config.print_machines = false;
    }
    if cli.no_output {
        config.print_output = false;
    }
    if cli.percent {
        config.show_percent = true;
    }
    config.merge_hooks(&cli.hooks);

    if let Some(spec) = &cli.executor {
        config.executor = ExecutorSpec::parse(spec);
    }
    // Raw ssh options ride along as positional executor args.
    config.executor.args.extend(cli.ssh_options.iter().cloned());
}

/// Implicit hooks from the output flags, then the named selection in
/// config order.
fn build_hooks(config: &Config, registry: &Registry) -> Result<Vec<Arc<dyn Hook>>> {
    let mut hooks: Vec<Arc<dyn Hook>> = Vec::new();

    if config.print_output {
        let name = if config.print_machines {
            "machine-printer"
        } else {
            "printer"
        };
        hooks.push(registry.hook(name)?);
    }
    if config.show_percent {
        hooks.push(registry.hook("progress")?);
    }
    for name in &config.hooks {
        hooks.push(
            registry
                .hook(name)
                .with_context(|| format!("selecting hook '{name}'"))?,
        );
    }
    Ok(hooks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("fanout").chain(args.iter().copied()))
    }

    #[test]
    fn args_override_config() {
        let mut config = Config::default();
        let cli = cli(&[
            "-m", "a", "-l", "25%", "-t", "30", "--no-output", "--percent", "uptime",
        ]);
        apply_args(&mut config, &cli);

        assert_eq!(config.fork_limit, ForkLimit::Percent(25.0));
        assert_eq!(config.timeout, 30);
        assert!(!config.print_output);
        assert!(config.show_percent);
        assert_eq!(cli.command, vec!["uptime"]);
    }

    #[test]
    fn serial_forces_limit_one() {
        let mut config = Config::default();
        let cli = cli(&["-m", "a", "-l", "64", "--serial", "uptime"]);
        apply_args(&mut config, &cli);
        assert_eq!(config.fork_limit, ForkLimit::Count(1));
    }

    #[test]
    fn ssh_options_become_executor_args() {
        let mut config = Config::default();
        let cli = cli(&["-m", "a", "-o", "-4", "-o", "-C", "uptime"]);
        apply_args(&mut config, &cli);
        assert_eq!(config.executor.args, vec!["-4", "-C"]);
    }

    #[test]
    fn default_hooks_follow_output_flags() {
        let registry = builtins::registry();

        let config = Config::default();
        assert_eq!(build_hooks(&config, &registry).unwrap().len(), 1);

        let mut config = Config::default();
        config.print_output = false;
        config.show_percent = true;
        config.merge_hooks(&["trace".to_string()]);
        assert_eq!(build_hooks(&config, &registry).unwrap().len(), 2);
    }

    #[test]
    fn unknown_hook_name_is_an_error() {
        let registry = builtins::registry();
        let mut config = Config::default();
        config.merge_hooks(&["nope".to_string()]);
        assert!(build_hooks(&config, &registry).is_err());
    }
}
