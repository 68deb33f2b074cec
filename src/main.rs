use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell as CompShell};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use sme_load::commands::{list, run, validate};
use sme_load::logging;

#[derive(Parser)]
#[command(name = "sme-load")]
#[command(version)]
#[command(about = "Load-testing scenarios for SERAp Estudante and Novo SGP")]
#[command(long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only errors, no banner or progress bar
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario (built-in name or .scenario.yaml path)
    Run {
        /// Scenario name or file
        target: String,
        /// Variable override KEY=VALUE, wins over the environment
        #[arg(short = 'e', long = "env", action = ArgAction::Append)]
        env: Vec<String>,
        /// Users file with `login,senha` lines
        #[arg(long = "users")]
        users: Option<PathBuf>,
        /// Constant number of VUs (replaces the scenario's stages)
        #[arg(long = "vus")]
        vus: Option<u64>,
        /// Run time for --vus (e.g. "30s", "5m")
        #[arg(long = "duration")]
        duration: Option<String>,
        /// Ramp stage DURATION:TARGET, repeatable (replaces the scenario's stages)
        #[arg(short = 's', long = "stage", action = ArgAction::Append, conflicts_with_all = ["vus", "duration"])]
        stages: Vec<String>,
        /// HTML report path (defaults to the scenario's own)
        #[arg(long = "report", conflicts_with = "no_report")]
        report: Option<PathBuf>,
        /// Do not write the HTML report
        #[arg(long = "no-report")]
        no_report: bool,
        /// Write the end-of-run summary as JSON
        #[arg(long = "summary-export")]
        summary_export: Option<PathBuf>,
        /// Per-request timeout
        #[arg(long = "timeout")]
        timeout: Option<String>,
        /// Skip TLS certificate verification
        #[arg(long = "insecure")]
        insecure: bool,
    },
    /// List built-in scenarios
    List,
    /// Print a scenario's YAML
    Show {
        /// Scenario name or file
        target: String,
    },
    /// Validate scenario files, or every built-in scenario
    Validate {
        /// File or directory of .scenario.yaml files
        path: Option<PathBuf>,
    },
    /// Generate shell completions (internal)
    #[command(hide = true)]
    Completions {
        /// Shell: bash, zsh, fish
        shell: String,
    },
    /// Generate man page (internal)
    #[command(hide = true)]
    Man,
}

pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    if atty::is(atty::Stream::Stdout) {
        println!(
            "{} {}  {}",
            "sme-load".cyan().bold(),
            format!("v{}", version).dimmed(),
            "SERAp Estudante · Novo SGP".dimmed()
        );
    } else {
        println!("sme-load v{}", version);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    // Print banner for user-facing commands only
    if !cli.quiet
        && matches!(
            cli.command,
            Commands::Run { .. } | Commands::List | Commands::Validate { .. }
        )
    {
        print_banner();
    }

    match cli.command {
        Commands::Run {
            target,
            env,
            users,
            vus,
            duration,
            stages,
            report,
            no_report,
            summary_export,
            timeout,
            insecure,
        } => {
            run::handle_run(run::RunOptions {
                target,
                env,
                users,
                vus,
                duration,
                stages,
                report,
                no_report,
                summary_export,
                timeout,
                insecure,
                quiet: cli.quiet,
            })
            .await?;
        }
        Commands::List => {
            list::handle_list()?;
        }
        Commands::Show { target } => {
            list::handle_show(&target)?;
        }
        Commands::Validate { path } => {
            validate::handle_validate(path).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            let sh = match shell.as_str() {
                "bash" => CompShell::Bash,
                "zsh" => CompShell::Zsh,
                "fish" => CompShell::Fish,
                "powershell" | "pwsh" => CompShell::PowerShell,
                "elvish" => CompShell::Elvish,
                other => {
                    eprintln!(
                        "Unsupported shell: {} (use bash|zsh|fish|powershell|elvish)",
                        other
                    );
                    std::process::exit(2);
                }
            };
            generate(sh, &mut cmd, name, &mut std::io::stdout());
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            man.render(&mut std::io::stdout())?;
        }
    }

    Ok(())
}
