mod aggregate;
mod client;
mod config;
mod envelope;
mod normalize;
mod report;

use crate::client::OcClient;
use crate::config::{Overrides, Scope};
use crate::report::ReportFormat;
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tsmctl",
    version,
    about = "Run administrative commands against IBM Spectrum Protect servers through the Operations Center REST API"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "HOST",
        help = "Operations Center address override for this invocation"
    )]
    address: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "PORT",
        help = "Operations Center port override (defaults to 11090)"
    )]
    port: Option<u16>,

    #[arg(long, global = true, help = "Admin user override for this invocation")]
    username: Option<String>,

    #[arg(long, global = true, help = "Admin password override for this invocation")]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one administrative command on the configured servers and write a report
    Run {
        #[arg(value_name = "COMMAND", help = "Command text, e.g. 'query node'")]
        command: String,
        #[arg(
            long,
            short = 's',
            value_name = "NAME",
            help = "TSM server to target (repeatable; overrides the configured list)"
        )]
        server: Vec<String>,
        #[arg(
            long,
            short = 'f',
            value_enum,
            default_value_t = ReportFormat::Csv,
            help = "Report format"
        )]
        format: ReportFormat,
        #[arg(long, short = 'o', value_name = "FILE", help = "Report output path")]
        out: PathBuf,
        #[arg(
            long,
            value_name = "NAME",
            default_value = "Report",
            help = "Sheet name (xlsx only)"
        )]
        sheet: String,
    },
    /// Persist gateway settings and the server list to the chosen scope
    Configure {
        #[arg(long, value_name = "HOST")]
        address: Option<String>,
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(
            long,
            value_name = "NAME1,NAME2",
            use_value_delimiter = true,
            value_delimiter = ','
        )]
        servers: Option<Vec<String>>,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Show current configuration (secrets masked)
    ConfigShow,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("reading current directory")?;

    match cli.command {
        Commands::Configure {
            address,
            port,
            username,
            password,
            servers,
            scope,
        } => {
            let mut existing = config::load_scope(scope.into(), &cwd)?;
            if let Some(address) = address {
                existing.address = Some(address);
            }
            if let Some(port) = port {
                existing.port = Some(port);
            }
            if let Some(username) = username {
                existing.username = Some(username);
            }
            if let Some(password) = password {
                existing.password = Some(password);
            }
            if let Some(servers) = servers {
                existing.servers = Some(servers);
            }
            let path = config::save(scope.into(), &existing, &cwd)?;
            println!("Saved configuration to {}", path.display());
        }
        Commands::Run {
            command,
            server,
            format,
            out,
            sheet,
        } => {
            let effective = config::resolve(
                &cwd,
                Overrides {
                    address: cli.address,
                    port: cli.port,
                    username: cli.username,
                    password: cli.password,
                    servers: (!server.is_empty()).then_some(server),
                },
            )?;
            let client = OcClient::new(
                &effective.base_url(),
                &effective.username,
                &effective.password,
            )?;

            let result = aggregate::execute(&client, &effective.servers, &command);
            report::write_report(&result, format, &out, &sheet)?;
            println!(
                "\nReport with {} row(s) written to {}",
                result.rows.len(),
                out.display()
            );
        }
        Commands::ConfigShow => {
            let merged = config::load(&cwd)?;
            let mut masked = merged.clone();
            if masked.password.is_some() {
                masked.password = Some("*****".into());
            }
            println!("{}", serde_yaml::to_string(&masked)?);
        }
        Commands::Completion { shell } => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => {
                    generate(shells::Bash, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Zsh => {
                    generate(shells::Zsh, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Fish => {
                    generate(shells::Fish, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut std::io::stdout())
                }
            }
        }
    }

    Ok(())
}
