//! Bizdash CLI - administration helpers for the Bizdash dashboard backend
//!
//! Inspect and validate the role policy table, issue development tokens and
//! preview the dashboard menu of each role.

use anyhow::{Context, Result};
use bizdash_core::{
    authz::{Identity, ResourceKind, Role, RolePolicyTable, UserId},
    config::{Config, PolicyDocument},
    middleware::{Authenticator, Claims},
    navigation::capabilities,
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{object::Columns, Alignment, Modify, Style},
};

// ═══════════════════════════════════════════════════════════════════════════════
// CLI Structure
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(
    name = "bizdash",
    version,
    about = "Bizdash - multi-tenant admin dashboard tooling",
    propagate_version = true
)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BIZDASH_CONFIG")]
    config: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Role policy table operations
    #[command(subcommand)]
    Policy(PolicyCommands),

    /// Token operations
    #[command(subcommand)]
    Token(TokenCommands),

    /// Show the dashboard sections a role can open
    Menu {
        /// Role name, e.g. super-admin or customer
        role: Role,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Print the effective policy table
    Show,

    /// Validate a TOML policy file
    Check {
        /// Path to a file holding `[[rules]]` entries
        file: String,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Issue a signed development token
    Issue {
        /// User ID (token subject)
        #[arg(short, long)]
        subject: String,

        #[arg(short, long)]
        role: Role,

        /// Parent entrepreneur, required for collaborators and customers
        #[arg(short, long)]
        entrepreneur: Option<String>,

        #[arg(long)]
        email: Option<String>,

        /// Lifetime in minutes; defaults to the configured TTL
        #[arg(long)]
        ttl_minutes: Option<i64>,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Output Helpers
// ═══════════════════════════════════════════════════════════════════════════════

struct OutputHelper {
    format: OutputFormat,
}

impl OutputHelper {
    fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    fn print_success(&self, message: &str) {
        match self.format {
            OutputFormat::Json => self.print_status("success", message),
            OutputFormat::Text => println!("{} {}", "[OK]".green().bold(), message),
        }
    }

    fn print_error(&self, message: &str) {
        match self.format {
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({ "status": "error", "message": message }));
            }
            OutputFormat::Text => eprintln!("{} {}", "[ERROR]".red().bold(), message),
        }
    }

    fn print_status(&self, status: &str, message: &str) {
        println!("{}", serde_json::json!({ "status": status, "message": message }));
    }

    fn print_json<T: Serialize>(&self, data: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }

    fn print_header(&self, title: &str) {
        if !self.is_json() {
            println!("\n{}", title.bold().underline());
        }
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn render_policy(table: &RolePolicyTable) -> String {
    let mut builder = Builder::default();

    let mut header = vec!["Role".to_string()];
    header.extend(ResourceKind::ALL.iter().map(|kind| kind.to_string()));
    builder.push_record(header);

    for role in Role::ALL {
        let mut record = vec![role.name().to_string()];
        record.extend(
            ResourceKind::ALL
                .iter()
                .map(|kind| table.operations(role, *kind).to_string()),
        );
        builder.push_record(record);
    }

    builder
        .build()
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::center()))
        .to_string()
}

fn handle_policy_command(cmd: PolicyCommands, config: &Config, output: &OutputHelper) -> Result<()> {
    match cmd {
        PolicyCommands::Show => {
            let table = config.policy.build_table()?;
            if output.is_json() {
                return output.print_json(&table.rules());
            }
            output.print_header("Role policy table");
            println!("{}", render_policy(&table));
            Ok(())
        }
        PolicyCommands::Check { file } => {
            let document = PolicyDocument::from_file(&file)?;
            let table = RolePolicyTable::from_rules(&document.rules)
                .with_context(|| format!("{file} is not a valid policy table"))?;
            output.print_success(&format!(
                "{} rules cover every role and resource kind",
                document.rules.len()
            ));
            if !output.is_json() {
                println!("{}", render_policy(&table));
            }
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Token Commands
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct IssuedToken {
    token: String,
    subject: String,
    role: Role,
    expires_at: String,
}

fn handle_token_command(cmd: TokenCommands, config: &Config, output: &OutputHelper) -> Result<()> {
    match cmd {
        TokenCommands::Issue {
            subject,
            role,
            entrepreneur,
            email,
            ttl_minutes,
        } => {
            let identity = Identity::from_parts(
                UserId::new(subject.as_str()),
                role,
                entrepreneur.map(UserId::from),
            )?;

            let ttl = ttl_minutes.unwrap_or(config.auth.token_ttl_minutes);
            let mut claims = Claims::for_identity(&identity, chrono::Duration::minutes(ttl));
            claims.email = email;

            let authenticator = Authenticator::new(config.auth.to_auth_config()?)
                .map_err(|e| anyhow::anyhow!("cannot sign tokens: {e}"))?;
            let token = authenticator
                .generate_token(&claims)
                .map_err(|e| anyhow::anyhow!("failed to sign token: {e}"))?;

            if output.is_json() {
                return output.print_json(&IssuedToken {
                    token,
                    subject,
                    role,
                    expires_at: claims.expires_at().to_rfc3339(),
                });
            }
            output.print_success(&format!(
                "Token for {} ({}) expires {}",
                subject.cyan(),
                role.name(),
                claims.expires_at().to_rfc3339()
            ));
            println!("{token}");
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Menu Command
// ═══════════════════════════════════════════════════════════════════════════════

fn handle_menu_command(role: Role, output: &OutputHelper) -> Result<()> {
    let sections = capabilities(role);
    if output.is_json() {
        return output.print_json(&sections);
    }

    output.print_header(&format!("Dashboard menu for {}", role.name()));
    for section in sections {
        println!("  {} {}", "•".blue(), section);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = OutputHelper::new(cli.format, cli.no_color);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Policy(cmd) => handle_policy_command(cmd, &config, &output),
        Commands::Token(cmd) => handle_token_command(cmd, &config, &output),
        Commands::Menu { role } => handle_menu_command(role, &output),
    });

    if let Err(e) = result {
        output.print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
