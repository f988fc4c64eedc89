//! jh-auth - Sign in to JobHive and manage the stored session token

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libjobhive::logging::LoggingConfig;
use libjobhive::types::{Credentials, UserType};
use libjobhive::{JobHiveError, JobHiveService, Session};
use std::io::{self, BufRead, IsTerminal};

#[derive(Parser)]
#[command(name = "jh-auth")]
#[command(version, about = "Manage the JobHive session on this machine", long_about = None)]
#[command(after_help = r#"EXIT CODES:
    0 - Success (including "not signed in" for status)
    1 - Storage, network or configuration error
    2 - Credentials rejected
    3 - Invalid input
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show who the stored token belongs to
    Status {
        /// Output format
        #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Sign in and store the session token
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Account role (user or business)
        #[arg(long, default_value = "user")]
        user_type: UserType,

        /// Read the password from stdin (for automation)
        #[arg(long)]
        stdin: bool,
    },

    /// Remove the stored session token
    Logout,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env().with_verbose(cli.verbose).init();

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<JobHiveError>()
        .map(JobHiveError::exit_code)
        .unwrap_or(1)
}

async fn run(command: Commands) -> Result<()> {
    let service = JobHiveService::new().context("Failed to initialize JobHive")?;
    tracing::debug!("Token backend: {}", service.token_store().backend_name());

    match command {
        Commands::Status { format } => {
            let session = service.session().fetch_authenticated_user().await?;
            print_session(&session, &format)
        }
        Commands::Login {
            email,
            user_type,
            stdin,
        } => {
            let password = read_password(stdin)?;
            service.session().set_user_type(user_type);
            let session = service
                .session()
                .sign_in(&Credentials {
                    email,
                    password,
                    user_type,
                })
                .await?;
            print_session(&session, "text")
        }
        Commands::Logout => {
            service.sign_out()?;
            println!("Signed out");
            Ok(())
        }
    }
}

fn read_password(use_stdin: bool) -> Result<String> {
    let password = if use_stdin {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read password from stdin")?;
        line.trim_end_matches(['\r', '\n']).to_string()
    } else if io::stdin().is_terminal() {
        rpassword::prompt_password("Password: ").context("Failed to read password")?
    } else {
        return Err(JobHiveError::InvalidInput(
            "no terminal for a password prompt; pass --stdin".to_string(),
        )
        .into());
    };

    if password.is_empty() {
        return Err(JobHiveError::InvalidInput("password must not be empty".to_string()).into());
    }
    Ok(password)
}

fn print_session(session: &Session, format: &str) -> Result<()> {
    if format == "json" {
        let value = serde_json::json!({
            "authenticated": session.is_authenticated,
            "userType": session.user_type,
            "user": session.user,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match (&session.user, session.user_type) {
        (Some(user), Some(user_type)) if session.is_authenticated => {
            println!("Signed in as {} <{}> ({})", user.name, user.email, user_type);
        }
        _ => println!("Not signed in"),
    }
    Ok(())
}
