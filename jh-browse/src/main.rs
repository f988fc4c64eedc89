//! jh-browse - Browse JobHive companies and manage received applications

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use libjobhive::logging::LoggingConfig;
use libjobhive::query::QueryState;
use libjobhive::types::{Company, InterviewPrep, TopCompany};
use libjobhive::{Application, ApplicationStatus, JobHiveError, JobHiveService};
use serde::Serialize;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "jh-browse")]
#[command(version, about = "Browse JobHive companies and applications")]
#[command(long_about = r#"Browse JobHive companies and applications from the command line.

EXAMPLES:
    # Search companies
    jh-browse companies --search rust

    # Company details and interview preparation
    jh-browse company 64f1c2
    jh-browse prep 64f1c2

    # Top hiring companies as JSON
    jh-browse --format json top

    # Applications received in the last week (business accounts)
    jh-browse applicants --days 7

    # Move an application forward
    jh-browse set-status 650a9e interview

EXIT CODES:
    0 - Success (including empty results)
    1 - Network, storage or configuration error, or update not accepted
    2 - Not signed in, or the token was rejected
    3 - Invalid input
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search companies by name
    Companies {
        /// Search text (empty lists every company)
        #[arg(short, long, default_value = "")]
        search: String,
    },

    /// Show one company
    Company {
        /// Company id
        id: String,
    },

    /// List the top hiring companies
    Top,

    /// Show interview preparation for a company
    Prep {
        /// Company id
        company_id: String,
    },

    /// List applications received by the signed-in business
    Applicants {
        /// Only count and list applications from the last N days
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Change the status of a received application
    SetStatus {
        /// Application id
        id: String,

        /// New status (pending, reviewed, interview, accepted, rejected)
        status: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env().with_verbose(cli.verbose).init();

    if let Err(e) = run(cli).await {
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

async fn run(cli: Cli) -> Result<()> {
    let json = cli.format == "json";
    let service = JobHiveService::new().context("Failed to initialize JobHive")?;

    match cli.command {
        Commands::Companies { search } => {
            let companies = into_data(service.api().companies(&search).load().await)?;
            output(json, &*companies, |companies| {
                if companies.is_empty() {
                    println!("No companies found");
                }
                for company in companies {
                    print_company_line(company);
                }
            })
        }
        Commands::Company { id } => {
            let company = into_data(service.api().company(Some(&id)).load().await)?;
            output(json, &*company, print_company)
        }
        Commands::Top => {
            let top = into_data(service.api().top_companies().load().await)?;
            output(json, &*top, print_top_companies)
        }
        Commands::Prep { company_id } => {
            let prep = into_data(service.api().interview_prep(Some(&company_id)).load().await)?;
            output(json, &*prep, print_prep)
        }
        Commands::Applicants { days } => {
            service.refresh_applicants().await.map_err(JobHiveError::from)?;
            let applicants = service.applicants();
            let Some(days) = days else {
                return output(json, &applicants.applications(), |applications| {
                    print_applications(applications);
                    println!("{} applications", applications.len());
                });
            };

            let now = Utc::now();
            let window = RecentApplications {
                days,
                count: applicants.applicants_in_last_n_days_at(days, now),
                applications: applicants.applications_in_last_n_days_at(days, now),
            };
            output(json, &window, |window| {
                print_applications(&window.applications);
                println!("{} applications in the last {} days", window.count, window.days);
            })
        }
        Commands::SetStatus { id, status } => {
            let status: ApplicationStatus = status.parse().map_err(JobHiveError::InvalidInput)?;
            if !service.update_status_and_sync(&id, status).await {
                anyhow::bail!("Status of application {} was not updated", id);
            }
            if json {
                println!("{}", serde_json::json!({"id": id, "status": status}));
            } else {
                println!("Application {} is now {}", id, status);
            }
            Ok(())
        }
    }
}

/// Applications received within a window of days, with their count
#[derive(Serialize)]
struct RecentApplications {
    days: u32,
    count: usize,
    applications: Vec<Application>,
}

/// Surface the query error, or the loaded data
fn into_data<T>(state: QueryState<T>) -> Result<Arc<T>> {
    if let Some(error) = state.error {
        return Err(JobHiveError::from(error).into());
    }
    state.data.context("No data returned")
}

fn output<T, F>(json: bool, value: &T, print_text: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T),
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print_text(value);
    }
    Ok(())
}

fn print_company_line(company: &Company) {
    match &company.location {
        Some(location) => println!("{}  {} ({})", company.id, company.name, location),
        None => println!("{}  {}", company.id, company.name),
    }
}

fn print_company(company: &Company) {
    println!("{}", company.name);
    let fields = [
        ("Location", &company.location),
        ("Industry", &company.industry),
        ("Website", &company.website),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {}: {}", label, value);
        }
    }
    if let Some(description) = &company.description {
        println!();
        println!("{}", description);
    }
}

fn print_top_companies(top: &Vec<TopCompany>) {
    for (rank, company) in top.iter().enumerate() {
        println!("{:>2}. {} ({} open jobs)", rank + 1, company.name, company.job_count);
    }
}

fn print_prep(prep: &InterviewPrep) {
    if prep.questions.is_empty() {
        println!("No interview questions for {}", prep.company_id);
        return;
    }
    for (i, question) in prep.questions.iter().enumerate() {
        match &question.category {
            Some(category) => println!("{}. [{}] {}", i + 1, category, question.question),
            None => println!("{}. {}", i + 1, question.question),
        }
        if let Some(answer) = &question.answer {
            println!("   {}", answer);
        }
    }
}

fn print_applications(applications: &[Application]) {
    if applications.is_empty() {
        println!("No applications");
        return;
    }
    for application in applications {
        println!(
            "{}  {}  {:<9}  {}",
            application.id,
            application.applied_at.format("%Y-%m-%d %H:%M"),
            application.status.as_str(),
            application.applicant_name.as_deref().unwrap_or("-")
        );
    }
}
