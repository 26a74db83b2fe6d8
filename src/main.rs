//! diary 命令行入口
//! 在带认证的客户端之上提供日记、综合日记、回顾与用户管理命令

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use diary_client::{
    auth::{CredentialStore, SessionState, SignOutReason},
    client::ApiClient,
    config::AppConfig,
    diary::DayStatus,
    error::ClientError,
    models::{
        auth::Landing,
        entry::{EntryEdit, SummaryGeneration},
        retrospect::RetrospectPeriod,
        user::RegisterForm,
    },
    services::Services,
    telemetry,
};
use secrecy::Secret;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Personal diary client
#[derive(Parser)]
#[command(name = "diary")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        user_id: String,
        /// Password (read from stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Create a new account
    Register {
        user_id: String,
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        /// Password (read from stdin when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Clear the stored session
    Logout,

    /// Show the signed-in identity
    Whoami,

    /// Write a new diary entry from free text
    Write {
        /// Raw input; joined with spaces when given as several words
        #[arg(required = true)]
        input: Vec<String>,
    },

    /// List entries, optionally for one day (YYYY-MM-DD)
    Entries {
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Show one entry
    Show { id: i64 },

    /// Edit an entry: regenerate from new input, or replace the text
    Edit {
        id: i64,
        /// Regenerate from this raw input
        #[arg(long, conflicts_with_all = ["text", "hashtags"])]
        input: Option<String>,
        /// Replace the generated text
        #[arg(long, required_unless_present = "input")]
        text: Option<String>,
        /// Comma-separated hashtags for a manual edit
        #[arg(long, default_value = "")]
        hashtags: String,
    },

    /// Delete an entry
    Delete { id: i64 },

    /// Daily summary commands
    #[command(subcommand)]
    Summary(SummaryCommand),

    /// Retrospect over a period, a date range, or a month
    Retrospect {
        /// 7d, 1m or 1y
        #[arg(long, conflicts_with_all = ["from", "recent", "year"])]
        period: Option<RetrospectPeriod>,
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
        /// Last week, month and year together
        #[arg(long)]
        recent: bool,
        #[arg(long, requires = "month")]
        year: Option<i32>,
        #[arg(long, requires = "year")]
        month: Option<u32>,
        /// With --year/--month: emotion distribution and insight instead of statistics
        #[arg(long, requires = "year")]
        insight: bool,
    },

    /// User administration (staff only)
    #[command(subcommand)]
    Users(UsersCommand),
}

#[derive(Subcommand)]
enum SummaryCommand {
    /// Show the summary of a day and whether it is out of date
    Show { date: NaiveDate },
    /// Generate (or regenerate) the summary of a day
    Generate { date: NaiveDate },
    /// Replace the summary text
    Edit { id: i64, text: String },
    /// Delete a summary
    Delete { id: i64 },
    /// List days with entries but no summary
    Missing,
}

#[derive(Subcommand)]
enum UsersCommand {
    List,
    /// Flip a user's active flag
    Toggle { id: i64 },
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载 .env 文件：DIARY_ENV 指定环境时优先加载 .env.<env>
    if let Ok(env) = std::env::var("DIARY_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    telemetry::init_telemetry(&config);

    let store = Arc::new(CredentialStore::file(&config.session.path));
    let client = Arc::new(ApiClient::new(&config.api, store)?);
    let services = Services::new(client);

    match run(cli.command, &services).await {
        Ok(()) => Ok(()),
        Err(err) => {
            if let SessionState::SignedOut(SignOutReason::RefreshFailed) =
                services.client.session().current()
            {
                eprintln!("Session expired and was cleared. Run `diary login` again.");
            }
            match err.downcast_ref::<ClientError>() {
                Some(client_err) => {
                    tracing::debug!(error = %client_err, "Command failed");
                    eprintln!("{}", client_err.user_message());
                    if let ClientError::Http { body, .. } = client_err {
                        if !body.is_empty() {
                            eprintln!("{}", body);
                        }
                    }
                    std::process::exit(1);
                }
                None => Err(err),
            }
        }
    }
}

async fn run(command: Commands, services: &Services) -> anyhow::Result<()> {
    match command {
        Commands::Login { user_id, password } => {
            let password = password_or_prompt(password)?;
            let signed_in = services.auth.login(&user_id, &password).await?;
            let view = match signed_in.landing {
                Landing::Admin => "admin",
                Landing::Home => "home",
            };
            println!(
                "Signed in as {} ({} view)",
                display_name(&signed_in.identity.username, &signed_in.identity.user_id),
                view
            );
        }
        Commands::Register {
            user_id,
            username,
            email,
            password,
        } => {
            let (password, confirm) = match password {
                Some(password) => (Secret::new(password.clone()), Secret::new(password)),
                None => (
                    prompt_secret("Password: ")?,
                    prompt_secret("Confirm password: ")?,
                ),
            };
            let form = RegisterForm {
                user_id,
                username,
                email,
                password,
                password_confirm: confirm,
            };
            let user = services.auth.register(&form).await?;
            println!("Registered {}. You can now sign in.", user.user_id);
        }
        Commands::Logout => {
            services.auth.logout()?;
            println!("Signed out");
        }
        Commands::Whoami => {
            let identity = services.auth.current_identity()?;
            println!(
                "{} (id: {}, staff: {})",
                display_name(&identity.username, &identity.user_id),
                identity.user_id,
                identity.is_staff
            );
        }
        Commands::Write { input } => {
            let entry = services.diary.generate(&input.join(" ")).await?;
            print_json(&entry)?;
        }
        Commands::Entries { date } => match date {
            Some(date) => print_json(&services.diary.entries_on(date).await?)?,
            None => print_json(&services.diary.feed().await?)?,
        },
        Commands::Show { id } => print_json(&services.diary.entry(id).await?)?,
        Commands::Edit {
            id,
            input,
            text,
            hashtags,
        } => {
            let edit = match (input, text) {
                (Some(raw_input), _) => EntryEdit::Regenerate { raw_input },
                (None, Some(text)) => EntryEdit::manual(text, &hashtags),
                (None, None) => anyhow::bail!("either --input or --text is required"),
            };
            print_json(&services.diary.edit(id, &edit).await?)?;
        }
        Commands::Delete { id } => {
            services.diary.delete(id).await?;
            println!("Deleted entry {}", id);
        }
        Commands::Summary(command) => run_summary(command, services).await?,
        Commands::Retrospect {
            period,
            from,
            to,
            recent,
            year,
            month,
            insight,
        } => {
            let retrospect = &services.retrospect;
            if recent {
                let reports = retrospect.recent().await?;
                for (label, report) in [
                    ("week", &reports.week),
                    ("month", &reports.month),
                    ("year", &reports.year),
                ] {
                    println!("== {} ==", label);
                    print_json(report)?;
                }
            } else if let (Some(from), Some(to)) = (from, to) {
                print_json(&retrospect.for_range(from, to).await?)?;
            } else if let (Some(year), Some(month), true) = (year, month, insight) {
                print_json(&retrospect.monthly_insight(year, month).await?)?;
            } else if let (Some(year), Some(month)) = (year, month) {
                match retrospect.monthly(year, month).await? {
                    Some(report) => print_json(&report)?,
                    None => println!("No entries in {}-{:02}", year, month),
                }
            } else {
                let period = period.unwrap_or(RetrospectPeriod::Week);
                print_json(&retrospect.for_period(period).await?)?;
            }
        }
        Commands::Users(command) => match command {
            UsersCommand::List => print_json(&services.users.list().await?)?,
            UsersCommand::Toggle { id } => print_json(&services.users.toggle_active(id).await?)?,
            UsersCommand::Delete { id } => {
                services.users.delete(id).await?;
                println!("Deleted user {}", id);
            }
        },
    }
    Ok(())
}

async fn run_summary(command: SummaryCommand, services: &Services) -> anyhow::Result<()> {
    let diary = &services.diary;
    match command {
        SummaryCommand::Show { date } => match diary.day_status(date).await? {
            DayStatus::Exists { summary, stale } => {
                print_json(&summary)?;
                if stale {
                    println!("Entries changed since this summary was generated; regenerate it with `diary summary generate {}`", date);
                }
            }
            DayStatus::CanGenerate => {
                println!("No summary for {} yet; run `diary summary generate {}`", date, date)
            }
            DayStatus::NoEntries => println!("No entries on {}", date),
        },
        SummaryCommand::Generate { date } => match diary.generate_daily_summary(date).await? {
            SummaryGeneration::Generated(summary) => print_json(&summary)?,
            SummaryGeneration::NoEntries { message } => println!("{}", message),
            SummaryGeneration::Failed { error } => anyhow::bail!("summary generation failed: {}", error),
        },
        SummaryCommand::Edit { id, text } => {
            diary.edit_daily_summary(id, &text).await?;
            println!("Updated summary {}", id);
        }
        SummaryCommand::Delete { id } => {
            diary.delete_daily_summary(id).await?;
            println!("Deleted summary {}", id);
        }
        SummaryCommand::Missing => {
            let dates = diary.missing_summaries().await?;
            if dates.is_empty() {
                println!("Every day with entries has a summary");
            }
            for date in dates {
                println!("{}", date);
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn display_name<'a>(username: &'a str, user_id: &'a str) -> &'a str {
    if username.is_empty() {
        user_id
    } else {
        username
    }
}

fn password_or_prompt(password: Option<String>) -> anyhow::Result<Secret<String>> {
    match password {
        Some(password) => Ok(Secret::new(password)),
        None => prompt_secret("Password: "),
    }
}

fn prompt_secret(prompt: &str) -> anyhow::Result<Secret<String>> {
    eprint!("{}", prompt);
    std::io::stderr().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(Secret::new(line.trim_end_matches(['\r', '\n']).to_string()))
}
