//! ModReview - moderation review client CLI
//!
//! The `modreview` command lets a reviewer work the moderation queue from a
//! terminal.
//!
//! ## Commands
//!
//! - `login` / `logout` / `whoami`: session management
//! - `tasks`: list review queues
//! - `assign`: take a task from the review-needed queue
//! - `justify`: submit a classification and justification, wait for the worker
//! - `complete`: mark a reviewed task as done
//! - `two-factor`: TOTP setup

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use modreview_api::{ApiClient, ApiConfig, ApiError, ChangePassword, ReviewTask, SubmittedTask};
use modreview_core::metrics::METRICS;
use modreview_core::obs::ExchangeSpan;
use modreview_core::{
    ClassificationSet, ExchangeConfig, ExchangeController, ExchangeState, FileTokenStore,
    ReviewResult, ReviewSubmission, Session,
};
use modreview_transport::WsConnector;

#[derive(Parser)]
#[command(name = "modreview")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Human-in-the-loop moderation review client", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON listings
    #[arg(long, global = true)]
    json: bool,

    /// Backend REST root
    #[arg(long, global = true, env = "MODREVIEW_API_URL")]
    api_url: Option<String>,

    /// Where tokens and the profile are kept between runs
    #[arg(
        long,
        global = true,
        env = "MODREVIEW_SESSION_FILE",
        default_value = ".modreview/session.json"
    )]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "MODREVIEW_PASSWORD", hide_env_values = true)]
        password: String,

        /// Authenticator code, for accounts with two-factor auth
        #[arg(long)]
        otp: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged-in user and role
    Whoami,

    /// List tasks
    Tasks {
        #[command(subcommand)]
        queue: TaskQueue,
    },

    /// Assign a task from the review-needed queue to yourself
    Assign {
        /// Task ID
        task: String,
    },

    /// Submit a review and wait for the worker's correction
    Justify {
        /// Task ID
        #[arg(short, long)]
        task: String,

        /// Label or wire value, e.g. "Highly Offensive" or "safe"
        #[arg(short, long)]
        classification: String,

        /// Why this label applies
        #[arg(short, long)]
        justification: String,

        /// Seconds to wait for each worker reply (0 waits indefinitely)
        #[arg(long)]
        timeout: Option<u64>,

        /// Reviewer socket URL (derived from the API URL by default)
        #[arg(long, env = "MODREVIEW_WS_URL")]
        ws_url: Option<String>,

        /// Mark the task complete once the worker answers
        #[arg(long)]
        complete: bool,
    },

    /// Mark a reviewed task as complete
    Complete {
        /// Task ID
        task: String,
    },

    /// Two-factor authentication
    TwoFactor {
        #[command(subcommand)]
        action: TwoFactorAction,
    },

    /// Change the account password
    ChangePassword {
        #[arg(long, env = "MODREVIEW_PASSWORD", hide_env_values = true)]
        current: String,

        #[arg(long)]
        new: String,
    },

    /// Change the account username
    Rename {
        username: String,
    },
}

#[derive(Subcommand)]
enum TaskQueue {
    /// Tasks assigned to you and awaiting your review
    Pending,
    /// Tasks flagged for human review
    ReviewNeeded,
    /// Tasks currently assigned to you
    Assigned,
    /// Tasks you submitted
    Mine,
}

#[derive(Subcommand)]
enum TwoFactorAction {
    /// Show the QR code URL and secret for an authenticator app
    Setup,
    /// Confirm setup with a code from the authenticator app
    Verify { code: String },
    /// Turn two-factor auth off
    Disable {
        #[arg(long, env = "MODREVIEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    modreview_core::init_tracing(cli.json, level);

    let session = Session::new(Arc::new(FileTokenStore::new(&cli.session_file)));
    let config = match cli.api_url.as_deref() {
        Some(url) => ApiConfig::new(url),
        None => ApiConfig::from_env(),
    };
    let api = ApiClient::new(config, session.clone()).context("Failed to create API client")?;

    let result = match cli.command {
        Commands::Login {
            username,
            password,
            otp,
        } => cmd_login(&api, &username, &password, otp.as_deref()).await,
        Commands::Logout => cmd_logout(&api).await,
        Commands::Whoami => cmd_whoami(&session).await,
        Commands::Tasks { queue } => cmd_tasks(&api, queue, cli.json).await,
        Commands::Assign { task } => cmd_assign(&api, &task).await,
        Commands::Justify {
            task,
            classification,
            justification,
            timeout,
            ws_url,
            complete,
        } => {
            let request = JustifyRequest {
                task,
                classification,
                justification,
                timeout,
                ws_url,
                complete,
            };
            cmd_justify(&api, session.clone(), request).await
        }
        Commands::Complete { task } => cmd_complete(&api, &task).await,
        Commands::TwoFactor { action } => cmd_two_factor(&api, action).await,
        Commands::ChangePassword { current, new } => {
            cmd_change_password(&api, &current, &new).await
        }
        Commands::Rename { username } => cmd_rename(&api, &username).await,
    };

    METRICS.flush();
    result
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

async fn cmd_login(api: &ApiClient, username: &str, password: &str, otp: Option<&str>) -> Result<()> {
    match api.login(username, password, otp).await {
        Ok(login) => {
            println!(
                "Logged in as {} ({})",
                login.user_data.username,
                login.user_data.role()
            );
            Ok(())
        }
        Err(ApiError::OtpRequired) => {
            bail!("This account uses two-factor auth; pass the authenticator code with --otp")
        }
        Err(err) => Err(err).context("Login failed"),
    }
}

async fn cmd_logout(api: &ApiClient) -> Result<()> {
    api.logout().await?;
    println!("Logged out");
    Ok(())
}

async fn cmd_whoami(session: &Session) -> Result<()> {
    match session.profile().await? {
        Some(profile) => {
            println!("{} <{}>", profile.username, profile.email);
            println!("Role: {}", profile.role());
        }
        None if session.is_logged_in().await? => println!("Logged in (no profile stored)"),
        None => println!("Not logged in. Run 'modreview login' first."),
    }
    Ok(())
}

async fn cmd_change_password(api: &ApiClient, current: &str, new: &str) -> Result<()> {
    let body = ChangePassword {
        current_password: current.to_string(),
        new_password: new.to_string(),
        confirm_password: new.to_string(),
    };
    let reply = api.change_password(&body).await?;
    report_reply(reply.success, reply.message.as_deref(), "Password changed")
}

async fn cmd_rename(api: &ApiClient, username: &str) -> Result<()> {
    let reply = api.update_username(username).await?;
    report_reply(reply.success, reply.message.as_deref(), "Username updated")
}

fn report_reply(success: bool, message: Option<&str>, fallback: &str) -> Result<()> {
    let message = message.unwrap_or(fallback);
    if !success {
        bail!("{message}");
    }
    println!("{message}");
    Ok(())
}

async fn cmd_two_factor(api: &ApiClient, action: TwoFactorAction) -> Result<()> {
    match action {
        TwoFactorAction::Setup => {
            let setup = api.two_factor_setup().await?;
            if setup.is_verified {
                println!("Two-factor auth is already enabled.");
                return Ok(());
            }
            println!("Scan with your authenticator app:");
            println!("  {}", setup.qr_code_url);
            println!("Or enter the secret manually: {}", setup.secret_key);
            println!("Then run 'modreview two-factor verify <code>'.");
        }
        TwoFactorAction::Verify { code } => {
            if !api.verify_two_factor(&code).await? {
                bail!("Code was not accepted");
            }
            println!("Two-factor auth enabled");
        }
        TwoFactorAction::Disable { password } => {
            if !api.disable_two_factor(&password).await? {
                bail!("Backend refused to disable two-factor auth");
            }
            println!("Two-factor auth disabled");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn cmd_tasks(api: &ApiClient, queue: TaskQueue, json: bool) -> Result<()> {
    match queue {
        TaskQueue::Pending => print_review_tasks(&api.pending_reviews().await?, json),
        TaskQueue::ReviewNeeded => print_review_tasks(&api.review_needed().await?, json),
        TaskQueue::Assigned => print_review_tasks(&api.assigned_tasks().await?, json),
        TaskQueue::Mine => print_submitted_tasks(&api.my_tasks().await?, json),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_review_tasks(tasks: &[ReviewTask], json: bool) -> Result<()> {
    if json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for task in tasks {
        let confidence = task
            .confidence
            .map(|c| format!("{:.0}%", c * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<18} {:>5}  {:<20} {}",
            task.id,
            task.ai_classification.as_deref().unwrap_or("-"),
            confidence,
            task.processing_status,
            preview(task.text.as_deref().unwrap_or(""), 50),
        );
    }
    Ok(())
}

fn print_submitted_tasks(tasks: &[SubmittedTask], json: bool) -> Result<()> {
    if json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for task in tasks {
        println!(
            "{:<8} {:<6} {:<12} {}",
            task.id,
            task.task_type.as_deref().unwrap_or("-"),
            task.status,
            task.title.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

async fn cmd_assign(api: &ApiClient, task: &str) -> Result<()> {
    let reply = api.assign_task(task).await?;
    if !reply.is_success() {
        bail!("Could not assign task {task}: {}", reply.message);
    }
    println!("Assigned task {task}: {}", reply.message);
    Ok(())
}

async fn cmd_complete(api: &ApiClient, task: &str) -> Result<()> {
    let reply = api.complete_review(task).await?;
    if !reply.is_success() {
        bail!("Could not complete review of task {task}: {}", reply.message);
    }
    println!("Review of task {task} completed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Justify
// ---------------------------------------------------------------------------

struct JustifyRequest {
    task: String,
    classification: String,
    justification: String,
    timeout: Option<u64>,
    ws_url: Option<String>,
    complete: bool,
}

/// Map user input to a wire value, listing the options on a miss.
fn resolve_classification(set: &ClassificationSet, input: &str) -> Result<String> {
    match set.resolve(input) {
        Some(option) => Ok(option.value.clone()),
        None => {
            let labels: Vec<&str> = set.options().iter().map(|o| o.label.as_str()).collect();
            bail!(
                "Unknown classification '{input}'. Choose one of: {}",
                labels.join(", ")
            )
        }
    }
}

fn exchange_config(request: &JustifyRequest, endpoint: String) -> ExchangeConfig {
    let mut config = ExchangeConfig::from_env().with_endpoint(endpoint);
    if let Some(secs) = request.timeout {
        config = config.with_response_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }
    config
}

async fn cmd_justify(api: &ApiClient, session: Session, request: JustifyRequest) -> Result<()> {
    let _span = ExchangeSpan::enter(&request.task);

    let endpoint = match request.ws_url.clone() {
        Some(url) => url,
        None => api
            .websocket_endpoint()
            .context("Cannot derive reviewer socket URL")?,
    };
    let config = exchange_config(&request, endpoint);
    let value = resolve_classification(&config.classifications, &request.classification)?;

    let controller = ExchangeController::spawn(config, session, Arc::new(WsConnector::default()));
    let mut states = controller.subscribe().await?;

    let submission = ReviewSubmission::new(&request.task, value, &request.justification);
    controller
        .submit(submission)
        .await
        .context("Submission rejected")?;
    info!(task_id = %request.task, "review submitted");

    let outcome = loop {
        tokio::select! {
            state = states.recv() => {
                let Some(state) = state else {
                    bail!("Exchange stopped unexpectedly");
                };
                println!("-> {state}");
                if state.is_terminal() || state == ExchangeState::Idle {
                    break state;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.cancel().await?;
                println!("Cancelled");
                return Ok(());
            }
        }
    };

    match outcome {
        ExchangeState::Resolved(result) => {
            print_result(&result);
            if request.complete {
                cmd_complete(api, &request.task).await?;
            }
            Ok(())
        }
        ExchangeState::Failed(err) => {
            Err(err).with_context(|| format!("Review of task {} failed", request.task))
        }
        _ => Ok(()),
    }
}

fn print_result(result: &ReviewResult) {
    println!();
    if result.classification_changed() {
        println!(
            "Corrected: {} -> {}",
            result.original_classification, result.corrected_classification
        );
    } else {
        println!("Confirmed: {}", result.corrected_classification);
    }
    println!("Confidence: {}%", result.confidence_percent());
    if !result.learning_summary.is_empty() {
        println!("Summary: {}", result.learning_summary);
    }
    if !result.similar_examples.is_empty() {
        println!("Similar examples:");
        for example in &result.similar_examples {
            println!("  - {example}");
        }
    }
}
