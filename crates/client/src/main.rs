// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use vedu::api::Operation;
use vedu::config::ClientConfig;
use vedu::education::{EducationClient, StudySort, VoteType};
use vedu::error::{ApiError, AuthError};

/// Command-line client for the education backend.
#[derive(Debug, Parser)]
#[command(name = "vedu", version, about)]
struct Cli {
    #[command(flatten)]
    config: ClientConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with email and password and persist the session.
    Login {
        #[arg(long, env = "VEDU_EMAIL")]
        email: String,
        #[arg(long, env = "VEDU_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show the stored session without touching the network.
    Status,
    /// Register a new account.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "VEDU_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: String,
    },
    /// List subjects.
    Subjects,
    /// Show the signed-in user's profile.
    Profile,
    /// List studies for a subject, or the caller's own studies.
    Studies {
        #[arg(long)]
        subject: Option<String>,
        /// Defaults to hot for a subject and new for your own studies.
        #[arg(long, value_enum)]
        sort: Option<StudySort>,
    },
    /// Vote on a study.
    Vote {
        study: String,
        #[arg(value_enum)]
        vote: VoteType,
    },
    /// Send an arbitrary authenticated request.
    Call {
        method: String,
        /// Path relative to the backend base URL, e.g. rest/v1/subjects.
        path: String,
        /// JSON request body.
        #[arg(long)]
        json: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli.config);

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        if session_ended(&e) {
            eprintln!("session is no longer valid; run `vedu login` again");
        }
        std::process::exit(1);
    }
}

fn init_tracing(config: &ClientConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output.
    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

fn session_ended(e: &anyhow::Error) -> bool {
    if let Some(api) = e.downcast_ref::<ApiError>() {
        return api.ends_session();
    }
    matches!(
        e.downcast_ref::<AuthError>(),
        Some(AuthError::NoCredential | AuthError::RefreshFailed(_))
    )
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = cli.config.build_client()?;
    let restored = client.credentials().restore().await;
    debug!(restored, "credential store initialised");

    let edu = EducationClient::new(client.clone(), cli.config.subject_candidates());

    match cli.command {
        Command::Login { email, password } => {
            let user = client.sign_in(&email, &password).await?;
            print_json(&json!({
                "user": user,
                "expires_at_ms": client.credentials().store().expires_at_epoch_ms(),
            }))
        }
        Command::Logout => {
            client.sign_out().await;
            print_json(&json!({ "signed_in": false }))
        }
        Command::Status => {
            let manager = client.credentials();
            let store = manager.store();
            print_json(&json!({
                "signed_in": store.get().is_some(),
                "valid": store.is_valid(manager.margin()),
                "expires_at_ms": store.expires_at_epoch_ms(),
                "user_id": manager.user_id(),
            }))
        }
        Command::Signup { email, password, name } => {
            print_json(&edu.sign_up(&email, &password, &name).await?)
        }
        Command::Subjects => print_json(&edu.subjects().await?),
        Command::Profile => print_json(&edu.user_profile().await?),
        Command::Studies { subject, sort } => {
            print_json(&edu.studies(subject.as_deref(), sort).await?)
        }
        Command::Vote { study, vote } => {
            let tally = edu.vote_study(&study, vote).await?;
            print_json(&json!({ "tally": tally, "score": tally.score() }))
        }
        Command::Call { method, path, json } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            let mut op = Operation::new(method, path);
            if let Some(body) = json {
                op = op.json(serde_json::from_str::<Value>(&body)?);
            }
            let response = client.execute(&op).await?;
            match response.json::<Value>() {
                Ok(value) => print_json(&json!({ "status": response.status, "body": value })),
                Err(_) => {
                    print_json(&json!({ "status": response.status, "body": response.text() }))
                }
            }
        }
    }
}
