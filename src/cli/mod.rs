//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the
//! appropriate commands.

pub mod account;
pub mod chat;
pub mod history;
pub mod redeem;
pub mod status;

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::api::client::HttpBackend;
use crate::core::constants::{DEFAULT_BASE_URL, DEFAULT_SESSION_ID, PRODUCT_5_CHATS};
use crate::core::profile::ProfileStore;

#[derive(Parser)]
#[command(name = "relief")]
#[command(about = "A terminal client for the Relief chat service")]
#[command(
    long_about = "Relief is a terminal client for the Relief chat service. Conversations are \
metered by per-account chat credits; the backend keeps the authoritative balance and this \
client mirrors it.\n\n\
Getting started:\n\
  relief register you@example.com --password <pw>   Create an account (includes free chats)\n\
  relief login you@example.com --password <pw>      Sign in on this machine\n\
  relief chat                                       Start chatting\n\n\
Purchases:\n\
  relief redeem <token>                             Verify a billing-provider purchase token\n\
                                                    and credit the chats to your account\n\n\
Diagnostics go to stderr; set RELIEF_LOG=relief=debug for verbose output."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend base URL (overrides the profile and the built-in default)
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Session id sent with chat messages
    #[arg(short = 's', long, global = true, value_name = "SESSION")]
    pub session: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a Relief account and sign in
    Register {
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value_t = 30)]
        age: u32,
        #[arg(long, default_value = "unspecified")]
        sex: String,
    },
    /// Sign in to an existing account
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Start the interactive chat (default)
    Chat,
    /// Show the remaining chat balance
    Status,
    /// Submit a billing-provider purchase token for verification
    Redeem {
        token: String,
        /// Product the token was issued for
        #[arg(long, default_value = PRODUCT_5_CHATS)]
        product: String,
    },
    /// List past chat sessions
    History,
    /// Show the messages of a past chat session
    Show {
        #[arg(default_value = "1")]
        session: String,
    },
    /// Ask the backend to hide your chat history
    HideHistory,
}

pub async fn run_cli(args: Args) -> Result<(), Box<dyn Error>> {
    let store = Arc::new(ProfileStore::open_default()?);

    let base_url = args
        .base_url
        .clone()
        .or_else(|| store.snapshot().base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let backend = Arc::new(HttpBackend::new(&base_url)?);

    let session = args
        .session
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Register {
            email,
            password,
            age,
            sex,
        } => account::register(backend, store, &email, age, &sex, &password).await,
        Commands::Login { email, password } => {
            // An explicit base URL at login sticks for future invocations.
            if let Some(url) = args.base_url.as_deref() {
                store.set_base_url(url)?;
            }
            account::login(backend, store, &email, &password).await
        }
        Commands::Chat => chat::run_chat(backend, store, &session).await,
        Commands::Status => status::show_status(backend, store).await,
        Commands::Redeem { token, product } => {
            redeem::redeem(backend, store, token, product).await
        }
        Commands::History => history::list(backend, store).await,
        Commands::Show { session } => history::show(backend, store, &session).await,
        Commands::HideHistory => history::hide(backend, store).await,
    }
}

/// Commands past sign-in need an account; fail with a pointer to `login`
/// rather than sending an empty email to the backend.
pub(crate) fn require_email(store: &ProfileStore) -> Result<String, Box<dyn Error>> {
    store.active_email().ok_or_else(|| {
        "Not signed in. Run `relief login <email> --password <password>` first."
            .to_string()
            .into()
    })
}
