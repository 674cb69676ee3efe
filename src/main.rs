// blindmatch - participant client for BlindMatch live events
//
// Usage:
//   blindmatch run [--token T] [--show-token] [--url URL]   Follow the event live
//   blindmatch status                                       Print the current screen once
//   blindmatch register --name NAME [--phone P] [--survey FILE]
//   blindmatch logout                                       Forget this device
//   blindmatch account <operation>                          Next-event signup, vibe, phone lookup
//   blindmatch contact --name N --email E --message M

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use blindmatch_client::client::app;
use blindmatch_client::client::config::{Config, Transport};
use blindmatch_client::client::http::{send_contact, ContactMessage, HttpApi};
use blindmatch_client::client::logging::init_logging;
use blindmatch_client::client::poller::EventPoller;
use blindmatch_client::client::push::PushFeed;
use blindmatch_client::client::storage::FileStore;
use blindmatch_client::core::io_traits::{EventFeed, ParticipantApi, SystemClock};
use blindmatch_client::core::protocol::ParticipantAction;
use blindmatch_client::core::{AccountAction, ClientSession, LaunchParams};

type Session = ClientSession<HttpApi, FileStore, SystemClock>;

/// BlindMatch participant client
#[derive(Parser)]
#[command(name = "blindmatch", version, about = "Participant client for BlindMatch live events")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = Config::CONFIG_FILENAME)]
    config: PathBuf,

    /// Log to stderr regardless of the config file
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the event live and answer prompts on stdin
    Run {
        /// Secure token (overrides the stored one)
        #[arg(long)]
        token: Option<String>,

        /// Show the freshly created token once
        #[arg(long)]
        show_token: bool,

        /// Launch link carrying ?token= and ?showToken=1
        #[arg(long, conflicts_with = "token")]
        url: Option<String>,
    },

    /// Resolve the stored token and print the current screen once
    Status,

    /// Create a token and register for the event
    Register {
        #[arg(long)]
        name: String,

        #[arg(long)]
        phone: Option<String>,

        /// JSON file with survey answers
        #[arg(long)]
        survey: Option<PathBuf>,
    },

    /// Forget the participant stored on this device
    Logout,

    /// Account operations
    Account {
        #[command(subcommand)]
        operation: AccountCommand,
    },

    /// Send a message to the organizers
    Contact {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        message: String,
    },
}

#[derive(Subcommand)]
enum AccountCommand {
    /// Check whether you are signed up for the next event
    CheckSignup,
    /// Sign up for the next event
    Signup,
    /// Sign up for every future event automatically
    EnableAutoSignup,
    DisableAutoSignup,
    /// Withdraw from the next event
    Unregister,
    /// Say whether you want to be matched again with your partner
    MatchPreference {
        /// yes or no
        #[arg(value_parser = clap::builder::BoolishValueParser::new())]
        wants_match: bool,
    },
    /// Generate your vibe analysis
    VibeAnalysis,
    /// Update vibe question answers from a JSON file
    VibeQuestions { answers: PathBuf },
    /// Find a registration by phone number
    PhoneLookup { phone: String },
    /// Sign up for the next event by phone number
    PhoneSignup { phone: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(
        cli.verbose || config.logging.console,
        config.log_file_path(&cli.config),
    );
    info!(server = %config.server.url, "[APP] Starting");

    match cli.command {
        Commands::Run {
            token,
            show_token,
            url,
        } => {
            let launch = match url {
                Some(url) => LaunchParams::from_url(&url).context("invalid launch URL")?,
                None => LaunchParams::new(token, show_token),
            };
            cmd_run(&cli.config, &config, launch)
        }
        Commands::Status => cmd_status(&cli.config, &config),
        Commands::Register {
            name,
            phone,
            survey,
        } => cmd_register(&cli.config, &config, &name, phone.as_deref(), survey),
        Commands::Logout => {
            let mut session = open_session(&cli.config, &config)?;
            session.logout();
            println!("Logged out.");
            Ok(())
        }
        Commands::Account { operation } => cmd_account(&cli.config, &config, operation),
        Commands::Contact {
            name,
            email,
            message,
        } => {
            send_contact(
                &config.contact.formspree_url,
                &ContactMessage {
                    name,
                    email,
                    message,
                },
            )?;
            println!("Message sent.");
            Ok(())
        }
    }
}

fn open_session(config_path: &Path, config: &Config) -> Result<Session> {
    let api = HttpApi::new(&config.server)?;
    let store = FileStore::open(config.storage_path(config_path));
    Ok(ClientSession::new(api, store, SystemClock))
}

fn print_notices(events: &[blindmatch_client::core::SessionEvent]) {
    for event in events {
        if let Some(notice) = app::describe_event(event) {
            println!("{}", notice);
        }
    }
}

fn cmd_run(config_path: &Path, config: &Config, launch: LaunchParams) -> Result<()> {
    let mut session = open_session(config_path, config)?;
    let events = session.bootstrap(&launch);
    print_notices(&events);
    if session.has_pending_token() {
        println!("Connection problem, retrying in the background.");
    }

    let mut feed: Box<dyn EventFeed> = match config.server.transport {
        Transport::Poll => {
            let poll_api = HttpApi::new(&config.server)?;
            let mut poller = EventPoller::new();
            poller.start(move || poll_api, config.server.poll_interval());
            Box::new(poller)
        }
        Transport::Websocket => {
            let token = session.participant().map(|p| p.secure_token.clone());
            let mut push = PushFeed::new(&config.server.url, token);
            push.connect();
            Box::new(push)
        }
    };

    println!("{}", app::HELP);
    app::run(&mut session, feed.as_mut(), config.server.tick_interval());
    Ok(())
}

fn cmd_status(config_path: &Path, config: &Config) -> Result<()> {
    let mut session = open_session(config_path, config)?;
    let events = session.bootstrap(&LaunchParams::default());
    print_notices(&events);
    if session.has_pending_token() {
        bail!("event server unreachable, try again later");
    }
    println!("{}", app::render_screen(&session));
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn cmd_register(
    config_path: &Path,
    config: &Config,
    name: &str,
    phone: Option<&str>,
    survey: Option<PathBuf>,
) -> Result<()> {
    let survey_data = match survey {
        Some(path) => read_json(&path)?,
        None => Value::Object(Default::default()),
    };
    let mut session = open_session(config_path, config)?;
    let events = session.register(name, phone, survey_data)?;
    print_notices(&events);
    println!("{}", app::render_screen(&session));
    Ok(())
}

fn cmd_account(
    config_path: &Path,
    config: &Config,
    operation: AccountCommand,
) -> Result<()> {
    let mut session = open_session(config_path, config)?;

    let action = match operation {
        // Phone lookups work without a token
        AccountCommand::PhoneLookup { phone } => {
            return print_answer(session.api().participant_action(
                &ParticipantAction::PhoneLookupData {
                    phone_number: phone,
                },
            )?);
        }
        AccountCommand::PhoneSignup { phone } => {
            return print_answer(session.api().participant_action(
                &ParticipantAction::PhoneLookupSignup {
                    phone_number: phone,
                },
            )?);
        }
        AccountCommand::CheckSignup => AccountAction::CheckNextEventSignup,
        AccountCommand::Signup => AccountAction::AutoSignupNextEvent,
        AccountCommand::EnableAutoSignup => AccountAction::EnableAutoSignup,
        AccountCommand::DisableAutoSignup => AccountAction::DisableAutoSignup,
        AccountCommand::Unregister => AccountAction::UnregisterNextEvent,
        AccountCommand::MatchPreference { wants_match } => {
            AccountAction::MatchPreference { wants_match }
        }
        AccountCommand::VibeAnalysis => AccountAction::GenerateVibeAnalysis,
        AccountCommand::VibeQuestions { answers } => AccountAction::UpdateVibeQuestions {
            answers: read_json(&answers)?,
        },
    };

    session.bootstrap(&LaunchParams::default());
    if session.has_pending_token() {
        bail!("event server unreachable, try again later");
    }
    print_answer(session.account_action(action)?)
}

fn print_answer(answer: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}
