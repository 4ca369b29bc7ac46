use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use ghostnote::auth::{AuthProvider, HostedAuth};
use ghostnote::chats::ChatList;
use ghostnote::composer::Composer;
use ghostnote::feed::Inbox;
use ghostnote::logging;
use ghostnote::realtime::{spawn_insert_listener, FeedHub};
use ghostnote::rest::RestStore;
use ghostnote::session::{self, Bootstrap, Session};
use ghostnote::store::{Message, Store};
use ghostnote::theme::{FileThemeStore, Theme, ThemePreference};
use ghostnote::thread::ChatThread;

/// Command-line client for Ghost Note.
///
/// Talks to the hosted row store over HTTP, to the auth service for
/// one-time login codes, and to the realtime feed over WebSocket.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "ghostnote", version, about)]
struct Cli {
    #[command(flatten)]
    opts: Opts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Opts {
    /// Data directory for session and settings [env: GHOSTNOTE_HOME] [default: ~/.ghostnote]
    #[arg(long, short = 'd')]
    data_dir: Option<PathBuf>,

    /// Row store base URL [env: GHOSTNOTE_API_URL] [default: http://127.0.0.1:54321/rest/v1]
    #[arg(long)]
    api_url: Option<String>,

    /// Auth service base URL [env: GHOSTNOTE_AUTH_URL] [default: http://127.0.0.1:54321/auth/v1]
    #[arg(long)]
    auth_url: Option<String>,

    /// Realtime feed WebSocket URL [env: GHOSTNOTE_FEED_URL] [default: ws://127.0.0.1:54321/feed/v1]
    #[arg(long)]
    feed_url: Option<String>,

    /// Backend API key [env: GHOSTNOTE_API_KEY]
    #[arg(long, short = 'k')]
    api_key: Option<String>,

    /// Public origin used to build share links [env: GHOSTNOTE_ORIGIN] [default: http://localhost:3000]
    #[arg(long)]
    origin: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Email a one-time login code
    Login {
        /// Address to send the code to
        email: String,
    },
    /// Exchange an emailed code for a local session
    Verify {
        email: String,
        /// The code from the email
        code: String,
    },
    /// Revoke the session and clear local credentials
    Logout,
    /// Print your shareable anonymous-message link
    Link,
    /// List messages sent to you, newest first
    Inbox,
    /// List conversations grouped by counterpart, most recent first
    Chats {
        /// Keep only conversations whose label contains this text
        #[arg(long, short = 'f')]
        filter: Option<String>,
    },
    /// Print the full history with one counterpart, oldest first
    Thread {
        /// Counterpart user id
        counterpart: String,
    },
    /// Send a message to a counterpart under your own id
    Send {
        /// Recipient user id
        recipient: String,
        message: String,
    },
    /// Send an anonymous message through someone's share link
    Anon {
        /// Recipient user id, or their full share link
        recipient: String,
        message: String,
    },
    /// Follow the inbox and print new messages as they arrive
    Watch,
    /// Show or change the colour theme
    Theme {
        #[command(subcommand)]
        action: Option<ThemeCommand>,
    },
}

#[derive(Subcommand, Debug)]
enum ThemeCommand {
    /// Print the stored theme
    Get,
    /// Store a theme: light, dark or lite
    Set { theme: String },
    /// Advance to the next theme in the rotation
    Cycle,
}

struct Config {
    data_dir: PathBuf,
    api_url: String,
    auth_url: String,
    feed_url: String,
    api_key: Option<String>,
    origin: String,
}

impl Config {
    fn from_cli_and_env(opts: Opts) -> Self {
        let data_dir = opts
            .data_dir
            .or_else(|| std::env::var("GHOSTNOTE_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".ghostnote"))
                    .unwrap_or_else(|_| PathBuf::from(".ghostnote"))
            });

        let api_url = opts
            .api_url
            .or_else(|| std::env::var("GHOSTNOTE_API_URL").ok())
            .unwrap_or_else(|| "http://127.0.0.1:54321/rest/v1".to_string());

        let auth_url = opts
            .auth_url
            .or_else(|| std::env::var("GHOSTNOTE_AUTH_URL").ok())
            .unwrap_or_else(|| "http://127.0.0.1:54321/auth/v1".to_string());

        let feed_url = opts
            .feed_url
            .or_else(|| std::env::var("GHOSTNOTE_FEED_URL").ok())
            .unwrap_or_else(|| "ws://127.0.0.1:54321/feed/v1".to_string());

        let api_key = opts
            .api_key
            .or_else(|| std::env::var("GHOSTNOTE_API_KEY").ok());

        let origin = opts
            .origin
            .or_else(|| std::env::var("GHOSTNOTE_ORIGIN").ok())
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        Self {
            data_dir,
            api_url,
            auth_url,
            feed_url,
            api_key,
            origin,
        }
    }
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli.opts);
    logging::init();

    match cli.command {
        Command::Login { email } => login(&config, &email),
        Command::Verify { email, code } => verify(&config, &email, &code),
        Command::Logout => logout(&config),
        Command::Link => link(&config),
        Command::Inbox => list_inbox(&config),
        Command::Chats { filter } => list_chats(&config, filter.as_deref()),
        Command::Thread { counterpart } => show_thread(&config, &counterpart),
        Command::Send { recipient, message } => send(&config, &recipient, &message),
        Command::Anon { recipient, message } => send_anonymous(&config, &recipient, &message),
        Command::Watch => watch(&config),
        Command::Theme { action } => theme(&config, action),
    }
}

fn require_api_key(config: &Config) -> Result<String, Box<dyn Error>> {
    config
        .api_key
        .clone()
        .ok_or_else(|| "api key required (use --api-key or GHOSTNOTE_API_KEY)".into())
}

fn auth_provider(config: &Config) -> Result<HostedAuth, Box<dyn Error>> {
    let api_key = require_api_key(config)?;
    Ok(HostedAuth::new(
        config.auth_url.clone(),
        api_key,
        config.data_dir.clone(),
    ))
}

/// A row store acting as the signed-in user when a session exists, or as
/// an anonymous visitor otherwise.
fn signed_store(config: &Config, auth: &HostedAuth) -> Result<RestStore, Box<dyn Error>> {
    let api_key = require_api_key(config)?;
    Ok(match auth.access_token()? {
        Some(token) => RestStore::with_bearer(config.api_url.clone(), api_key, token),
        None => RestStore::new(config.api_url.clone(), api_key),
    })
}

fn require_session(
    auth: &dyn AuthProvider,
    store: &dyn Store,
    origin: &str,
) -> Result<Session, Box<dyn Error>> {
    match session::bootstrap(auth, store, origin)? {
        Bootstrap::Ready(session) => Ok(session),
        Bootstrap::SignedOut => Err("not signed in (run `ghostnote login <email>` first)".into()),
    }
}

fn print_message(own_id: &str, message: &Message) {
    let when = logging::format_epoch_millis(message.created_at);
    let from = match &message.sender_id {
        Some(id) if id == own_id => "me".to_string(),
        Some(id) => logging::user_id(id),
        None => "anonymous".to_string(),
    };
    println!("{when}  {from}: {}", message.content);
}

/// Accept either a bare user id or a full share link (`.../u/<id>`).
fn recipient_from_link(input: &str) -> &str {
    input
        .rsplit_once("/u/")
        .map(|(_, id)| id)
        .unwrap_or(input)
        .trim_end_matches('/')
}

fn login(config: &Config, email: &str) -> Result<(), Box<dyn Error>> {
    let auth = auth_provider(config)?;
    auth.request_login_code(email)?;
    println!("login code sent to {email}");
    println!("run `ghostnote verify {email} <code>` once it arrives");
    Ok(())
}

fn verify(config: &Config, email: &str, code: &str) -> Result<(), Box<dyn Error>> {
    let auth = auth_provider(config)?;
    let identity = auth.verify_login_code(email, code)?;
    println!("signed in as {}", identity.id);

    let store = signed_store(config, &auth)?;
    let session = require_session(&auth, &store, &config.origin)?;
    println!("your link: {}", session.public_link);
    Ok(())
}

fn logout(config: &Config) -> Result<(), Box<dyn Error>> {
    let auth = auth_provider(config)?;
    auth.sign_out()?;
    println!("signed out");
    Ok(())
}

fn link(config: &Config) -> Result<(), Box<dyn Error>> {
    let auth = auth_provider(config)?;
    let store = signed_store(config, &auth)?;
    let session = require_session(&auth, &store, &config.origin)?;
    println!("{}", session.public_link);
    Ok(())
}

fn list_inbox(config: &Config) -> Result<(), Box<dyn Error>> {
    let auth = auth_provider(config)?;
    let store = signed_store(config, &auth)?;
    let session = require_session(&auth, &store, &config.origin)?;

    let messages = store.inbox_messages(&session.identity.id)?;
    if messages.is_empty() {
        println!("no messages yet; share your link: {}", session.public_link);
        return Ok(());
    }
    for message in &messages {
        print_message(&session.identity.id, message);
    }
    println!("{} messages", messages.len());
    Ok(())
}

fn list_chats(config: &Config, filter: Option<&str>) -> Result<(), Box<dyn Error>> {
    let auth = auth_provider(config)?;
    let store = signed_store(config, &auth)?;
    let session = require_session(&auth, &store, &config.origin)?;

    let mut list = ChatList::load(&store, &session.identity.id)?;
    if let Some(text) = filter {
        list.set_filter(text);
    }

    let visible = list.visible();
    if visible.is_empty() {
        println!("no conversations");
        return Ok(());
    }
    for chat in visible {
        let when = logging::format_epoch_millis(chat.last_at);
        println!("{when}  {}  {}", chat.label, chat.last_message);
    }
    Ok(())
}

fn show_thread(config: &Config, counterpart: &str) -> Result<(), Box<dyn Error>> {
    let auth = auth_provider(config)?;
    let store = signed_store(config, &auth)?;
    let session = require_session(&auth, &store, &config.origin)?;

    let thread = ChatThread::open(Arc::new(store), &session.identity.id, counterpart)?;
    if thread.is_empty() {
        println!("no messages with {}", logging::user_id(counterpart));
        return Ok(());
    }
    for message in thread.messages() {
        print_message(&session.identity.id, message);
    }
    Ok(())
}

fn send(config: &Config, recipient: &str, message: &str) -> Result<(), Box<dyn Error>> {
    let auth = auth_provider(config)?;
    let store = signed_store(config, &auth)?;
    let session = require_session(&auth, &store, &config.origin)?;

    let mut composer = Composer::new();
    composer.set_draft(message);
    let sent = composer.send_direct(&store, recipient, &session.identity.id)?;
    println!(
        "sent {} to {}",
        logging::msg_id(&sent.id),
        logging::user_id(recipient)
    );
    Ok(())
}

fn send_anonymous(config: &Config, recipient: &str, message: &str) -> Result<(), Box<dyn Error>> {
    let api_key = require_api_key(config)?;
    let store = RestStore::new(config.api_url.clone(), api_key);
    let recipient = recipient_from_link(recipient);

    let mut composer = Composer::new();
    composer.set_draft(message);
    let sent = composer.send_anonymous(&store, recipient)?;
    println!("sent {} anonymously", logging::msg_id(&sent.id));
    Ok(())
}

fn watch(config: &Config) -> Result<(), Box<dyn Error>> {
    let auth = auth_provider(config)?;
    let store = signed_store(config, &auth)?;
    let session = require_session(&auth, &store, &config.origin)?;
    let api_key = require_api_key(config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let hub = FeedHub::new();
        let _listener = spawn_insert_listener(
            config.feed_url.clone(),
            api_key,
            session.identity.id.clone(),
            hub.clone(),
        );

        let mut inbox = Inbox::open(Arc::new(store), &hub, &session.identity.id);
        if let Some(e) = inbox.last_error() {
            eprintln!("warning: could not load existing messages: {e}");
        }
        for message in inbox.messages() {
            print_message(&session.identity.id, message);
        }
        println!("watching for new messages (ctrl-c to stop)");

        while let Some(message) = inbox.next_live().await {
            print_message(&session.identity.id, &message);
        }
    });

    Ok(())
}

fn theme(config: &Config, action: Option<ThemeCommand>) -> Result<(), Box<dyn Error>> {
    let store = FileThemeStore::new(config.data_dir.clone());
    let mut prefs = ThemePreference::init(Box::new(store), None)?;

    match action {
        None | Some(ThemeCommand::Get) => println!("{}", prefs.current()),
        Some(ThemeCommand::Set { theme }) => {
            let theme: Theme = theme.parse()?;
            prefs.set(theme)?;
            println!("theme set to {theme}");
        }
        Some(ThemeCommand::Cycle) => {
            let theme = prefs.cycle()?;
            println!("theme set to {theme}");
        }
    }
    Ok(())
}
