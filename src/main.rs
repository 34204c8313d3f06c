use clap::Parser;
use peer_chat::chat::ChatSession;
use peer_chat::config::{DEFAULT_REGISTRY_URL, SessionConfig};
use peer_chat::directory::{Address, Protocol, UserRecord, check_host, check_user_name};
use peer_chat::error::ChatError;
use peer_chat::registry::RegistryClient;
use peer_chat::transport::{ChatServer, MessageListener};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

/// Console chat peer.
#[derive(Parser, Debug)]
#[command(name = "peer-chat", version, about = "Chat with peers found through a shared registry")]
struct Args {
    /// Name of user
    #[arg(long, value_parser = parse_user_name)]
    name: String,

    /// Base URL of the user registry
    #[arg(long, default_value = DEFAULT_REGISTRY_URL)]
    registry: String,

    /// Protocol to receive messages with (HTTP, WEBSOCKET, UDP)
    #[arg(long, default_value = "HTTP")]
    protocol: Protocol,

    /// Hostname or IP to listen on
    #[arg(long, default_value = "0.0.0.0", value_parser = parse_host)]
    host: String,

    /// Port to listen on (defaults to 8080 / 8082 / 3000 per protocol)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Address advertised to the registry when it differs from the bind address
    #[arg(long, value_parser = Url::parse)]
    public_url: Option<Url>,

    /// Background directory refresh period, in seconds
    #[arg(long, default_value_t = 120)]
    refresh_secs: u64,
}

fn parse_user_name(name: &str) -> Result<String, String> {
    if check_user_name(name) {
        Ok(name.to_string())
    } else {
        Err("Incorrect name.".to_string())
    }
}

fn parse_host(host: &str) -> Result<String, String> {
    if check_host(host) {
        Ok(host.to_string())
    } else {
        Err("Incorrect IP or Host.".to_string())
    }
}

/// The address other peers should dial: the public URL's host (and port,
/// when it names one) or else the bind address.
fn advertised_address(args: &Args, port: u16) -> anyhow::Result<Address> {
    match &args.public_url {
        Some(url) => {
            let host = url
                .host_str()
                .ok_or_else(|| anyhow::anyhow!("public URL {} has no host", url))?;
            Ok(Address::new(args.protocol, host, url.port().unwrap_or(port)))
        }
        None => Ok(Address::new(args.protocol, args.host.clone(), port)),
    }
}

enum Command<'a> {
    Update,
    Exit,
    Select(&'a str),
    Send(&'a str),
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    let line = line.trim_start();
    if line.trim().is_empty() {
        return None;
    }

    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    Some(match head {
        ":update" => Command::Update,
        ":exit" => Command::Exit,
        ":user" => Command::Select(rest.trim()),
        _ => Command::Send(line),
    })
}

fn prompt(selected: Option<&str>) {
    print!("  to [{}] <<< ", selected.unwrap_or("<not selected>"));
    let _ = std::io::stdout().flush();
}

async fn print_directory(session: &ChatSession) {
    match session.refresh_directory().await {
        Ok(update) => {
            if let Some(lost) = update.lost_selection {
                println!("Selected user {} was removed from registry", lost);
            }
            for (name, address) in update.peers {
                println!("{} ==> {}", name, address);
            }
        }
        Err(_) => println!("Cannot get users from registry"),
    }
}

async fn command_loop(session: &ChatSession) -> anyhow::Result<()> {
    println!("Hi, {}\nWelcome to the chat!", session.name());
    print_directory(session).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt(session.selected_peer().await.as_deref());

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            return Ok(());
        };

        match parse_command(&line) {
            None => {}
            Some(Command::Exit) => return Ok(()),
            Some(Command::Update) => print_directory(session).await,
            Some(Command::Select(name)) => {
                if let Err(e) = session.select_peer(name).await {
                    println!("{}", e);
                }
            }
            Some(Command::Send(text)) => match session.send_to_selected(text).await {
                Ok(()) => {}
                Err(e @ ChatError::NoPeerSelected) => println!("{}", e),
                Err(ChatError::UnknownPeer(_)) => {
                    println!("Cannot send message, because user disappeared")
                }
                Err(e) => println!("Error! {}", e),
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let port = args.port.unwrap_or_else(|| args.protocol.default_port());

    let config = SessionConfig {
        refresh_period: Duration::from_secs(args.refresh_secs.max(1)),
        ..SessionConfig::default()
    };

    let http = reqwest::Client::new();
    let registry = Arc::new(RegistryClient::new(
        &args.registry,
        http.clone(),
        config.transport.request_timeout,
    )?);

    let listener: MessageListener = Arc::new(|user: &str, text: &str| {
        println!("\nfrom [{}] >>> {}", user, text);
    });
    let mut server = ChatServer::new(args.protocol, args.host.clone(), port, listener, &config.transport);
    let bound = server.start().await?;
    tracing::info!("{} chat server listening on {}", server.protocol(), bound);

    let address = advertised_address(&args, port)?;
    if address.is_unspecified() {
        tracing::warn!(
            "Advertising {} which other peers cannot dial; pass --public-url or a concrete --host",
            address
        );
    }
    if let Err(e) = registry.register(&UserRecord::new(args.name.clone(), address)).await {
        server.stop().await;
        return Err(anyhow::anyhow!("Cannot register with {}: {}", registry.base_url(), e));
    }

    let session = ChatSession::new(args.name.clone(), registry.clone(), http, config);
    let refresher = session.clone().spawn_refresher();

    let outcome = command_loop(&session).await;

    refresher.stop().await;
    if let Err(e) = registry.unregister(&args.name).await {
        tracing::warn!("Cannot unregister {}: {}", args.name, e);
    }
    server.stop().await;

    outcome
}
