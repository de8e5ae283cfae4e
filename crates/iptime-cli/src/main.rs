//! iptimectl - port-forward management for ipTIME routers.
//!
//! Drives the router's CGI admin interface from the command line: list,
//! inspect and change port-forward rules, read system info, or run the REST
//! facade with `serve`. JSON goes to stdout, logs to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use iptime_client::{
    NewRule, PortForwardManager, RouterClient, RouterConfig, RuleSelector, RuleUpdate,
};
use iptime_server::{Server, ServerConfig};

/// Port-forward management for ipTIME routers
#[derive(Parser, Debug)]
#[command(name = "iptimectl", version, about)]
struct Args {
    /// Router address (defaults to $IPTIME_ROUTER_IP, then http://192.168.0.1)
    #[arg(long)]
    host: Option<String>,

    /// Admin account (defaults to $IPTIME_USERNAME, then admin)
    #[arg(long)]
    username: Option<String>,

    /// Admin password (defaults to $IPTIME_PASSWORD, then admin)
    #[arg(long)]
    password: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List port-forward rules as JSON
    List,

    /// Show one rule by id or name
    Get {
        /// Rule id (number) or name
        rule: String,
    },

    /// Add a rule
    Add {
        /// Rule description; also the key deletion is matched on
        #[arg(long)]
        description: String,

        /// Internal IP address to forward to
        #[arg(long)]
        internal_ip: String,

        /// External port
        #[arg(long)]
        external_port: u16,

        /// Internal port (defaults to the external port)
        #[arg(long)]
        internal_port: Option<u16>,

        /// Protocol
        #[arg(long, value_enum, default_value = "tcp")]
        protocol: Protocol,
    },

    /// Update a rule by id or name
    Update {
        /// Rule id (number) or name
        rule: String,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New internal IP address
        #[arg(long)]
        internal_ip: Option<String>,

        /// New external port
        #[arg(long)]
        external_port: Option<u16>,

        /// New internal port
        #[arg(long)]
        internal_port: Option<u16>,

        /// New protocol
        #[arg(long, value_enum)]
        protocol: Option<Protocol>,
    },

    /// Delete a rule by id or name
    Delete {
        /// Rule id (number) or name
        rule: String,
    },

    /// Show router model and firmware as JSON
    Info,

    /// Run the REST API facade
    Serve {
        /// Listen port (defaults to $PORT, then 6000)
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Forwarding protocol as the router understands it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Protocol {
    Tcp,
    Udp,
    Both,
}

impl Protocol {
    fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Both => "both",
        }
    }
}

impl Args {
    /// Flags beat the environment; the environment beats the stock defaults.
    fn router_config(&self) -> RouterConfig {
        let env = RouterConfig::from_env();
        RouterConfig::new(
            self.host.clone().unwrap_or(env.base_url),
            self.username.clone().unwrap_or(env.username),
            self.password.clone().unwrap_or(env.password),
        )
    }
}

/// Logs go to stderr so JSON output stays pipeable.
fn init_logging(debug: bool) {
    let default_filter = if debug {
        "iptimectl=debug,iptime_client=debug,iptime_server=debug,warn"
    } else {
        "iptimectl=info,warn"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `DEBUG=true` in the environment has the same effect as `--debug`.
fn debug_env() -> bool {
    std::env::var("DEBUG").is_ok_and(|value| value.eq_ignore_ascii_case("true"))
}

/// All-digit identifiers select by listing position, anything else by name.
fn parse_selector(raw: &str) -> RuleSelector {
    match raw.parse::<usize>() {
        Ok(id) => RuleSelector::Id(id),
        Err(_) => RuleSelector::from(raw),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug || debug_env());

    match &args.command {
        Command::Serve { port } => serve(&args, *port).await,
        command => {
            let client = RouterClient::new(args.router_config())?;
            if !client.login().await {
                anyhow::bail!("Login failed");
            }

            let result = dispatch(&client, command).await;
            client.logout().await;
            result
        }
    }
}

async fn dispatch(client: &RouterClient, command: &Command) -> anyhow::Result<()> {
    let manager = PortForwardManager::new(client);

    match command {
        Command::List => {
            let rules = manager.list_rules().await;
            println!("{}", serde_json::to_string_pretty(&rules)?);
            Ok(())
        }
        Command::Get { rule } => match manager.get_rule(&parse_selector(rule)).await {
            Some(found) => {
                println!("{}", serde_json::to_string_pretty(&found)?);
                Ok(())
            }
            None => anyhow::bail!("Rule not found: {rule}"),
        },
        Command::Add {
            description,
            internal_ip,
            external_port,
            internal_port,
            protocol,
        } => {
            let mut new_rule = NewRule::new(description.clone(), internal_ip.clone(), *external_port)
                .with_protocol(protocol.as_str());
            if let Some(port) = internal_port {
                new_rule = new_rule.with_internal_port(*port);
            }
            report(manager.add_rule(&new_rule).await, "Rule added", "Failed to add rule")
        }
        Command::Update {
            rule,
            description,
            internal_ip,
            external_port,
            internal_port,
            protocol,
        } => {
            let update = RuleUpdate {
                description: description.clone(),
                internal_ip: internal_ip.clone(),
                external_port: *external_port,
                internal_port: *internal_port,
                protocol: protocol.map(|protocol| protocol.as_str().to_string()),
            };
            report(
                manager.update_rule(&parse_selector(rule), &update).await,
                "Rule updated",
                "Failed to update rule",
            )
        }
        Command::Delete { rule } => report(
            manager.delete_rule(&parse_selector(rule)).await,
            "Rule deleted",
            "Failed to delete rule",
        ),
        Command::Info => match client.system_info().await {
            Some(info) if !info.is_empty() => {
                println!("{}", serde_json::to_string_pretty(&info)?);
                Ok(())
            }
            _ => anyhow::bail!("Failed to get system info"),
        },
        Command::Serve { .. } => unreachable!("serve never opens a router session"),
    }
}

fn report(success: bool, done: &str, failed: &str) -> anyhow::Result<()> {
    if success {
        println!("{done}");
        Ok(())
    } else {
        anyhow::bail!("{failed}")
    }
}

/// Runs the REST facade. Flags override the environment-derived settings.
async fn serve(args: &Args, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = ServerConfig::from_env().with_router(args.router_config());
    if let Some(port) = port {
        config = config.with_port(port);
    }

    info!(
        port = config.port,
        router = %config.router.base_url,
        token_auth = config.api_token.is_some(),
        "Starting ipTIME API facade"
    );

    let server = Server::new(config)?;
    server.run().await?;
    Ok(())
}
