use clap::{Parser, Subcommand};

/// dnsbeacon: control plane and agent for callback DNS servers
#[derive(Parser)]
#[command(name = "dnsbeacon", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the control-plane API server
    Serve {
        /// Port to bind (overrides DNSBEACON_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage api tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Manage zones
    Zone {
        #[command(subcommand)]
        command: ZoneCommands,
    },

    /// Run a DNS agent against a control plane
    Agent {
        #[arg(long, env = "DNSBEACON_API_URL")]
        api_url: String,
        #[arg(long, env = "DNSBEACON_API_TOKEN", hide_env_values = true)]
        api_token: String,
        /// Seconds between zone refreshes
        #[arg(long, default_value = "60")]
        refresh_secs: u64,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Mint a signed token and print it. Nothing is persisted until the
    /// token is first synced or used.
    Mint {
        #[arg(long)]
        subject: String,
        /// Space- or comma-separated scopes
        #[arg(long)]
        scopes: String,
        #[arg(long)]
        dns_server: String,
        /// Lifetime in seconds (defaults to DNSBEACON_TOKEN_TTL_SECS)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ZoneCommands {
    /// Add a zone with optional records
    Add {
        #[arg(long)]
        domain: String,
        #[arg(long)]
        ip: String,
        /// Restrict the zone to one server; omitted means every server
        #[arg(long)]
        dns_server: Option<String>,
        /// Record line, repeatable
        #[arg(long = "record")]
        records: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_mint() {
        let cli = Cli::try_parse_from([
            "dnsbeacon",
            "token",
            "mint",
            "--subject",
            "ops",
            "--scopes",
            "api-token:syncable zone:list",
            "--dns-server",
            "edge-01",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Token {
                command: TokenCommands::Mint { dns_server, ttl_secs, .. },
            }) => {
                assert_eq!(dns_server, "edge-01");
                assert_eq!(ttl_secs, None);
            }
            _ => panic!("expected token mint"),
        }
    }

    #[test]
    fn test_parse_zone_add_repeated_records() {
        let cli = Cli::try_parse_from([
            "dnsbeacon", "zone", "add", "--domain", "example.com", "--ip", "10.0.0.1",
            "--record", "www A 10.0.0.2", "--record", "mail A 10.0.0.3",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Zone {
                command: ZoneCommands::Add { records, dns_server, .. },
            }) => {
                assert_eq!(records.len(), 2);
                assert!(dns_server.is_none());
            }
            _ => panic!("expected zone add"),
        }
    }
}
