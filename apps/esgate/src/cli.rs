//! Command-line interface.
//!
//! Every option can also come from the environment, matching how the proxy
//! is usually deployed in containers.

use clap::Parser;

/// SigV4 signing proxy for Amazon OpenSearch and Elasticsearch Service
/// domains.
#[derive(Debug, Parser)]
#[command(name = "esgate", version, about)]
pub struct Cli {
    /// The IP address to bind to.
    #[arg(
        short = 'b',
        long = "bind-address",
        env = "BIND_ADDRESS",
        default_value = "127.0.0.1"
    )]
    pub bind_address: String,

    /// The port to bind to.
    #[arg(short = 'p', long, env = "PORT", default_value_t = 9200)]
    pub port: u16,

    /// The region of the cluster; inferred from the endpoint hostname when
    /// omitted.
    #[arg(short = 'r', long, env = "REGION")]
    pub region: Option<String>,

    /// Username required to access the proxy; basic auth is enabled only
    /// when both --user and --password are set.
    #[arg(short = 'u', long, env = "ESGATE_USER")]
    pub user: Option<String>,

    /// Password required to access the proxy.
    #[arg(short = 'a', long, env = "ESGATE_PASSWORD")]
    pub password: Option<String>,

    /// URI path that answers health checks without contacting the upstream.
    #[arg(short = 'H', long = "health-path", env = "HEALTH_PATH")]
    pub health_path: Option<String>,

    /// Request body size limit, e.g. "10mb".
    #[arg(short = 'l', long, env = "LIMIT", default_value = "10mb")]
    pub limit: String,

    /// The cluster endpoint, e.g.
    /// search-mydomain.us-east-1.es.amazonaws.com.
    #[arg(env = "ENDPOINT")]
    pub endpoint: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_should_have_valid_command_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_should_parse_minimal_invocation() {
        let cli = Cli::parse_from(["esgate", "search-x.us-east-1.es.amazonaws.com"]);
        assert_eq!(
            cli.endpoint.as_deref(),
            Some("search-x.us-east-1.es.amazonaws.com")
        );
        assert_eq!(cli.bind_address, "127.0.0.1");
        assert_eq!(cli.port, 9200);
        assert_eq!(cli.limit, "10mb");
        assert!(cli.region.is_none());
    }

    #[test]
    fn test_should_parse_short_flags() {
        let cli = Cli::parse_from([
            "esgate",
            "-b",
            "0.0.0.0",
            "-p",
            "8080",
            "-r",
            "eu-west-1",
            "-H",
            "/healthz",
            "-l",
            "1mb",
            "example.com",
        ]);
        assert_eq!(cli.bind_address, "0.0.0.0");
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cli.health_path.as_deref(), Some("/healthz"));
        assert_eq!(cli.limit, "1mb");
    }
}
