use clap::Parser;
use server::network::Server;
use std::time::Duration;

// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "6789")]
    port: u16,
    /// Tick rate (world updates per second); must be at least 1
    #[clap(short, long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..))]
    tick_rate: u32,
}

/// Parses command-line arguments and runs the server until the process is
/// killed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let addr = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate as f64);

    let mut server = Server::new(&addr, tick_duration).await?;
    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_arguments() {
        let args = Args::try_parse_from(["server"]).unwrap();
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 6789);
        assert_eq!(args.tick_rate, 60);
    }

    #[test]
    fn zero_tick_rate_is_rejected() {
        assert!(Args::try_parse_from(["server", "--tick-rate", "0"]).is_err());
        assert!(Args::try_parse_from(["server", "--tick-rate", "1"]).is_ok());
    }
}
