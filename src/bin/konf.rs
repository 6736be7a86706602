//! The one-shot configuration client binary.
//!
//! Non-option arguments form a single query line passed verbatim to
//! the daemon; arguments containing spaces are re-quoted with their
//! quotes and backslashes escaped. A stream reply prints line by line.

use clap::Parser;

use clish::konf::{Client, KONFD_SOCKET_PATH};

#[derive(Parser)]
#[command(name = "konf")]
#[command(about = "Client for the configuration daemon")]
#[command(version)]
struct Cli {
    /// Daemon UNIX socket path
    #[arg(short = 's', long = "socket", default_value = KONFD_SOCKET_PATH)]
    socket: String,

    /// Query tokens passed to the daemon
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    query: Vec<String>,
}

fn requote(arg: &str) -> String {
    let escaped = clish::argv::encode(arg, "\\\"'");
    if arg.contains(' ') {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

fn main() {
    let cli = Cli::parse();

    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    if cli.query.is_empty() {
        eprintln!("Error: Empty query.");
        std::process::exit(1);
    }

    let line = cli
        .query
        .iter()
        .map(|a| requote(a))
        .collect::<Vec<_>>()
        .join(" ");

    let mut client = Client::new(&cli.socket);
    match client.request(&line) {
        Ok(Some(stream)) => {
            for text_line in stream.lines() {
                println!("{}", text_line);
            }
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
