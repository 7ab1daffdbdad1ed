use clap::{App, Arg};
use colored::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "9000";
const ACK: &[u8] = b"$SEND$";

/// Bench-side collector: accepts one frame per connection, prints it, and
/// answers with the fixed acknowledgement the logger expects.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("fieldlog-collector")
        .version("0.1.0")
        .about("📡 Field Data Logger collector - receives and acknowledges frames")
        .arg(
            Arg::with_name("bind")
                .short("b")
                .long("bind")
                .value_name("ADDR")
                .help("Bind address")
                .takes_value(true)
                .default_value(DEFAULT_BIND),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Listen port")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .get_matches();

    let bind = matches.value_of("bind").unwrap_or(DEFAULT_BIND);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;

    let listener = TcpListener::bind((bind, port)).await?;
    println!("📡 Collector listening on {}:{}", bind, port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, "logger connected");
                tokio::spawn(async move {
                    if let Err(e) = handle_frame(stream).await {
                        warn!(%addr, error = %e, "frame handling failed");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Reads until the logger half-closes its write side, then acknowledges.
async fn handle_frame(mut stream: TcpStream) -> std::io::Result<()> {
    let mut frame = Vec::new();
    stream.read_to_end(&mut frame).await?;

    let text = String::from_utf8_lossy(&frame);
    println!(
        "{} {}",
        "FRAME".green().bold(),
        text.trim_end().cyan()
    );

    stream.write_all(ACK).await?;
    stream.shutdown().await?;
    Ok(())
}
