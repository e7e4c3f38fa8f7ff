//! Entry point: parses `argv`, loads configuration, and starts the connection server
//! and work queue (spec §4, §6, §10.5).

use std::sync::Arc;

use rusty_db::config::Config;
use rusty_db::network::Server;
use rusty_db::queue::WorkQueue;
use rusty_db::store::Store;

const USAGE: &str = "Usage:\n\
  rusty-db -f <config file path>          : Use the specified configuration file.\n\
  rusty-db -h                             : Display this help message.\n\
  rusty-db -v                             : Display the current version of the application.\n\
  rusty-db -o                             : Display the implementation steps.\n\
\n\
After running the program, connect over TCP to the configured ip:port (by default,\n\
telnet localhost 8080).\n\
\n\
To insert into the database: send the document length as 15 digits, then an XML\n\
document.\n\
\n\
To select (view) the data in the database in XML format, send the document length as\n\
15 digits, then:\n\
<request>\n\
<operation type=\"select\"/>\n\
</request>\n";

const STEPS: &str = "1. Program configuration\n\
2. Socket creation on the connection server task\n\
3. Waiting for operator input (Enter key) on another task\n\
4. Accepting client connections\n\
5. Client connects and sends data\n\
6. Data parsing and database storage\n\
7. Client receives the result and may continue\n";

fn print_version() {
    println!("Application Version: {}", env!("CARGO_PKG_VERSION"));
}

/// Hand-parses `argv` in a single pass (spec §10.5): `-f <path>` is required and takes
/// a value; `-h`/`-v`/`-o` print a fixed block and exit 0; an unrecognized flag or a
/// missing `-f` value prints help and exits 0; running without `-f` prints help and
/// exits 0.
fn parse_args(args: &[String]) -> Option<String> {
    if args.is_empty() {
        return None;
    }

    let mut config_path = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            "-o" => {
                println!("{STEPS}");
                std::process::exit(0);
            }
            "-v" => {
                print_version();
                std::process::exit(0);
            }
            "-f" => {
                let Some(path) = args.get(i + 1) else {
                    println!("{USAGE}");
                    std::process::exit(0);
                };
                config_path = Some(path.clone());
                i += 1;
            }
            other => {
                println!("UnKnown option: {other}\n");
                println!("{USAGE}");
                std::process::exit(0);
            }
        }
        i += 1;
    }

    config_path
}

#[tokio::main]
async fn main() -> rusty_db::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(config_path) = parse_args(&args) else {
        println!("{USAGE}");
        std::process::exit(0);
    };

    let config = Config::load(&config_path)?;
    tracing::info!(path = %config_path, "configuration loaded");

    let store = Arc::new(Store::open(&config.database.path)?);
    let (queue, dispatcher) = WorkQueue::start(store);
    let server = Server::bind(&config.server, queue).await?;
    let handle = server.handle();

    println!("Server started. Press Enter to stop...\n");

    // `run()` is spawned rather than awaited directly so the stdin branch below can
    // call `handle.stop()` and then still await the accept loop's own graceful finish,
    // instead of dropping (and aborting) it the moment the operator presses Enter.
    let mut run_task = tokio::spawn(server.run());

    let mut stdin_line = String::new();
    tokio::select! {
        result = &mut run_task => {
            if let Err(ref e) = result {
                tracing::error!(error = %e, "server task panicked");
            }
            if let Ok(inner) = result {
                inner?;
            }
        }
        _ = tokio::task::spawn_blocking(move || std::io::stdin().read_line(&mut stdin_line)) => {
            tracing::info!("operator requested shutdown");
            handle.stop();
            // Waits for the same accept loop to actually drain every in-flight
            // session (spec §5) instead of returning the moment `stop()` is called.
            match run_task.await {
                Ok(inner) => inner?,
                Err(e) => tracing::error!(error = %e, "server task panicked"),
            }
        }
    };

    // By now the accept loop has fully drained every session task it tracked, each of
    // which dropped its `WorkQueue` sender clone along with the one `Server` itself
    // held -- the dispatcher's `recv()` loop can end on its own, so this just waits for
    // it (and every worker it spawned) to actually finish before the process exits.
    dispatcher.await.map_err(|e| {
        rusty_db::DbError::Socket(format!("work queue dispatcher task panicked: {e}"))
    })?;
    tracing::info!("shutdown complete");
    Ok(())
}
