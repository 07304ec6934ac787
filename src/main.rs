// This is my main entry point for the overlay node CLI
// I'm importing the node, its configuration and the registry it persists boards to
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use peernote::cli::parse_keywords;
use peernote::{local_ip, Command, Config, JsonFileRegistry, Node, Opt};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() {
    // I initialize logging so I can see what's happening on the overlay
    // Info is the default, RUST_LOG still overrides it when I need more detail
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    // I parse the command line arguments using clap
    let opt = Opt::parse();

    // If something goes wrong, I log the error and exit with code 1
    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// This is where I handle all the different CLI commands
fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    // Defaults first, then my TOML file if I passed one, then environment overrides
    let mut config = Config::load(opt.config.as_deref())?;

    match opt.command {
        // When I want to run a node that stays up until I kill it
        Command::Start {
            host,
            port,
            bootstrap,
            super_peer,
            title,
            keywords,
            crawl_rounds,
        } => {
            if bootstrap {
                // The bootstrap node is whoever listens on the well-known address
                config.host = config.bootstrap_host.clone();
                config.port = config.bootstrap_port;
            } else {
                config.host = host.unwrap_or_else(|| local_ip().to_string());
                if let Some(port) = port {
                    config.port = port;
                }
            }
            if super_peer && title.is_none() {
                return Err("--title is required with --super-peer".into());
            }

            let registry = Arc::new(JsonFileRegistry::new(&config.data_dir));
            let node = Node::new(config, registry)?;
            node.start()?;

            // Everyone except the bootstrap joins through the bootstrap
            if !node.is_bootstrap() && !node.do_bootstrap() {
                warn!("Could not reach the bootstrap node, running alone for now");
            }

            if let (true, Some(title)) = (super_peer, title) {
                node.become_super_peer(&title, parse_keywords(&keywords));
                // I crawl a few rounds to fill my peer directory with other super-peers
                for round in 1..=crawl_rounds {
                    let learned = node.request_peers();
                    info!("Crawl round {round} learned {learned} peers");
                    if learned == 0 {
                        break;
                    }
                }
            }

            println!(
                "Node {} running on {}:{}",
                node.node_id(),
                node.host(),
                node.port()
            );
            node.join();
        }
        // When I want to find boards matching some keywords
        Command::Search {
            host,
            keywords,
            wait_secs,
        } => {
            // A transient peer on a free port, PONGs come back to it directly
            config.host = host.unwrap_or_else(|| local_ip().to_string());
            config.port = 0;

            let registry = Arc::new(JsonFileRegistry::new(&config.data_dir));
            let node = Node::new(config, registry)?;
            node.start()?;
            if !node.do_bootstrap() {
                node.stop();
                return Err("Could not reach the bootstrap node".into());
            }

            let ping_id = node.issue_search_request(parse_keywords(&keywords));
            // PONGs arrive on their own connections, so I just wait for them
            thread::sleep(Duration::from_secs(wait_secs));

            let results = node.search_results(&ping_id);
            if results.is_empty() {
                println!("No boards found");
            }
            for hit in &results {
                println!(
                    "Board '{}' ({}) at {}:{}",
                    hit.board_title, hit.board_id, hit.responder_host, hit.responder_port
                );
                for board in &hit.boards {
                    println!(
                        "- registered board '{}' at {}:{}",
                        board.board_title, board.peer_host, board.peer_port
                    );
                }
            }
            node.stop();
        }
        // When I want to read every card of a board
        Command::Fetch { host, port, board } => {
            // I only make outbound requests here, so I never start the listener
            config.host = local_ip().to_string();
            config.port = 0;

            let registry = Arc::new(JsonFileRegistry::new(&config.data_dir));
            let node = Node::new(config, registry)?;
            let cards = node.request_board_meta(&host, port, &board)?;
            println!("{}", serde_json::to_string_pretty(&cards)?);
        }
    }
    Ok(())
}
