use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "peernote")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "start", about = "Run a node until killed")]
    Start {
        #[arg(long = "host", help = "Address to listen on and advertise")]
        host: Option<String>,
        #[arg(long = "port", help = "Port to listen on (0 picks a free one)")]
        port: Option<u16>,
        #[arg(long = "bootstrap", help = "Run as the well-known bootstrap node")]
        bootstrap: bool,
        #[arg(long = "super-peer", help = "Own a board and take part in gossip")]
        super_peer: bool,
        #[arg(long = "title", help = "Board title when running as a super-peer")]
        title: Option<String>,
        #[arg(
            long = "keywords",
            value_delimiter = ',',
            help = "Comma-separated board keywords"
        )]
        keywords: Vec<String>,
        #[arg(
            long = "crawl-rounds",
            default_value_t = 3,
            help = "How many peer crawls a super-peer runs after joining"
        )]
        crawl_rounds: usize,
    },
    #[command(name = "search", about = "Flood a keyword search and print the hits")]
    Search {
        #[arg(long = "host", help = "Address to advertise for PONG delivery")]
        host: Option<String>,
        #[arg(
            long = "keywords",
            value_delimiter = ',',
            help = "Comma-separated keywords to look for"
        )]
        keywords: Vec<String>,
        #[arg(
            long = "wait-secs",
            default_value_t = 3,
            help = "How long to collect answers"
        )]
        wait_secs: u64,
    },
    #[command(name = "fetch", about = "Fetch every card of a board from a super-peer")]
    Fetch {
        #[arg(long = "host", help = "Super-peer host")]
        host: String,
        #[arg(long = "port", help = "Super-peer port")]
        port: u16,
        #[arg(long = "board", help = "Board title")]
        board: String,
    },
}

/// Trim, drop empties and deduplicate keywords given on the command line
pub fn parse_keywords(raw: &[String]) -> BTreeSet<String> {
    raw.iter()
        .map(|keyword| keyword.trim())
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_command() {
        let opt = Opt::parse_from([
            "peernote",
            "start",
            "--port",
            "8002",
            "--super-peer",
            "--title",
            "yolo",
            "--keywords",
            "hello,world",
        ]);
        match opt.command {
            Command::Start {
                port,
                super_peer,
                title,
                keywords,
                crawl_rounds,
                ..
            } => {
                assert_eq!(port, Some(8002));
                assert!(super_peer);
                assert_eq!(title.as_deref(), Some("yolo"));
                assert_eq!(keywords, vec!["hello", "world"]);
                assert_eq!(crawl_rounds, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_fetch_requires_target() {
        assert!(Opt::try_parse_from(["peernote", "fetch", "--board", "yolo"]).is_err());
    }

    #[test]
    fn test_parse_keywords() {
        let raw = vec![" world".to_string(), String::new(), "hello".to_string(), "world".to_string()];
        let keywords = parse_keywords(&raw);
        assert_eq!(keywords.into_iter().collect::<Vec<_>>(), vec!["hello", "world"]);
    }
}
