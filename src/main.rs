use anyhow::{bail, Context};
use tracing::{info, warn};

use p2shuffle::config::{self, Config};
use p2shuffle::controller::{create_controller, Difficulty, PlayerKind};
use p2shuffle::game::PuckColor;
use p2shuffle::game_modes::{self, Invitation, Pace};
use p2shuffle::logging;
use p2shuffle::network;

#[derive(Debug, PartialEq)]
enum Mode {
    Local(Option<Difficulty>),
    Practice(u32),
    Network(Invitation),
}

#[derive(Debug)]
struct Args {
    mode: Mode,
    login: Option<String>,
    color: Option<PuckColor>,
    relay: Option<String>,
    debug: bool,
    fast: bool,
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().collect();
    let args = match parse_args(&argv[1..]) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage(&argv[0]);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage(&argv[0]);
            std::process::exit(1);
        }
    };

    logging::init(args.debug)?;

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            warn!("Using built-in settings, config not readable: {}", e);
            Config::default()
        }
    };
    let pace = if args.fast {
        Pace::fast(&config.display)
    } else {
        Pace::realtime(&config.display)
    };
    let difficulty = |chosen: Option<Difficulty>| -> Difficulty {
        chosen.unwrap_or_else(|| {
            config.ai.difficulty.parse().unwrap_or_else(|e| {
                warn!("{}, playing medium", e);
                Difficulty::Medium
            })
        })
    };

    match args.mode {
        Mode::Local(chosen) => {
            let level = difficulty(chosen);
            let (red, _) = create_controller(PlayerKind::Ai(level), &config);
            let (blue, _) = create_controller(PlayerKind::Ai(level), &config);
            let summary = game_modes::run_game_local(&config, red, blue, pace)?;
            println!("Final score: Red {} - Blue {}", summary.red, summary.blue);
        }
        Mode::Practice(throws) => {
            let (ai, _) = create_controller(PlayerKind::Ai(difficulty(None)), &config);
            let color = args.color.unwrap_or(PuckColor::Red);
            let reports = game_modes::run_practice(&config, ai, color, throws, pace)?;
            let total: u32 = reports.iter().filter_map(|r| r.points).sum();
            println!("Practice total: {} points", total);
        }
        Mode::Network(invitation) => {
            let Some(login) = args.login else {
                bail!("network play needs --login <user>");
            };
            let relay = args.relay.unwrap_or_else(|| config.network.relay_server.clone());
            info!("Connecting to {} as {}", relay, login);

            let mut transport = network::connect_relay(&relay, &login)
                .with_context(|| format!("could not log in to {}", relay))?;
            let (local, _) = create_controller(PlayerKind::Ai(difficulty(None)), &config);
            let summary = game_modes::run_game_network(&config, &mut transport, &invitation, args.color, local, pace)?;

            if summary.abandoned && summary.winner.is_none() {
                println!("Match abandoned at Red {} - Blue {}", summary.red, summary.blue);
            } else {
                println!("Final score: Red {} - Blue {}", summary.red, summary.blue);
            }
        }
    }

    Ok(())
}

/// Parse command line arguments; `Ok(None)` means help was asked for
fn parse_args(args: &[String]) -> Result<Option<Args>, String> {
    let mut parsed = Args {
        mode: Mode::Local(None),
        login: None,
        color: None,
        relay: None,
        debug: false,
        fast: false,
    };

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args.get(i + 1).filter(|v| !v.starts_with("--"));

        match flag {
            "--help" | "-h" => return Ok(None),
            "--debug" => parsed.debug = true,
            "--fast" => parsed.fast = true,
            "--local" => {
                let level = value
                    .map(|v| v.parse::<Difficulty>())
                    .transpose()
                    .map_err(|e| e.to_string())?;
                if level.is_some() {
                    i += 1;
                }
                parsed.mode = Mode::Local(level);
            }
            "--practice" => {
                let throws = value
                    .ok_or("--practice requires a number of throws")?
                    .parse::<u32>()
                    .map_err(|e| format!("bad throw count: {}", e))?;
                parsed.mode = Mode::Practice(throws);
                i += 1;
            }
            "--invite" | "--accept" => {
                let peer = value.ok_or(format!("{} requires a peer name", flag))?.clone();
                parsed.mode = Mode::Network(if flag == "--invite" {
                    Invitation::Invite(peer)
                } else {
                    Invitation::Accept(peer)
                });
                i += 1;
            }
            "--login" => {
                parsed.login = Some(value.ok_or("--login requires a user name")?.clone());
                i += 1;
            }
            "--color" => {
                let color = value
                    .ok_or("--color requires red or blue")?
                    .parse::<PuckColor>()
                    .map_err(|e| e.to_string())?;
                parsed.color = Some(color);
                i += 1;
            }
            "--relay" => {
                parsed.relay = Some(value.ok_or("--relay requires a URL")?.clone());
                i += 1;
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
        i += 1;
    }

    Ok(Some(parsed))
}

fn print_usage(program: &str) {
    println!("p2shuffle - table shuffleboard for two, over a chat relay");
    println!();
    println!("Usage:");
    println!("  {} [--local [easy|medium|hard]]       # AI against AI on this machine", program);
    println!("  {} --practice <throws>                 # Throw alone and see the points", program);
    println!("  {} --invite <peer> --login <user>      # Invite a peer and host the match", program);
    println!("  {} --accept <peer> --login <user>      # Wait for a peer's invitation", program);
    println!();
    println!("Options:");
    println!("  --color red|blue   Color of the local player (network: host red, invitee blue)");
    println!("  --relay <url>      Chat relay WebSocket URL (default from config)");
    println!("  --fast             Simulate without waiting for real time");
    println!("  --debug            Write a debug log to {}", logging::LOG_FILE_PATH);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_to_local() {
        let parsed = parse_args(&[]).unwrap().unwrap();
        assert_eq!(parsed.mode, Mode::Local(None));
        assert!(!parsed.debug);
    }

    #[test]
    fn test_local_difficulty_optional() {
        let parsed = parse_args(&args(&["--local", "hard", "--fast"])).unwrap().unwrap();
        assert_eq!(parsed.mode, Mode::Local(Some(Difficulty::Hard)));
        assert!(parsed.fast);

        let parsed = parse_args(&args(&["--local", "--debug"])).unwrap().unwrap();
        assert_eq!(parsed.mode, Mode::Local(None));
        assert!(parsed.debug);
    }

    #[test]
    fn test_network_arguments() {
        let parsed = parse_args(&args(&["--invite", "bob", "--login", "alice", "--color", "blue"]))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.mode, Mode::Network(Invitation::Invite("bob".into())));
        assert_eq!(parsed.login.as_deref(), Some("alice"));
        assert_eq!(parsed.color, Some(PuckColor::Blue));
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse_args(&args(&["--practice"])).is_err());
        assert!(parse_args(&args(&["--practice", "many"])).is_err());
        assert!(parse_args(&args(&["--accept"])).is_err());
        assert!(parse_args(&args(&["--color", "green"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert!(parse_args(&args(&["--help"])).unwrap().is_none());
    }
}
