//! Endless session tool
//!
//! Loads an HTTPS-upgrade ruleset and reports what it would do to each URL.
//!
//! ```text
//! endless-session [ruleset.json] <url>...
//! ```
//!
//! Without a ruleset argument the path from the session config is used
//! (`ENDLESS_CONFIG`, then `./endless.json`, then the packaged default).

use endless_session::{NAME, RuleEngine, RuleSet, SessionConfig, VERSION};
use std::env;
use std::path::PathBuf;
use url::Url;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: endless-session [ruleset.json] <url>...");
        std::process::exit(2);
    }

    println!("{} v{} - HTTPS upgrade check", NAME, VERSION);

    let (ruleset_path, urls) = if is_web_url(&args[0]) {
        (SessionConfig::load().ruleset_path, &args[..])
    } else {
        (PathBuf::from(&args[0]), &args[1..])
    };

    let rules = match RuleSet::load(&ruleset_path) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("Failed to load ruleset {}: {}", ruleset_path.display(), e);
            std::process::exit(1);
        }
    };
    println!("Loaded {} rule(s) from {}\n", rules.len(), ruleset_path.display());

    let mut failed = false;
    for raw in urls {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                eprintln!("{}: invalid URL ({})", raw, e);
                failed = true;
                continue;
            }
        };

        let evaluation = RuleEngine::evaluate(&rules, &url);
        match &evaluation.rewritten {
            Some(rewritten) => println!("{} -> {}", url, rewritten),
            None => println!("{} (unchanged)", url),
        }

        let applicable = evaluation.applicable_rules();
        for pattern in applicable.patterns() {
            let names: Vec<&str> = applicable
                .get(pattern)
                .unwrap_or_default()
                .iter()
                .map(|rule| rule.name())
                .collect();
            println!("   {}: {}", pattern, names.join(", "));
        }
    }

    if failed {
        std::process::exit(1);
    }
}

fn is_web_url(arg: &str) -> bool {
    Url::parse(arg).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}
