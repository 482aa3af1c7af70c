mod commands;

use std::env;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let cmd = &args[1];
    let rest = &args[2..];

    let result = match cmd.as_str() {
        "token-id" => {
            if rest.len() < 4 {
                println!("Usage: token-id <chain> <symbol> <decimals> <address>");
                println!("  chain    - evm:<chain id> or solana");
                return;
            }
            commands::token_id(&rest[0], &rest[1], &rest[2], &rest[3])
        }
        "note" => {
            if rest.len() < 3 {
                println!("Usage: note <amount> <token-id> <owner-key> [memo]");
                return;
            }
            commands::note(&rest[0], &rest[1], &rest[2], rest.get(3).map(String::as_str))
        }
        "overview" => {
            let Some(path) = rest.iter().find(|a| !a.starts_with("--")) else {
                println!("Usage: overview <notes.json> [--cache-only]");
                return;
            };
            let cache_only = rest.iter().any(|a| a == "--cache-only");
            commands::overview(path, cache_only).await
        }
        "sync" => {
            if rest.is_empty() {
                println!("Usage: sync <nullifier>...");
                return;
            }
            commands::sync(rest).await
        }
        "deposit" => {
            let positional: Vec<&String> = rest.iter().filter(|a| !a.starts_with("--")).collect();
            if positional.len() < 2 {
                println!("Usage: deposit <note.json> <nonce> [--submit]");
                return;
            }
            let submit = rest.iter().any(|a| a == "--submit");
            commands::deposit(positional[0], positional[1], submit).await
        }
        "config" => {
            print!("{}", shade_config::ShadeConfig::generate_sample());
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        _ => {
            println!("Unknown command: {}", cmd);
            println!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error running {}: {:#}", cmd, e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Shade CLI - shielded note toolkit");
    println!();
    println!("USAGE:");
    println!("  shade <command> [args]");
    println!();
    println!("NOTE COMMANDS:");
    println!("  token-id <chain> <symbol> <decimals> <address>   Derive a token id");
    println!("  note <amount> <token-id> <owner-key> [memo]      Build a note with fresh randomness");
    println!();
    println!("LEDGER COMMANDS:");
    println!("  overview <notes.json> [--cache-only]             Balance and spendable notes");
    println!("  sync <nullifier>...                              Refresh cached nullifier status");
    println!("  deposit <note.json> <nonce> [--submit]           Prove (and submit) a deposit");
    println!();
    println!("OTHER COMMANDS:");
    println!("  config                     Print a sample config.toml");
    println!("  help                       Show this help message");
    println!();
    println!("EXAMPLES:");
    println!("  shade token-id evm:1 USDC 6 0xA0b8...eB48");
    println!("  shade note 1000 0x1f...ab 0x05 > note.json");
    println!("  shade overview notes.json --cache-only");
    println!("  shade deposit note.json 7 --submit");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("  SHADE_CONFIG         Path to config.toml");
    println!("  SHADE_AUTHORITY_URL  Ledger authority endpoint");
    println!("  SHADE_DB_PATH        Nullifier cache database path");
    println!("  RUST_LOG             Log level (debug/info/warn/error)");
}
