/// Path Sim: replays a path through a story file and prints the result as JSON.
///
/// Usage: path_sim <story.ron> [<title>...] [--config <file>] [--suggest <depth>]
///                 [--walk <steps>] [--seed <n>] [--start <title>] [--verbose]

use harlowe_path_sim::core::simulator::PathSimulator;
use harlowe_path_sim::schema::story::Story;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::path::Path;
use std::process;

enum Mode {
    Simulate,
    Suggest(usize),
    Walk(usize),
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        process::exit(0);
    }

    let story_path = &args[1];
    let mut titles = Vec::new();
    let mut config_path = None;
    let mut start = None;
    let mut mode = Mode::Simulate;
    let mut seed: u64 = 42;
    let mut verbose = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--suggest" if i + 1 < args.len() => {
                i += 1;
                mode = Mode::Suggest(parse_count(&args[i], "--suggest"));
            }
            "--walk" if i + 1 < args.len() => {
                i += 1;
                mode = Mode::Walk(parse_count(&args[i], "--walk"));
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            "--start" if i + 1 < args.len() => {
                i += 1;
                start = Some(args[i].clone());
            }
            "--verbose" | "-v" => verbose = true,
            flag if flag.starts_with("--") => {
                eprintln!("Unknown argument: {}", flag);
                print_usage();
                process::exit(1);
            }
            title => titles.push(title.to_string()),
        }
        i += 1;
    }

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);

    let story = match Story::load_from_ron(Path::new(story_path)) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("ERROR: Failed to load story: {}", e);
            process::exit(1);
        }
    };

    let mut builder = PathSimulator::builder(&story);
    if let Some(ref path) = config_path {
        builder = builder.config_file(Path::new(path));
    }
    let sim = match builder.build() {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    let start = start
        .or_else(|| titles.first().cloned())
        .or_else(|| story.start_passage().map(|p| p.title.clone()));

    let output = match mode {
        Mode::Simulate => {
            if titles.is_empty() {
                eprintln!("ERROR: no path given");
                print_usage();
                process::exit(1);
            }
            let result = sim.simulate_path(&titles);
            let json = serde_json::to_string_pretty(&result);
            if !result.success {
                print_json(json);
                process::exit(1);
            }
            json
        }
        Mode::Suggest(depth) => {
            let Some(start) = start else {
                eprintln!("ERROR: no start passage; pass --start <title>");
                process::exit(1);
            };
            serde_json::to_string_pretty(&sim.suggested_paths(&start, depth))
        }
        Mode::Walk(steps) => {
            let Some(start) = start else {
                eprintln!("ERROR: no start passage; pass --start <title>");
                process::exit(1);
            };
            let walk = sim.random_walk(&start, steps, seed);
            serde_json::to_string_pretty(&sim.simulate_path(&walk))
        }
    };
    print_json(output);
}

fn print_json(json: serde_json::Result<String>) {
    match json {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("ERROR: Serialization failed: {}", e);
            process::exit(1);
        }
    }
}

fn parse_count(arg: &str, flag: &str) -> usize {
    match arg.parse() {
        Ok(n) => n,
        Err(_) => {
            eprintln!("ERROR: {} expects a number, got '{}'", flag, arg);
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("Usage: path_sim <story.ron> [<title>...] [options]");
    println!();
    println!("Options:");
    println!("  --config <file>    load a simulator config (RON)");
    println!("  --suggest <depth>  print suggested paths instead of simulating");
    println!("  --walk <steps>     simulate a seeded random walk");
    println!("  --seed <n>         seed for --walk (default 42)");
    println!("  --start <title>    start passage for --suggest and --walk");
    println!("  --verbose, -v      log every step to stderr");
}
