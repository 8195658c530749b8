/// Playtest: interactive shell for walking a story and poking at its state.
///
/// Usage: playtest <story.ron> [--config <file>] [--verbose]
///
/// Commands:
///   go <title>           follow a link from the current passage
///   eval <expr>          evaluate an expression against the current state
///   if <condition>       evaluate a condition against the current state
///   state                print every variable
///   links                list links out of the current passage
///   suggest <depth>      suggested paths from the current passage
///   walk <steps> [seed]  take a seeded random walk from here
///   reset                back to the start passage with the initial state
///   help                 list commands
///   quit                 exit

use harlowe_path_sim::core::format::Evaluator;
use harlowe_path_sim::core::simulator::PathSimulator;
use harlowe_path_sim::schema::simulation::SimulationResult;
use harlowe_path_sim::schema::story::Story;
use harlowe_path_sim::schema::value::VariableState;
use rustc_hash::FxHashMap;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// The path walked so far and the state it produced.
struct Session {
    path: Vec<String>,
    state: VariableState,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let story_path = args[1].clone();
    let mut config_path = None;
    let mut verbose = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--verbose" | "-v" => verbose = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);

    let story = match Story::load_from_ron(Path::new(&story_path)) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("ERROR: Failed to load story: {}", e);
            std::process::exit(1);
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
            std::process::exit(1);
        }
    };

    let Some(start) = story.start_passage().map(|p| p.title.clone()) else {
        eprintln!("ERROR: story has no start passage");
        std::process::exit(1);
    };

    println!("Loaded '{}' ({} passages, format {})", story.title, story.passages.len(), sim.format().name());
    println!("Type 'help' for commands.\n");

    let mut session = Session {
        path: Vec::new(),
        state: sim.config().initial_state.clone(),
    };
    enter(&sim, &mut session, &start);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{}> ", session.path.last().map(String::as_str).unwrap_or(""));
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
            None => (line.to_lowercase(), ""),
        };

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "go" => {
                if rest.is_empty() {
                    println!("Usage: go <title>");
                    continue;
                }
                let links = current_links(&sim, &session);
                if !links.iter().any(|l| l == rest) {
                    println!("No link to '{}'. Links: {:?}", rest, links);
                    continue;
                }
                enter(&sim, &mut session, rest);
            }
            "eval" => match evaluator_for(&sim, &session).evaluate_expression(rest) {
                Ok(value) => println!("{}", value),
                Err(e) => println!("Error: {}", e),
            },
            "if" => match evaluator_for(&sim, &session).evaluate_condition(rest) {
                Ok(holds) => println!("{}", holds),
                Err(e) => println!("Error: {}", e),
            },
            "state" => {
                if session.state.is_empty() {
                    println!("(no variables)");
                }
                for (name, value) in &session.state {
                    println!("  ${} = {}", name, value);
                }
            }
            "links" => {
                for link in current_links(&sim, &session) {
                    println!("  -> {}", link);
                }
            }
            "suggest" => {
                let depth = rest.parse().unwrap_or(3);
                let Some(here) = session.path.last() else {
                    continue;
                };
                for path in sim.suggested_paths(here, depth) {
                    println!("  {}", path.join(" -> "));
                }
            }
            "walk" => {
                let mut parts = rest.split_whitespace();
                let steps = parts.next().and_then(|s| s.parse().ok()).unwrap_or(5);
                let seed = parts.next().and_then(|s| s.parse().ok()).unwrap_or(42);
                let Some(here) = session.path.last().cloned() else {
                    continue;
                };
                let walk = sim.random_walk(&here, steps, seed);
                for title in walk.iter().skip(1) {
                    enter(&sim, &mut session, title);
                }
            }
            "reset" => {
                session.path.clear();
                session.state = sim.config().initial_state.clone();
                enter(&sim, &mut session, &start);
            }
            _ => {
                println!("Unknown command: {}. Type 'help' for commands.", cmd);
            }
        }
    }
}

/// Extend the session path by one passage and replay it from the start.
fn enter(sim: &PathSimulator, session: &mut Session, title: &str) {
    session.path.push(title.to_string());
    let result = sim.simulate_path(&session.path);
    if !result.success {
        session.path.pop();
        for error in &result.errors {
            println!("Error: {}", error);
        }
        return;
    }
    report_step(&result);
    session.state = result.final_state;
}

fn report_step(result: &SimulationResult) {
    let Some(step) = result.steps.last() else {
        return;
    };
    println!("== {} (step {}) ==", step.passage_title, step.index);
    for change in step.changes.values().filter(|c| c.is_changed()) {
        match (&change.previous, change.delta) {
            (Some(_), Some(delta)) => println!("  ${} = {} ({:+})", change.name, change.current, delta),
            (Some(previous), None) => println!("  ${} = {} (was {})", change.name, change.current, previous),
            (None, _) => println!("  ${} = {} (new)", change.name, change.current),
        }
    }
    for warning in &step.warnings {
        println!("  WARNING: {}", warning);
    }
    if step.available_links.is_empty() {
        println!("  (no links)");
    } else {
        println!("  links: {}", step.available_links.join(", "));
    }
}

fn current_links(sim: &PathSimulator, session: &Session) -> Vec<String> {
    session
        .path
        .last()
        .map(|title| sim.links_from(title))
        .unwrap_or_default()
}

/// An evaluator positioned where the session stands.
fn evaluator_for(sim: &PathSimulator, session: &Session) -> Box<dyn Evaluator> {
    let mut evaluator = sim.format().create_evaluator(session.state.clone());
    let mut visits: FxHashMap<String, u32> = FxHashMap::default();
    for title in &session.path {
        *visits.entry(title.clone()).or_insert(0) += 1;
    }
    evaluator.set_visited_passages(visits);
    evaluator.set_history(session.path.clone());
    if let Some(here) = session.path.last() {
        evaluator.set_current_passage(here);
    }
    evaluator
}

fn print_usage() {
    println!("Usage: playtest <story.ron> [--config <file>] [--verbose]");
    println!();
    println!("Replay a story interactively. Type 'help' inside for commands.");
}

fn print_help() {
    println!("Commands:");
    println!("  go <title>           follow a link from the current passage");
    println!("  eval <expr>          evaluate an expression, e.g. eval $hp + 5");
    println!("  if <condition>       evaluate a condition, e.g. if $hp > 50");
    println!("  state                print every variable");
    println!("  links                list links out of the current passage");
    println!("  suggest <depth>      suggested paths from here (default depth 3)");
    println!("  walk <steps> [seed]  take a seeded random walk from here");
    println!("  reset                back to the start with the initial state");
    println!("  help                 this list");
    println!("  quit                 exit");
}
