/// Story Linter: checks a story file for broken links, unreachable passages,
/// dead ends and malformed macros.
///
/// Usage: story_linter <story.ron> [--verbose]

use harlowe_path_sim::core::format::FormatRegistry;
use harlowe_path_sim::core::harlowe::HarloweFormat;
use harlowe_path_sim::core::simulator::PathSimulator;
use harlowe_path_sim::schema::story::Story;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_linter <story.ron> [--verbose]");
        process::exit(0);
    }

    let verbose = args[2..].iter().any(|a| a == "--verbose" || a == "-v");
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);

    let story = match Story::load_from_ron(Path::new(&args[1])) {
        Ok(story) => story,
        Err(e) => {
            eprintln!("ERROR: Failed to load story: {}", e);
            process::exit(1);
        }
    };
    println!("Loaded '{}' with {} passages", story.title, story.passages.len());

    let registry = FormatRegistry::with_defaults();
    let sim = match PathSimulator::new(&story, &registry) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    let (errors, warnings) = lint_story(&sim);

    println!("\n=== Story Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn lint_story(sim: &PathSimulator) -> (Vec<String>, Vec<String>) {
    let story = sim.story();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match story.start_passage() {
        Some(start) => {
            let reachable = reachable_from(sim, &start.title);
            for title in story.titles() {
                if !reachable.contains(title) {
                    warnings.push(format!("passage '{}' is unreachable from '{}'", title, start.title));
                }
            }
        }
        None => errors.push("story has no start passage".to_string()),
    }

    for title in story.titles() {
        let links = sim.links_from(title);
        for target in &links {
            if !story.contains(target) {
                errors.push(format!("passage '{}' links to missing passage '{}'", title, target));
            }
        }

        let is_ending = story.passage(title).is_some_and(|p| p.has_tag("ending"));
        if links.is_empty() && !is_ending {
            warnings.push(format!("passage '{}' is a dead end", title));
        }
    }

    // Structural checks are Harlowe-specific.
    if sim.format().name() == HarloweFormat::NAME {
        for title in story.titles() {
            let Some(passage) = story.passage(title) else {
                continue;
            };
            for err in HarloweFormat.check_structure(&passage.content) {
                errors.push(format!("passage '{}': {}", title, err));
            }
        }
    }

    (errors, warnings)
}

fn reachable_from<'a>(sim: &PathSimulator<'a>, start: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([start.to_string()]);
    while let Some(title) = queue.pop_front() {
        if !sim.story().contains(&title) || !seen.insert(title.clone()) {
            continue;
        }
        queue.extend(sim.links_from(&title));
    }
    seen
}
