use colored::Colorize;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("no role") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Pick a side with:");
        eprintln!("  {} hostlink run --role responder", "$".dimmed());
    }

    if msg.contains("connection refused") || msg.contains("unable to establish") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Start the responder first, then the initiator:");
        eprintln!("  {} hostlink run --role responder", "$".dimmed());
    }

    if msg.contains("address in use") || msg.contains("failed to prepare") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Another responder is already running. Stop it or pick a port:");
        eprintln!("  {} hostlink run --role responder --port 35001", "$".dimmed());
    }

    std::process::exit(1);
}
