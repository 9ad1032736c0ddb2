use colored::Colorize;

fn main() {
    if let Err(e) = menaxa::app::run_cli() {
        eprintln!("{} {}", "::".bold().red(), e);
        std::process::exit(1);
    }
}
