use clap::Parser;

fn main() {
    let cli = highlightsctl::Cli::parse();
    if let Err(err) = highlightsctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
