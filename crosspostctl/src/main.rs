use clap::Parser;

fn main() {
    let cli = crosspostctl::Cli::parse();
    std::process::exit(crosspostctl::run(cli));
}
