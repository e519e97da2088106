// Renders the jobline man page to stdout, or to the file given as the first argument

use clap::CommandFactory;
use jobline::cli::Cli;
use std::io::Write;

fn main() -> std::io::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut buffer: Vec<u8> = Vec::new();
    man.render(&mut buffer)?;

    match std::env::args().nth(1) {
        Some(path) => std::fs::write(path, buffer),
        None => std::io::stdout().write_all(&buffer),
    }
}
