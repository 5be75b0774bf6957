//! Entry point ("driver").
//!
//! This module wires the compilation phases together and exposes a CLI.
//! Assembling and linking the output is up to the caller.

use anyhow::Context;
use clap::{crate_version, Arg, Command};
use kair::target::{AddressMode, EmitOptions, Syntax, Target};

use std::{
    fs::{self, File},
    io::{self, BufReader, Write},
    process,
    str::FromStr,
};

fn main() -> anyhow::Result<()> {
    // CLI parsing
    let args = Command::new("KAIR compiler")
        .version(crate_version!())
        .arg(
            Arg::new("syntax")
                .long("syntax")
                .value_name("DIALECT")
                .takes_value(true)
                .default_value("nasm")
                .possible_values(["nasm", "gas"])
                .ignore_case(true)
                .help("Assembler syntax of the output"),
        )
        .arg(
            Arg::new("addressing")
                .long("addressing")
                .value_name("MODE")
                .takes_value(true)
                .default_value("symbol")
                .possible_values(["symbol", "rip"])
                .ignore_case(true)
                .help("How static regions are addressed"),
        )
        .arg(
            Arg::new("annotate")
                .long("annotate")
                .help("Quote each source statement in the output"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .default_value("-")
                .help("Output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("SOURCE")
                .help("Source file ('-' for stdin)"),
        )
        .get_matches();

    // Values are validated by clap, defaults make them always present
    let syntax = args.value_of("syntax").and_then(|name| Syntax::from_str(name).ok());
    let addressing = args
        .value_of("addressing")
        .and_then(|name| AddressMode::from_str(name).ok());

    let mut options = EmitOptions::empty();
    if args.is_present("annotate") {
        options |= EmitOptions::ANNOTATE;
    }

    let target = Target {
        syntax: syntax.context("Bad syntax name")?,
        addressing: addressing.context("Bad addressing mode")?,
        options,
    };

    let input = args.value_of("input").context("Missing input")?;
    let output = args.value_of("output").unwrap_or("-");

    let result = match input {
        "-" => kair::compile(io::stdin().lock(), "<stdin>", &target),
        path => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open for reading: {}", path))?;

            kair::compile(BufReader::new(file), path, &target)
        }
    };

    let asm = match result {
        Ok(asm) => asm,
        Err(diagnostics) => {
            eprint!("{}", diagnostics);
            process::exit(1);
        }
    };

    match output {
        "-" => io::stdout()
            .write_all(asm.as_bytes())
            .context("Failed to write to stdout")?,

        path => fs::write(path, asm).with_context(|| format!("Failed to write: {}", path))?,
    }

    Ok(())
}
