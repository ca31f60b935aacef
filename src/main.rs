//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{anyhow, bail, Context};
use clap::{Arg, Command};
use env_logger::Builder;
use log::{trace, LevelFilter};

use plc::{
    ast::{Category, Program, VarId},
    awl, compile, encode,
    error::Diagnostics,
    ir::Operation,
    parse,
    sim::Simulator,
    source,
};

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader, Write},
};

/// Capacidad de pila del simulador para tablas de verdad.
const STACK_SIZE: usize = 256;

/// Máximo de entradas que se enumeran en una tabla de verdad.
const TRUTH_INPUTS: usize = 16;

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("PLC compiler")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .multiple_occurrences(true)
                .help("Increase log verbosity (up to -vvvv)"),
        )
        .arg(
            Arg::new("awl")
                .long("awl")
                .help("Parse the input as an AWL listing instead of equations"),
        )
        .arg(
            Arg::new("emit")
                .short('e')
                .long("emit")
                .value_name("FORMAT")
                .takes_value(true)
                .default_value("ops")
                .possible_values(["ops", "hex", "bin"])
                .help("Output format"),
        )
        .arg(
            Arg::new("resolve")
                .long("resolve")
                .value_name("NAME")
                .takes_value(true)
                .conflicts_with("awl")
                .help("Print the dependency-resolved equation of a signal"),
        )
        .arg(
            Arg::new("truth")
                .long("truth")
                .value_name("NAME")
                .takes_value(true)
                .conflicts_with("awl")
                .help("Print the truth table of a signal"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .help("Output file ('-' or absent for stdout)"),
        )
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("INPUT")
                .help("Source file ('-' for stdin)"),
        )
        .get_matches();

    configure_logger(args.occurrences_of("verbose"))?;

    // Se extraen argumentos necesarios
    let input = args.value_of("input").unwrap_or("-");
    let format = args.value_of("emit").unwrap_or("ops");
    let output = args.value_of("output").filter(|&path| path != "-");

    let reader: Box<dyn BufRead> = match input {
        "-" => Box::new(BufReader::new(io::stdin())),
        path => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open for reading: {}", path))?;

            Box::new(BufReader::new(file))
        }
    };

    let (start, stream) = source::consume(reader, input);
    let operations = if args.is_present("awl") {
        let program = awl::parse_awl(start, stream).map_err(|error| {
            eprint!("{}", Diagnostics::from(error));
            anyhow!("Failed to parse AWL listing: {}", input)
        })?;

        compile::compile_awl(&program).map_err(|error| anyhow!("{}", error))?
    } else {
        let program = parse::parse(start, stream).map_err(|error| {
            eprint!("{}", Diagnostics::from(error));
            anyhow!("Failed to parse equations: {}", input)
        })?;

        if let Some(name) = args.value_of("resolve") {
            let resolved = program
                .resolve_dependencies(name, None)
                .map_err(|error| anyhow!("{}", error))?;

            println!("{} {} {}", name, resolved.assignment(), program.display(&resolved));
        }

        if let Some(name) = args.value_of("truth") {
            truth_table(&program, name, &mut io::stdout())?;
        }

        compile::compile_program(&program).map_err(|error| anyhow!("{}", error))?
    };

    match (format, output) {
        // Salida binaria a stdout
        ("bin", None) => bail!("Refusing to write binary image to stdout"),

        // Salida binaria a archivo
        ("bin", Some(path)) => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            encode::emit(&operations, &mut file)
                .with_context(|| format!("Failed to emit to file: {}", path))?;
        }

        // Salida textual
        (format, path) => {
            let mut writer: Box<dyn Write> = match path {
                None => Box::new(io::stdout()),
                Some(path) => Box::new(
                    File::create(path)
                        .with_context(|| format!("Failed to open for writing: {}", path))?,
                ),
            };

            match format {
                "hex" => write_hex(&operations, &mut writer)?,
                _ => write_listing(&operations, &mut writer)?,
            }

            writer.flush().context("Failed to flush output")?;
        }
    };

    Ok(())
}

/// Configura el logger con la verbosidad indicada.
///
/// Mayor verbosidad implica más mensajes, hasta un máximo.
fn configure_logger(verbosity: u64) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        4 => LevelFilter::Trace,
        _ => bail!("Verbosity is limited to -vvvv"),
    };

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}:{}] {}",
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(level)
        .init();

    trace!("logger verbosity {}", level);
    Ok(())
}

fn write_listing(operations: &[Operation], output: &mut dyn Write) -> anyhow::Result<()> {
    for operation in operations {
        writeln!(output, "{}", operation).context("Failed to write listing")?;
    }

    Ok(())
}

fn write_hex(operations: &[Operation], output: &mut dyn Write) -> anyhow::Result<()> {
    let bytes = encode::encode(operations).context("Failed to encode program")?;

    for row in bytes.chunks(16) {
        let row: Vec<String> = row.iter().map(|byte| format!("{:02x}", byte)).collect();
        writeln!(output, "{}", row.join(" ")).context("Failed to write hex dump")?;
    }

    Ok(())
}

/// Enumera todas las combinaciones de las hojas de una señal resuelta.
fn truth_table(program: &Program, name: &str, output: &mut dyn Write) -> anyhow::Result<()> {
    let resolved = program
        .resolve_dependencies(name, None)
        .map_err(|error| anyhow!("{}", error))?;

    let mut operations = Vec::new();
    compile::compile_expression(program.symbols(), &resolved, |operation| {
        operations.push(operation)
    })
    .map_err(|error| anyhow!("{}", error))?;

    let mut inputs: HashMap<VarId, u32> = HashMap::new();
    resolved.count_inputs(&mut inputs);

    let mut leaves: Vec<VarId> = inputs.into_keys().collect();
    leaves.sort();

    if leaves.len() > TRUTH_INPUTS {
        bail!(
            "Signal `{}` depends on {} inputs, at most {} are supported",
            name,
            leaves.len(),
            TRUTH_INPUTS
        );
    }

    let cells = |category| {
        program
            .symbols()
            .max_index(category)
            .map_or(0, |max| max as usize + 1)
    };

    let mut simulator = Simulator::new(
        cells(Category::Input),
        cells(Category::Output),
        cells(Category::Flag),
        cells(Category::Monoflop),
    );

    let header: Vec<&str> = leaves
        .iter()
        .map(|&leaf| program.variable(leaf).name().as_ref())
        .collect();

    writeln!(output, "{} | {}", header.join(" "), name)?;

    for row in 0u32..1 << leaves.len() {
        simulator.reset_all();

        let mut values = Vec::with_capacity(leaves.len());
        for (position, &leaf) in leaves.iter().enumerate() {
            let value = (row >> (leaves.len() - 1 - position)) & 1 == 1;
            let variable = program.variable(leaf);

            simulator.set(variable.category(), variable.index(), value)?;
            values.push(format!("{:>width$}", value as u8, width = header[position].len()));
        }

        let result = simulator.execute::<STACK_SIZE>(&operations)?;
        writeln!(output, "{} | {}", values.join(" "), result as u8)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_hex_when_long_image_then_rows_of_sixteen() {
        let program = parse::parse_str(
            "Inputs: a=0; Outputs: out=0;
             out = a & a & a & a & a & a & a & a & a;",
        )
        .unwrap();

        let operations = compile::compile_program(&program).unwrap();
        let mut output = Vec::new();
        write_hex(&operations, &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let rows: Vec<&str> = text.lines().collect();

        // 9 lecturas, 8 combinadores y el almacenamiento
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].split(' ').count(), 16);
        assert_eq!(rows[0].split(' ').next(), Some("30"));
        assert_eq!(rows[1].split(' ').collect::<Vec<_>>(), ["c1", "40"]);
    }

    #[test]
    fn truth_table_when_two_leaves_then_four_rows() {
        let program = parse::parse_str("Inputs: a=0, b=1; Outputs: out=0; out = a & !b;").unwrap();

        let mut output = Vec::new();
        truth_table(&program, "out", &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "a b | out\n0 0 | 0\n0 1 | 0\n1 0 | 1\n1 1 | 0\n"
        );
    }
}
