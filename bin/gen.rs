use airq_ingest::constants::{DATE_COLUMN, TIME_COLUMN};
use airq_ingest::Measurement;
use clap::{Arg, Command};
use std::io::{self, Write};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Write a synthetic sensor export to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("with_header")
                .long("with-header")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("invalid_every")
                .long("invalid-every")
                .help("Emit a row with a bad date every N rows (0 = never)")
                .value_parser(clap::value_parser!(u64))
                .default_value("0"),
        )
        .get_matches();

    let rows: u64 = *matches.get_one("rows").unwrap_or(&0);
    let with_header = matches.get_flag("with_header");
    let invalid_every: u64 = *matches.get_one("invalid_every").unwrap_or(&0);

    let mut out = io::BufWriter::new(io::stdout().lock());

    if with_header {
        write!(&mut out, "{DATE_COLUMN};{TIME_COLUMN}")?;
        for m in Measurement::ALL {
            write!(&mut out, ";{}", m.column())?;
        }
        // sensor exports end every line with two empty columns
        writeln!(&mut out, ";;")?;
    }

    for i in 0..rows {
        let hour = i % 24;
        let day = i / 24;
        let (d, mo, y) = (1 + day % 28, 1 + (day / 28) % 12, 2004 + day / 336);

        if invalid_every > 0 && (i + 1) % invalid_every == 0 {
            write!(&mut out, "{d:02}-{mo:02}-{y};{hour}.00.00")?;
        } else {
            write!(&mut out, "{d:02}/{mo:02}/{y};{hour}.00.00")?;
        }
        for (c, _) in Measurement::ALL.iter().enumerate() {
            if (i + c as u64) % 17 == 0 {
                write!(&mut out, ";-200")?;
            } else {
                write!(&mut out, ";{},{}", (i + c as u64) % 90, i % 10)?;
            }
        }
        writeln!(&mut out, ";;")?;
        if i % 10_000 == 0 {
            out.flush()?;
        }
    }

    out.flush()?;
    Ok(())
}
