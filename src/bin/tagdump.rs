//! Dump a DT record file: one identity line per record, faults inline, and
//! per-type / per-mid counts at the end.
//!
//! Usage: tagdump [-v]... [--checksums] [--fields] [--start=OFFSET] <file>

use std::io::Write;
use std::path::PathBuf;
use tagdump::dump::{fault_line, fields_to_dump, record_line, REC_TITLE};
use tagdump::registry::{dt_records, sirf_mids};
use tagdump::{lookup_message_name, lookup_type_name, Decoded, DecoderConfig, StreamDecoder};

fn init_logging(verbose: u8) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = match verbose {
        0 => LevelFilter::Warn,
        1..=2 => LevelFilter::Info,
        3..=4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

fn main() -> anyhow::Result<()> {
    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let mut verbose = 0u8;
    raw_args.retain(|a| {
        if a.len() > 1 && a.starts_with('-') && a[1..].chars().all(|c| c == 'v') {
            verbose = verbose.saturating_add((a.len() - 1) as u8);
            false
        } else {
            true
        }
    });
    let checksums = match raw_args.iter().position(|a| a == "--checksums") {
        Some(pos) => {
            raw_args.remove(pos);
            true
        }
        None => false,
    };
    let show_fields = match raw_args.iter().position(|a| a == "--fields") {
        Some(pos) => {
            raw_args.remove(pos);
            true
        }
        None => false,
    };
    let start: usize = match raw_args.iter().position(|a| a.starts_with("--start=")) {
        Some(pos) => {
            let arg = raw_args.remove(pos);
            let s = arg.trim_start_matches("--start=");
            s.parse().map_err(|e| anyhow::anyhow!("bad --start '{}': {}", s, e))?
        }
        None => 0,
    };
    let path: PathBuf = raw_args
        .into_iter()
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: tagdump [-v]... [--checksums] [--fields] [--start=OFFSET] <file>"))?;

    init_logging(verbose);
    log::info!("tagdump v{}: {}", env!("CARGO_PKG_VERSION"), path.display());

    let bytes = std::fs::read(&path).map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    let config = DecoderConfig::new().with_level(verbose).with_checksums(checksums);
    let mut decoder = StreamDecoder::new(config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", REC_TITLE)?;

    let mut offset = start.min(bytes.len());
    let (mut n_records, mut n_faults) = (0usize, 0usize);
    loop {
        let (decoded, consumed) = decoder.decode_next_record(&bytes[offset..], offset);
        match decoded {
            Decoded::Record(r) => {
                n_records += 1;
                writeln!(out, "{}", record_line(&r))?;
                for f in &r.faults {
                    writeln!(out, "    *** {}", f)?;
                }
                if show_fields {
                    if let Some(schema) = dt_records().lookup(r.header.rtype).schema {
                        writeln!(out, "{}", fields_to_dump(schema, &r.fields, 2))?;
                    }
                    if let Some(m) = &r.inner {
                        if let Some(schema) = sirf_mids().lookup(m.mid as u16).schema {
                            writeln!(out, "    {} ({}):", m.name, m.mid)?;
                            writeln!(out, "{}", fields_to_dump(schema, &m.fields, 3))?;
                        }
                    }
                }
            }
            Decoded::Fault(f) => {
                n_faults += 1;
                writeln!(out, "{}", fault_line(&f))?;
            }
            Decoded::Exhausted => break,
        }
        if consumed == 0 {
            break;
        }
        offset += consumed;
    }

    let counts = decoder.counts();
    writeln!(out)?;
    writeln!(out, "records: {}  faults: {}  bytes: {}", n_records, n_faults, offset - start.min(bytes.len()))?;
    writeln!(out, "record types:")?;
    for (code, n) in counts.records.snapshot() {
        writeln!(out, "  {:5} {:<14} {}", code, lookup_type_name(code), n)?;
    }
    if counts.records.unknown() > 0 {
        writeln!(out, "  {:>5} {:<14} {}", "-", "unk", counts.records.unknown())?;
    }
    let mids = counts.messages.snapshot();
    if !mids.is_empty() {
        writeln!(out, "sirf mids:")?;
        for (mid, n) in mids {
            writeln!(out, "  {:5} {:<14} {}", mid, lookup_message_name(mid as u8), n)?;
        }
    }
    Ok(())
}
