use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;
use pdfcos::{ByteSink, Document, FileSink, FileSource, Object, ObjectId, WriteSink, XrefEntry};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect the objects of a PDF file", arg_required_else_help = true)]
struct Args {
    /// Input PDF file.
    input: PathBuf,

    /// File key of an encrypted document, as hex digits.
    #[arg(long, global = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Version, trailer and cross-reference statistics.
    Info,
    /// Print one object.
    Object {
        number: u32,
        #[arg(default_value_t = 0)]
        generation: u16,
    },
    /// Decode one stream.
    Stream {
        number: u32,
        #[arg(default_value_t = 0)]
        generation: u16,
        /// Write the decoded bytes here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resolve every object and report the ones that fail.
    Check,
}

fn parse_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

fn info(doc: &Document<FileSource>) {
    println!("PDF-{}", doc.version);
    doc.with_xref(|xref| {
        let compressed = xref
            .iter()
            .filter(|(_, entry)| matches!(entry, XrefEntry::Compressed { .. }))
            .count();
        println!("sections: {}", xref.section_count());
        println!("objects: {} ({compressed} in object streams)", xref.len());
        if let Some(start) = xref.start_xref() {
            println!("startxref: {start}");
        }
    });
    for (key, value) in doc.trailer().iter() {
        println!("/{} {value:?}", String::from_utf8_lossy(key));
    }
    for warning in doc.warnings() {
        println!("warning: {warning}");
    }
}

fn stream(doc: &Document<FileSource>, id: ObjectId, output: Option<PathBuf>) -> pdfcos::Result<u64> {
    let object = doc.get_object(id)?;
    let stream = object.as_stream()?;
    let mut chain = doc.store().decode_chain(id, stream)?;
    let mut sink: Box<dyn ByteSink> = match output {
        Some(path) => Box::new(FileSink::create(path)?),
        None => Box::new(WriteSink::new(io::stdout().lock())),
    };
    let written = sink.write_from(&mut chain)?;
    sink.close()?;
    Ok(written)
}

fn check(doc: &Document<FileSource>) -> bool {
    let resolved = doc.resolve_all();
    let streams = resolved
        .objects
        .iter()
        .filter(|(_, object)| matches!(***object, Object::Stream(_)))
        .filter(|(id, object)| {
            let result = object.as_stream().and_then(|stream| doc.store().decode_stream(**id, stream));
            if let Err(err) = &result {
                println!("{} {}: {err}", id.0, id.1);
            }
            result.is_err()
        })
        .count();
    for (id, err) in &resolved.failures {
        println!("{} {}: {err}", id.0, id.1);
    }
    println!(
        "{} objects, {} failed to resolve, {streams} streams failed to decode",
        resolved.objects.len() + resolved.failures.len(),
        resolved.failures.len()
    );
    resolved.failures.is_empty() && streams == 0
}

fn run(args: Args) -> pdfcos::Result<bool> {
    let mut doc = Document::load(&args.input)?;
    if let Some(key) = &args.key {
        match parse_hex(key) {
            Some(key) => doc.set_encryption_key(key)?,
            None => {
                error!("--key expects hex digits");
                return Ok(false);
            }
        }
    }

    match args.command {
        Command::Info => info(&doc),
        Command::Object { number, generation } => println!("{:?}", doc.get_object((number, generation))?),
        Command::Stream {
            number,
            generation,
            output,
        } => {
            let written = stream(&doc, (number, generation), output)?;
            log::info!("{written} bytes decoded");
        }
        Command::Check => return Ok(check(&doc)),
    }
    Ok(true)
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
