use clap::Parser;
use log::{info, warn};
use rayon::ThreadPoolBuilder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::num::NonZeroUsize;
use txg::transcripts::{open_text_input, TranscriptIndex};
use txg::translate::{translate_queries, write_results};

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Path to the transcript alignment file (transcript, chromosome, genomic start, CIGAR).
    /// Unless --force-reindex is given, an associated index file is reused when present.
    #[clap(short = 'a', long, value_parser)]
    alignments: String,

    /// Force the regeneration of the index, even if it already exists.
    #[clap(short = 'I', long, action)]
    force_reindex: bool,

    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = NonZeroUsize::new(4).unwrap())]
    num_threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Command-line tool for translating transcript coordinates to genome coordinates.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Translate transcript positions from a query file
    Translate {
        #[clap(flatten)]
        common: CommonOpts,

        /// Path to the query file (transcript, 0-based transcript position)
        #[clap(short = 'q', long, value_parser)]
        queries: String,

        /// Output file; writes to stdout if omitted
        #[clap(short = 'o', long, value_parser)]
        output: Option<String>,
    },
    /// Build the transcript index and serialize it, without running queries
    Index {
        #[clap(flatten)]
        common: CommonOpts,
    },
    /// Print index statistics
    Stats {
        #[clap(flatten)]
        common: CommonOpts,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Translate {
            common,
            queries,
            output,
        } => {
            let transcripts = initialize_index(&common)?;

            let reader = open_text_input(&queries)?;
            let results = translate_queries(reader, &transcripts).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to translate queries: {}", e),
                )
            })?;

            match output {
                Some(path) => {
                    let mut writer = BufWriter::new(File::create(&path)?);
                    write_results(&mut writer, &results)?;
                    writer.flush()?;
                    info!("Wrote {} translated positions to {}", results.len(), path);
                }
                None => {
                    let stdout = io::stdout();
                    let mut writer = BufWriter::new(stdout.lock());
                    write_results(&mut writer, &results)?;
                    writer.flush()?;
                }
            }
        }
        Args::Index { common } => {
            init_runtime(&common);
            let transcripts = generate_index(&common.alignments)?;
            info!("Indexed {} transcripts", transcripts.len());
        }
        Args::Stats { common } => {
            let transcripts = initialize_index(&common)?;

            print_stats(&transcripts);
        }
    }

    Ok(())
}

/// Initialize logger and thread pool based on common options
fn init_runtime(common: &CommonOpts) {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    ThreadPoolBuilder::new()
        .num_threads(common.num_threads.into())
        .build_global()
        .unwrap();
}

/// Initialize the runtime and load/generate the index based on common options
fn initialize_index(common: &CommonOpts) -> io::Result<TranscriptIndex> {
    init_runtime(common);

    if common.force_reindex {
        generate_index(&common.alignments)
    } else {
        load_or_generate_index(&common.alignments)
    }
}

fn index_path(alignments_file: &str) -> String {
    format!("{}.txg", alignments_file)
}

fn load_or_generate_index(alignments_file: &str) -> io::Result<TranscriptIndex> {
    if std::path::Path::new(&index_path(alignments_file)).exists() {
        load_index(alignments_file)
    } else {
        generate_index(alignments_file)
    }
}

fn load_index(alignments_file: &str) -> io::Result<TranscriptIndex> {
    let index_file = index_path(alignments_file);

    let alignments_metadata = std::fs::metadata(alignments_file)?;
    let index_metadata = std::fs::metadata(index_file.clone())?;
    if let (Ok(alignments_ts), Ok(index_ts)) =
        (alignments_metadata.modified(), index_metadata.modified())
    {
        if alignments_ts > index_ts {
            warn!("WARNING:\tAlignment file has been modified since txg index creation.");
        }
    } else {
        warn!("WARNING:\tUnable to compare timestamps of alignment file and txg index file. Alignment file may have been modified since txg index creation.");
    }

    let file = File::open(index_file)?;
    let mut reader = BufReader::new(file);
    let transcripts: TranscriptIndex =
        bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard()).map_err(
            |e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to deserialize index: {:?}", e),
                )
            },
        )?;
    Ok(transcripts)
}

fn generate_index(alignments_file: &str) -> io::Result<TranscriptIndex> {
    let reader = open_text_input(alignments_file)?;
    let transcripts = TranscriptIndex::from_reader(reader).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse alignment records: {}", e),
        )
    })?;

    let file = File::create(index_path(alignments_file))?;
    let mut writer = BufWriter::new(file);
    bincode::serde::encode_into_std_write(&transcripts, &mut writer, bincode::config::standard())
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to serialize index: {:?}", e),
            )
        })?;
    writer.flush()?;

    Ok(transcripts)
}

fn print_stats(transcripts: &TranscriptIndex) {
    // Basic stats
    let num_transcripts = transcripts.len();
    let total_transcript_length: i64 = transcripts
        .iter()
        .map(|(_, record)| record.index.transcript_len())
        .sum();
    let num_intervals: usize = transcripts
        .iter()
        .map(|(_, record)| record.index.intervals().len())
        .sum();
    let num_insertion_intervals: usize = transcripts
        .iter()
        .map(|(_, record)| {
            record
                .index
                .intervals()
                .iter()
                .filter(|interval| interval.is_insertion)
                .count()
        })
        .sum();
    println!("Number of transcripts: {}", num_transcripts);
    println!("Total transcript length: {} bp", total_transcript_length);
    println!("Number of intervals: {}", num_intervals);
    println!("Number of insertion intervals: {}", num_insertion_intervals);

    // Interval distribution stats
    let mut entries: Vec<(&String, usize)> = transcripts
        .iter()
        .map(|(transcript, record)| (transcript, record.index.intervals().len()))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    if !entries.is_empty() {
        let mean = num_intervals as f64 / entries.len() as f64;

        let median = if entries.len() % 2 == 0 {
            let mid = entries.len() / 2;
            (entries[mid - 1].1 + entries[mid].1) as f64 / 2.0
        } else {
            entries[entries.len() / 2].1 as f64
        };
        println!("\nMean intervals per transcript: {:.2}", mean);
        println!("Median intervals per transcript: {:.2}", median);

        println!("\nTop transcripts by number of intervals:");
        for (idx, (transcript, count)) in entries.iter().take(5).enumerate() {
            println!("{}. {}: {} intervals", idx + 1, transcript, count);
        }
    }
}
