use anyhow::Result;
use clap::Parser;
use huffman_stream::{transform, Config, Stats, Summary};
use std::{ffi::OsString, path::PathBuf, time::Duration};
use tracing::warn;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Compress or decompress a string or a file with Huffman coding.
#[derive(Parser)]
pub struct Options {
    /// Interpret <INPUT> as a path and transform the file it points to.
    #[clap(short = 'f')]
    from_file: bool,

    /// Print the console output as a binary string.
    #[clap(short = 'b')]
    binary: bool,

    /// Print the code dictionary.
    #[clap(short = 'd')]
    dictionary: bool,

    /// Print statistics about the input and output.
    #[clap(short = 's')]
    stats: bool,

    /// Decode the input instead of encoding it. Requires -f.
    #[clap(short = 'r')]
    decode: bool,

    /// Write the result to this file instead of the console.
    #[clap(short = 'o')]
    output: Option<PathBuf>,

    /// Do not output the result, useful for gathering statistics.
    #[clap(short = 'n')]
    suppress: bool,

    input: OsString,
}

impl Options {
    fn config(&self) -> Config {
        Config {
            decode: self.decode,
            from_file: self.from_file,
            output_path: self.output.clone(),
            suppress_output: self.suppress,
            binary_display: self.binary,
        }
    }

    fn warn_ignored(&self) {
        if self.suppress && self.binary {
            warn!("-b ignored because of -n");
        }
        if self.suppress && self.output.is_some() {
            warn!("-o <filepath> ignored because of -n");
        }
        if self.binary && self.output.is_some() {
            warn!("-b flag only applies to console output, -o specified");
        }
    }

    fn run(&self) -> Result<()> {
        self.warn_ignored();
        let config = self.config();

        if !self.suppress {
            match (self.output.is_some(), self.decode) {
                (true, false) => println!("Encoding Message..."),
                (true, true) => println!("Decoding Message..."),
                (false, false) => println!("Encoded Message:"),
                (false, true) => println!("Decoded Message:"),
            }
        }

        let summary = transform(&config, config.input(&self.input))?;

        if !self.suppress {
            println!("{}", if self.output.is_some() { "" } else { "\n\nDone." });
        }
        if self.dictionary {
            print_dictionary(&summary);
        }
        if self.stats {
            self.print_stats(&summary.stats);
        }
        Ok(())
    }

    fn print_stats(&self, stats: &Stats) {
        println!("\nStatistics:");
        if self.decode {
            println!("----  Input  ----");
            println!("File Size Before Decoding : {} Bytes", stats.compressed_bytes());
            println!("Dictionary Size           : {}", bits(stats.header_bits));
            println!("Digest Size               : {}", bits(stats.payload_bits));
            println!("File Compression Ratio    : {}", percent(stats.file_ratio()));
            println!("\n---- Output  ----");
            println!("File Size                 : {} Bytes", stats.plain_bytes);
        } else {
            println!("----  Input  ----");
            println!("Size Before Encoding      : {} Bytes", stats.plain_bytes);
            println!("Shannon Entropy           : {:.3} Bits", stats.shannon_entropy);

            println!("\n---- Output  ----");
            println!("Digest Size               : {}", bits(stats.payload_bits));
            println!("Digest Compression Ratio  : {}", percent(stats.digest_ratio()));
            if self.output.is_some() {
                println!("Dictionary Size           : {}", bits(stats.header_bits));
                println!("Output File Size          : {} Bytes", stats.compressed_bytes());
                println!("File Compression Ratio    : {}", percent(stats.file_ratio()));
            }

            let fixed = stats.fixed_length_bits();
            let fixed_bits = stats.plain_bytes * u64::from(fixed);
            println!("\n---- Fixed-Length Encoding Alternative ----");
            println!("Digest Size               : {}", bits(fixed_bits));
            println!("Digest Compression Ratio  : {}", percent(ratio(fixed_bits, 8 * stats.plain_bytes)));
            if self.output.is_some() {
                // 3 bits for the code width, 16 bytes of bitmap, one entry per symbol
                let dictionary = 17 * 8 + u64::from(fixed) * u64::from(stats.unique_symbols);
                let total = (fixed_bits + dictionary).div_ceil(8);
                println!("Dictionary Size           : {}", bits(dictionary));
                println!("Output File Size          : {total} Bytes");
                println!("File Compression Ratio    : {}", percent(ratio(total, stats.plain_bytes)));
            }
            println!("\n---- General ----");
            println!("Average Code Length       : {:.3} Bits", stats.average_code_length);
        }
        println!("Time Taken                : {}", elapsed(stats.elapsed));
    }
}

fn print_dictionary(summary: &Summary) {
    print!("\nDictionary:");
    for (symbol, code) in summary.codes.iter() {
        print!("\n{symbol:3}: {code}");
    }
    println!();
}

fn bits(count: u64) -> String {
    match count % 8 {
        0 => format!("{} Bytes", count / 8),
        rest => format!("{} Bytes and {rest} Bits", count / 8),
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn percent(ratio: f64) -> String {
    format!("{ratio:.3} ({:.1}%)", ratio * 100.0)
}

fn elapsed(duration: Duration) -> String {
    let seconds = duration.as_secs_f64();
    if seconds >= 61.0 {
        let minutes = (seconds / 60.0).floor();
        format!("{minutes} Minutes and {:.2} Seconds", seconds - minutes * 60.0)
    } else if seconds >= 1.0 {
        format!("{seconds:.2} Seconds")
    } else if seconds >= 1e-3 {
        format!("{:.2} Milli-Seconds", seconds * 1e3)
    } else if seconds >= 1e-6 {
        format!("{:.2} Micro-Seconds", seconds * 1e6)
    } else {
        format!("{:.2} Nano-Seconds", seconds * 1e9)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let options = Options::parse();
    options.run()
}
