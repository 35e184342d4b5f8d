use clap::Parser;
use colored::*;
use thread15d4_cat::{parse_ext_address, Decryption, FrameParser, Options};

/// `cat` for IEEE 802.15.4 frames of a Thread network.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The IEEE 802.15.4 frame to parse, hex encoded.
    #[clap(value_parser(clap::builder::NonEmptyStringValueParser::new()))]
    input: String,

    /// The frame ends with its FCS.
    #[arg(long)]
    fcs: bool,

    /// Network master key (32 hex digits) used to decrypt secured frames.
    #[arg(long)]
    key: Option<String>,

    /// Key sequence the master key is used with.
    #[arg(long, default_value_t = 0)]
    key_sequence: u32,

    /// Extended address of the sender when the frame carries a short
    /// source address.
    #[arg(long)]
    source: Option<String>,
}

fn main() {
    let args = Args::parse();

    let source = match args.source.as_deref().map(parse_ext_address).transpose() {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: invalid source address: {}", "error".red().bold(), e);
            std::process::exit(2);
        }
    };
    let decryption = match args
        .key
        .as_deref()
        .map(|key| Decryption::from_hex(key, args.key_sequence, source))
        .transpose()
    {
        Ok(decryption) => decryption,
        Err(e) => {
            eprintln!("{}: invalid key: {}", "error".red().bold(), e);
            std::process::exit(2);
        }
    };

    let options = Options {
        fcs: args.fcs,
        decryption,
    };
    match FrameParser::parse_hex_with(&args.input, &options) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(1);
        }
    }
}
