// Demo CLI: decode a length-prefixed stream of packets through the
// lapped-transform frame engine and write the reconstructed pictures out
// as Y4M. Packet framing/demuxing is explicitly out of scope for the
// core decoder (SPEC_FULL.md §1), so this binary owns a minimal
// length-prefixed container of its own rather than a real one.

use std::fs::File;
use std::io::BufWriter;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use clap::Parser;
use log::info;

use lappedvc::engine::{Engine, PictureInfo};
use lappedvc::y4m::Y4MWriter;

#[derive(Parser, Debug)]
#[command(about = "Decode a lapped-transform packet stream into a Y4M file")]
struct Args {
  /// Path to the packet stream (sequence of `u32le length || bytes`).
  input: String,

  /// Path to write the reconstructed Y4M output.
  output: String,

  #[arg(long, default_value_t = 352)]
  width: usize,

  #[arg(long, default_value_t = 288)]
  height: usize,

  /// Enable the chroma-from-luma predictor (default off, see DESIGN.md).
  #[arg(long, default_value_t = false)]
  chroma_from_luma: bool,

  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn read_packets(path: &str) -> std::io::Result<Vec<Vec<u8>>> {
  let mut file = File::open(path)?;
  let mut packets = Vec::new();
  loop {
    let len = match file.read_u32::<LittleEndian>() {
      Ok(len) => len,
      Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
      Err(e) => return Err(e),
    };
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;
    packets.push(buf);
  }
  Ok(packets)
}

fn main() {
  let args = Args::parse();

  let level = match args.verbose {
    0 => log::LevelFilter::Warn,
    1 => log::LevelFilter::Info,
    2 => log::LevelFilter::Debug,
    _ => log::LevelFilter::Trace,
  };
  env_logger::Builder::new().filter_level(level).init();

  let packets = match read_packets(&args.input) {
    Ok(packets) => packets,
    Err(e) => {
      eprintln!("failed to read packet stream {}: {}", args.input, e);
      std::process::exit(1);
    }
  };

  let info = PictureInfo {
    width: args.width,
    height: args.height,
    planes: vec![(0, 0), (1, 1), (1, 1)],
  };
  let mut engine = match Engine::alloc(info) {
    Ok(engine) => engine,
    Err(e) => {
      eprintln!("failed to allocate engine: {}", e);
      std::process::exit(1);
    }
  };
  engine.set_chroma_from_luma(args.chroma_from_luma);

  let out_file = match File::create(&args.output) {
    Ok(f) => f,
    Err(e) => {
      eprintln!("failed to create {}: {}", args.output, e);
      std::process::exit(1);
    }
  };
  let mut writer = Y4MWriter::new(BufWriter::new(out_file), args.width, args.height);

  let mut decoded = 0u32;
  for (i, packet) in packets.iter().enumerate() {
    match engine.decode_packet_in(packet) {
      Ok(idx) => {
        if let Some(frame) = engine.picture(idx) {
          writer.write_frame(frame);
        }
        decoded += 1;
      }
      Err(e) => {
        eprintln!("packet {} rejected: {}", i, e);
        break;
      }
    }
  }
  engine.end_of_stream();

  info!("decoded {} of {} packets from {}", decoded, packets.len(), args.input);
}
