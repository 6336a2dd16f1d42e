//! # seqidx-cli — Sequence Number Index diagnostic shell
//!
//! A REPL-style command-line interface over a single [`seqidx_engine::Writer`].
//! Reads commands from stdin, drives the writer with synthetic fragments
//! (see [`classifier`]), and prints lookups to stdout. Not a FIX gateway —
//! there is no real archival log here, just this shell poking the index
//! directly instead of a real client.
//!
//! ## Commands
//!
//! ```text
//! PUT session seq      Record session's latest sequence number
//! GET session          Look up a session (prints the number or "(nil)")
//! RESET session        Reset one session's sequence number to 0
//! RESETALL             Reset every session's sequence number
//! DOWORK                Run one cooperative flush tick
//! LASTPOS               Print the last replayed archival-log position
//! STATS                 Print writer debug info
//! EXIT / QUIT           Flush and shut down
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! SEQIDX_DIR                  Directory holding the index file (default: ".")
//! SEQIDX_FILE_CAPACITY        Total index size in bytes     (default: 16 MiB)
//! SEQIDX_SECTOR_SIZE          Sector size in bytes          (default: 4096)
//! SEQIDX_SEQUENCE_NUMBER_RATIO Record/position split        (default: 0.9)
//! SEQIDX_STREAM_ID            Fragment stream filter        (default: 1)
//! SEQIDX_FLUSH_TIMEOUT_MS     Time-based flush interval     (default: 1000)
//! ```

mod classifier;
mod clock;
mod error_sink;

use anyhow::Result;
use classifier::{encode_fix_ok, encode_reset_sequence_number, encode_reset_session_ids, CliClassifier, FixedRecordingId};
use clock::SystemClock;
use error_sink::StderrErrorSink;
use seqidx_config::SeqIndexConfig;
use seqidx_engine::{FragmentHeader, Reader, Writer};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    let dir = env_or("SEQIDX_DIR", ".");
    let config = SeqIndexConfig::from_env();
    let index_path = std::path::Path::new(&dir).join("seqidx.dat");

    let mut writer = Writer::open(
        index_path.clone(),
        &config,
        i64::MAX, // the shell has no real archival log, so no term ever rolls
        Arc::new(SystemClock),
        Arc::new(StderrErrorSink),
        Arc::new(FixedRecordingId),
        Arc::new(CliClassifier),
    )?;

    println!(
        "seqidx-cli started (path={}, capacity={}, sector={}, stream_id={})",
        index_path.display(),
        config.file_capacity,
        config.sector_size,
        config.stream_id
    );
    println!("Commands: PUT session seq | GET session | RESET session | RESETALL");
    println!("          DOWORK | LASTPOS | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut position: i64 = 0;

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" => match (parts.next(), parts.next()) {
                    (Some(session), Some(seq)) => {
                        match (session.parse::<u64>(), seq.parse::<u32>()) {
                            (Ok(session), Ok(seq)) => {
                                let fragment = encode_fix_ok(session, seq);
                                offer(&mut writer, &mut position, config.stream_id, session as i32, &fragment);
                                println!("OK");
                            }
                            _ => println!("ERR usage: PUT session seq (both integers)"),
                        }
                    }
                    _ => println!("ERR usage: PUT session seq"),
                },
                "GET" => match parts.next().and_then(|s| s.parse::<u64>().ok()) {
                    Some(session) => {
                        let reader = Reader::from_live_buffer(writer.buffer_handle(), writer.sector_size());
                        match reader.lookup(session) {
                            Some(seq) => println!("{}", seq),
                            None => println!("(nil)"),
                        }
                    }
                    None => println!("ERR usage: GET session"),
                },
                "RESET" => match parts.next().and_then(|s| s.parse::<u64>().ok()) {
                    Some(session) => {
                        let fragment = encode_reset_sequence_number(session);
                        offer(&mut writer, &mut position, config.stream_id, session as i32, &fragment);
                        println!("OK");
                    }
                    None => println!("ERR usage: RESET session"),
                },
                "RESETALL" => {
                    let fragment = encode_reset_session_ids();
                    offer(&mut writer, &mut position, config.stream_id, 0, &fragment);
                    println!("OK");
                }
                "DOWORK" => {
                    println!("{}", writer.do_work());
                }
                "LASTPOS" => {
                    let mut any = false;
                    writer.read_last_position(|transport_session_id, recording_id, pos| {
                        any = true;
                        println!(
                            "transport_session_id={} recording_id={} position={}",
                            transport_session_id, recording_id, pos
                        );
                    });
                    if !any {
                        println!("(no positions recorded)");
                    }
                }
                "STATS" => {
                    println!("{:?}", writer);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => println!("unknown command: {}", other),
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    writer.close()?;
    Ok(())
}

/// Offers one synthetic fragment at the shell's running position, advancing
/// the position by the fragment's length afterward.
fn offer(writer: &mut Writer, position: &mut i64, stream_id: i32, transport_session_id: i32, fragment: &[u8]) {
    let header = FragmentHeader {
        stream_id,
        begin_flag: true,
        transport_session_id,
        start_position: *position,
    };
    writer.on_fragment(fragment, 0, fragment.len(), &header);
    *position += fragment.len() as i64;
}
