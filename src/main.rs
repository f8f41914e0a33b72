//! NetFS interactive client
//!
//! Commands: `ls`, `fget <name>`, `fup <name>`, `exit`; anything else is sent
//! to the server as a chat message.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use netfs::cli::ClientOpts;
use netfs::client::Client;
use netfs::command::{parse_command, Command};
use netfs::progress::download_bar;
use netfs::Frame;

fn main() -> Result<()> {
    netfs::init_tracing("warn");

    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = ClientOpts::parse();
    let addr = SocketAddr::from((opts.address, opts.port));
    let mut client = Client::connect(addr)?;
    client.check_admission(Duration::from_millis(200))?;
    println!("Connected to {}.", addr);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        let command = match parse_command(&line) {
            Ok(Some(c)) => c,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("error: {}", e);
                continue;
            }
        };
        if command == Command::Exit {
            println!("Connection termination requested.");
            break;
        }
        if let Err(e) = execute(&mut client, command, &opts) {
            eprintln!("error: {:#}", e);
        }
        for frame in client.drain_pending() {
            print_unsolicited(frame);
        }
        if !client.is_connected() {
            eprintln!("Server closed the connection.");
            break;
        }
    }

    client.close();
    Ok(())
}

fn execute(client: &mut Client, command: Command, opts: &ClientOpts) -> Result<()> {
    match command {
        Command::List => {
            for (index, entry) in client.list()?.iter().enumerate() {
                println!(
                    "{:>4}  {}  {:>12}  {}",
                    index,
                    entry.kind_tag(),
                    entry.size,
                    entry.name
                );
            }
        }
        Command::Get(name) => {
            let bar = download_bar(&name, !opts.no_progress);
            let done = client.download(&name, &opts.download_dir, &bar)?;
            bar.finish_and_clear();
            println!("Saved {} ({} bytes)", done.path.display(), done.bytes);
        }
        Command::Put(name) => {
            let size = client.announce_upload(Path::new(&name))?;
            println!("Announced upload of {} ({} bytes)", name, size);
        }
        Command::Say(text) => client.send_message(&text)?,
        Command::Exit => {}
    }
    Ok(())
}

fn print_unsolicited(frame: Frame) {
    match frame {
        Frame::Message(text) => println!("server: {}", text),
        Frame::Error(text) => eprintln!("server error: {}", text),
        other => eprintln!("ignoring unexpected {} from server", other.kind()),
    }
}
