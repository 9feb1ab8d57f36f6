// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{io, path::PathBuf};

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const STOP: &str = "stop";
const LOAD: &str = "load";
const UNLOAD: &str = "unload";
const KEYS: &str = "keys";
const QUIT: &str = "quit";

/// A driver that reads sampler commands from the keyboard, one per line.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Turns one line of input into an event. Anything that isn't a command is taken
    /// to be a note label.
    fn parse(input: &str) -> Option<Event> {
        let input = input.trim();
        let (command, argument) = match input.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (input, ""),
        };

        match command.to_lowercase().as_str() {
            "" => None,
            STOP => Some(Event::Stop),
            UNLOAD => Some(Event::Unload),
            KEYS => Some(Event::Keys),
            QUIT => Some(Event::Quit),
            LOAD if argument.is_empty() => {
                warn!("load needs a path");
                None
            }
            LOAD => Some(Event::Load(PathBuf::from(argument))),
            _ if argument.is_empty() => Some(Event::Play(command.to_string())),
            _ => {
                warn!(input, "Unrecognized input");
                None
            }
        }
    }

    /// Reads and forwards one command. Returns false once the input is exhausted or
    /// the user quits.
    fn monitor_io<R, W>(events_tx: &Sender<Event>, mut reader: R, mut writer: W) -> io::Result<bool>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command (<note>, {}, {} <path>, {}, {}, {}): ",
            STOP, LOAD, UNLOAD, KEYS, QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        let Some(event) = Self::parse(&input) else {
            return Ok(true);
        };
        let more = event != Event::Quit;
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(more)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}
