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
mod audio;
mod config;
mod controller;
mod notes;
mod playsync;
mod sampler;
#[cfg(test)]
mod testutil;
mod visualizer;

use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::controller::Controller;
use crate::notes::Layout;
use crate::sampler::Sampler;
use crate::visualizer::Visualizer;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A single-sample keyboard sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Prints the keys of a keyboard layout and their playback rates.
    Notes {
        /// The keyboard layout.
        #[arg(short, long, value_enum, default_value_t = Layout::SingleOctave)]
        keyboard: Layout,
        /// Overrides the pitch samples are assumed to be recorded at, in Hz.
        #[arg(short, long)]
        base_frequency: Option<f64>,
    },
    /// Plays one note of a sample through the audio interface.
    Play {
        /// The device name to play through.
        device_name: String,
        /// The audio file to use as the sample.
        file: PathBuf,
        /// The key to play, e.g. C4.
        note: String,
        /// The keyboard layout.
        #[arg(short, long, value_enum, default_value_t = Layout::SingleOctave)]
        keyboard: Layout,
    },
    /// Start will start the interactive sampler.
    Start {
        /// The path to the sampler config.
        config_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Logs go to stderr so the visualizer owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Notes {
            keyboard,
            base_frequency,
        } => {
            let mut layout = keyboard.keyboard();
            if let Some(base_frequency) = base_frequency {
                layout = layout.with_base_frequency(base_frequency)?;
            }

            println!("{}", layout);
            println!("Base frequency: {:.2} Hz", layout.base_frequency());
            for note in layout.notes() {
                println!("- {} (rate {:.4})", note, layout.rate_for(note));
            }
        }
        Commands::Play {
            device_name,
            file,
            note,
            keyboard,
        } => {
            let config = config::Sampler::new(config::Audio::new(&device_name), keyboard);
            let device = audio::get_device(config.audio())?;
            let sampler = Sampler::new(config.keyboard()?, device, None);
            sampler.load_file(&file)?;

            if let Some(handle) = sampler.play_note(&note)? {
                info!(note = %note, file = %file.display(), "Playing");
                tokio::task::spawn_blocking(move || handle.wait()).await?;
            }
        }
        Commands::Start { config_path } => {
            let config = config::Sampler::deserialize(&config_path)?;
            let sampler = Arc::new(Sampler::from_config(&config)?);
            let visualizer = match sampler.analyser() {
                Some(analyser) => Some(Arc::new(Visualizer::from_config(
                    config.visualizer(),
                    analyser,
                )?)),
                None => None,
            };

            let driver = Arc::new(controller::keyboard::Driver::new());
            println!("{}", sampler.keyboard());
            Controller::new(sampler, visualizer, driver).join().await?;
        }
    }

    Ok(())
}
