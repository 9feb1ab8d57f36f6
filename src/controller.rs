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
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::sampler::Sampler;
use crate::visualizer::Visualizer;

pub mod keyboard;

/// Controller events that will trigger behavior in the sampler.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Plays the key with the given label, stopping whatever is playing.
    Play(String),

    /// Stops the active voice. If nothing is playing, does nothing.
    Stop,

    /// Loads an audio file as the sample.
    Load(PathBuf),

    /// Stops playback and forgets the sample.
    Unload,

    /// Prints the keyboard.
    Keys,

    /// Stops playback and shuts the controller down.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a sampler from a stream of events.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(
        sampler: Arc<Sampler>,
        visualizer: Option<Arc<Visualizer>>,
        driver: Arc<dyn Driver>,
    ) -> Controller {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(sampler, visualizer, driver)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Triggers sampler events by watching the driver and getting events from it.
    async fn trigger_events(
        sampler: Arc<Sampler>,
        visualizer: Option<Arc<Visualizer>>,
        driver: Arc<dyn Driver>,
    ) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(keys = %sampler.keyboard(), "Controller started.");

        while let Some(event) = events_rx.recv().await {
            debug!(event = ?event, "Received event.");

            match event {
                Event::Play(label) => Controller::play(&sampler, visualizer.as_ref(), &label),
                Event::Stop => sampler.stop(),
                Event::Load(path) => {
                    let loader = sampler.clone();
                    match tokio::task::spawn_blocking(move || loader.load_file(&path)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(err = %e, "Sample not loaded"),
                        Err(e) => error!(err = %e, "Sample loader failed"),
                    }
                }
                Event::Unload => sampler.unload(),
                Event::Keys => println!("{}", sampler.keyboard()),
                Event::Quit => {
                    sampler.stop();
                    break;
                }
            }
        }

        info!("Controller closing.");
        match join_handle.await {
            Ok(Err(e)) => error!(err = %e, "Event monitor failed"),
            Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            Ok(Ok(())) => {}
        }
    }

    fn play(sampler: &Arc<Sampler>, visualizer: Option<&Arc<Visualizer>>, label: &str) {
        match sampler.play_note(label) {
            Ok(Some(_)) => {
                if let Some(visualizer) = visualizer {
                    let sampler = Arc::downgrade(sampler);
                    visualizer.start(move || {
                        sampler
                            .upgrade()
                            .is_some_and(|sampler| sampler.is_playing())
                    });
                }
            }
            Ok(None) => info!(note = label, "No sample loaded yet, use load <path>"),
            Err(e) => warn!(err = %e, "Unable to play note"),
        }
    }
}
