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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapRb,
};
use tracing::{error, info, span, Level};

use crate::audio::mixer::{ActiveSource, AudioMixer};
use crate::config;

/// A small wrapper around a cpal::Device. Owns the output stream and the mixer feeding it.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The running output, present once the device has been opened with `get`.
    output: Option<OutputManager>,
}

/// Manages the continuous output stream and the mixing thread feeding it.
struct OutputManager {
    /// The core audio mixer
    mixer: AudioMixer,
    /// Cleared to stop both threads.
    running: Arc<AtomicBool>,
    /// Handle to the output thread (keeps the stream alive).
    output_thread: Option<thread::JoinHandle<()>>,
    /// Handle to the producer thread (fills the ring buffer).
    producer_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Builds an output stream that drains the ring buffer, converting to the device's
/// sample type and zero-filling any shortfall.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut ring: HeapCons<f32>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut temp: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            temp.resize(data.len(), 0.0);
            let read = ring.pop_slice(&mut temp);
            temp[read..].fill(0.0);
            for (dst, &src) in data.iter_mut().zip(temp.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.producer_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

impl OutputManager {
    /// Starts mixing into a ring buffer and playing it through the given device.
    fn start(
        device: cpal::Device,
        stream_config: cpal::StreamConfig,
        sample_format: cpal::SampleFormat,
        block_frames: usize,
    ) -> Result<OutputManager, Box<dyn Error>> {
        let num_channels = stream_config.channels;
        let sample_rate = stream_config.sample_rate.0;
        let mixer = AudioMixer::new(num_channels, sample_rate);
        let running = Arc::new(AtomicBool::new(true));

        // ~100ms of audio.
        let capacity_samples = (sample_rate as usize * num_channels as usize) / 10;
        let block_samples = block_frames * num_channels as usize;
        let ring = HeapRb::<f32>::new(capacity_samples.max(block_samples * 2));
        let (mut producer, consumer) = ring.split();

        let producer_thread = {
            let mixer = mixer.clone();
            let running = running.clone();
            thread::spawn(move || {
                let mut scratch = vec![0.0f32; block_samples];
                while running.load(Ordering::Relaxed) {
                    if producer.vacant_len() >= block_samples {
                        mixer.process_into_output(&mut scratch, block_frames);
                        producer.push_slice(&scratch);
                    } else {
                        thread::sleep(Duration::from_micros(500));
                    }
                }
            })
        };

        // The stream is created on its own thread since cpal streams can't always be sent
        // between threads. The build result is reported back before the thread parks.
        let (started_tx, started_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let output_thread = {
            let running = running.clone();
            thread::spawn(move || {
                let stream_result = match sample_format {
                    cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, consumer),
                    cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, consumer),
                    cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, consumer),
                    cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, consumer),
                    format => {
                        let _ = started_tx.send(Err(format!("unsupported sample format {}", format)));
                        return;
                    }
                };

                let stream = match stream_result {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = started_tx.send(Err(format!("failed to create stream: {}", e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = started_tx.send(Err(format!("failed to start stream: {}", e)));
                    return;
                }
                let _ = started_tx.send(Ok(()));

                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(100));
                }
            })
        };

        let manager = OutputManager {
            mixer,
            running,
            output_thread: Some(output_thread),
            producer_thread: Some(producer_thread),
        };

        match started_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    channels = num_channels,
                    sample_rate, "CPAL output stream started successfully"
                );
                Ok(manager)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err("output thread exited before starting the stream".into()),
        }
    }
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let max_channels = match device.supported_output_configs() {
                    Ok(configs) => configs.map(|c| c.channels()).max().unwrap_or(0),
                    Err(_) => continue,
                };

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        output: None,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Opens the configured device and starts its output stream. The device name
    /// "default" selects the default host's default output device.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let span = span!(Level::INFO, "open device (cpal)");
        let _enter = span.enter();

        let name = config.device();
        let mut device = if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default output device available")?;
            let max_channels = device
                .supported_output_configs()?
                .map(|c| c.channels())
                .max()
                .unwrap_or(0);
            Device {
                name: device.name()?,
                max_channels,
                host_id: host.id(),
                device,
                output: None,
            }
        } else {
            Device::list()?
                .into_iter()
                .find(|device| device.name.trim() == name)
                .ok_or_else(|| format!("no device found with name {}", name))?
        };

        let default_config = device.device.default_output_config()?;
        let sample_format = default_config.sample_format();
        let mut stream_config = default_config.config();
        if let Some(sample_rate) = config.sample_rate() {
            stream_config.sample_rate = cpal::SampleRate(sample_rate);
        }

        info!(
            device = %device.name,
            channels = stream_config.channels,
            sample_rate = stream_config.sample_rate.0,
            format = %sample_format,
            "Opening audio device."
        );

        device.output = Some(OutputManager::start(
            device.device.clone(),
            stream_config,
            sample_format,
            config.buffer_size(),
        )?);
        Ok(device)
    }

    fn output(&self) -> Result<&OutputManager, Box<dyn Error>> {
        self.output
            .as_ref()
            .ok_or_else(|| format!("device {} has not been opened", self.name).into())
    }
}

impl super::Device for Device {
    fn play_source(&self, source: ActiveSource) -> Result<(), Box<dyn Error>> {
        self.output()?.mixer.sender().send(source)?;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.output
            .as_ref()
            .map(|output| output.mixer.sample_rate())
            .unwrap_or_default()
    }

    fn num_channels(&self) -> u16 {
        self.output
            .as_ref()
            .map(|output| output.mixer.num_channels())
            .unwrap_or(self.max_channels)
    }
}
