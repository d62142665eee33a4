// SPDX-FileCopyrightText: 2025 Contributors to the morgul project.
// SPDX-License-Identifier: Apache-2.0

//! Runs one receiver per port and logs acquisition statistics.
//!
//! ```text
//! cargo run --example receive -- --udp-port 30001 --listeners 2 --seconds 120
//! ```

mod common;

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use clap::{CommandFactory, Parser, error::ErrorKind};
use sls_receiver::{
    DestroyError, ReceiverHandle, config::START_PERMIT, config::get_receiver_so_path, load_api,
    make_receiver,
};
use tracing::{info, warn};

/// UDP packets per Jungfrau module frame.
const PACKETS_PER_FRAME: u32 = 64;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// First receiver port; further listeners use the following ports.
    #[arg(long, short, default_value_t = 30001)]
    udp_port: u16,

    /// Number of receivers to run.
    #[arg(long, short, default_value_t = 1)]
    listeners: u16,

    /// Path of the receiver shim library.
    #[arg(long, env = "SLS_RECEIVER_LIBRARY")]
    library: Option<PathBuf>,

    /// How long to keep receiving before shutting down.
    #[arg(long, short, default_value_t = 60)]
    seconds: u64,
}

impl Args {
    /// Ports of all listeners. A range running past the last port is a usage error.
    fn ports(&self) -> Result<Vec<u16>, clap::Error> {
        (0..self.listeners)
            .map(|offset| {
                self.udp_port.checked_add(offset).ok_or_else(|| {
                    Args::command().error(
                        ErrorKind::ValueValidation,
                        format!(
                            "{} listeners starting at port {} run past port {}",
                            self.listeners,
                            self.udp_port,
                            u16::MAX
                        ),
                    )
                })
            })
            .collect()
    }
}

#[derive(Default)]
struct Stats {
    images_seen: AtomicUsize,
    complete_images: AtomicUsize,
    packets_lost: AtomicUsize,
}

impl Stats {
    fn reset(&self) {
        self.images_seen.store(0, Ordering::Relaxed);
        self.complete_images.store(0, Ordering::Relaxed);
        self.packets_lost.store(0, Ordering::Relaxed);
    }
}

fn start_receiver(
    api: sls_receiver::ReceiverApiHandle,
    port: u16,
) -> sls_receiver::Result<ReceiverHandle> {
    let mut receiver = make_receiver(api, port)?;
    info!("{port}: receiver version {}", receiver.get_receiver_version()?);

    let stats = Arc::new(Stats::default());

    let start_stats = stats.clone();
    receiver.register_start_callback(move |header| {
        start_stats.reset();
        info!(
            "{port}: acquisition started on UDP ports {:?}, {}x{} modules, {} bit",
            header.udp_ports, header.detector_shape.x, header.detector_shape.y, header.dynamic_range
        );
        START_PERMIT
    })?;

    let frame_stats = stats.clone();
    receiver.register_frame_callback(move |header, _payload| {
        frame_stats.images_seen.fetch_add(1, Ordering::Relaxed);
        if header.complete_image {
            frame_stats.complete_images.fetch_add(1, Ordering::Relaxed);
        } else {
            let lost = header.packets_lost(PACKETS_PER_FRAME);
            warn!(
                "{port}: lost packets: image {} missed {} packets",
                header.detector.frame_number, lost
            );
            frame_stats
                .packets_lost
                .fetch_add(lost as usize, Ordering::Relaxed);
        }
    })?;

    receiver.register_end_callback(move |header| {
        info!(
            "{port}: end of acquisition, seen {} images, {} complete, {} packets lost \
             (receiver reports {} complete frames)",
            stats.images_seen.load(Ordering::Relaxed),
            stats.complete_images.load(Ordering::Relaxed),
            stats.packets_lost.load(Ordering::Relaxed),
            header.total_complete_frames()
        );
    })?;

    Ok(receiver)
}

fn main() -> sls_receiver::Result<()> {
    common::setup_logging();
    let args = Args::parse();
    let ports = args.ports().unwrap_or_else(|err| err.exit());

    let library = args.library.unwrap_or_else(get_receiver_so_path);
    info!("Loading receiver library from {}", library.display());
    let api = load_api(&library)?;

    let receivers = ports
        .into_iter()
        .map(|port| start_receiver(api.clone(), port))
        .collect::<sls_receiver::Result<Vec<_>>>()?;
    info!("Running {} receiver(s) for {}s", receivers.len(), args.seconds);

    std::thread::sleep(Duration::from_secs(args.seconds));

    for receiver in receivers {
        let port = receiver.port();
        match receiver.destroy() {
            Ok(()) => info!("{port}: receiver released"),
            Err(DestroyError::AcquisitionActive(receiver)) => {
                warn!("{port}: still acquiring at shutdown");
                drop(receiver);
            }
            Err(DestroyError::Native(err)) => warn!("{port}: failed to release receiver: {err}"),
        }
    }
    Ok(())
}
