//! Dedicated pulse thread.
//!
//! [`PulseDriver`] calls [`PhysicsWorld::do_pulse`] once per interval until stopped. Script calls
//! from other threads keep going through the world's own locks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};

use crate::world::PhysicsWorld;

pub struct PulseDriver {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<u64>>,
}

impl PulseDriver {
    pub fn spawn(world: Arc<PhysicsWorld>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(interval);

        let thread = thread::Builder::new()
            .name("physics-pulse".into())
            .spawn(move || {
                log::info!("physics {} pulse thread started, interval {interval:?}", world.id());
                let mut pulses = 0u64;
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            world.do_pulse();
                            pulses += 1;
                        }
                        // A message or a dropped sender both stop the thread.
                        recv(stop_rx) -> _ => break,
                    }
                }
                log::info!("physics {} pulse thread stopped after {pulses} pulses", world.id());
                pulses
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the thread and wait for the current pulse to end. Returns the number of pulses run.
    pub fn stop(&mut self) -> u64 {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(pulses)) => pulses,
            Some(Err(_)) => {
                log::warn!("physics pulse thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for PulseDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
