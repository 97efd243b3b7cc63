//! Visualization path: an analyser tap downstream of the render output and a
//! frame-paced sampler that turns snapshots into polylines.
//!
//! The tap is the only piece on the render thread; it pushes into an SPSC ring
//! and silently drops samples when the ring is full. Everything else runs in
//! the control context and never touches render state.

use rtrb::{Consumer, Producer, RingBuffer};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use wavebridge_core::dsp::{byte_to_unit, sample_to_byte};

/// Create an analyser with a window of `fft_size` samples and its render-side tap.
pub fn analyser(fft_size: usize) -> (Analyser, AnalyserTap) {
    let fft_size = fft_size.max(1);
    let (producer, consumer) = RingBuffer::new(fft_size * 4);
    (
        Analyser { consumer, window: vec![0.0; fft_size], write: 0 },
        AnalyserTap { producer, dropped: 0 },
    )
}

/// Render-side end of the analyser.
pub struct AnalyserTap {
    producer: Producer<f32>,
    dropped: u64,
}

impl AnalyserTap {
    /// Copy a rendered block into the ring. Never blocks.
    #[inline]
    pub fn push_block(&mut self, block: &[f32]) {
        for &s in block {
            if self.producer.push(s).is_err() {
                self.dropped += 1;
            }
        }
    }

    /// Samples lost because nobody was reading.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Control-side end: keeps the most recent `fft_size` samples.
pub struct Analyser {
    consumer: Consumer<f32>,
    window: Vec<f32>,
    write: usize,
}

impl Analyser {
    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    /// Move everything the tap produced into the window.
    fn pull(&mut self) {
        while let Ok(s) = self.consumer.pop() {
            self.window[self.write] = s;
            self.write = (self.write + 1) % self.window.len();
        }
    }

    /// Oldest-to-newest samples, as many as fit in `out`.
    pub fn float_time_domain_data(&mut self, out: &mut [f32]) {
        self.pull();
        let n = self.window.len();
        for (i, o) in out.iter_mut().take(n).enumerate() {
            *o = self.window[(self.write + i) % n];
        }
    }

    /// Same snapshot mapped to unsigned bytes (128 = silence).
    pub fn byte_time_domain_data(&mut self, out: &mut [u8]) {
        self.pull();
        let n = self.window.len();
        for (i, o) in out.iter_mut().take(n).enumerate() {
            *o = sample_to_byte(self.window[(self.write + i) % n]);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
}

/// Waveform coordinates for one frame; x grows left to right, y down from 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polyline {
    pub width: f32,
    pub height: f32,
    pub points: Vec<(f32, f32)>,
}

impl Polyline {
    /// Largest distance of any point from the vertical center.
    pub fn excursion(&self) -> f32 {
        let mid = self.height / 2.0;
        self.points.iter().fold(0.0f32, |m, &(_, y)| m.max((y - mid).abs()))
    }
}

pub struct VisualizationSampler {
    analyser: Analyser,
    state: SamplerState,
    bytes: Vec<u8>,
}

impl VisualizationSampler {
    pub fn new(analyser: Analyser) -> Self {
        let n = analyser.fft_size();
        Self { analyser, state: SamplerState::Idle, bytes: vec![128; n] }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn start(&mut self) {
        self.state = SamplerState::Running;
    }

    pub fn cancel(&mut self) {
        self.state = SamplerState::Idle;
    }

    /// One animation frame. `None` while idle.
    pub fn tick(&mut self, width: f32, height: f32) -> Option<Polyline> {
        if self.state != SamplerState::Running {
            return None;
        }
        self.analyser.byte_time_domain_data(&mut self.bytes);
        let n = self.bytes.len();
        let slice = width / n as f32;
        let points = self
            .bytes
            .iter()
            .enumerate()
            .map(|(i, &b)| (i as f32 * slice, byte_to_unit(b) * height / 2.0))
            .collect();
        Some(Polyline { width, height, points })
    }

    /// Frame-paced loop. Keeps rescheduling itself until the sink breaks or
    /// the sampler is cancelled.
    pub async fn run<F>(&mut self, fps: u32, width: f32, height: f32, mut sink: F)
    where
        F: FnMut(&Polyline) -> ControlFlow<()>,
    {
        let mut frames = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps.max(1))));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.start();
        while self.state == SamplerState::Running {
            frames.tick().await;
            let Some(line) = self.tick(width, height) else { break };
            if sink(&line).is_break() {
                self.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_sampler_yields_nothing() {
        let (a, _tap) = analyser(64);
        let mut s = VisualizationSampler::new(a);
        assert!(s.tick(100.0, 50.0).is_none());
    }

    #[test]
    fn silence_is_a_flat_line() {
        let (a, mut tap) = analyser(64);
        tap.push_block(&[0.0; 128]);
        let mut s = VisualizationSampler::new(a);
        s.start();
        let line = s.tick(640.0, 200.0).unwrap();
        assert_eq!(line.points.len(), 64);
        assert!(line.points.iter().all(|&(_, y)| (y - 100.0).abs() < 1e-4));
        assert_eq!(line.excursion(), 0.0);
    }

    #[test]
    fn window_keeps_latest_samples() {
        let (mut a, mut tap) = analyser(4);
        tap.push_block(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let mut out = [0.0f32; 4];
        a.float_time_domain_data(&mut out);
        assert_eq!(out, [0.3, 0.4, 0.5, 0.6]);
    }

    #[test]
    fn full_ring_drops_instead_of_blocking() {
        let (_a, mut tap) = analyser(2);
        tap.push_block(&[0.5; 10]);
        assert_eq!(tap.dropped(), 2);
    }

    #[test]
    fn points_span_the_width() {
        let (a, mut tap) = analyser(8);
        tap.push_block(&[1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]);
        let mut s = VisualizationSampler::new(a);
        s.start();
        let line = s.tick(80.0, 100.0).unwrap();
        assert_eq!(line.points[0].0, 0.0);
        assert_eq!(line.points[7].0, 70.0);
        assert!(line.excursion() > 45.0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_sink_breaks() {
        let (a, _tap) = analyser(16);
        let mut s = VisualizationSampler::new(a);
        let mut frames = 0;
        s.run(60, 10.0, 10.0, |_| {
            frames += 1;
            if frames == 3 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
        })
        .await;
        assert_eq!(frames, 3);
        assert_eq!(s.state(), SamplerState::Idle);
    }
}
