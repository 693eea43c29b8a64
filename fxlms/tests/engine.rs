use std::convert::Infallible;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;

use fxlms::{
    AdaptationParameters, AncError, CancelToken, CaptureSource, Engine, HistoryBuffer, Phase,
    PlayRecord, PlaybackSink, run_playback,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SECONDARY_PATH: [f32; 8] = [0.0, 0.6, 0.3, -0.1, 0.0, 0.0, 0.0, 0.0];
const PRIMARY_PATH: [f32; 4] = [0.0, 0.0, 0.9, 0.2];

/// A room with one noise source, one cancellation speaker and an error mic.
struct Room {
    rng: StdRng,
    noise: HistoryBuffer,
    speaker: HistoryBuffer,
    /// Block most recently handed to the speaker; it sounds during the next capture.
    playing: Vec<f32>,
}

impl Room {
    fn new(block_size: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(99),
            noise: HistoryBuffer::new(PRIMARY_PATH.len()),
            speaker: HistoryBuffer::new(SECONDARY_PATH.len()),
            playing: vec![0.0; block_size],
        }
    }
}

type SharedRoom = Arc<Mutex<Room>>;

struct Calibration(SharedRoom);

impl PlayRecord for Calibration {
    type Error = Infallible;

    fn play_record(&mut self, excitation: &[f32], error: &mut [f32]) -> Result<(), Infallible> {
        let mut room = self.0.lock().unwrap();
        for (&x, e) in excitation.iter().zip(error.iter_mut()) {
            room.speaker.push(x);
            *e = room.speaker.dot(&SECONDARY_PATH);
        }
        Ok(())
    }
}

struct Mic {
    room: SharedRoom,
    periods: usize,
    cancel_after: usize,
    token: CancelToken,
}

impl CaptureSource for Mic {
    type Error = Infallible;

    fn capture(&mut self, reference: &mut [f32], error: &mut [f32]) -> Result<(), Infallible> {
        let mut room = self.room.lock().unwrap();
        for n in 0..reference.len() {
            let noise = room.rng.random_range(-0.5..=0.5);
            let anti_noise = room.playing[n];
            room.noise.push(noise);
            room.speaker.push(anti_noise);
            reference[n] = noise;
            error[n] = room.noise.dot(&PRIMARY_PATH) + room.speaker.dot(&SECONDARY_PATH);
        }

        self.periods += 1;
        if self.periods == self.cancel_after {
            self.token.cancel();
        }
        Ok(())
    }
}

struct Speaker {
    room: SharedRoom,
    limit: f32,
    periods: u64,
}

impl PlaybackSink for Speaker {
    type Error = Infallible;

    fn play(&mut self, block: &[f32]) -> Result<(), Infallible> {
        assert!(block.iter().all(|s| s.abs() <= self.limit));
        self.room.lock().unwrap().playing.copy_from_slice(block);
        self.periods += 1;
        Ok(())
    }
}

struct UnpluggedDevice;

impl PlayRecord for UnpluggedDevice {
    type Error = io::Error;

    fn play_record(&mut self, _: &[f32], _: &mut [f32]) -> Result<(), io::Error> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no such device"))
    }
}

impl CaptureSource for UnpluggedDevice {
    type Error = io::Error;

    fn capture(&mut self, _: &mut [f32], _: &mut [f32]) -> Result<(), io::Error> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "device went away"))
    }
}

fn params() -> AdaptationParameters {
    AdaptationParameters {
        sample_rate: 8000,
        block_size: 64,
        calibration_secs: 0.25,
        secondary_path_order: SECONDARY_PATH.len(),
        control_order: 16,
        output_limit: 0.3,
        ..Default::default()
    }
}

fn calibrated_engine(room: &SharedRoom) -> Engine {
    let mut engine = Engine::new(params()).unwrap().with_report_interval(10);
    engine.calibrate(&mut Calibration(Arc::clone(room))).unwrap();
    engine
}

#[test]
fn calibration_moves_idle_engine_to_adapting_with_identified_path() {
    let room = Arc::new(Mutex::new(Room::new(64)));
    let mut engine = Engine::new(params()).unwrap();
    assert_eq!(engine.phase(), Phase::Idle);
    assert!(engine.secondary_path().is_none());

    let s_hat = engine
        .calibrate(&mut Calibration(Arc::clone(&room)))
        .unwrap()
        .clone();
    assert_eq!(engine.phase(), Phase::Adapting);
    for (estimate, truth) in s_hat.taps().iter().zip(SECONDARY_PATH) {
        assert!((estimate - truth).abs() < 1e-3, "{estimate} vs {truth}");
    }

    // the control filter reads the identified model, not a fresh zero vector
    let filter = engine.filter().unwrap();
    assert!(filter.secondary_path().shares_taps_with(&s_hat));
    assert!(filter.secondary_path().iter().any(|t| *t != 0.0));
}

#[test]
fn calibration_is_pending_until_the_response_is_supplied() {
    let mut engine = Engine::new(params()).unwrap();
    let excitation = engine.begin_calibration().unwrap();
    assert_eq!(engine.phase(), Phase::Calibrating);
    assert_eq!(excitation.len(), 2000);

    let mut output = vec![0.0; 64];
    assert!(matches!(
        engine.process(&[0.0; 64], &[0.0; 64], &mut output),
        Err(AncError::NotAdapting(Phase::Calibrating))
    ));

    let mut response = vec![0.0; excitation.len()];
    let room = Arc::new(Mutex::new(Room::new(64)));
    Calibration(room)
        .play_record(&excitation, &mut response)
        .unwrap();
    engine.complete_calibration(&excitation, &response).unwrap();
    assert_eq!(engine.phase(), Phase::Adapting);
    engine.process(&[0.0; 64], &[0.0; 64], &mut output).unwrap();
}

#[test]
fn duplex_run_processes_until_cancelled() {
    let room = Arc::new(Mutex::new(Room::new(64)));
    let mut engine = calibrated_engine(&room);
    let token = CancelToken::new();
    let mut mic = Mic {
        room: Arc::clone(&room),
        periods: 0,
        cancel_after: 200,
        token: token.clone(),
    };
    let mut speaker = Speaker {
        room: Arc::clone(&room),
        limit: 0.3,
        periods: 0,
    };

    let summary = engine.run_duplex(&mut mic, &mut speaker, &token).unwrap();
    assert_eq!(summary.blocks_processed, 200);
    assert_eq!(engine.blocks_processed(), 200);
    assert_eq!(engine.phase(), Phase::Stopped);
    assert!(engine.filter().is_none());
    assert!(engine.levels().reference_rms > 0.0);
}

#[test]
fn cancelled_token_stops_before_the_first_block() {
    let room = Arc::new(Mutex::new(Room::new(64)));
    let mut engine = calibrated_engine(&room);
    let token = CancelToken::new();
    token.cancel();
    let mut mic = Mic {
        room: Arc::clone(&room),
        periods: 0,
        cancel_after: usize::MAX,
        token: token.clone(),
    };
    let mut speaker = Speaker {
        room,
        limit: 0.3,
        periods: 0,
    };

    let summary = engine.run_duplex(&mut mic, &mut speaker, &token).unwrap();
    assert_eq!(summary.blocks_processed, 0);
    assert_eq!(mic.periods, 0);
    assert_eq!(engine.phase(), Phase::Stopped);
}

#[test]
fn split_run_hands_blocks_to_a_playback_thread() {
    let room = Arc::new(Mutex::new(Room::new(64)));
    let mut engine = calibrated_engine(&room);
    let token = CancelToken::new();
    let mut consumer = engine.take_playback_consumer().unwrap();

    let playback = {
        let token = token.clone();
        let mut speaker = Speaker {
            room: Arc::clone(&room),
            limit: 0.3,
            periods: 0,
        };
        thread::spawn(move || {
            let played = run_playback(&mut speaker, &mut consumer, &token);
            (played, speaker.periods)
        })
    };

    let mut mic = Mic {
        room: Arc::clone(&room),
        periods: 0,
        cancel_after: 500,
        token: token.clone(),
    };
    let summary = engine.run_capture(&mut mic, &token).unwrap();
    let (played, speaker_periods) = playback.join().unwrap();
    let played = played.unwrap();

    assert_eq!(played.periods, speaker_periods);
    assert!(played.silent_periods <= played.periods);
    assert_eq!(summary.blocks_processed, 500);
    assert!(summary.overwritten_blocks <= 500);
    assert_eq!(engine.phase(), Phase::Stopped);
}

#[test]
fn device_failure_during_calibration_stops_the_engine() {
    let mut engine = Engine::new(params()).unwrap();
    let result = engine.calibrate(&mut UnpluggedDevice);
    assert!(matches!(result, Err(AncError::Stream(_))));
    assert_eq!(engine.phase(), Phase::Stopped);
}

#[test]
fn capture_failure_ends_the_run() {
    let room = Arc::new(Mutex::new(Room::new(64)));
    let mut engine = calibrated_engine(&room);
    let token = CancelToken::new();
    let mut speaker = Speaker {
        room,
        limit: 0.3,
        periods: 0,
    };

    let result = engine.run_duplex(&mut UnpluggedDevice, &mut speaker, &token);
    assert!(matches!(result, Err(AncError::Stream(_))));
    assert_eq!(engine.phase(), Phase::Stopped);
}

#[test]
fn uncalibrated_engine_refuses_to_run() {
    let room = Arc::new(Mutex::new(Room::new(64)));
    let mut engine = Engine::new(params()).unwrap();
    let token = CancelToken::new();
    let mut mic = Mic {
        room: Arc::clone(&room),
        periods: 0,
        cancel_after: 10,
        token: token.clone(),
    };
    let mut speaker = Speaker {
        room: Arc::clone(&room),
        limit: 0.3,
        periods: 0,
    };

    let result = engine.run_duplex(&mut mic, &mut speaker, &token);
    assert!(matches!(result, Err(AncError::NotAdapting(Phase::Idle))));
    assert_eq!(engine.phase(), Phase::Idle);
    assert_eq!(mic.periods, 0);
    assert_eq!(speaker.periods, 0);

    // the refused run did not burn the engine; it can still be calibrated
    engine.calibrate(&mut Calibration(room)).unwrap();
    assert_eq!(engine.phase(), Phase::Adapting);
}
