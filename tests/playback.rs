//! Playback thread driven against an in-memory MIDI sink

use crossbeam_channel::Receiver;
use drumbeat::midi::{MidiMessage, MidiSink, OutputError};
use drumbeat::sequencer::{
    ControlError, EngineOptions, PlaybackEngine, PlaybackEvent, PlaybackStatus,
};
use drumbeat_core::types::{InstrumentId, InstrumentMap, Pattern, StepArray};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

type Log = Arc<Mutex<Vec<(Instant, MidiMessage)>>>;

#[derive(Clone, Default)]
struct RecordingSink {
    log: Log,
}

impl RecordingSink {
    fn messages(&self) -> Vec<(Instant, MidiMessage)> {
        self.log.lock().unwrap().clone()
    }

    fn note_ons(&self) -> Vec<(Instant, MidiMessage)> {
        self.messages()
            .into_iter()
            .filter(|(_, m)| matches!(m, MidiMessage::NoteOn { .. }))
            .collect()
    }
}

impl MidiSink for RecordingSink {
    fn send(&mut self, message: MidiMessage) -> Result<(), OutputError> {
        self.log.lock().unwrap().push((Instant::now(), message));
        Ok(())
    }
}

/// Output that rejects every message
struct UnpluggedSink;

impl MidiSink for UnpluggedSink {
    fn send(&mut self, _message: MidiMessage) -> Result<(), OutputError> {
        Err(OutputError::NotConnected("TR-8S".to_string()))
    }
}

/// Output that blocks once, on the `stall_at`-th Note On
#[derive(Clone)]
struct StallingSink {
    inner: RecordingSink,
    stall_at: usize,
    stall: Duration,
}

impl MidiSink for StallingSink {
    fn send(&mut self, message: MidiMessage) -> Result<(), OutputError> {
        self.inner.send(message)?;
        if matches!(message, MidiMessage::NoteOn { .. })
            && self.inner.note_ons().len() == self.stall_at
        {
            thread::sleep(self.stall);
        }
        Ok(())
    }
}

const ALL_STEPS: StepArray = [100; 16];

fn kick_every_step(bpm: f64) -> Pattern {
    Pattern::new(bpm)
        .unwrap()
        .with_track(InstrumentId::BD, ALL_STEPS)
        .unwrap()
}

fn wait_for_status(events: &Receiver<PlaybackEvent>, wanted: PlaybackStatus) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while let Ok(event) = events.recv_deadline(deadline) {
        if event == PlaybackEvent::StatusChanged(wanted) {
            return true;
        }
    }
    false
}

fn next_step(events: &Receiver<PlaybackEvent>) -> Option<usize> {
    let deadline = Instant::now() + Duration::from_secs(2);
    while let Ok(event) = events.recv_deadline(deadline) {
        if let PlaybackEvent::StepChanged(step) = event {
            return Some(step);
        }
    }
    None
}

/// Every step published until playback reports Stopped
fn steps_until_stopped(events: &Receiver<PlaybackEvent>) -> Vec<usize> {
    let mut steps = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(2);
    while let Ok(event) = events.recv_deadline(deadline) {
        match event {
            PlaybackEvent::StepChanged(step) => steps.push(step),
            PlaybackEvent::StatusChanged(PlaybackStatus::Stopped) => return steps,
            _ => {}
        }
    }
    panic!("playback never stopped");
}

/// Consume events up to and including `step`
fn advance_to(events: &Receiver<PlaybackEvent>, step: usize) {
    for _ in 0..64 {
        match next_step(events) {
            Some(s) if s == step => return,
            Some(_) => {}
            None => break,
        }
    }
    panic!("step {} never reached", step);
}

#[test]
fn test_status_transitions() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink).unwrap();
    let events = engine.subscribe().unwrap();

    assert_eq!(engine.status(), PlaybackStatus::Stopped);
    engine.play(kick_every_step(120.0)).unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Playing));
    assert!(engine.is_playing());

    engine.stop().unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Stopped));
    assert!(!engine.is_playing());
}

#[test]
fn test_silent_pattern_sends_no_notes() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink.clone()).unwrap();
    let events = engine.subscribe().unwrap();

    let silent = Pattern::new(300.0)
        .unwrap()
        .with_track(InstrumentId::SD, [0; 16])
        .unwrap();
    engine.play(silent).unwrap();
    for _ in 0..8 {
        assert!(next_step(&events).is_some());
    }
    assert!(sink.note_ons().is_empty());
}

#[test]
fn test_only_sounding_steps_are_sent() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink.clone()).unwrap();
    let events = engine.subscribe().unwrap();

    let mut steps = [0u8; 16];
    steps[0] = 127;
    steps[4] = 64;
    let pattern = Pattern::new(300.0)
        .unwrap()
        .with_track(InstrumentId::CH, steps)
        .unwrap();
    engine.play(pattern).unwrap();
    advance_to(&events, 7);
    engine.stop().unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Stopped));

    let notes: Vec<MidiMessage> = sink.note_ons().into_iter().map(|(_, m)| m).collect();
    assert_eq!(
        notes,
        vec![
            MidiMessage::NoteOn { channel: 9, note: 42, velocity: 127 },
            MidiMessage::NoteOn { channel: 9, note: 42, velocity: 64 },
        ]
    );
}

#[test]
fn test_steps_follow_tempo() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink.clone()).unwrap();
    let events = engine.subscribe().unwrap();

    engine.play(kick_every_step(240.0)).unwrap();
    for expected in 0..12 {
        assert_eq!(next_step(&events), Some(expected));
    }
    engine.stop().unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Stopped));

    // 62.5ms per step at 240 BPM; generous bounds for loaded CI machines
    let times: Vec<Instant> = sink.note_ons().iter().map(|(t, _)| *t).collect();
    assert!(times.len() >= 12);
    let span = times[11] - times[0];
    assert!(span >= Duration::from_millis(680), "span {:?}", span);
    assert!(span <= Duration::from_millis(760), "span {:?}", span);
}

#[test]
fn test_stop_sweeps_every_instrument_once() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink.clone()).unwrap();
    let events = engine.subscribe().unwrap();

    engine.play(kick_every_step(60.0)).unwrap();
    assert_eq!(next_step(&events), Some(0));

    let stop_sent = Instant::now();
    engine.stop().unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Stopped));
    // A step is 250ms here; stop must not wait for the next one
    assert!(stop_sent.elapsed() < Duration::from_millis(200));

    let offs: Vec<MidiMessage> = sink
        .messages()
        .into_iter()
        .map(|(_, m)| m)
        .filter(|m| matches!(m, MidiMessage::NoteOff { .. }))
        .collect();
    assert_eq!(offs.len(), InstrumentMap::default().len());
    for id in InstrumentId::ALL {
        assert!(offs.contains(&MidiMessage::NoteOff {
            channel: 9,
            note: id.default_note()
        }));
    }

    // Nothing more once stopped
    let count = sink.messages().len();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(sink.messages().len(), count);
    assert_eq!(engine.current_step(), 0);
}

#[test]
fn test_double_play_does_not_restart() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink).unwrap();
    let events = engine.subscribe().unwrap();

    let pattern = kick_every_step(300.0);
    engine.play(pattern.clone()).unwrap();
    advance_to(&events, 5);
    engine.play(pattern).unwrap();

    // Steps keep counting up from where they were
    let after = next_step(&events).unwrap();
    assert!(after >= 6, "restarted at step {}", after);
}

#[test]
fn test_double_play_sends_each_step_once() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink.clone()).unwrap();
    let events = engine.subscribe().unwrap();

    let pattern = kick_every_step(300.0);
    engine.play(pattern.clone()).unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Playing));
    let mut steps = Vec::new();
    while steps.len() < 6 {
        steps.push(next_step(&events).unwrap());
    }
    engine.play(pattern.clone()).unwrap();
    engine.play(pattern).unwrap();
    while steps.len() < 10 {
        steps.push(next_step(&events).unwrap());
    }
    engine.stop().unwrap();
    steps.extend(steps_until_stopped(&events));

    let expected: Vec<usize> = (0..steps.len()).collect();
    assert_eq!(steps, expected);
    assert_eq!(sink.note_ons().len(), steps.len());
}

#[test]
fn test_late_output_skips_steps_instead_of_bursting() {
    let recorder = RecordingSink::default();
    let sink = StallingSink {
        inner: recorder.clone(),
        stall_at: 3,
        stall: Duration::from_millis(420),
    };
    let engine = PlaybackEngine::new(sink).unwrap();
    let events = engine.subscribe().unwrap();

    // 125ms per step; the stall on step 2 overruns steps 3 and 4
    engine.play(kick_every_step(120.0)).unwrap();
    let steps: Vec<usize> = (0..8).map(|_| next_step(&events).unwrap()).collect();
    engine.stop().unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Stopped));
    assert_eq!(steps, vec![0, 1, 2, 5, 6, 7, 8, 9]);

    let times: Vec<Instant> = recorder.note_ons().iter().map(|(t, _)| *t).collect();
    assert_eq!(times.len(), 8);
    assert!(times[3] - times[2] >= Duration::from_millis(400));
    for pair in times[3..].windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(100), "burst gap {:?}", gap);
    }
}

#[test]
fn test_swing_delays_odd_steps() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink.clone()).unwrap();
    let events = engine.subscribe().unwrap();

    let swung = kick_every_step(120.0).with_swing(50).unwrap();
    engine.play(swung).unwrap();
    advance_to(&events, 7);
    engine.stop().unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Stopped));

    // 125ms grid; 50% swing pushes odd steps back by 0.165 of a step
    let times: Vec<Instant> = sink.note_ons().iter().map(|(t, _)| *t).collect();
    assert_eq!(times.len(), 8);
    for (k, t) in times.iter().enumerate() {
        let grid = times[0] + Duration::from_millis(125) * k as u32;
        let offset_ms = t.saturating_duration_since(grid).as_secs_f64() * 1000.0;
        if k % 2 == 1 {
            assert!((15.0..27.0).contains(&offset_ms), "step {} offset {}ms", k, offset_ms);
        } else {
            assert!(offset_ms < 6.0, "step {} offset {}ms", k, offset_ms);
        }
    }
}

#[test]
fn test_play_from_start_restarts_bar() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink).unwrap();
    let events = engine.subscribe().unwrap();

    let pattern = kick_every_step(300.0);
    engine.play(pattern.clone()).unwrap();
    advance_to(&events, 6);
    engine.play_from_start(pattern).unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Playing));
    assert_eq!(next_step(&events), Some(0));
}

#[test]
fn test_hot_swap_keeps_position() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink.clone()).unwrap();
    let events = engine.subscribe().unwrap();

    engine.play(kick_every_step(150.0)).unwrap();
    advance_to(&events, 3);

    let snares = Pattern::new(150.0)
        .unwrap()
        .with_track(InstrumentId::SD, ALL_STEPS)
        .unwrap();
    engine.replace_pattern(snares).unwrap();
    let swapped_at = next_step(&events).unwrap();
    assert_eq!(swapped_at, 4);
    engine.stop().unwrap();
    assert!(wait_for_status(&events, PlaybackStatus::Stopped));

    let notes: Vec<u8> = sink
        .note_ons()
        .into_iter()
        .filter_map(|(_, m)| match m {
            MidiMessage::NoteOn { note, .. } => Some(note),
            _ => None,
        })
        .collect();
    assert_eq!(&notes[..4], &[36, 36, 36, 36]);
    assert!(notes[4..].iter().all(|&n| n == 38));
}

#[test]
fn test_live_tempo_change() {
    let sink = RecordingSink::default();
    let engine = PlaybackEngine::new(sink.clone()).unwrap();
    let events = engine.subscribe().unwrap();

    engine.play(kick_every_step(60.0)).unwrap();
    assert_eq!(next_step(&events), Some(0));
    engine.set_tempo(300.0).unwrap();
    // The change lands at the next step boundary, then steps are 50ms apart
    assert_eq!(next_step(&events), Some(1));
    let start = Instant::now();
    for expected in 2..6 {
        assert_eq!(next_step(&events), Some(expected));
    }
    assert!(start.elapsed() < Duration::from_millis(400));
    assert_eq!(engine.tempo_bpm(), 300.0);
}

#[test]
fn test_tempo_and_swing_are_validated() {
    let engine = PlaybackEngine::new(RecordingSink::default()).unwrap();
    assert!(matches!(
        engine.set_tempo(f64::NAN),
        Err(ControlError::InvalidTempo(_))
    ));
    assert_eq!(engine.set_tempo(-120.0), Err(ControlError::InvalidTempo(-120.0)));
    assert!(engine.set_swing(400).is_ok());
    assert!(engine.set_swing(-3).is_ok());
}

#[test]
fn test_output_errors_do_not_stop_playback() {
    let engine = PlaybackEngine::new(UnpluggedSink).unwrap();
    let events = engine.subscribe().unwrap();

    engine.play(kick_every_step(300.0)).unwrap();
    let mut errors = 0;
    let mut steps = 0;
    let deadline = Instant::now() + Duration::from_secs(2);
    while steps < 6 {
        match events.recv_deadline(deadline) {
            Ok(PlaybackEvent::OutputError(_)) => errors += 1,
            Ok(PlaybackEvent::StepChanged(_)) => steps += 1,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert_eq!(steps, 6);
    assert!(errors >= 5);
    assert!(engine.is_playing());
}

#[test]
fn test_explicit_note_off_gates() {
    let sink = RecordingSink::default();
    let options = EngineOptions {
        instruments: InstrumentMap::default().with_explicit_note_off(true),
        ..EngineOptions::default()
    };
    let engine = PlaybackEngine::with_options(sink.clone(), options).unwrap();
    let events = engine.subscribe().unwrap();

    let mut steps = [0u8; 16];
    steps[0] = 100;
    let pattern = Pattern::new(120.0)
        .unwrap()
        .with_track(InstrumentId::RS, steps)
        .unwrap();
    engine.play(pattern).unwrap();
    assert_eq!(next_step(&events), Some(0));
    thread::sleep(Duration::from_millis(60));

    let messages = sink.messages();
    let on = messages
        .iter()
        .find(|(_, m)| matches!(m, MidiMessage::NoteOn { note: 37, .. }))
        .map(|(t, _)| *t)
        .unwrap();
    let off = messages
        .iter()
        .find(|(_, m)| matches!(m, MidiMessage::NoteOff { note: 37, .. }))
        .map(|(t, _)| *t)
        .unwrap();
    assert!(off - on >= Duration::from_millis(10));
    assert!(off - on < Duration::from_millis(50));
}

#[test]
fn test_slow_subscriber_does_not_stall_playback() {
    let sink = RecordingSink::default();
    let options = EngineOptions {
        subscriber_capacity: 1,
        ..EngineOptions::default()
    };
    let engine = PlaybackEngine::with_options(sink.clone(), options).unwrap();
    let _ignored = engine.subscribe().unwrap();

    engine.play(kick_every_step(300.0)).unwrap();
    thread::sleep(Duration::from_millis(400));
    assert!(sink.note_ons().len() >= 6);
    assert!(engine.is_playing());
}
