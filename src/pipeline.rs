//! Pipeline wiring: reader, sensing loop and voice loop around one shared
//! dispatcher. All threads are gated on a single running flag; Ctrl-C
//! clears it, loops drain and join, and any open drag is released before
//! the process exits.

use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::action::{ActionCommand, ActionDescriptor, ControllerKind};
use crate::classifier::{GestureClassifier, Source};
use crate::config::Config;
use crate::controllers::ControllerRegistry;
use crate::dispatcher::{ActionDispatcher, DispatchMode, DispatchOutcome};
use crate::landmarks::LandmarkFrame;
use crate::profile::{ActionMapper, Profile};
use crate::source::run_reader;
use crate::stabilizer::{CooldownRegistry, GestureStabilizer};
use crate::stats::{PipelineStats, StatusSnapshot};

type LoopResult = Result<(), Box<dyn Error + Send + Sync>>;

pub struct PipelineContext {
    pub config: Config,
    pub profile: Profile,
    pub registry: ControllerRegistry,
}

/// Only pointer work is latency-critical enough to run on the sensing
/// thread. Keyboard emulation sleeps between key events, so it queues
/// along with everything else that can block.
fn mode_for(kind: ControllerKind) -> DispatchMode {
    match kind {
        ControllerKind::Pointer => DispatchMode::Immediate,
        ControllerKind::Keyboard | ControllerKind::Shell | ControllerKind::Window => {
            DispatchMode::Queued
        }
    }
}

fn dispatch(
    dispatcher: &ActionDispatcher,
    stats: &PipelineStats,
    descriptor: ActionDescriptor,
) {
    stats.actions_triggered.fetch_add(1, Ordering::Relaxed);
    let mode = mode_for(descriptor.kind());
    if let DispatchOutcome::Rejected(result) = dispatcher.execute(descriptor, mode) {
        eprintln!(
            "[DISPATCH] action dropped: {}",
            result.error.unwrap_or_default()
        );
    }
}

fn run_sensing(
    frame_rx: flume::Receiver<LandmarkFrame>,
    config: &Config,
    mapper: Arc<ActionMapper>,
    dispatcher: Arc<ActionDispatcher>,
    stats: Arc<PipelineStats>,
    running: Arc<AtomicBool>,
) -> LoopResult {
    let mut classifier = GestureClassifier::new(config.gestures.clone());
    let mut stabilizer = GestureStabilizer::new(config.stabilizer.clone());

    while running.load(Ordering::SeqCst) {
        let frame = match frame_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => frame,
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        };
        stats.frames_processed.fetch_add(1, Ordering::Relaxed);
        if !frame.is_usable() || frame.confidence < config.gestures.min_confidence {
            stats.frames_skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        let now = Instant::now();
        let sample = match classifier.classify(&frame, now) {
            Some(sample) => sample,
            None => continue,
        };
        stats.samples_classified.fetch_add(1, Ordering::Relaxed);
        let event = match stabilizer.accept(sample, Source::Hand, now) {
            Some(event) => event,
            None => {
                stats.events_suppressed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        stats.events_stabilized.fetch_add(1, Ordering::Relaxed);
        if let Some(descriptor) = mapper.map(&event) {
            dispatch(&dispatcher, &stats, descriptor);
        }
    }

    // A drag must never outlive the loop that started it.
    if let Some(end) = classifier.end_drag(Instant::now()) {
        if let Some(descriptor) = mapper.map(&end) {
            dispatch(&dispatcher, &stats, descriptor);
        }
    }
    Ok(())
}

fn run_voice(
    voice_rx: flume::Receiver<String>,
    cooldown_interval: Duration,
    mapper: Arc<ActionMapper>,
    dispatcher: Arc<ActionDispatcher>,
    stats: Arc<PipelineStats>,
    running: Arc<AtomicBool>,
) -> LoopResult {
    // Voice has its own cooldown, keyed on the resolved command so a
    // stuttering transcript cannot double-fire an action.
    let mut cooldown: CooldownRegistry<(ActionCommand, Source)> =
        CooldownRegistry::new(cooldown_interval);
    while running.load(Ordering::SeqCst) {
        let text = match voice_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(text) => text,
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        };
        match mapper.map_voice(&text) {
            Some(descriptor) => {
                let key = (descriptor.command.clone(), Source::Voice);
                if !cooldown.check_and_update(key, Instant::now()) {
                    stats.events_suppressed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                stats.voice_commands.fetch_add(1, Ordering::Relaxed);
                println!("voice: {:?} -> {}", text, descriptor.description);
                dispatch(&dispatcher, &stats, descriptor);
            }
            None => println!("voice: {:?} (no match)", text),
        }
    }
    Ok(())
}

pub fn status_snapshot(
    dispatcher: &ActionDispatcher,
    drag_active: bool,
) -> StatusSnapshot {
    let all_kinds = [
        ControllerKind::Pointer,
        ControllerKind::Keyboard,
        ControllerKind::Shell,
        ControllerKind::Window,
    ];
    let registry = dispatcher.controllers();
    let controllers = all_kinds
        .iter()
        .map(|&kind| (kind, registry.available(kind)))
        .collect();
    StatusSnapshot {
        queue_depth: dispatcher.queue_depth(),
        controllers,
        last_action: dispatcher.stats.last_action(),
        drag_active,
    }
}

pub fn run_pipeline<R>(ctx: PipelineContext, input: R) -> LoopResult
where
    R: BufRead + Send + 'static,
{
    let PipelineContext {
        config,
        profile,
        registry,
    } = ctx;

    println!(
        "profile {:?}: {} gesture mappings, {} voice phrases",
        profile.name,
        profile.gestures.len(),
        profile.voice.len()
    );

    let mapper = Arc::new(ActionMapper::new(profile));
    let dispatcher = Arc::new(ActionDispatcher::new(&config.dispatch, registry));
    let stats = Arc::new(PipelineStats::default());
    let running = Arc::new(AtomicBool::new(true));

    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            eprintln!("[PIPELINE] shutting down");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    dispatcher.start();

    let (frame_tx, frame_rx) = flume::bounded::<LandmarkFrame>(8);
    let (voice_tx, voice_rx) = flume::bounded::<String>(32);

    // The reader may stay blocked on a quiet input after shutdown, so it is
    // detached rather than joined; its channels disconnect when the loops
    // exit and the process ends regardless.
    let reader = {
        let running = Arc::clone(&running);
        std::thread::spawn(move || run_reader(input, frame_tx, voice_tx, running))
    };

    let cooldown_interval = Duration::from_millis(config.stabilizer.cooldown_ms);

    let sensing = {
        let mapper = Arc::clone(&mapper);
        let dispatcher = Arc::clone(&dispatcher);
        let stats = Arc::clone(&stats);
        let running = Arc::clone(&running);
        let config = config;
        std::thread::spawn(move || {
            if let Err(e) = run_sensing(frame_rx, &config, mapper, dispatcher, stats, running) {
                eprintln!("[PIPELINE] sensing loop failed: {}", e);
            }
        })
    };

    let voice = {
        let mapper = Arc::clone(&mapper);
        let dispatcher = Arc::clone(&dispatcher);
        let stats = Arc::clone(&stats);
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            if let Err(e) =
                run_voice(voice_rx, cooldown_interval, mapper, dispatcher, stats, running)
            {
                eprintln!("[PIPELINE] voice loop failed: {}", e);
            }
        })
    };

    let _ = sensing.join();
    running.store(false, Ordering::SeqCst);
    let _ = voice.join();
    drop(reader);

    // Any open drag was released when the sensing loop exited.
    println!("status: {}", status_snapshot(&dispatcher, false).render());
    dispatcher.stop();
    println!("pipeline: {}", stats.summary());
    println!("dispatch: {}", dispatcher.stats.summary());
    Ok(())
}

/// Feed a recorded session file through the pipeline.
pub fn run_replay(ctx: PipelineContext, path: &Path) -> LoopResult {
    let file = File::open(path)
        .map_err(|e| format!("opening {}: {}", path.display(), e))?;
    run_pipeline(ctx, BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionCommand, ActionParams, PointerButton};
    use crate::controllers::{Controller, ControllerError};
    use crate::landmarks::{
        Handedness, INDEX_PIP, INDEX_TIP, LANDMARK_COUNT, Landmark, MIDDLE_PIP, MIDDLE_TIP,
        PINKY_PIP, PINKY_TIP, RING_PIP, RING_TIP, THUMB_TIP,
    };
    use crate::profile::Mapping;
    use std::sync::Mutex;

    #[test]
    fn test_mode_routing() {
        assert_eq!(mode_for(ControllerKind::Pointer), DispatchMode::Immediate);
        assert_eq!(mode_for(ControllerKind::Keyboard), DispatchMode::Queued);
        assert_eq!(mode_for(ControllerKind::Shell), DispatchMode::Queued);
        assert_eq!(mode_for(ControllerKind::Window), DispatchMode::Queued);
    }

    struct RecordingController {
        log: Arc<Mutex<Vec<ActionCommand>>>,
    }

    impl Controller for RecordingController {
        fn execute(
            &mut self,
            command: &ActionCommand,
            _params: &ActionParams,
        ) -> Result<String, ControllerError> {
            self.log.lock().unwrap().push(command.clone());
            Ok("ok".into())
        }
    }

    fn lm(x: f32, y: f32) -> Landmark {
        Landmark {
            x,
            y,
            z: 0.0,
            visibility: 1.0,
        }
    }

    fn fist_frame() -> LandmarkFrame {
        let mut points = vec![lm(300.0, 300.0); LANDMARK_COUNT];
        points[THUMB_TIP] = lm(200.0, 330.0);
        points[INDEX_PIP] = lm(300.0, 280.0);
        points[INDEX_TIP] = lm(300.0, 320.0);
        points[MIDDLE_PIP] = lm(320.0, 280.0);
        points[MIDDLE_TIP] = lm(320.0, 320.0);
        points[RING_PIP] = lm(340.0, 280.0);
        points[RING_TIP] = lm(340.0, 320.0);
        points[PINKY_PIP] = lm(360.0, 280.0);
        points[PINKY_TIP] = lm(360.0, 320.0);
        LandmarkFrame {
            landmarks: points,
            handedness: Handedness::Right,
            confidence: 0.9,
            frame_width: 640,
            frame_height: 480,
        }
    }

    /// End to end across the sensing loop: three fist frames stabilize to
    /// one event, the cooldown collapses the rest, and exactly one mapped
    /// action reaches the keyboard controller.
    #[test]
    fn test_sensing_loop_fires_once_for_steady_fist() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ControllerRegistry::new();
        registry.register(
            ControllerKind::Keyboard,
            Box::new(RecordingController {
                log: Arc::clone(&log),
            }),
        );
        let config = Config::default();
        let dispatcher = Arc::new(ActionDispatcher::new(&config.dispatch, registry));
        let mut profile = Profile::builtin("test".to_string());
        profile.gestures.insert(
            "fist".to_string(),
            Mapping {
                command: ActionCommand::KeyTap("escape".into()),
                enabled: true,
                required_confidence: 0.0,
                hand: None,
                confidence: 1.0,
                description: "escape".into(),
            },
        );
        let mapper = Arc::new(ActionMapper::new(profile));
        let stats = Arc::new(PipelineStats::default());
        let running = Arc::new(AtomicBool::new(true));

        let (frame_tx, frame_rx) = flume::unbounded();
        for _ in 0..3 {
            frame_tx.send(fist_frame()).unwrap();
        }
        drop(frame_tx); // disconnect ends the loop after the backlog

        dispatcher.start();
        run_sensing(
            frame_rx,
            &config,
            mapper,
            Arc::clone(&dispatcher),
            Arc::clone(&stats),
            running,
        )
        .unwrap();
        // Keyboard actions are queued; wait for the consumer to drain.
        let deadline = Instant::now() + Duration::from_secs(2);
        while log.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        dispatcher.stop();

        assert_eq!(
            *log.lock().unwrap(),
            vec![ActionCommand::KeyTap("escape".into())]
        );
        assert_eq!(stats.frames_processed.load(Ordering::Relaxed), 3);
        assert_eq!(stats.samples_classified.load(Ordering::Relaxed), 3);
        assert_eq!(stats.events_stabilized.load(Ordering::Relaxed), 1);
        assert_eq!(stats.events_suppressed.load(Ordering::Relaxed), 2);
    }

    /// A repeated transcript inside the cooldown interval fires once.
    #[test]
    fn test_voice_repeat_suppressed() {
        let config = Config::default();
        let dispatcher = Arc::new(ActionDispatcher::new(
            &config.dispatch,
            ControllerRegistry::new(),
        ));
        let mut profile = Profile::builtin("test".to_string());
        profile.voice.insert(
            "open terminal".to_string(),
            Mapping {
                command: ActionCommand::ShellRun("true".into()),
                enabled: true,
                required_confidence: 0.0,
                hand: None,
                confidence: 1.0,
                description: "terminal".into(),
            },
        );
        let mapper = Arc::new(ActionMapper::new(profile));
        let stats = Arc::new(PipelineStats::default());

        let (voice_tx, voice_rx) = flume::unbounded();
        voice_tx.send("open terminal".to_string()).unwrap();
        voice_tx.send("open terminal".to_string()).unwrap();
        drop(voice_tx);

        run_voice(
            voice_rx,
            Duration::from_millis(300),
            mapper,
            Arc::clone(&dispatcher),
            Arc::clone(&stats),
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        assert_eq!(stats.voice_commands.load(Ordering::Relaxed), 1);
        assert_eq!(stats.events_suppressed.load(Ordering::Relaxed), 1);
        assert_eq!(dispatcher.queue_depth(), 1);
    }

    /// The shutdown path ends an open drag with exactly one release.
    #[test]
    fn test_loop_exit_releases_open_drag() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ControllerRegistry::new();
        registry.register(
            ControllerKind::Pointer,
            Box::new(RecordingController {
                log: Arc::clone(&log),
            }),
        );
        let config = Config::default();
        let dispatcher = Arc::new(ActionDispatcher::new(&config.dispatch, registry));
        let mapper = Arc::new(ActionMapper::new(Profile::builtin("test".to_string())));
        let stats = Arc::new(PipelineStats::default());
        let running = Arc::new(AtomicBool::new(true));

        // A pinched frame, held long enough to promote to a drag.
        let mut points = vec![lm(300.0, 300.0); LANDMARK_COUNT];
        points[INDEX_PIP] = lm(300.0, 250.0);
        points[INDEX_TIP] = lm(300.0, 200.0);
        points[THUMB_TIP] = lm(290.0, 200.0);
        points[MIDDLE_PIP] = lm(320.0, 280.0);
        points[MIDDLE_TIP] = lm(320.0, 320.0);
        points[RING_PIP] = lm(340.0, 280.0);
        points[RING_TIP] = lm(340.0, 320.0);
        points[PINKY_PIP] = lm(360.0, 280.0);
        points[PINKY_TIP] = lm(360.0, 320.0);
        let pinched = LandmarkFrame {
            landmarks: points,
            handedness: Handedness::Right,
            confidence: 0.9,
            frame_width: 640,
            frame_height: 480,
        };

        let (frame_tx, frame_rx) = flume::unbounded();
        let sender = {
            let pinched = pinched.clone();
            std::thread::spawn(move || {
                frame_tx.send(pinched.clone()).unwrap();
                std::thread::sleep(Duration::from_millis(350));
                frame_tx.send(pinched).unwrap();
            })
        };

        run_sensing(
            frame_rx,
            &config,
            mapper,
            Arc::clone(&dispatcher),
            Arc::clone(&stats),
            running,
        )
        .unwrap();
        sender.join().unwrap();

        let log = log.lock().unwrap();
        let presses = log
            .iter()
            .filter(|c| **c == ActionCommand::PointerPress(PointerButton::Left))
            .count();
        let releases = log
            .iter()
            .filter(|c| **c == ActionCommand::PointerRelease(PointerButton::Left))
            .count();
        assert_eq!(presses, 1);
        assert_eq!(releases, 1);
    }
}
