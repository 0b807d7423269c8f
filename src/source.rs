//! Input framing: the detector and the speech front-end share one pipe.
//!
//! Each line is either a JSON object (a landmark frame) or a bare phrase
//! (a voice transcript). Malformed frames are logged and skipped so a
//! glitching detector cannot stall the pipeline.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::landmarks::LandmarkFrame;

pub fn run_reader<R: BufRead>(
    reader: R,
    frame_tx: flume::Sender<LandmarkFrame>,
    voice_tx: flume::Sender<String>,
    running: Arc<AtomicBool>,
) {
    for line in reader.lines() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("[SOURCE] read error: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('{') {
            match serde_json::from_str::<LandmarkFrame>(line) {
                Ok(frame) => {
                    if frame_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("[SOURCE] bad frame: {}", e),
            }
        } else if voice_tx.send(line.to_string()).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame_line() -> String {
        let point = r#"{"x": 0.5, "y": 0.5}"#;
        let points = vec![point; 21].join(",");
        format!(r#"{{"landmarks": [{}], "handedness": "left", "confidence": 0.9}}"#, points)
    }

    #[test]
    fn test_frames_and_phrases_demuxed() {
        let input = format!(
            "# comment\n\n{}\nopen terminal\n{{not json}}\n{}\n",
            frame_line(),
            frame_line()
        );
        let (frame_tx, frame_rx) = flume::unbounded();
        let (voice_tx, voice_rx) = flume::unbounded();
        run_reader(
            Cursor::new(input),
            frame_tx,
            voice_tx,
            Arc::new(AtomicBool::new(true)),
        );
        assert_eq!(frame_rx.drain().count(), 2);
        let phrases: Vec<String> = voice_rx.drain().collect();
        assert_eq!(phrases, vec!["open terminal"]);
    }

    #[test]
    fn test_reader_stops_when_flag_cleared() {
        let input = format!("{}\n{}\n", frame_line(), frame_line());
        let (frame_tx, frame_rx) = flume::unbounded();
        let (voice_tx, _voice_rx) = flume::unbounded();
        run_reader(
            Cursor::new(input),
            frame_tx,
            voice_tx,
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(frame_rx.drain().count(), 0);
    }
}
